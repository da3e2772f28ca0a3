use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Protocol selector carried on the wire as an integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Form {
    #[default]
    Http,
    Tcp,
    WebSocket,
}

impl Form {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Tcp => "tcp",
            Self::WebSocket => "websocket",
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for Form {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Http),
            1 => Ok(Self::Tcp),
            2 => Ok(Self::WebSocket),
            _ => Err(ValidationError::UnknownForm { value }),
        }
    }
}

impl From<Form> for u8 {
    fn from(form: Form) -> Self {
        match form {
            Form::Http => 0,
            Form::Tcp => 1,
            Form::WebSocket => 2,
        }
    }
}

/// Immutable per-run configuration of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub task_id: String,
    pub url: String,
    #[serde(rename = "conCurrent")]
    pub concurrent: u64,
    /// Only meaningful for scale requests against a running task.
    #[serde(rename = "lessenConCurrent")]
    pub lessen_concurrent: u64,
    /// Seconds; 0 runs until stopped.
    pub duration: u64,
    /// Milliseconds between attempts of one worker.
    pub interval: u64,
    pub form: Form,
    pub send_data: Option<SendData>,
    pub http_options: HttpOptions,
    pub tcp_options: TcpOptions,
    pub transaction_options: TransactionSpec,
}

impl Options {
    /// Checks the invariants required before a run can start.
    ///
    /// # Errors
    ///
    /// Returns an error when the URL is empty, the concurrency is zero, or a
    /// transaction step is malformed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.trim().is_empty() {
            return Err(ValidationError::MissingUrl);
        }
        if self.concurrent == 0 {
            return Err(ValidationError::ConcurrencyZero);
        }
        self.transaction_options.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpOptions {
    pub method: String,
    pub header: BTreeMap<String, String>,
    pub cookie: BTreeMap<String, String>,
}

/// Length-prefixed framing parameters and pool limits for TCP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TcpOptions {
    pub max_frame_length: usize,
    pub pool_capacity: usize,
    pub pool_wait_ms: u64,
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            max_frame_length: 8 * 1024 * 1024,
            pool_capacity: 1024,
            pool_wait_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendData {
    pub data_field_list: Vec<DataField>,
}

impl SendData {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data_field_list.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Int,
    #[default]
    String,
    File,
    #[serde(alias = "transaction-send", alias = "transaction_send")]
    TransactionSend,
    #[serde(alias = "transaction-response", alias = "transaction_response")]
    TransactionResponse,
}

/// Declarative description of one payload field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Upper bound for `int`, length for `string`.
    pub len: u64,
    pub default: Option<String>,
    /// `"<source>---<key>"` locator for file and transaction kinds.
    pub dynamic: Option<String>,
}

impl DataField {
    /// The literal default, if one was configured. An empty string counts as
    /// unset since that is what clients send for "no default".
    #[must_use]
    pub fn literal(&self) -> Option<&str> {
        self.default.as_deref().filter(|value| !value.is_empty())
    }
}

/// One step of a transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Step {
    pub name: String,
    pub url: String,
    /// Milliseconds to wait after this step before the next one.
    pub interval: u64,
    pub http_options: HttpOptions,
    pub tcp_options: TcpOptions,
    pub send_data: Option<SendData>,
}

/// Ordered transaction steps; empty means single-request mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionSpec {
    pub steps: Vec<Step>,
}

impl TransactionSpec {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    fn validate(&self) -> Result<(), ValidationError> {
        let mut seen = HashSet::with_capacity(self.steps.len());
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(ValidationError::StepMissingName { index });
            }
            if !seen.insert(step.name.as_str()) {
                return Err(ValidationError::DuplicateStepName {
                    name: step.name.clone(),
                });
            }
            if step.url.trim().is_empty() {
                return Err(ValidationError::StepMissingUrl {
                    name: step.name.clone(),
                });
            }
        }
        Ok(())
    }
}
