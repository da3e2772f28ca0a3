use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Form;
use crate::error::TransportError;

use super::context::RequesterContext;
use super::http::HttpTransport;
use super::requester::ProtocolRequester;
use super::tcp::TcpTransport;
use super::traits::Requester;

pub type RequesterCtor = fn(&RequesterContext) -> Result<Box<dyn Requester>, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTableError {
    pub message: String,
}

/// Maps each [`Form`] to the constructor of its requester.
#[derive(Debug, Clone)]
pub struct ProtocolTable {
    ctors: BTreeMap<Form, RequesterCtor>,
}

impl Default for ProtocolTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn http_requester(ctx: &RequesterContext) -> Result<Box<dyn Requester>, TransportError> {
    let transport = HttpTransport::new(ctx.http_client.clone(), ctx.timeout);
    Ok(Box::new(ProtocolRequester::new(
        transport,
        Arc::clone(&ctx.options),
        ctx.resolver.clone(),
    )))
}

fn tcp_requester(ctx: &RequesterContext) -> Result<Box<dyn Requester>, TransportError> {
    let transport = TcpTransport::new(Arc::clone(&ctx.pool), ctx.timeout);
    Ok(Box::new(ProtocolRequester::new(
        transport,
        Arc::clone(&ctx.options),
        ctx.resolver.clone(),
    )))
}

impl ProtocolTable {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ctors: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();
        let builtins: [(Form, RequesterCtor); 2] =
            [(Form::Http, http_requester), (Form::Tcp, tcp_requester)];
        for (form, ctor) in builtins {
            if let Err(err) = table.register(form, ctor) {
                tracing::warn!("Skipping duplicate builtin requester: {}", err.message);
            }
        }
        table
    }

    /// Registers a constructor for `form`.
    ///
    /// # Errors
    ///
    /// Returns an error when `form` already has a constructor.
    pub fn register(&mut self, form: Form, ctor: RequesterCtor) -> Result<(), ProtocolTableError> {
        if self.ctors.contains_key(&form) {
            return Err(ProtocolTableError {
                message: format!("Requester already registered: {}", form),
            });
        }
        self.ctors.insert(form, ctor);
        Ok(())
    }

    #[must_use]
    pub fn supports(&self, form: Form) -> bool {
        self.ctors.contains_key(&form)
    }

    /// Builds a requester for the context's configured form.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedProtocol` when no constructor is registered.
    pub fn build(&self, ctx: &RequesterContext) -> Result<Box<dyn Requester>, TransportError> {
        let form = ctx.options.form;
        let ctor = self
            .ctors
            .get(&form)
            .ok_or(TransportError::UnsupportedProtocol { form })?;
        ctor(ctx)
    }
}
