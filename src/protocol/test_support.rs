use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::Form;
use crate::error::TransportError;
use crate::report::Response;

use super::{AttemptFailure, ProtocolTable, Requester, RequesterContext};

/// Network-free requester. Behaviour is picked by the options URL:
/// `fake://ok`, `fake://fail`, or `fake://flaky` (two failures, then a
/// success, repeating). Every attempt takes 5ms.
pub(crate) struct FakeRequester {
    mode: String,
    attempts: u64,
}

#[async_trait]
impl Requester for FakeRequester {
    fn form(&self) -> Form {
        Form::Http
    }

    async fn dispose(&mut self) -> Result<Response, AttemptFailure> {
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.attempts = self.attempts.saturating_add(1);
        let failing = match self.mode.as_str() {
            "fake://fail" => true,
            "fake://flaky" => self.attempts % 3 != 0,
            _ => false,
        };
        if failing {
            let error = TransportError::Io {
                source: std::io::Error::other("fake failure"),
            };
            return Err(AttemptFailure::new(Duration::from_millis(5), error));
        }
        Ok(Response::success(Duration::from_millis(5), Bytes::new()))
    }

    async fn send(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        Ok(Bytes::new())
    }

    fn close(&mut self) {}
}

fn fake_requester(ctx: &RequesterContext) -> Result<Box<dyn Requester>, TransportError> {
    Ok(Box::new(FakeRequester {
        mode: ctx.options.url.clone(),
        attempts: 0,
    }))
}

/// A table whose HTTP entry builds [`FakeRequester`]s.
pub(crate) fn fake_table() -> ProtocolTable {
    let mut table = ProtocolTable::empty();
    if let Err(err) = table.register(Form::Http, fake_requester) {
        tracing::warn!("{}", err.message);
    }
    table
}
