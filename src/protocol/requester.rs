use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::{Form, Options, SendData};
use crate::data::{Captures, Resolver, TransactionCursor};
use crate::error::TransportError;
use crate::report::{Response, micros};

use super::traits::{AttemptFailure, Requester, Target, Transport};

/// Attempt logic shared by every protocol: payload resolution, transaction
/// stepping, captures and timing. The wire exchange is delegated to `T`.
pub struct ProtocolRequester<T> {
    transport: T,
    options: Arc<Options>,
    resolver: Resolver,
    cursor: Option<TransactionCursor>,
}

impl<T: Transport> ProtocolRequester<T> {
    #[must_use]
    pub fn new(transport: T, options: Arc<Options>, resolver: Resolver) -> Self {
        let cursor = if options.transaction_options.is_empty() {
            None
        } else {
            Some(TransactionCursor::new(&options.transaction_options))
        };
        Self {
            transport,
            options,
            resolver,
            cursor,
        }
    }

    #[must_use]
    pub const fn cursor(&self) -> Option<&TransactionCursor> {
        self.cursor.as_ref()
    }

    async fn exchange(&mut self) -> Result<Bytes, TransportError> {
        self.send().await?;
        self.recv().await
    }

    async fn dispose_single(&mut self) -> Result<Response, AttemptFailure> {
        let started = Instant::now();
        let result = self.exchange().await;
        let elapsed = started.elapsed();
        match result {
            Ok(data) => Ok(Response::success(elapsed, data)),
            Err(error) => Err(AttemptFailure::new(elapsed, error)),
        }
    }

    async fn dispose_transaction(&mut self) -> Result<Response, AttemptFailure> {
        let steps = match self.cursor.as_mut() {
            Some(cursor) => {
                cursor.begin_attempt();
                Arc::clone(cursor.steps())
            }
            None => return self.dispose_single().await,
        };

        let mut step_times = BTreeMap::new();
        let mut total = Duration::ZERO;
        let mut last = Bytes::new();
        let mut pause = 0_u64;

        for step in steps.iter() {
            if pause > 0 {
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
            pause = step.interval;

            let started = Instant::now();
            let result = self.exchange().await;
            let elapsed = started.elapsed();
            total = total.saturating_add(elapsed);

            match result {
                Ok(data) => {
                    step_times.insert(step.name.clone(), micros(elapsed));
                    last = data;
                }
                Err(error) => {
                    debug!("Transaction step '{}' failed: {}", step.name, error);
                    return Err(AttemptFailure::new(
                        total,
                        TransportError::step(&step.name, error),
                    ));
                }
            }
            if let Some(cursor) = self.cursor.as_ref() {
                cursor.advance();
            }
        }

        let mut response = Response::success(total, last);
        response.transaction_waste_time = Some(step_times);
        Ok(response)
    }
}

fn encode(
    resolver: &Resolver,
    send_data: Option<&SendData>,
    captures: &Captures,
) -> Result<Option<Bytes>, TransportError> {
    send_data
        .map(|send_data| resolver.encode(send_data, captures))
        .transpose()
        .map_err(|source| TransportError::Encode { source })
}

#[async_trait]
impl<T: Transport> Requester for ProtocolRequester<T> {
    fn form(&self) -> Form {
        self.transport.form()
    }

    async fn dispose(&mut self) -> Result<Response, AttemptFailure> {
        if self.cursor.is_some() {
            self.dispose_transaction().await
        } else {
            self.dispose_single().await
        }
    }

    async fn send(&mut self) -> Result<(), TransportError> {
        match self.cursor.as_mut() {
            Some(cursor) => {
                let steps = Arc::clone(cursor.steps());
                let Some(step) = steps.get(cursor.position()) else {
                    return Err(TransportError::NothingSent);
                };
                let payload = encode(&self.resolver, step.send_data.as_ref(), cursor.captures())?;
                if let Some(payload) = payload.as_ref() {
                    cursor.captures_mut().record_sent(&step.name, payload.clone());
                }
                let target = Target {
                    key: &step.name,
                    url: &step.url,
                    http: &step.http_options,
                    tcp: &step.tcp_options,
                };
                self.transport.send(target, payload).await
            }
            None => {
                let options = &self.options;
                let payload = encode(
                    &self.resolver,
                    options.send_data.as_ref(),
                    &Captures::default(),
                )?;
                let target = Target {
                    key: &options.url,
                    url: &options.url,
                    http: &options.http_options,
                    tcp: &options.tcp_options,
                };
                self.transport.send(target, payload).await
            }
        }
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let data = self.transport.recv().await?;
        if let Some(cursor) = self.cursor.as_mut() {
            let steps = Arc::clone(cursor.steps());
            if let Some(step) = steps.get(cursor.position()) {
                cursor.captures_mut().record_received(&step.name, data.clone());
            }
        }
        Ok(data)
    }

    fn close(&mut self) {
        self.transport.close();
    }
}
