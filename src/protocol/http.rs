use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, COOKIE, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};

use crate::config::{Form, HttpOptions};
use crate::error::TransportError;

use super::traits::{Target, Transport};

/// Builds the client shared by every HTTP worker of one engine.
///
/// # Errors
///
/// Returns an error when the TLS backend cannot be initialised.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(concat!("loadrig/", env!("CARGO_PKG_VERSION")))
        .build()
}

pub struct HttpTransport {
    client: Client,
    timeout: Duration,
    pending: Option<reqwest::Response>,
}

impl HttpTransport {
    #[must_use]
    pub const fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            pending: None,
        }
    }
}

fn parse_method(method: &str) -> Result<Method, TransportError> {
    let trimmed = method.trim();
    if trimmed.is_empty() {
        return Ok(Method::GET);
    }
    Method::from_bytes(trimmed.to_ascii_uppercase().as_bytes()).map_err(|_err| {
        TransportError::InvalidMethod {
            method: method.to_owned(),
        }
    })
}

fn cookie_header(options: &HttpOptions) -> Option<String> {
    if options.cookie.is_empty() {
        return None;
    }
    let pairs: Vec<String> = options
        .cookie
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect();
    Some(pairs.join("; "))
}

#[async_trait]
impl Transport for HttpTransport {
    fn form(&self) -> Form {
        Form::Http
    }

    async fn send(
        &mut self,
        target: Target<'_>,
        payload: Option<Bytes>,
    ) -> Result<(), TransportError> {
        self.pending = None;
        let method = parse_method(&target.http.method)?;
        let mut request = self
            .client
            .request(method, target.url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (name, value) in &target.http.header {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_err| TransportError::InvalidHeader { name: name.clone() })?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_err| TransportError::InvalidHeader { name: name.clone() })?;
            request = request.header(header_name, header_value);
        }
        if let Some(cookie) = cookie_header(target.http) {
            let value = HeaderValue::from_str(&cookie).map_err(|_err| {
                TransportError::InvalidHeader {
                    name: COOKIE.as_str().to_owned(),
                }
            })?;
            request = request.header(COOKIE, value);
        }
        if let Some(body) = payload {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|err| TransportError::from_reqwest(err, self.timeout))?;
        self.pending = Some(response);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        let response = self.pending.take().ok_or(TransportError::NothingSent)?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| TransportError::from_reqwest(err, self.timeout))?;
        if status != StatusCode::OK {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        Ok(body)
    }

    fn close(&mut self) {
        self.pending = None;
    }
}
