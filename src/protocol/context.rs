use std::sync::Arc;
use std::time::Duration;

use crate::config::Options;
use crate::data::Resolver;

use super::tcp::ConnectionPool;

/// Everything a requester constructor may draw on. Shared by all workers of
/// one engine.
#[derive(Debug, Clone)]
pub struct RequesterContext {
    pub options: Arc<Options>,
    pub resolver: Resolver,
    pub timeout: Duration,
    pub http_client: reqwest::Client,
    pub pool: Arc<ConnectionPool>,
}
