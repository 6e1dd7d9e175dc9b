//! Request correlation for relay and quote logs

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::Span;
use uuid::Uuid;

/// Random id attached to every event of one request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-request trace context
///
/// Carries the correlation ID and operation name; [`TraceContext::span`]
/// opens a `tracing` span so every event logged inside the request inherits
/// both fields.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub correlation_id: CorrelationId,

    /// "relay" or "quote"
    pub operation: &'static str,

    /// Unix seconds at which the request arrived
    pub received_at: u64,
}

impl TraceContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            correlation_id: CorrelationId::new(),
            operation,
            received_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn span(&self) -> Span {
        tracing::info_span!(
            "request",
            correlation_id = %self.correlation_id,
            operation = self.operation,
            received_at = self.received_at
        )
    }
}
