use crate::types::ErrorShape;
use thiserror::Error;

/// Failure of a single tool invocation.
///
/// Only the transport retries, and only for `UpstreamUnavailable` causes;
/// every other variant is returned to the caller as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("upstream unavailable: {message}")]
    UpstreamUnavailable { message: String, status: Option<u16> },

    #[error("request rejected with status {status}: {body}")]
    RequestRejected { status: u16, body: String },

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl ToolError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        ToolError::InvalidArgument(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        ToolError::MalformedResponse(msg.into())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArgument(_) => "invalid_argument",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::UpstreamUnavailable { .. } => "upstream_unavailable",
            ToolError::RequestRejected { .. } => "request_rejected",
            ToolError::MalformedResponse(_) => "malformed_response",
            ToolError::NotConfigured(_) => "not_configured",
        }
    }

    pub fn retriable(&self) -> bool {
        matches!(self, ToolError::UpstreamUnavailable { .. })
    }

    /// Upstream HTTP status associated with the failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ToolError::UpstreamUnavailable { status, .. } => *status,
            ToolError::RequestRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn to_shape(&self) -> ErrorShape {
        ErrorShape {
            kind: self.kind().to_string(),
            message: self.to_string(),
            retriable: self.retriable(),
            status: self.status(),
        }
    }
}
