use std::fmt;

use bytes::Bytes;
use studio_core::{ItemId, MetadataPatch, OperationKind, OperationParams};

/// Bytes handed to a remote operation.
#[derive(Clone, PartialEq, Eq)]
pub struct SourceBytes {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl fmt::Debug for SourceBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceBytes")
            .field("name", &self.name)
            .field("mime", &self.mime)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One remote invocation for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationJob {
    pub item_id: ItemId,
    pub kind: OperationKind,
    pub params: OperationParams,
    pub source: SourceBytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutput {
    /// A processed image. `bytes` is present when the service returned the
    /// image body, which lets the next step of a plan skip a download.
    Image {
        url: String,
        filename: Option<String>,
        bytes: Option<Bytes>,
    },
    Metadata(MetadataPatch),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationError {
    pub kind: FailureKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for OperationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    MalformedResponse,
    Network,
    Io,
    InvalidParams,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Io => write!(f, "io error"),
            FailureKind::InvalidParams => write!(f, "invalid parameters"),
        }
    }
}

/// Result of the service health probe.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}
