use thiserror::Error;

/// Closed set of failure kinds. Callers match on this to decide whether a
/// failure is swallowed (remote mirror, background sync) or surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Rejected,
    Parse,
    Config,
    LocalPersistence,
    RemotePersistence,
    Collaborator,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "E101_TRANSIENT",
            Self::Rejected => "E102_REJECTED",
            Self::Parse => "E103_PARSE",
            Self::Config => "E104_CONFIG",
            Self::LocalPersistence => "E201_LOCAL_PERSISTENCE",
            Self::RemotePersistence => "E202_REMOTE_PERSISTENCE",
            Self::Collaborator => "E301_COLLABORATOR",
        }
    }
}

/// Raised when no repair pass recovers a JSON value from model output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not recover JSON from model output; tail: {tail}")]
pub struct ParseFailure {
    pub tail: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Rate limit, server error, or an unreachable host. `status` is `None`
    /// for network-level failures.
    #[error("model call failed with retryable error (status {}): {message}", status_label(.status))]
    Retryable {
        status: Option<u16>,
        message: String,
    },
    #[error("model call rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Parse(#[from] ParseFailure),
    #[error("model gateway misconfigured: {0}")]
    Config(String),
}

fn status_label(status: &Option<u16>) -> String {
    status.map_or_else(|| "network".to_string(), |s| s.to_string())
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Retryable { .. } => ErrorKind::Transient,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::Parse(_) => ErrorKind::Parse,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local storage failure: {0}")]
    Local(String),
    #[error("remote storage failure: {0}")]
    Remote(String),
    #[error("collaborator failure: {0}")]
    Collaborator(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Local(_) => ErrorKind::LocalPersistence,
            Self::Remote(_) => ErrorKind::RemotePersistence,
            Self::Collaborator(_) => ErrorKind::Collaborator,
        }
    }
}

/// Failure of a model-backed operation whose result the caller persists.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Gateway(err) => err.kind(),
            Self::Store(err) => err.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_failures_render_without_status_code() {
        let err = GatewayError::Retryable {
            status: None,
            message: "connection refused".into(),
        };
        assert!(err.to_string().contains("status network"));
        assert!(err.is_retryable());
        assert_eq!(err.kind().as_str(), "E101_TRANSIENT");
    }

    #[test]
    fn parse_failure_converts_into_gateway_error() {
        let err: GatewayError = ParseFailure {
            tail: "{\"a\":".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert!(!err.is_retryable());
    }

    #[test]
    fn analysis_errors_keep_their_source_kind() {
        let err: AnalysisError = StoreError::Local("disk full".into()).into();
        assert_eq!(err.kind(), ErrorKind::LocalPersistence);
        let err: AnalysisError = GatewayError::Rejected {
            status: 400,
            body: "bad".into(),
        }
        .into();
        assert_eq!(err.kind().as_str(), "E102_REJECTED");
    }
}
