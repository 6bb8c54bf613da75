//! Error types
//!
//! Every failure the plugin can report to the host. The enum is `Clone` so a
//! single in-flight authentication can hand the same error to every waiter.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// A required connection parameter is missing or empty.
    #[error("'{0}' must be set in the connection configuration. Edit your connection configuration file and then restart the host")]
    MissingConfig(&'static str),

    #[error("error creating provider client: {0}")]
    Auth(String),

    #[error("{operation}: {message}")]
    Transport { operation: String, message: String },

    #[error("{operation}: cancelled")]
    Cancelled { operation: String },

    #[error("{operation}: unexpected status {status}{}", .reason.as_deref().map(|r| format!(" {r}")).unwrap_or_default())]
    UpstreamStatus {
        operation: String,
        status: u16,
        reason: Option<String>,
    },

    #[error("{operation}: failed to parse response: {message}")]
    Extraction { operation: String, message: String },

    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    #[error("no endpoint found for service '{service}' in region '{region}'")]
    EndpointNotFound { service: String, region: String },

    #[error("invalid endpoint URL '{url}': {message}")]
    InvalidEndpoint { url: String, message: String },

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("qualifier '{0}' is required for this table")]
    MissingQualifier(String),

    #[error("table '{0}' has no lookup by key")]
    NoKeyLookup(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn transport(operation: &str, err: &reqwest::Error) -> Self {
        let message = if err.is_timeout() {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Error::Transport {
            operation: operation.to_string(),
            message,
        }
    }

    pub(crate) fn extraction(operation: &str, err: impl std::fmt::Display) -> Self {
        Error::Extraction {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }

    /// Whether the host should treat this as "no row" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_names_field() {
        let err = Error::MissingConfig("tenant_id");
        assert!(err.to_string().starts_with("'tenant_id' must be set"));
    }

    #[test]
    fn test_upstream_status_message_contains_code() {
        let err = Error::UpstreamStatus {
            operation: "list DNS domains".to_string(),
            status: 401,
            reason: Some("Unauthorized".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "list DNS domains: unexpected status 401 Unauthorized"
        );

        let bare = Error::UpstreamStatus {
            operation: "get volume".to_string(),
            status: 503,
            reason: None,
        };
        assert_eq!(bare.to_string(), "get volume: unexpected status 503");
    }

    #[test]
    fn test_not_found_is_distinct() {
        let err = Error::NotFound {
            kind: "flavor",
            key: "2".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!Error::Auth("boom".to_string()).is_not_found());
    }
}
