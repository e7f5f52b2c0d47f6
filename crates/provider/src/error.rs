//! Errors from the provider layer and HTTP status classification.

use talkgen_core::failure::{summarize, FailureKind};

/// Errors from a [`VideoProvider`](crate::api::VideoProvider).
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The provider throttled the request (HTTP 429).
    #[error("Provider rate limit exceeded: {body}")]
    RateLimited { body: String },

    /// The provider refused the request (4xx other than 404/429 on status).
    #[error("Provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The provider does not know the job (yet).
    #[error("Provider job not found: {0}")]
    NotFound(String),

    /// Network, transport, 5xx or malformed-response failure.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Which provider call produced a response, for 404 handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Submit,
    FetchStatus,
}

impl ProviderError {
    /// Classify a non-2xx provider response.
    ///
    /// - 429 is a rate limit.
    /// - 404 on a status fetch means the job is not registered yet.
    /// - Any other 4xx is a rejection.
    /// - 5xx and anything else is treated as transient unavailability.
    pub fn from_status(status: u16, body: String, kind: RequestKind) -> Self {
        match status {
            429 => Self::RateLimited { body },
            404 if kind == RequestKind::FetchStatus => Self::NotFound(body),
            400..=499 => Self::Rejected { status, body },
            _ => Self::Unavailable(format!("HTTP {status}: {body}")),
        }
    }

    /// Failure category of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited { .. } => FailureKind::RateLimited,
            Self::Rejected { .. } => FailureKind::Rejected,
            Self::NotFound(_) | Self::Unavailable(_) => FailureKind::Unavailable,
        }
    }

    /// One-line message suitable for end users.
    pub fn summary(&self) -> &'static str {
        summarize(self.kind())
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::NotFound(_) | Self::Unavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn status_429_is_rate_limited() {
        let err = ProviderError::from_status(429, "slow down".into(), RequestKind::Submit);
        assert_matches!(err, ProviderError::RateLimited { .. });
        assert_eq!(err.summary(), "Rate limit exceeded, try later");
    }

    #[test]
    fn status_404_depends_on_request_kind() {
        assert_matches!(
            ProviderError::from_status(404, String::new(), RequestKind::FetchStatus),
            ProviderError::NotFound(_)
        );
        assert_matches!(
            ProviderError::from_status(404, String::new(), RequestKind::Submit),
            ProviderError::Rejected { status: 404, .. }
        );
    }

    #[test]
    fn other_4xx_is_rejected() {
        let err = ProviderError::from_status(400, "bad image".into(), RequestKind::Submit);
        assert_matches!(err, ProviderError::Rejected { status: 400, .. });
        assert!(!err.is_transient());
    }

    #[test]
    fn status_5xx_is_unavailable() {
        let err = ProviderError::from_status(503, "down".into(), RequestKind::FetchStatus);
        assert_matches!(err, ProviderError::Unavailable(_));
        assert!(err.is_transient());
    }
}
