use reddit_client::RedditError;

/// Why a single page could not be turned into records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("page fetch timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The page arrived but could not be read as a listing.
    #[error("unreadable page: {0}")]
    Parse(String),
}

impl FetchError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_)
                | FetchError::RateLimited(_)
                | FetchError::Transport(_)
                | FetchError::Server { .. }
        )
    }

    /// Refetching cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FetchError::NotFound(_) | FetchError::Forbidden(_))
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, FetchError::Parse(_))
    }
}

impl From<RedditError> for FetchError {
    fn from(err: RedditError) -> Self {
        match err {
            RedditError::Network(msg) => FetchError::Transport(msg),
            RedditError::Timeout(msg) => FetchError::Timeout(msg),
            RedditError::Parse(msg) => FetchError::Parse(msg),
            RedditError::Api { status, message } => match status {
                401 | 403 => FetchError::Forbidden(message),
                404 | 410 => FetchError::NotFound(message),
                429 => FetchError::RateLimited(message),
                // Anything else (5xx, odd 4xx) is retried within the bounded budget.
                _ => FetchError::Server { status, message },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> RedditError {
        RedditError::Api {
            status,
            message: String::new(),
        }
    }

    #[test]
    fn http_statuses_map_to_fetch_errors() {
        assert!(matches!(FetchError::from(api(404)), FetchError::NotFound(_)));
        assert!(matches!(FetchError::from(api(403)), FetchError::Forbidden(_)));
        assert!(matches!(FetchError::from(api(429)), FetchError::RateLimited(_)));
        assert!(matches!(
            FetchError::from(api(503)),
            FetchError::Server { status: 503, .. }
        ));
    }

    #[test]
    fn classification() {
        assert!(FetchError::Timeout("x".into()).is_transient());
        assert!(FetchError::RateLimited("x".into()).is_transient());
        assert!(FetchError::from(api(502)).is_transient());
        assert!(FetchError::NotFound("x".into()).is_permanent());
        assert!(!FetchError::Forbidden("x".into()).is_transient());

        let parse = FetchError::from(RedditError::Parse("bad json".into()));
        assert!(parse.is_parse());
        assert!(!parse.is_transient());
        assert!(!parse.is_permanent());
    }
}
