//! Error types for CI health queries.

/// Errors raised while fetching or aggregating CI results.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    /// Time period string did not match `<n>h|d|w`.
    #[error("invalid time period format: {input} (expected format: 24h, 2d, 1w)")]
    InvalidTimePeriod { input: String },

    /// A job or test filter failed to compile.
    #[error("invalid {field} regex: {source}")]
    InvalidRegex {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    /// Endpoint answered with a non-success, non-404 status.
    #[error("failed to fetch {url}: status code {status}")]
    Http { url: String, status: u16 },

    /// Transport-level failure (DNS, connect, timeout, body read).
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    /// Payload could not be decoded.
    #[error("failed to parse {url}: {message}")]
    Parse { url: String, message: String },

    /// None of the history sources produced a run.
    #[error("no job history found for {job}")]
    NoJobHistory { job: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl HealthError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        if self.is_input_error() {
            1
        } else {
            2
        }
    }

    /// Whether the caller supplied bad input (as opposed to a remote or data failure).
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidTimePeriod { .. } | Self::InvalidRegex { .. } | Self::Config { .. }
        )
    }

    pub(crate) fn parse(url: &str, message: impl std::fmt::Display) -> Self {
        Self::Parse {
            url: url.to_string(),
            message: message.to_string(),
        }
    }
}

/// Result type for CI health operations.
pub type HealthResult<T> = Result<T, HealthError>;
