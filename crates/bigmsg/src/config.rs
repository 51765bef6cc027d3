/// Per-transfer configuration.

use std::sync::Arc;

use crate::error::ConfigError;
use crate::logging::TransferLogger;
use crate::progress::TransferProgress;
use crate::protocol::MAX_CHUNK_SIZE;

/// Default ceiling for buffers allocated by `recv_big_vec` (64 GiB).
pub const DEFAULT_MAX_TOTAL_LEN: u64 = 64 << 30;

/// Configuration shared by the send and receive paths.
#[derive(Clone)]
pub struct TransferConfig {
    /// Largest message handed to the transport. Receivers reject peers
    /// announcing anything larger.
    pub max_chunk_size: usize,
    /// Sender: put a SHA-256 of the payload in the header.
    pub digest: bool,
    /// Receiver: check the digest when the header carries one.
    pub verify_digest: bool,
    /// Receiver: largest announced length `recv_big_vec` will allocate.
    pub max_total_len: u64,
    pub logger: Option<Arc<dyn TransferLogger>>,
    pub progress: Option<Arc<TransferProgress>>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: MAX_CHUNK_SIZE,
            digest: false,
            verify_digest: true,
            max_total_len: DEFAULT_MAX_TOTAL_LEN,
            logger: None,
            progress: None,
        }
    }
}

impl TransferConfig {
    /// Defaults overridden by `BIGMSG_MAX_CHUNK_SIZE`, `BIGMSG_DIGEST`,
    /// `BIGMSG_VERIFY_DIGEST` and `BIGMSG_MAX_TOTAL_LEN`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("BIGMSG_MAX_CHUNK_SIZE") {
            let size: usize = parse_number("BIGMSG_MAX_CHUNK_SIZE", &v)?;
            if size == 0 {
                return Err(ConfigError::Invalid {
                    var: "BIGMSG_MAX_CHUNK_SIZE",
                    value: v,
                    reason: "must be non-zero".into(),
                });
            }
            config.max_chunk_size = size;
        }
        if let Some(v) = lookup("BIGMSG_DIGEST") {
            config.digest = parse_bool("BIGMSG_DIGEST", &v)?;
        }
        if let Some(v) = lookup("BIGMSG_VERIFY_DIGEST") {
            config.verify_digest = parse_bool("BIGMSG_VERIFY_DIGEST", &v)?;
        }
        if let Some(v) = lookup("BIGMSG_MAX_TOTAL_LEN") {
            config.max_total_len = parse_number("BIGMSG_MAX_TOTAL_LEN", &v)?;
        }

        Ok(config)
    }

    pub fn with_max_chunk_size(mut self, size: usize) -> Self {
        self.max_chunk_size = size;
        self
    }

    pub fn with_digest(mut self, on: bool) -> Self {
        self.digest = on;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn TransferLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_progress(mut self, progress: Arc<TransferProgress>) -> Self {
        self.progress = Some(progress);
        self
    }
}

fn parse_number<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "expected a boolean".into(),
        }),
    }
}
