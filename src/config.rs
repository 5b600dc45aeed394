use crate::error::{Result, ScrubError};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_DATA_DIR: &str = "data/cleaned";

/// How often the background sweeper scans the scratch directory.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Stored files older than this are eligible for deletion.
pub const MAX_FILE_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Bearer secret for the payment gateway's verification endpoint.
    /// Only required when serving; the offline subcommands never touch it.
    pub paystack_secret_key: Option<String>,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .map_err(|_| ScrubError::Config(format!("PORT must be a port number, got '{raw}'")))?,
            Err(_) => DEFAULT_PORT,
        };

        let paystack_secret_key = std::env::var("PAYSTACK_SECRET_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let data_dir = std::env::var("SCRUB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(Self { port, paystack_secret_key, data_dir })
    }

    /// The secret, or a configuration error naming the missing variable.
    pub fn require_secret(&self) -> Result<&str> {
        self.paystack_secret_key
            .as_deref()
            .ok_or_else(|| ScrubError::Config("PAYSTACK_SECRET_KEY is not set".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test so the PORT mutations never race each other under the
    // parallel test runner.
    #[test]
    fn env_parsing_defaults_and_rejects_bad_ports() {
        std::env::remove_var("PORT");
        std::env::remove_var("SCRUB_DATA_DIR");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.data_dir, PathBuf::from(DEFAULT_DATA_DIR));

        std::env::set_var("PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ScrubError::Config(_)));
        std::env::remove_var("PORT");
    }
}
