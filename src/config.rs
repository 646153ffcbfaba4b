//! Server configuration.
//!
//! Values come from an optional YAML file, then environment variables
//! override individual fields:
//!
//! | Field | Env var | Default |
//! |---|---|---|
//! | `port` | `SERVER_PORT` | 12345 |
//! | `listen_backlog` | `SERVER_LISTEN_BACKLOG` | 5 |
//! | `agency_count` | `AGENCY_COUNT` | 5 |
//! | `winning_number` | `WINNING_NUMBER` | 7574 |
//! | `ledger_path` | `LEDGER_PATH` | `./bets.csv` |
//! | `max_batch_bytes` | `MAX_BATCH_BYTES` | 1 MiB |
//! | `log_level` | `LOGGING_LEVEL` | `info` |
//! | `log_json` | `LOGGING_JSON` | `false` |

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{LotteryError, Result};
use crate::protocol::DEFAULT_MAX_BATCH_BYTES;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub listen_backlog: u32,
    /// Number of agencies that must report before the draw.
    pub agency_count: u8,
    pub winning_number: u32,
    pub ledger_path: PathBuf,
    /// Largest batch payload accepted from an agency.
    pub max_batch_bytes: u32,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 12345,
            listen_backlog: 5,
            agency_count: 5,
            winning_number: 7574,
            ledger_path: PathBuf::from("./bets.csv"),
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load from `path` (if given), apply process environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    LotteryError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_yaml_str(&content)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document; missing fields keep their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| LotteryError::Config(format!("invalid config yaml: {}", e)))
    }

    /// Override fields from environment-style lookups.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "SERVER_PORT", &mut self.port)?;
        override_parsed(&lookup, "SERVER_LISTEN_BACKLOG", &mut self.listen_backlog)?;
        override_parsed(&lookup, "AGENCY_COUNT", &mut self.agency_count)?;
        override_parsed(&lookup, "WINNING_NUMBER", &mut self.winning_number)?;
        override_parsed(&lookup, "MAX_BATCH_BYTES", &mut self.max_batch_bytes)?;
        override_parsed(&lookup, "LOGGING_JSON", &mut self.log_json)?;
        if let Some(path) = lookup("LEDGER_PATH") {
            self.ledger_path = PathBuf::from(path);
        }
        if let Some(level) = lookup("LOGGING_LEVEL") {
            self.log_level = level;
        }
        Ok(())
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.agency_count == 0 {
            return Err(LotteryError::Config(
                "agency_count must be at least 1".to_string(),
            ));
        }
        if self.listen_backlog == 0 {
            return Err(LotteryError::Config(
                "listen_backlog must be at least 1".to_string(),
            ));
        }
        if self.max_batch_bytes == 0 {
            return Err(LotteryError::Config(
                "max_batch_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the listener binds to (all interfaces).
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| LotteryError::Config(format!("invalid value {:?} for {}", raw, key)))?;
    }
    Ok(())
}
