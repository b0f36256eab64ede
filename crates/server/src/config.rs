use std::env;
use std::path::PathBuf;
use std::time::Duration;

use engine_bridge::EngineConfig;

/// What happens to a bot seat whose controller faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultPolicy {
    /// The faulted seat resigns.
    Forfeit,
    /// The seat stays on move and its clock keeps running.
    Continue,
}

impl FaultPolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "forfeit" => Some(FaultPolicy::Forfeit),
            "continue" => Some(FaultPolicy::Continue),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Completed matches are also written here as JSON when set
    pub archive_dir: Option<PathBuf>,
    pub engine: EngineConfig,
    /// How long an offer must stand before its actor may withdraw it
    pub negotiation_grace: Duration,
    /// Delay before a bot seat accepts an offer
    pub bot_auto_accept: Duration,
    pub fault_policy: FaultPolicy,
    pub chat_max_len: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8000),
            archive_dir: env::var("ARCHIVE_DIR")
                .ok()
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            engine: EngineConfig::from_env(),
            negotiation_grace: Duration::from_millis(
                env::var("NEGOTIATION_GRACE_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2000),
            ),
            bot_auto_accept: Duration::from_millis(
                env::var("BOT_AUTO_ACCEPT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(500),
            ),
            fault_policy: env::var("CONTROLLER_FAULT_POLICY")
                .ok()
                .and_then(|v| FaultPolicy::parse(&v))
                .unwrap_or(FaultPolicy::Forfeit),
            chat_max_len: env::var("CHAT_MAX_LEN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(280),
        }
    }

    /// Local defaults with the builtin engine; used by tests.
    pub fn local() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            archive_dir: None,
            engine: EngineConfig::builtin(Duration::from_secs(5)),
            negotiation_grace: Duration::from_millis(2000),
            bot_auto_accept: Duration::from_millis(500),
            fault_policy: FaultPolicy::Forfeit,
            chat_max_len: 280,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_policy_parse() {
        assert_eq!(FaultPolicy::parse("Continue"), Some(FaultPolicy::Continue));
        assert_eq!(FaultPolicy::parse(" forfeit "), Some(FaultPolicy::Forfeit));
        assert_eq!(FaultPolicy::parse("retry"), None);
    }
}
