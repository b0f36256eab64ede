//! Engine configuration from environment variables

use std::env;
use std::time::Duration;

/// Where engine connections come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineSource {
    /// Spawn an external process per connection.
    Process { path: String, args: Vec<String> },
    /// Run the greedy reference engine inside this process.
    Builtin,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub source: EngineSource,

    /// Budget for a single request/response round trip
    pub move_timeout: Duration,
}

impl EngineConfig {
    /// `ENGINE_PATH` unset or `builtin` selects the in-process engine.
    pub fn from_env() -> Self {
        let source = match env::var("ENGINE_PATH") {
            Ok(path) if !path.is_empty() && path != "builtin" => EngineSource::Process {
                path,
                args: env::var("ENGINE_ARGS")
                    .map(|a| a.split_whitespace().map(String::from).collect())
                    .unwrap_or_default(),
            },
            _ => EngineSource::Builtin,
        };

        let move_timeout_ms = env::var("ENGINE_MOVE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(5000);

        Self {
            source,
            move_timeout: Duration::from_millis(move_timeout_ms),
        }
    }

    pub fn builtin(move_timeout: Duration) -> Self {
        Self {
            source: EngineSource::Builtin,
            move_timeout,
        }
    }
}
