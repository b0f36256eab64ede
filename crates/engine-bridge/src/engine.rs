//! Engine connection speaking BGS over line-delimited JSON (async I/O)

use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::{EngineConfig, EngineSource};
use crate::error::BridgeError;
use crate::protocol::{BgsConfig, BgsRequest, BgsResponse};
use crate::reference;

type Reader = Box<dyn AsyncBufRead + Send + Unpin>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// Result of an `evaluate_position` round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub ply: usize,
    /// Standard notation, empty when the engine has no move to offer
    pub best_move: String,
    /// Player 1's perspective, clamped to [-1, 1]
    pub evaluation: f64,
}

/// One engine connection. Requests are strictly sequential; after a timeout
/// or a garbled reply the stream can no longer be trusted, so the connection
/// refuses further requests.
pub struct BgsEngine {
    process: Option<Child>,
    writer: Writer,
    reader: Reader,
    timeout: Duration,
    healthy: bool,
}

impl BgsEngine {
    /// Opens a connection as configured: a child process, or the builtin
    /// engine on an in-memory pipe.
    pub async fn connect(config: &EngineConfig) -> Result<Self, BridgeError> {
        match &config.source {
            EngineSource::Process { path, args } => Self::spawn(path, args, config.move_timeout),
            EngineSource::Builtin => Ok(Self::builtin(config.move_timeout)),
        }
    }

    /// Spawn an engine process with piped stdin/stdout
    pub fn spawn(path: &str, args: &[String], timeout: Duration) -> Result<Self, BridgeError> {
        let mut process = Command::new(path)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(BridgeError::Spawn)?;

        let stdin = process.stdin.take().ok_or(BridgeError::Closed)?;
        let stdout = process.stdout.take().ok_or(BridgeError::Closed)?;

        Ok(Self {
            process: Some(process),
            writer: Box::new(stdin),
            reader: Box::new(BufReader::new(stdout)),
            timeout,
            healthy: true,
        })
    }

    /// Serves the reference engine on an in-memory pipe.
    pub fn builtin(timeout: Duration) -> Self {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        tokio::spawn(async move {
            if let Err(e) = reference::serve(BufReader::new(server_read), server_write).await {
                warn!("Builtin engine stopped: {e}");
            }
        });

        let (client_read, client_write) = tokio::io::split(client);
        Self::from_io(BufReader::new(client_read), client_write, timeout)
    }

    pub fn from_io<R, W>(reader: R, writer: W, timeout: Duration) -> Self
    where
        R: AsyncBufRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            process: None,
            writer: Box::new(writer),
            reader: Box::new(reader),
            timeout,
            healthy: true,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy
    }

    /// Send one request and wait for its matching response, within the
    /// timeout. Engine-reported failures become [`BridgeError::Engine`].
    pub async fn request(&mut self, request: &BgsRequest) -> Result<BgsResponse, BridgeError> {
        if !self.healthy {
            return Err(BridgeError::Closed);
        }

        let outcome = tokio::time::timeout(self.timeout, self.round_trip(request)).await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.healthy = false;
                return Err(e);
            }
            Err(_) => {
                self.healthy = false;
                return Err(BridgeError::Timeout(self.timeout));
            }
        };

        if response.type_tag() != request.expected_response() || response.bgs_id() != request.bgs_id() {
            self.healthy = false;
            return Err(BridgeError::Malformed(format!(
                "expected {} for {}, got {} for {}",
                request.expected_response(),
                request.bgs_id(),
                response.type_tag(),
                response.bgs_id()
            )));
        }
        response.outcome().map_err(BridgeError::Engine)?;
        Ok(response)
    }

    async fn round_trip(&mut self, request: &BgsRequest) -> Result<BgsResponse, BridgeError> {
        let line = serde_json::to_string(request)?;
        debug!(line = %line, "BGS <");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;

        let mut buf = String::new();
        loop {
            buf.clear();
            let read = self.reader.read_line(&mut buf).await?;
            if read == 0 {
                return Err(BridgeError::Closed);
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }
            debug!(line = trimmed, "BGS >");
            return serde_json::from_str(trimmed)
                .map_err(|e| BridgeError::Malformed(format!("{e}: {trimmed}")));
        }
    }

    pub async fn start_session(&mut self, bgs_id: &str, bot_id: &str, config: BgsConfig) -> Result<(), BridgeError> {
        self.request(&BgsRequest::StartGameSession {
            bgs_id: bgs_id.to_string(),
            bot_id: bot_id.to_string(),
            config,
        })
        .await?;
        Ok(())
    }

    pub async fn end_session(&mut self, bgs_id: &str) -> Result<(), BridgeError> {
        self.request(&BgsRequest::EndGameSession {
            bgs_id: bgs_id.to_string(),
        })
        .await?;
        Ok(())
    }

    pub async fn evaluate(&mut self, bgs_id: &str, expected_ply: usize) -> Result<Evaluation, BridgeError> {
        let response = self
            .request(&BgsRequest::EvaluatePosition {
                bgs_id: bgs_id.to_string(),
                expected_ply,
            })
            .await?;

        match response {
            BgsResponse::EvaluateResponse {
                ply,
                best_move,
                evaluation,
                ..
            } => {
                if ply != expected_ply {
                    return Err(BridgeError::Malformed(format!(
                        "evaluated ply {ply}, expected {expected_ply}"
                    )));
                }
                if !evaluation.is_finite() {
                    return Err(BridgeError::Malformed(format!("evaluation {evaluation}")));
                }
                Ok(Evaluation {
                    ply,
                    best_move,
                    evaluation: evaluation.clamp(-1.0, 1.0),
                })
            }
            other => Err(BridgeError::Malformed(format!("unexpected {}", other.type_tag()))),
        }
    }

    /// Applies `notation` at `expected_ply`; returns the engine's new ply.
    pub async fn apply_move(&mut self, bgs_id: &str, expected_ply: usize, notation: &str) -> Result<usize, BridgeError> {
        let response = self
            .request(&BgsRequest::ApplyMove {
                bgs_id: bgs_id.to_string(),
                expected_ply,
                mv: notation.to_string(),
            })
            .await?;

        match response {
            BgsResponse::MoveApplied { ply, .. } if ply == expected_ply + 1 => Ok(ply),
            BgsResponse::MoveApplied { ply, .. } => Err(BridgeError::Malformed(format!(
                "engine at ply {ply} after applying ply {expected_ply}"
            ))),
            other => Err(BridgeError::Malformed(format!("unexpected {}", other.type_tag()))),
        }
    }

    /// Close stdin and wait for the process to exit
    pub async fn quit(&mut self) {
        self.healthy = false;
        let _ = self.writer.shutdown().await;
        if let Some(process) = self.process.as_mut() {
            let _ = process.wait().await;
        }
    }
}

impl Drop for BgsEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        if let Some(process) = self.process.as_mut() {
            let _ = process.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallwars_core::{GameConfig, Variant};

    fn config() -> BgsConfig {
        BgsConfig::from_game_config(&GameConfig::new(Variant::Standard, 5, 5))
    }

    #[tokio::test]
    async fn test_builtin_session_round_trip() {
        let mut engine = BgsEngine::builtin(Duration::from_secs(5));
        engine.start_session("g1", "greedy", config()).await.unwrap();

        let eval = engine.evaluate("g1", 0).await.unwrap();
        assert_eq!(eval.ply, 0);
        assert!(!eval.best_move.is_empty());

        assert_eq!(engine.apply_move("g1", 0, &eval.best_move).await.unwrap(), 1);
        engine.end_session("g1").await.unwrap();
        assert!(engine.is_healthy());
    }

    #[tokio::test]
    async fn test_ply_mismatch_is_engine_error() {
        let mut engine = BgsEngine::builtin(Duration::from_secs(5));
        engine.start_session("g1", "greedy", config()).await.unwrap();
        let err = engine.evaluate("g1", 4).await.unwrap_err();
        assert!(matches!(err, BridgeError::Engine(_)));
        // A reported failure is still a well-formed exchange.
        assert!(engine.is_healthy());
    }

    #[tokio::test]
    async fn test_silent_engine_times_out() {
        let (client, _server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client);
        let mut engine = BgsEngine::from_io(BufReader::new(read), write, Duration::from_millis(50));

        let err = engine.evaluate("g1", 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
        assert!(matches!(engine.evaluate("g1", 0).await, Err(BridgeError::Closed)));
    }

    #[tokio::test]
    async fn test_garbage_reply_is_malformed() {
        let (client, server) = tokio::io::duplex(1024);
        let (read, write) = tokio::io::split(client);
        let (_server_read, mut server_write) = tokio::io::split(server);
        server_write.write_all(b"bestmove e2e4\n").await.unwrap();

        let mut engine = BgsEngine::from_io(BufReader::new(read), write, Duration::from_secs(1));
        let err = engine.evaluate("g1", 0).await.unwrap_err();
        assert!(matches!(err, BridgeError::Malformed(_)));
    }
}
