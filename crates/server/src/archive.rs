//! Completed matches, kept for replay.
//!
//! Records live in memory and, when a directory is configured, are also
//! written there as `{match_id}.json` so replays survive a restart.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use wallwars_core::GameState;

use crate::protocol::MatchSnapshot;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedMatch {
    pub match_id: String,
    pub snapshot: MatchSnapshot,
    pub state: GameState,
    pub completed_at: DateTime<Utc>,
}

pub struct Archive {
    dir: Option<PathBuf>,
    matches: RwLock<HashMap<String, ArchivedMatch>>,
}

impl Archive {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            matches: RwLock::new(HashMap::new()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    pub async fn store(&self, record: ArchivedMatch) -> anyhow::Result<()> {
        if let Some(path) = self.path_for(&record.match_id) {
            if let Some(dir) = &self.dir {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&path, serde_json::to_vec_pretty(&record)?).await?;
            debug!(path = %path.display(), "Archived match written");
        }
        info!(match_id = %record.match_id, plies = record.state.ply(), "Match archived");
        self.matches.write().await.insert(record.match_id.clone(), record);
        Ok(())
    }

    /// Looks in memory first, then on disk.
    pub async fn get(&self, match_id: &str) -> anyhow::Result<Option<ArchivedMatch>> {
        if let Some(record) = self.matches.read().await.get(match_id) {
            return Ok(Some(record.clone()));
        }
        let Some(path) = self.path_for(match_id) else {
            return Ok(None);
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: ArchivedMatch = serde_json::from_slice(&bytes)?;
        self.matches
            .write()
            .await
            .insert(record.match_id.clone(), record.clone());
        Ok(Some(record))
    }

    fn path_for(&self, match_id: &str) -> Option<PathBuf> {
        let safe = !match_id.is_empty() && match_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        match (&self.dir, safe) {
            (Some(dir), true) => Some(dir.join(format!("{match_id}.json"))),
            _ => None,
        }
    }
}
