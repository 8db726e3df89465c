//! Append-only run ledger with file-based persistence.
//!
//! One ledger per (farm, season) pair, stored as newline-delimited JSON for
//! easy inspection. The ledger is the durable record behind the re-mint
//! guard: a second run for a season that already minted finds the receipt
//! here and never issues another transaction. Opening a ledger takes an
//! exclusive file lock held until the ledger drops, so the replay-then-mint
//! window of the guard never overlaps with another writer.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{BlockchainReceipt, StepName};

/// A single entry in the run ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub farm_id: String,
    pub season_id: String,
    #[serde(flatten)]
    pub kind: RunEventKind,
}

impl RunEvent {
    pub fn new(farm_id: &str, season_id: &str, kind: RunEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            farm_id: farm_id.to_string(),
            season_id: season_id.to_string(),
            kind,
        }
    }
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEventKind {
    RunStarted,
    StageCompleted {
        stage: StepName,
    },
    StageFailed {
        stage: StepName,
        error: String,
    },
    /// QA verdict sent the run back to ingestion
    RetryScheduled {
        attempt: u32,
    },
    Minted {
        tx_ref: String,
        confirmed_block: u64,
        quantity_kg_ch4: f64,
    },
    RunFailed {
        error: String,
    },
    RunCompleted,
}

/// File-backed JSONL ledger for one (farm, season) pair.
///
/// Holds an exclusive lock on the pair's directory from `open` until drop.
/// A second opener for the same pair blocks until the first ledger is gone.
pub struct Ledger {
    farm_id: String,
    season_id: String,
    events_path: PathBuf,
    // Lock is released when the file is dropped
    _lock: std::fs::File,
}

/// Identifiers become path components, so they must not escape the home.
fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
        anyhow::bail!("invalid {kind} id for ledger path: {id:?}");
    }
    Ok(())
}

impl Ledger {
    /// Create or open the ledger under `home`, acquiring its lock.
    pub async fn open(home: &Path, farm_id: &str, season_id: &str) -> Result<Self> {
        validate_id("farm", farm_id)?;
        validate_id("season", season_id)?;

        let dir = home.join(format!("{farm_id}__{season_id}"));
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create ledger directory: {}", dir.display()))?;

        let lock_path = dir.join("ledger.lock");
        let lock = tokio::task::spawn_blocking(move || -> Result<std::fs::File> {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .open(&lock_path)
                .with_context(|| {
                    format!("Failed to open ledger lock file: {}", lock_path.display())
                })?;
            file.lock_exclusive()
                .context("Failed to acquire ledger lock")?;
            Ok(file)
        })
        .await??;

        Ok(Self {
            farm_id: farm_id.to_string(),
            season_id: season_id.to_string(),
            events_path: dir.join("events.jsonl"),
            _lock: lock,
        })
    }

    /// Default ledger home: `$MRV_HOME/runs` or `~/.mrv/runs`.
    pub fn default_home() -> Result<PathBuf> {
        if let Ok(custom) = std::env::var("MRV_HOME") {
            return Ok(PathBuf::from(custom).join("runs"));
        }
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(home.join(".mrv").join("runs"))
    }

    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Append one event.
    pub async fn append(&self, kind: RunEventKind) -> Result<()> {
        let event = RunEvent::new(&self.farm_id, &self.season_id, kind);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!("Failed to open ledger file: {}", self.events_path.display())
            })?;

        let json = serde_json::to_string(&event).context("Failed to serialize ledger event")?;
        file.write_all(format!("{json}\n").as_bytes())
            .await
            .context("Failed to write ledger event")?;
        file.flush().await.context("Failed to flush ledger event")?;

        Ok(())
    }

    /// Replay all events in order.
    pub async fn replay(&self) -> Result<Vec<RunEvent>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open ledger file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: RunEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse ledger event: {line}"))?;
            events.push(event);
        }

        Ok(events)
    }

    /// The receipt of a prior confirmed mint for this season, if any.
    pub async fn minted_receipt(&self) -> Result<Option<BlockchainReceipt>> {
        let events = self.replay().await?;

        Ok(events.into_iter().rev().find_map(|event| match event.kind {
            RunEventKind::Minted {
                tx_ref,
                confirmed_block,
                quantity_kg_ch4,
            } => Some(BlockchainReceipt {
                tx_ref,
                confirmed_block,
                quantity_kg_ch4,
                minted_at: event.timestamp,
            }),
            _ => None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn append_and_replay_preserve_order() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::open(temp.path(), "F1", "S1").await.unwrap();

        ledger.append(RunEventKind::RunStarted).await.unwrap();
        ledger
            .append(RunEventKind::StageCompleted {
                stage: StepName::Ingestion,
            })
            .await
            .unwrap();
        ledger
            .append(RunEventKind::RetryScheduled { attempt: 1 })
            .await
            .unwrap();

        let events = ledger.replay().await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, RunEventKind::RunStarted);
        assert_eq!(
            events[2].kind,
            RunEventKind::RetryScheduled { attempt: 1 }
        );
        assert_eq!(events[0].farm_id, "F1");
    }

    #[tokio::test]
    async fn minted_receipt_found_after_mint() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::open(temp.path(), "F1", "S1").await.unwrap();

        assert!(ledger.minted_receipt().await.unwrap().is_none());

        ledger
            .append(RunEventKind::Minted {
                tx_ref: "tx-abc".to_string(),
                confirmed_block: 1001,
                quantity_kg_ch4: 1.248,
            })
            .await
            .unwrap();

        let receipt = ledger.minted_receipt().await.unwrap().unwrap();
        assert_eq!(receipt.tx_ref, "tx-abc");
        assert_eq!(receipt.confirmed_block, 1001);
    }

    #[tokio::test]
    async fn ledger_lock_serializes_writers() {
        let temp = TempDir::new().unwrap();
        let first = Ledger::open(temp.path(), "F1", "S1").await.unwrap();

        let home = temp.path().to_path_buf();
        let second = tokio::spawn(async move {
            let ledger = Ledger::open(&home, "F1", "S1").await.unwrap();
            ledger.append(RunEventKind::RunStarted).await.unwrap();
        });

        // The second opener blocks on the lock while the first ledger lives
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        drop(first);
        second.await.unwrap();
    }

    #[tokio::test]
    async fn rejects_path_escaping_ids() {
        let temp = TempDir::new().unwrap();
        assert!(Ledger::open(temp.path(), "../escape", "S1").await.is_err());
        assert!(Ledger::open(temp.path(), "F1", "bad/season").await.is_err());
        assert!(Ledger::open(temp.path(), "F1", r"bad\season").await.is_err());
        assert!(Ledger::open(temp.path(), "", "S1").await.is_err());
    }

    #[tokio::test]
    async fn separate_seasons_have_separate_ledgers() {
        let temp = TempDir::new().unwrap();
        let first = Ledger::open(temp.path(), "F1", "S1").await.unwrap();
        let second = Ledger::open(temp.path(), "F1", "S2").await.unwrap();

        first.append(RunEventKind::RunStarted).await.unwrap();
        assert!(second.replay().await.unwrap().is_empty());
    }
}
