//! Append-only event store with file-based persistence.
//!
//! Events are stored as newline-delimited JSON (JSONL) for simplicity
//! and easy debugging/inspection. Output files of a run live next to the
//! log under `artifacts/`.

use std::fs::File as StdFile;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fs2::FileExt;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use uuid::Uuid;

use crate::domain::{Event, RunSummary};

/// File-based event store using JSONL format
#[derive(Debug)]
pub struct EventStore {
    /// Directory containing the run
    run_dir: PathBuf,

    /// Path to the events.jsonl file
    events_path: PathBuf,

    /// Path to artifacts directory
    artifacts_dir: PathBuf,

    /// Exclusive writer lock, released on drop
    _lock: Option<StdFile>,
}

impl EventStore {
    /// Create the run directory and take the writer lock on it
    pub async fn create(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = runs_dir.join(run_id.to_string());
        let artifacts_dir = run_dir.join("artifacts");

        fs::create_dir_all(&artifacts_dir)
            .await
            .with_context(|| format!("Failed to create artifacts directory: {}", artifacts_dir.display()))?;

        let lock_path = run_dir.join(".lock");
        let lock = StdFile::create(&lock_path)
            .with_context(|| format!("Failed to create lock file: {}", lock_path.display()))?;
        lock.try_lock_exclusive()
            .with_context(|| format!("Run {} is already being written", run_id))?;

        Ok(Self {
            events_path: run_dir.join("events.jsonl"),
            run_dir,
            artifacts_dir,
            _lock: Some(lock),
        })
    }

    /// Open an existing run for reading
    pub async fn open(runs_dir: &Path, run_id: Uuid) -> Result<Self> {
        let run_dir = runs_dir.join(run_id.to_string());
        if !run_dir.is_dir() {
            anyhow::bail!("Run {} not found in {}", run_id, runs_dir.display());
        }

        Ok(Self {
            events_path: run_dir.join("events.jsonl"),
            artifacts_dir: run_dir.join("artifacts"),
            run_dir,
            _lock: None,
        })
    }

    /// Get the path to the events file
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Get the run directory
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Get the artifacts directory
    pub fn artifacts_dir(&self) -> &Path {
        &self.artifacts_dir
    }

    /// Store an artifact to disk; `file_name` may include subdirectories
    pub async fn store_artifact(&self, file_name: &str, content: &[u8]) -> Result<PathBuf> {
        let artifact_path = self.artifacts_dir.join(file_name);
        if let Some(parent) = artifact_path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        fs::write(&artifact_path, content)
            .await
            .with_context(|| format!("Failed to write artifact: {}", artifact_path.display()))?;

        Ok(artifact_path)
    }

    /// List all artifacts in this run
    pub async fn list_artifacts(&self) -> Result<Vec<String>> {
        let mut artifacts = Vec::new();

        if !self.artifacts_dir.exists() {
            return Ok(artifacts);
        }

        let mut entries = fs::read_dir(&self.artifacts_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                artifacts.push(name.to_string());
            }
        }

        artifacts.sort();
        Ok(artifacts)
    }

    /// Append an event to the log
    pub async fn append(&self, event: &Event) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.events_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to open events file: {}",
                    self.events_path.display()
                )
            })?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .await
            .context("Failed to write event")?;
        file.flush().await.context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events in order
    pub async fn replay(&self) -> Result<Vec<Event>> {
        if !self.events_path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.events_path)
            .await
            .with_context(|| format!("Failed to open events file: {}", self.events_path.display()))?;

        let reader = BufReader::new(file);
        let mut lines = reader.lines();
        let mut events = Vec::new();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let event: Event = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// Rebuild the run summary from the log
    pub async fn summary(&self) -> Result<RunSummary> {
        let events = self.replay().await?;
        RunSummary::from_events(&events)
            .with_context(|| format!("No events recorded in {}", self.events_path.display()))
    }

    /// List all run IDs in the runs directory
    pub async fn list_runs(runs_dir: &Path) -> Result<Vec<Uuid>> {
        if !runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(runs_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if let Ok(uuid) = Uuid::parse_str(name) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventType, Stage};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_event_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::create(temp.path(), run_id).await.unwrap();

        let started = Event::new(run_id, Stage::Planning, 1, EventType::RunStarted, "Italian, Restaurant");
        let entered = Event::new(run_id, Stage::AssetGeneration, 1, EventType::StageEntered, "asset_generation");

        store.append(&started).await.unwrap();
        store.append(&entered).await.unwrap();

        let events = store.replay().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::RunStarted);
        assert_eq!(events[1].stage, Stage::AssetGeneration);
    }

    #[tokio::test]
    async fn test_writer_lock_is_exclusive() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();

        let writer = EventStore::create(temp.path(), run_id).await.unwrap();
        assert!(EventStore::create(temp.path(), run_id).await.is_err());

        // Readers never contend for the lock
        let reader = EventStore::open(temp.path(), run_id).await.unwrap();
        assert_eq!(reader.events_path(), writer.events_path());

        drop(writer);
        assert!(EventStore::create(temp.path(), run_id).await.is_ok());
    }

    #[tokio::test]
    async fn test_artifacts_and_listing() {
        let temp = TempDir::new().unwrap();
        let run_id = Uuid::new_v4();
        let store = EventStore::create(temp.path(), run_id).await.unwrap();

        store.store_artifact("style.json", b"{}").await.unwrap();
        store.store_artifact("layout.json", b"[]").await.unwrap();

        assert_eq!(
            store.list_artifacts().await.unwrap(),
            vec!["layout.json".to_string(), "style.json".to_string()]
        );
        assert_eq!(EventStore::list_runs(temp.path()).await.unwrap(), vec![run_id]);
    }

    #[tokio::test]
    async fn test_open_missing_run() {
        let temp = TempDir::new().unwrap();
        assert!(EventStore::open(temp.path(), Uuid::new_v4()).await.is_err());
    }
}
