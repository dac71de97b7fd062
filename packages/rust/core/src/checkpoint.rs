//! Crash-recovery snapshots of in-flight records.
//!
//! A snapshot is `{"skills": {id: record}, "timestamp": <RFC 3339>}`. It is
//! honored wholesale while fresh and ignored wholesale once stale or unreadable.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use skillsync_shared::{DraftRecord, Result, SkillSyncError};

use crate::catalog::write_json_atomic;

#[derive(Serialize)]
struct SnapshotOut<'a> {
    skills: &'a BTreeMap<String, DraftRecord>,
    timestamp: DateTime<Utc>,
}

#[derive(Deserialize)]
struct SnapshotIn {
    skills: BTreeMap<String, DraftRecord>,
    timestamp: DateTime<Utc>,
}

/// Saves and restores the progress snapshot file.
#[derive(Debug, Clone)]
pub struct ProgressCheckpointer {
    path: PathBuf,
    max_age: Duration,
}

impl ProgressCheckpointer {
    pub fn new(path: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self {
            path: path.into(),
            max_age,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Persist the full in-flight map, stamped with the current time.
    pub fn checkpoint(&self, records: &BTreeMap<String, DraftRecord>) -> Result<()> {
        self.checkpoint_at(records, Utc::now())
    }

    pub fn checkpoint_at(
        &self,
        records: &BTreeMap<String, DraftRecord>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        write_json_atomic(
            &self.path,
            &SnapshotOut {
                skills: records,
                timestamp: now,
            },
            false,
        )?;
        debug!(count = records.len(), "progress snapshot saved");
        Ok(())
    }

    /// Load a fresh snapshot, or an empty map.
    pub fn restore(&self) -> BTreeMap<String, DraftRecord> {
        self.restore_at(Utc::now())
    }

    pub fn restore_at(&self, now: DateTime<Utc>) -> BTreeMap<String, DraftRecord> {
        if !self.path.exists() {
            return BTreeMap::new();
        }

        let snapshot = match std::fs::read_to_string(&self.path)
            .map_err(|e| e.to_string())
            .and_then(|s| serde_json::from_str::<SnapshotIn>(&s).map_err(|e| e.to_string()))
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable progress snapshot ignored");
                return BTreeMap::new();
            }
        };

        let age = now - snapshot.timestamp;
        if age >= self.max_age {
            info!(age_hours = age.num_hours(), "progress snapshot too old, starting fresh");
            return BTreeMap::new();
        }

        info!(
            count = snapshot.skills.len(),
            age_minutes = age.num_minutes(),
            "resuming from progress snapshot"
        );
        snapshot.skills
    }

    /// Delete the snapshot after a completed run.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "progress snapshot removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SkillSyncError::io(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skillsync_shared::CatalogRecord;

    fn checkpointer() -> (PathBuf, ProgressCheckpointer) {
        let dir = std::env::temp_dir().join(format!("skillsync-checkpoint-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let cp = ProgressCheckpointer::new(dir.join(".sync_progress.json"), Duration::hours(24));
        (dir, cp)
    }

    fn records() -> BTreeMap<String, DraftRecord> {
        let mut map = BTreeMap::new();
        map.insert(
            "official-alice-tool-a".to_string(),
            DraftRecord {
                record: CatalogRecord {
                    id: "official-alice-tool-a".into(),
                    name: "Tool A".into(),
                    tags: vec!["cli".into()],
                    ..Default::default()
                },
                raw_body: Some("---\nname: Tool A\n---\nbody".into()),
            },
        );
        map.insert(
            "official-bob-b".to_string(),
            DraftRecord::reused(CatalogRecord {
                id: "official-bob-b".into(),
                name: "B".into(),
                stars: 3,
                ..Default::default()
            }),
        );
        map
    }

    #[test]
    fn restore_within_window_returns_snapshot() {
        let (dir, cp) = checkpointer();
        let now = Utc::now();
        let map = records();

        cp.checkpoint_at(&map, now).unwrap();
        assert_eq!(cp.restore_at(now + Duration::hours(23)), map);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_snapshot_is_discarded() {
        let (dir, cp) = checkpointer();
        let now = Utc::now();

        cp.checkpoint_at(&records(), now).unwrap();
        assert!(cp.restore_at(now + Duration::hours(24)).is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn corrupt_snapshot_is_discarded() {
        let (dir, cp) = checkpointer();
        std::fs::write(cp.path(), r#"{"skills": {"x": 42}, "timestamp": "yesterday"}"#).unwrap();
        assert!(cp.restore().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn raw_body_survives_snapshot() {
        let (dir, cp) = checkpointer();
        cp.checkpoint(&records()).unwrap();

        let text = std::fs::read_to_string(cp.path()).unwrap();
        assert!(text.contains("_raw_content"));
        assert!(text.contains("timestamp"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn clear_removes_snapshot_and_tolerates_absence() {
        let (dir, cp) = checkpointer();
        cp.checkpoint(&records()).unwrap();
        cp.clear().unwrap();
        assert!(!cp.path().exists());
        cp.clear().unwrap();
        assert!(cp.restore().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
