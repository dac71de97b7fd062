//! Seeds input and persisted catalog files.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{debug, info};

use skillsync_shared::{CatalogRecord, Result, Seed, SkillSyncError};

/// Load the ordered seed list. A missing or malformed file is a config error.
pub fn load_seeds(path: &Path) -> Result<Vec<Seed>> {
    if !path.exists() {
        return Err(SkillSyncError::config(format!(
            "seeds file not found: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| SkillSyncError::io(path, e))?;
    let seeds: Vec<Seed> = serde_json::from_str(&content).map_err(|e| {
        SkillSyncError::config(format!("invalid seeds file {}: {e}", path.display()))
    })?;

    if seeds.is_empty() {
        return Err(SkillSyncError::config(format!(
            "seeds file {} lists no seeds",
            path.display()
        )));
    }
    Ok(seeds)
}

/// Load the persisted catalog keyed by id. A missing file is an empty catalog.
pub fn load_catalog(path: &Path) -> Result<HashMap<String, CatalogRecord>> {
    if !path.exists() {
        debug!(path = %path.display(), "no existing catalog");
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| SkillSyncError::io(path, e))?;
    let records: Vec<CatalogRecord> = serde_json::from_str(&content).map_err(|e| {
        SkillSyncError::validation(format!("invalid catalog {}: {e}", path.display()))
    })?;

    Ok(records.into_iter().map(|r| (r.id.clone(), r)).collect())
}

/// Copy the current catalog to `backup_dir/skills_<YYYYmmdd_HHMMSS>.json`.
///
/// Returns the backup path, or `None` when there is nothing to back up.
pub fn backup_catalog(
    catalog: &Path,
    backup_dir: &Path,
    now: DateTime<Local>,
) -> Result<Option<PathBuf>> {
    if !catalog.exists() {
        return Ok(None);
    }

    std::fs::create_dir_all(backup_dir).map_err(|e| SkillSyncError::io(backup_dir, e))?;
    let target = backup_dir.join(format!("skills_{}.json", now.format("%Y%m%d_%H%M%S")));
    std::fs::copy(catalog, &target).map_err(|e| SkillSyncError::io(&target, e))?;

    info!(backup = %target.display(), "catalog backed up");
    Ok(Some(target))
}

/// Stars descending, then id ascending.
pub fn sort_records(records: &mut [CatalogRecord]) {
    records.sort_by(|a, b| match b.stars.cmp(&a.stars) {
        Ordering::Equal => a.id.cmp(&b.id),
        other => other,
    });
}

/// Write the final catalog (pretty-printed) atomically.
pub fn save_catalog(path: &Path, records: &[CatalogRecord]) -> Result<()> {
    write_json_atomic(path, &records, true)?;
    info!(path = %path.display(), count = records.len(), "catalog saved");
    Ok(())
}

/// Serialize to a temp file next to `path`, then rename into place.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, data: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(data)
    } else {
        serde_json::to_string(data)
    }
    .map_err(|e| SkillSyncError::validation(format!("JSON serialization failed: {e}")))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| SkillSyncError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.json".into());
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, json).map_err(|e| SkillSyncError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| SkillSyncError::io(path, e))?;

    debug!(path = %path.display(), "wrote JSON file");
    Ok(())
}
