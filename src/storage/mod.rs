//! Persistence layer.
//!
//! Keeps the history of analyzed listings in a JSON file. One entry per
//! listing URL; re-analyzing a listing replaces its entry.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

use crate::types::{Estimation, Listing};

/// A listing together with the estimate it received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedItem {
    #[serde(flatten)]
    pub listing: Listing,
    pub is_good_value: bool,
    pub estimation: Estimation,
    pub analyzed_at: DateTime<Utc>,
    pub id: Uuid,
}

impl AnalyzedItem {
    pub fn new(listing: Listing, estimation: Estimation) -> Self {
        let is_good_value = listing.is_good_value(&estimation);
        Self {
            listing,
            is_good_value,
            estimation,
            analyzed_at: Utc::now(),
            id: Uuid::new_v4(),
        }
    }
}

/// Record an analysis, replacing any earlier entry for the same URL.
pub fn save_item(path: &Path, listing: &Listing, estimation: &Estimation) -> Result<AnalyzedItem> {
    let mut items = load_items(path)?;
    let item = AnalyzedItem::new(listing.clone(), estimation.clone());

    match items.iter().position(|i| i.listing.url == listing.url) {
        Some(index) => {
            debug!(url = %listing.url, "Replacing earlier analysis");
            items[index] = item.clone();
        }
        None => items.push(item.clone()),
    }

    write_items(path, &items)?;
    debug!(
        path = %path.display(),
        items = items.len(),
        good_value = item.is_good_value,
        "History saved"
    );
    Ok(item)
}

/// Load the analysis history. A missing file is an empty history.
pub fn load_items(path: &Path) -> Result<Vec<AnalyzedItem>> {
    if !path.exists() {
        debug!(path = %path.display(), "No history file yet");
        return Ok(Vec::new());
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history from {}", path.display()))?;
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }

    serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse history from {}", path.display()))
}

/// Empty the analysis history.
pub fn clear_items(path: &Path) -> Result<()> {
    write_items(path, &[])?;
    info!(path = %path.display(), "History cleared");
    Ok(())
}

fn write_items(path: &Path, items: &[AnalyzedItem]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(items).context("Failed to serialise history")?;

    // Readers see either the old file or the new one, never a partial write.
    let temp_path = path.with_extension("json.tmp");
    std::fs::write(&temp_path, json)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("Failed to write history to {}", path.display()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
