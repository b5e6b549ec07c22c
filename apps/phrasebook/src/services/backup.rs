//! Whole-store export and restore.

use crate::db::repository::Result;
use crate::db::{clear_all, insert_snapshot, read_snapshot, repair_invariants, RepairReport, SqliteRepository};
use chrono::{DateTime, Utc};
use phrasebook_core::snapshot::{upgrade_snapshot, Snapshot};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub languages: usize,
    pub decks: usize,
    pub sentences: usize,
    pub srs_states: usize,
}

pub fn export_snapshot(conn: &Connection, now: DateTime<Utc>) -> Result<Snapshot> {
    read_snapshot(conn, now)
}

pub fn export_json(conn: &Connection, now: DateTime<Utc>) -> Result<String> {
    Ok(serde_json::to_string_pretty(&export_snapshot(conn, now)?)?)
}

/// Replace the whole store with a backup document of any known shape.
///
/// The document is upgraded before the transaction starts; a malformed
/// document fails without touching the store.
pub fn restore_snapshot(repo: &mut SqliteRepository, document: &Value, now: DateTime<Utc>) -> Result<RestoreSummary> {
    let snapshot = upgrade_snapshot(document, now)?;
    let report: RepairReport = repo.transaction(|tx| {
        clear_all(tx)?;
        insert_snapshot(tx, &snapshot)?;
        repair_invariants(tx, now)
    })?;

    let summary = RestoreSummary {
        languages: snapshot.languages.len(),
        decks: snapshot.decks.len(),
        sentences: snapshot.sentences.len(),
        srs_states: snapshot.srs_state.len(),
    };
    info!(?summary, clean = report.is_clean(), "restored backup");
    Ok(summary)
}

pub fn restore_json(repo: &mut SqliteRepository, text: &str, now: DateTime<Utc>) -> Result<RestoreSummary> {
    let document: Value = serde_json::from_str(text)?;
    restore_snapshot(repo, &document, now)
}
