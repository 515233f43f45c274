use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::ReviewStep;
use crate::models::StoredDraft;

/// Insert or replace the draft for a session. Last write wins.
pub fn upsert_draft(conn: &Connection, draft: &StoredDraft) -> Result<(), DatabaseError> {
    let record_json = serde_json::to_string(&draft.record)?;
    conn.execute(
        "INSERT INTO drafts (session_id, record_json, current_step, revision, finalized, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(session_id) DO UPDATE SET
            record_json = ?2,
            current_step = ?3,
            revision = ?4,
            finalized = ?5,
            updated_at = ?6",
        params![
            draft.session_id,
            record_json,
            draft.step.as_str(),
            draft.revision as i64,
            draft.finalized as i32,
            draft.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

struct DraftRow {
    session_id: String,
    record_json: String,
    current_step: String,
    revision: i64,
    finalized: i32,
    updated_at: String,
}

fn draft_from_row(row: DraftRow) -> Result<StoredDraft, DatabaseError> {
    let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());
    Ok(StoredDraft {
        session_id: row.session_id,
        record: serde_json::from_str(&row.record_json)?,
        step: row.current_step.parse::<ReviewStep>()?,
        revision: row.revision.max(0) as u64,
        finalized: row.finalized != 0,
        updated_at,
    })
}

const DRAFT_COLUMNS: &str =
    "session_id, record_json, current_step, revision, finalized, updated_at";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftRow> {
    Ok(DraftRow {
        session_id: row.get(0)?,
        record_json: row.get(1)?,
        current_step: row.get(2)?,
        revision: row.get(3)?,
        finalized: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

pub fn get_draft(conn: &Connection, session_id: &str) -> Result<Option<StoredDraft>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRAFT_COLUMNS} FROM drafts WHERE session_id = ?1"
    ))?;

    match stmt.query_row(params![session_id], read_row) {
        Ok(row) => Ok(Some(draft_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Most recently saved first.
pub fn list_drafts(conn: &Connection) -> Result<Vec<StoredDraft>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {DRAFT_COLUMNS} FROM drafts ORDER BY updated_at DESC"
    ))?;
    let rows = stmt
        .query_map([], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(draft_from_row).collect()
}

pub fn delete_draft(conn: &Connection, session_id: &str) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM drafts WHERE session_id = ?1", [session_id])?;
    Ok(deleted > 0)
}
