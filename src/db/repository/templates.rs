use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::TemplateKind;
use crate::pipeline::template::TemplateDescriptor;

pub fn insert_template(
    conn: &Connection,
    descriptor: &TemplateDescriptor,
    source: &[u8],
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO templates (id, owner_session, name, kind, source_sha256, source,
         discovered_fields, mapping, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            descriptor.id.to_string(),
            descriptor.owner_session,
            descriptor.name,
            descriptor.kind.as_str(),
            descriptor.source_sha256,
            source,
            serde_json::to_string(&descriptor.discovered_fields)?,
            serde_json::to_string(&descriptor.mapping)?,
            descriptor.created_at.to_rfc3339(),
            descriptor.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Persist descriptor changes; the source is replaced only when given.
pub fn update_template(
    conn: &Connection,
    descriptor: &TemplateDescriptor,
    source: Option<&[u8]>,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE templates SET
            name = ?2,
            kind = ?3,
            source_sha256 = ?4,
            source = COALESCE(?5, source),
            discovered_fields = ?6,
            mapping = ?7,
            updated_at = ?8
         WHERE id = ?1",
        params![
            descriptor.id.to_string(),
            descriptor.name,
            descriptor.kind.as_str(),
            descriptor.source_sha256,
            source,
            serde_json::to_string(&descriptor.discovered_fields)?,
            serde_json::to_string(&descriptor.mapping)?,
            descriptor.updated_at.to_rfc3339(),
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "template".into(),
            id: descriptor.id.to_string(),
        });
    }
    Ok(())
}

struct TemplateRow {
    id: String,
    owner_session: String,
    name: String,
    kind: String,
    source_sha256: String,
    discovered_fields: String,
    mapping: String,
    created_at: String,
    updated_at: String,
}

const TEMPLATE_COLUMNS: &str = "id, owner_session, name, kind, source_sha256, \
     discovered_fields, mapping, created_at, updated_at";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TemplateRow> {
    Ok(TemplateRow {
        id: row.get(0)?,
        owner_session: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
        source_sha256: row.get(4)?,
        discovered_fields: row.get(5)?,
        mapping: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn template_from_row(row: TemplateRow) -> Result<TemplateDescriptor, DatabaseError> {
    let id = Uuid::parse_str(&row.id).map_err(|_| DatabaseError::InvalidEnum {
        field: "template.id".into(),
        value: row.id.clone(),
    })?;
    Ok(TemplateDescriptor {
        id,
        owner_session: row.owner_session,
        name: row.name,
        kind: TemplateKind::from_str(&row.kind)?,
        source_sha256: row.source_sha256,
        discovered_fields: serde_json::from_str(&row.discovered_fields)?,
        mapping: serde_json::from_str(&row.mapping)?,
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
    })
}

pub fn get_template(conn: &Connection, id: &Uuid) -> Result<Option<TemplateDescriptor>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = ?1"
    ))?;

    match stmt.query_row(params![id.to_string()], read_row) {
        Ok(row) => Ok(Some(template_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_template_source(conn: &Connection, id: &Uuid) -> Result<Option<Vec<u8>>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT source FROM templates WHERE id = ?1")?;
    match stmt.query_row(params![id.to_string()], |row| row.get::<_, Vec<u8>>(0)) {
        Ok(source) => Ok(Some(source)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn list_templates(
    conn: &Connection,
    owner_session: &str,
) -> Result<Vec<TemplateDescriptor>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TEMPLATE_COLUMNS} FROM templates WHERE owner_session = ?1 ORDER BY created_at"
    ))?;
    let rows = stmt
        .query_map(params![owner_session], read_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(template_from_row).collect()
}

pub fn delete_template(conn: &Connection, id: &Uuid) -> Result<bool, DatabaseError> {
    let deleted = conn.execute("DELETE FROM templates WHERE id = ?1", [id.to_string()])?;
    Ok(deleted > 0)
}
