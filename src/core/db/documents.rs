//! Document metadata rows. File contents are handled by `core::storage`.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{not_found_if_none, parse_ts, ts, Database, DbError};
use crate::core::entity::{parse_column, Entity};
use crate::core::identity::EntityId;
use crate::core::realtime::{record_change, Operation};
use crate::entities::{Bucket, Document};

const COLUMNS: &str = "id, company_id, bucket, path, name, size, sha256, uploaded_by, created";

fn map_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let size: i64 = row.get(5)?;
    Ok(Document {
        id: row.get(0)?,
        company_id: row.get(1)?,
        bucket: parse_column(2, row.get(2)?)?,
        path: row.get(3)?,
        name: row.get(4)?,
        size: size.max(0) as u64,
        sha256: row.get(6)?,
        uploaded_by: row.get(7)?,
        created: parse_ts(8, row.get(8)?)?,
    })
}

/// Insert or replace the row for `(company, bucket, path)`
pub(crate) fn upsert_document(conn: &Connection, doc: &Document) -> Result<Document, DbError> {
    let existing: Option<EntityId> = conn
        .query_row(
            "SELECT id FROM document WHERE company_id = ?1 AND bucket = ?2 AND path = ?3",
            params![doc.company_id, doc.bucket.as_str(), doc.path],
            |row| row.get(0),
        )
        .optional()?;

    let mut stored = doc.clone();
    let operation = match existing {
        Some(id) => {
            stored.id = id;
            conn.execute(
                "UPDATE document SET name = ?2, size = ?3, sha256 = ?4, uploaded_by = ?5, created = ?6
                 WHERE id = ?1",
                params![
                    stored.id,
                    stored.name,
                    stored.size as i64,
                    stored.sha256,
                    stored.uploaded_by,
                    ts(&stored.created)
                ],
            )?;
            Operation::Update
        }
        None => {
            conn.execute(
                &format!("INSERT INTO document ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    stored.id,
                    stored.company_id,
                    stored.bucket.as_str(),
                    stored.path,
                    stored.name,
                    stored.size as i64,
                    stored.sha256,
                    stored.uploaded_by,
                    ts(&stored.created)
                ],
            )?;
            Operation::Insert
        }
    };
    record_change(conn, &stored.company_id, Document::TABLE, operation, &stored.id.to_string())?;
    Ok(stored)
}

impl Database {
    pub fn get_document(
        &self,
        company_id: &EntityId,
        bucket: Bucket,
        path: &str,
    ) -> Result<Document, DbError> {
        let doc = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM document
                     WHERE company_id = ?1 AND bucket = ?2 AND path = ?3"
                ),
                params![company_id, bucket.as_str(), path],
                map_document,
            )
            .optional()?;
        not_found_if_none(doc, "document", format!("{}/{}", bucket, path))
    }

    /// Documents of a company, optionally in one bucket or under a path prefix
    pub fn list_documents(
        &self,
        company_id: &EntityId,
        bucket: Option<Bucket>,
        prefix: Option<&str>,
    ) -> Result<Vec<Document>, DbError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {COLUMNS} FROM document
             WHERE company_id = ?1 AND (?2 IS NULL OR bucket = ?2)
               AND (?3 IS NULL OR path LIKE ?3 || '%')
             ORDER BY bucket, path"
        ))?;
        let docs = stmt
            .query_map(
                params![company_id, bucket.map(|b| b.as_str()), prefix],
                map_document,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub(crate) fn delete_document_row(&mut self, doc: &Document) -> Result<(), DbError> {
        self.write(|tx| {
            tx.execute("DELETE FROM document WHERE id = ?1", params![doc.id])?;
            record_change(tx, &doc.company_id, Document::TABLE, Operation::Delete, &doc.id.to_string())
        })
    }
}
