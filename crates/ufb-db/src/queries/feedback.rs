use anyhow::Result;
use rusqlite::{Connection, params};

use super::{OptionalExt, placeholders};
use crate::Database;
use crate::models::{FeedbackFieldRow, FeedbackResponseRow, FeedbackRow, NewField, ResponseValueRow};

impl Database {
    // -- Feedback definitions --

    pub fn create_feedback(&self, name: &str, description: Option<&str>, fields: &[NewField]) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO feedbacks (name, description) VALUES (?1, ?2)",
                params![name, description],
            )?;
            let feedback_id = tx.last_insert_rowid();
            upsert_fields(&tx, feedback_id, fields)?;
            tx.commit()?;
            Ok(feedback_id)
        })
    }

    pub fn list_feedbacks(&self) -> Result<Vec<(FeedbackRow, Vec<FeedbackFieldRow>)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, created_at, updated_at FROM feedbacks ORDER BY id",
            )?;
            let feedbacks = stmt
                .query_map([], map_feedback)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(feedbacks.len());
            for feedback in feedbacks {
                let fields = query_fields(conn, feedback.id)?;
                out.push((feedback, fields));
            }
            Ok(out)
        })
    }

    pub fn get_feedback(&self, id: i64) -> Result<Option<(FeedbackRow, Vec<FeedbackFieldRow>)>> {
        self.with_conn(|conn| {
            let feedback = conn
                .query_row(
                    "SELECT id, name, description, created_at, updated_at FROM feedbacks WHERE id = ?1",
                    [id],
                    map_feedback,
                )
                .optional()?;
            match feedback {
                Some(feedback) => {
                    let fields = query_fields(conn, id)?;
                    Ok(Some((feedback, fields)))
                }
                None => Ok(None),
            }
        })
    }

    /// Whether another feedback already uses `name`.
    pub fn feedback_name_taken(&self, name: &str, except_id: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT id FROM feedbacks WHERE name = ?1 AND (?2 IS NULL OR id != ?2)",
                    params![name, except_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Rename the feedback and reconcile its fields by key: listed keys are
    /// inserted or updated in list order, unlisted keys are dropped along
    /// with their stored values.
    pub fn update_feedback(
        &self,
        id: i64,
        name: &str,
        description: Option<&str>,
        fields: &[NewField],
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let updated = tx.execute(
                "UPDATE feedbacks SET name = ?1, description = ?2, updated_at = datetime('now')
                 WHERE id = ?3",
                params![name, description, id],
            )?;
            if updated == 0 {
                return Ok(false);
            }

            upsert_fields(&tx, id, fields)?;

            let keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
            let sql = format!(
                "DELETE FROM feedback_fields WHERE feedback_id = ?1 AND key NOT IN ({})",
                placeholders(keys.len(), 1)
            );
            let mut bound: Vec<&dyn rusqlite::types::ToSql> = vec![&id];
            bound.extend(keys.iter().map(|k| k as &dyn rusqlite::types::ToSql));
            tx.execute(&sql, bound.as_slice())?;

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn delete_feedback(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM feedbacks WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    // -- Responses --

    /// Store one response with its `(field_id, json_value)` pairs.
    pub fn insert_response(
        &self,
        feedback_id: i64,
        user_id: Option<&str>,
        values: &[(i64, String)],
    ) -> Result<FeedbackResponseRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO feedback_responses (feedback_id, user_id) VALUES (?1, ?2)",
                params![feedback_id, user_id],
            )?;
            let response_id = tx.last_insert_rowid();
            for (field_id, value) in values {
                tx.execute(
                    "INSERT INTO feedback_response_fields (response_id, field_id, value)
                     VALUES (?1, ?2, ?3)",
                    params![response_id, field_id, value],
                )?;
            }
            let row = tx.query_row(
                "SELECT id, feedback_id, user_id, created_at FROM feedback_responses WHERE id = ?1",
                [response_id],
                map_response,
            )?;
            tx.commit()?;
            Ok(row)
        })
    }

    /// Page through responses, newest first. `from`/`to` are inclusive/exclusive
    /// UTC timestamps in storage format.
    pub fn list_responses(
        &self,
        feedback_id: i64,
        from: Option<&str>,
        to: Option<&str>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<FeedbackResponseRow>, i64)> {
        self.with_conn(|conn| {
            let filter = "feedback_id = ?1
                 AND (?2 IS NULL OR created_at >= ?2)
                 AND (?3 IS NULL OR created_at < ?3)";
            let mut stmt = conn.prepare(&format!(
                "SELECT id, feedback_id, user_id, created_at FROM feedback_responses
                 WHERE {}
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4 OFFSET ?5",
                filter
            ))?;
            let rows = stmt
                .query_map(params![feedback_id, from, to, limit, offset], map_response)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM feedback_responses WHERE {}", filter),
                params![feedback_id, from, to],
                |row| row.get(0),
            )?;
            Ok((rows, total))
        })
    }

    /// Batch-fetch stored values for a set of responses, keyed by field key.
    pub fn get_response_values(&self, response_ids: &[i64]) -> Result<Vec<ResponseValueRow>> {
        if response_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT v.response_id, f.key, v.value
                 FROM feedback_response_fields v
                 JOIN feedback_fields f ON f.id = v.field_id
                 WHERE v.response_id IN ({})
                 ORDER BY v.response_id, f.position",
                placeholders(response_ids.len(), 0)
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = response_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(ResponseValueRow {
                        response_id: row.get(0)?,
                        key: row.get(1)?,
                        value: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    /// Delete the listed responses belonging to `feedback_id`. Returns how
    /// many rows went away.
    pub fn delete_responses(&self, feedback_id: i64, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let sql = format!(
                "DELETE FROM feedback_responses WHERE feedback_id = ?1 AND id IN ({})",
                placeholders(ids.len(), 1)
            );
            let mut bound: Vec<&dyn rusqlite::types::ToSql> = vec![&feedback_id];
            bound.extend(ids.iter().map(|id| id as &dyn rusqlite::types::ToSql));
            Ok(conn.execute(&sql, bound.as_slice())?)
        })
    }
}

fn upsert_fields(conn: &Connection, feedback_id: i64, fields: &[NewField]) -> Result<()> {
    for (position, field) in fields.iter().enumerate() {
        conn.execute(
            "INSERT INTO feedback_fields
                (feedback_id, key, name, description, format, options, is_required, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(feedback_id, key) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                format = excluded.format,
                options = excluded.options,
                is_required = excluded.is_required,
                position = excluded.position",
            params![
                feedback_id,
                field.key,
                field.name,
                field.description,
                field.format,
                field.options,
                field.is_required,
                position as i64,
            ],
        )?;
    }
    Ok(())
}

fn query_fields(conn: &Connection, feedback_id: i64) -> Result<Vec<FeedbackFieldRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, feedback_id, key, name, description, format, options, is_required, position
         FROM feedback_fields WHERE feedback_id = ?1 ORDER BY position, id",
    )?;
    let rows = stmt
        .query_map([feedback_id], |row| {
            Ok(FeedbackFieldRow {
                id: row.get(0)?,
                feedback_id: row.get(1)?,
                key: row.get(2)?,
                name: row.get(3)?,
                description: row.get(4)?,
                format: row.get(5)?,
                options: row.get(6)?,
                is_required: row.get(7)?,
                position: row.get(8)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn map_feedback(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedbackRow> {
    Ok(FeedbackRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn map_response(row: &rusqlite::Row<'_>) -> rusqlite::Result<FeedbackResponseRow> {
    Ok(FeedbackResponseRow {
        id: row.get(0)?,
        feedback_id: row.get(1)?,
        user_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}
