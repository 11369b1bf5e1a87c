use anyhow::Result;
use rusqlite::params;

use super::OptionalExt;
use super::users::insert_user;
use crate::Database;
use crate::models::{CodeRow, NewUser};

impl Database {
    /// Store a fresh code for (type, key), replacing any earlier one and
    /// resetting its verified flag.
    pub fn upsert_code(
        &self,
        code_type: &str,
        key: &str,
        code: &str,
        data: Option<&str>,
        expired_at: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO codes (code_type, key, code, data, is_verified, expired_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)
                 ON CONFLICT(code_type, key) DO UPDATE SET
                    code = excluded.code,
                    data = excluded.data,
                    is_verified = 0,
                    expired_at = excluded.expired_at,
                    created_at = datetime('now')",
                params![code_type, key, code, data, expired_at],
            )?;
            Ok(())
        })
    }

    pub fn get_code(&self, code_type: &str, key: &str) -> Result<Option<CodeRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, code_type, key, code, data, is_verified, expired_at
                 FROM codes WHERE code_type = ?1 AND key = ?2",
                params![code_type, key],
                |row| {
                    Ok(CodeRow {
                        id: row.get(0)?,
                        code_type: row.get(1)?,
                        key: row.get(2)?,
                        code: row.get(3)?,
                        data: row.get(4)?,
                        is_verified: row.get(5)?,
                        expired_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn mark_code_verified(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("UPDATE codes SET is_verified = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    pub fn delete_code(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute("DELETE FROM codes WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Consume invitation code `code_id`, create `user` and bind it to
    /// `role_id` if that role still exists, all in one transaction.
    ///
    /// Returns `None`, writing nothing, if the code is already gone;
    /// otherwise whether the role was bound.
    pub fn redeem_invitation(&self, code_id: i64, user: &NewUser, role_id: Option<i64>) -> Result<Option<bool>> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            if tx.execute("DELETE FROM codes WHERE id = ?1", [code_id])? == 0 {
                return Ok(None);
            }
            insert_user(&tx, user)?;
            let bound = match role_id {
                Some(role_id) => {
                    tx.execute(
                        "INSERT INTO role_user_bindings (role_id, user_id)
                         SELECT id, ?2 FROM roles WHERE id = ?1",
                        params![role_id, user.id],
                    )? == 1
                }
                None => false,
            };
            tx.commit()?;
            Ok(Some(bound))
        })
    }
}
