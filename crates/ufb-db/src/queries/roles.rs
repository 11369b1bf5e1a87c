use anyhow::Result;
use rusqlite::{Connection, params};

use super::OptionalExt;
use crate::Database;
use crate::models::RoleRow;

impl Database {
    /// Create a role with its initial permission set. Returns the new id.
    pub fn create_role(&self, name: &str, description: Option<&str>, permissions: &[&str]) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO roles (name, description) VALUES (?1, ?2)",
                params![name, description],
            )?;
            let role_id = tx.last_insert_rowid();
            for permission in permissions {
                tx.execute(
                    "INSERT OR IGNORE INTO role_permission_bindings (role_id, permission) VALUES (?1, ?2)",
                    params![role_id, permission],
                )?;
            }
            tx.commit()?;
            Ok(role_id)
        })
    }

    pub fn list_roles(&self) -> Result<Vec<(RoleRow, Vec<String>)>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description, created_at FROM roles ORDER BY id")?;
            let roles = stmt
                .query_map([], map_role)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut out = Vec::with_capacity(roles.len());
            for role in roles {
                let permissions = query_role_permissions(conn, role.id)?;
                out.push((role, permissions));
            }
            Ok(out)
        })
    }

    pub fn get_role_by_name(&self, name: &str) -> Result<Option<(RoleRow, Vec<String>)>> {
        self.with_conn(|conn| {
            let role = conn
                .query_row(
                    "SELECT id, name, description, created_at FROM roles WHERE name = ?1",
                    [name],
                    map_role,
                )
                .optional()?;
            match role {
                Some(role) => {
                    let permissions = query_role_permissions(conn, role.id)?;
                    Ok(Some((role, permissions)))
                }
                None => Ok(None),
            }
        })
    }

    pub fn role_exists(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row("SELECT id FROM roles WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn delete_role(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM roles WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    pub fn get_role_permissions(&self, role_id: i64) -> Result<Vec<String>> {
        self.with_conn(|conn| query_role_permissions(conn, role_id))
    }

    // -- Bindings --

    /// Returns `false` if the binding already existed.
    pub fn bind_permission(&self, role_id: i64, permission: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO role_permission_bindings (role_id, permission) VALUES (?1, ?2)",
                params![role_id, permission],
            )?;
            Ok(inserted == 1)
        })
    }

    /// Returns `false` if there was nothing to remove.
    pub fn unbind_permission(&self, role_id: i64, permission: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM role_permission_bindings WHERE role_id = ?1 AND permission = ?2",
                params![role_id, permission],
            )?;
            Ok(deleted == 1)
        })
    }

    pub fn bind_user(&self, role_id: i64, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO role_user_bindings (role_id, user_id) VALUES (?1, ?2)",
                params![role_id, user_id],
            )?;
            Ok(inserted == 1)
        })
    }

    pub fn unbind_user(&self, role_id: i64, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute(
                "DELETE FROM role_user_bindings WHERE role_id = ?1 AND user_id = ?2",
                params![role_id, user_id],
            )?;
            Ok(deleted == 1)
        })
    }

    /// Names of the roles bound to a user.
    pub fn get_user_roles(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT r.name FROM roles r
                 JOIN role_user_bindings b ON b.role_id = r.id
                 WHERE b.user_id = ?1
                 ORDER BY r.name",
            )?;
            let names = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    /// Union of permissions granted through every role bound to a user.
    pub fn get_user_permissions(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT p.permission FROM role_permission_bindings p
                 JOIN role_user_bindings b ON b.role_id = p.role_id
                 WHERE b.user_id = ?1
                 ORDER BY p.permission",
            )?;
            let permissions = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(permissions)
        })
    }
}

fn map_role(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoleRow> {
    Ok(RoleRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_role_permissions(conn: &Connection, role_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT permission FROM role_permission_bindings WHERE role_id = ?1 ORDER BY permission",
    )?;
    let permissions = stmt
        .query_map([role_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(permissions)
}
