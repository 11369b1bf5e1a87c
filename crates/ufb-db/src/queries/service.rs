use anyhow::Result;
use rusqlite::{Connection, params};

use super::OptionalExt;
use super::users::insert_user;
use crate::Database;
use crate::models::{CustomAuthRow, NewUser, ServiceRow};

impl Database {
    pub fn get_service(&self) -> Result<Option<ServiceRow>> {
        self.with_conn(query_service)
    }

    /// Insert the singleton service row together with its first user, in one
    /// transaction. Returns `false`, writing nothing, if the service already
    /// exists.
    pub fn setup_service(
        &self,
        name: &str,
        description: Option<&str>,
        logo_url: Option<&str>,
        timezone_offset: &str,
        owner: &NewUser,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO services (id, name, description, logo_url, timezone_offset)
                 VALUES (1, ?1, ?2, ?3, ?4)",
                params![name, description, logo_url, timezone_offset],
            )?;
            if inserted == 0 {
                return Ok(false);
            }
            insert_user(&tx, owner)?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn update_service(
        &self,
        name: &str,
        description: Option<&str>,
        logo_url: Option<&str>,
        timezone_offset: &str,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE services
                 SET name = ?1, description = ?2, logo_url = ?3, timezone_offset = ?4,
                     updated_at = datetime('now')
                 WHERE id = 1",
                params![name, description, logo_url, timezone_offset],
            )?;
            Ok(updated == 1)
        })
    }

    pub fn get_custom_auth(&self) -> Result<Option<CustomAuthRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT enabled, authorize_url, token_url, userinfo_url, client_id,
                        client_secret, scope, email_key
                 FROM custom_auths WHERE service_id = 1",
                [],
                |row| {
                    Ok(CustomAuthRow {
                        enabled: row.get(0)?,
                        authorize_url: row.get(1)?,
                        token_url: row.get(2)?,
                        userinfo_url: row.get(3)?,
                        client_id: row.get(4)?,
                        client_secret: row.get(5)?,
                        scope: row.get(6)?,
                        email_key: row.get(7)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn upsert_custom_auth(&self, auth: &CustomAuthRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO custom_auths
                    (service_id, enabled, authorize_url, token_url, userinfo_url,
                     client_id, client_secret, scope, email_key)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(service_id) DO UPDATE SET
                    enabled = excluded.enabled,
                    authorize_url = excluded.authorize_url,
                    token_url = excluded.token_url,
                    userinfo_url = excluded.userinfo_url,
                    client_id = excluded.client_id,
                    client_secret = excluded.client_secret,
                    scope = excluded.scope,
                    email_key = excluded.email_key,
                    updated_at = datetime('now')",
                params![
                    auth.enabled,
                    auth.authorize_url,
                    auth.token_url,
                    auth.userinfo_url,
                    auth.client_id,
                    auth.client_secret,
                    auth.scope,
                    auth.email_key,
                ],
            )?;
            Ok(())
        })
    }
}

fn query_service(conn: &Connection) -> Result<Option<ServiceRow>> {
    conn.query_row(
        "SELECT name, description, logo_url, timezone_offset, created_at, updated_at
         FROM services WHERE id = 1",
        [],
        |row| {
            Ok(ServiceRow {
                name: row.get(0)?,
                description: row.get(1)?,
                logo_url: row.get(2)?,
                timezone_offset: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()
}
