use anyhow::Result;
use rusqlite::{Connection, params};

use super::OptionalExt;
use crate::Database;
use crate::models::{NewUser, UserRow};

const USER_COLUMNS: &str = "u.id, u.email, u.user_type, p.nickname, p.avatar_url, u.created_at";

impl Database {
    // -- Users --

    /// Create a user with an empty profile, plus an email credential when a
    /// password hash is given.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        user_type: &str,
        password_hash: Option<&str>,
    ) -> Result<()> {
        let user = NewUser {
            id,
            email,
            user_type,
            password_hash,
        };
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            insert_user(&tx, &user)?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.id = ?1", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "u.email = ?1", email))
    }

    pub fn list_users(&self, limit: u32, offset: u32) -> Result<(Vec<UserRow>, i64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users u
                 LEFT JOIN user_profiles p ON p.user_id = u.id
                 ORDER BY u.created_at, u.email
                 LIMIT ?1 OFFSET ?2",
                USER_COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![limit, offset], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            Ok((rows, total))
        })
    }

    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    pub fn update_profile(
        &self,
        user_id: &str,
        nickname: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO user_profiles (user_id, nickname, avatar_url) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET
                    nickname = excluded.nickname,
                    avatar_url = excluded.avatar_url,
                    updated_at = datetime('now')",
                params![user_id, nickname, avatar_url],
            )?;
            Ok(())
        })
    }

    // -- Email credentials --

    pub fn get_password_hash(&self, user_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT password_hash FROM email_auths WHERE user_id = ?1",
                [user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn set_password_hash(&self, user_id: &str, hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO email_auths (user_id, password_hash) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET
                    password_hash = excluded.password_hash,
                    updated_at = datetime('now')",
                params![user_id, hash],
            )?;
            Ok(())
        })
    }

    // -- OAuth accounts --

    pub fn find_account_user(&self, provider: &str, provider_account_id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id FROM accounts WHERE provider = ?1 AND provider_account_id = ?2",
                params![provider, provider_account_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    pub fn link_account(&self, user_id: &str, provider: &str, provider_account_id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO accounts (user_id, provider, provider_account_id)
                 VALUES (?1, ?2, ?3)",
                params![user_id, provider, provider_account_id],
            )?;
            Ok(())
        })
    }
}

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        user_type: row.get(2)?,
        nickname: row.get(3)?,
        avatar_url: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn query_user(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users u
         LEFT JOIN user_profiles p ON p.user_id = u.id
         WHERE {}",
        USER_COLUMNS, predicate
    ))?;

    stmt.query_row([value], map_user).optional()
}

/// Insert a user, its empty profile and optional email credential.
/// Callers own the transaction.
pub(crate) fn insert_user(conn: &Connection, user: &NewUser) -> Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, user_type) VALUES (?1, ?2, ?3)",
        params![user.id, user.email, user.user_type],
    )?;
    conn.execute("INSERT INTO user_profiles (user_id) VALUES (?1)", [user.id])?;
    if let Some(hash) = user.password_hash {
        conn.execute(
            "INSERT INTO email_auths (user_id, password_hash) VALUES (?1, ?2)",
            params![user.id, hash],
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    #[test]
    fn create_and_fetch_user_with_profile() {
        let db = db();
        let id = user(&db, "a@example.com");

        let row = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.user_type, "GENERAL");
        assert!(row.nickname.is_none());

        db.update_profile(&id, Some("alice"), Some("https://cdn/a.png")).unwrap();
        let row = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(row.nickname.as_deref(), Some("alice"));
        assert_eq!(row.avatar_url.as_deref(), Some("https://cdn/a.png"));
    }

    #[test]
    fn email_is_unique() {
        let db = db();
        user(&db, "a@example.com");
        let dup = db.create_user("other-id", "a@example.com", "GENERAL", None);
        assert!(dup.is_err());
        // The failed transaction must not leave a profile behind.
        assert!(db.get_user_by_id("other-id").unwrap().is_none());
    }

    #[test]
    fn password_hash_set_and_replace() {
        let db = db();
        let id = uuid::Uuid::new_v4().to_string();
        db.create_user(&id, "oauth@example.com", "GENERAL", None).unwrap();
        assert!(db.get_password_hash(&id).unwrap().is_none());

        db.set_password_hash(&id, "h1").unwrap();
        db.set_password_hash(&id, "h2").unwrap();
        assert_eq!(db.get_password_hash(&id).unwrap().as_deref(), Some("h2"));
    }

    #[test]
    fn list_and_delete() {
        let db = db();
        let a = user(&db, "a@example.com");
        user(&db, "b@example.com");
        user(&db, "c@example.com");

        let (page, total) = db.list_users(2, 0).unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);

        assert!(db.delete_user(&a).unwrap());
        assert!(!db.delete_user(&a).unwrap());
        assert_eq!(db.list_users(10, 0).unwrap().1, 2);
    }

    #[test]
    fn accounts_link_once() {
        let db = db();
        let id = user(&db, "a@example.com");
        assert!(db.find_account_user("oauth", "sub-1").unwrap().is_none());

        db.link_account(&id, "oauth", "sub-1").unwrap();
        db.link_account(&id, "oauth", "sub-1").unwrap();
        assert_eq!(db.find_account_user("oauth", "sub-1").unwrap(), Some(id));
    }
}
