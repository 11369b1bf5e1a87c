use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

/// A schema change identified by its creation timestamp (ms since epoch).
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1_700_000_000_000,
        name: "initial-schema",
        up: INITIAL_UP,
        down: INITIAL_DOWN,
    },
    Migration {
        version: 1_700_795_948_817,
        name: "service-timezone-offset",
        up: "ALTER TABLE services ADD COLUMN timezone_offset TEXT NOT NULL DEFAULT '+00:00';",
        down: "ALTER TABLE services DROP COLUMN timezone_offset;",
    },
];

const INITIAL_UP: &str = "
    CREATE TABLE services (
        id          INTEGER PRIMARY KEY CHECK (id = 1),
        name        TEXT NOT NULL,
        description TEXT,
        logo_url    TEXT,
        created_at  TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE custom_auths (
        service_id      INTEGER PRIMARY KEY REFERENCES services(id) ON DELETE CASCADE,
        enabled         INTEGER NOT NULL DEFAULT 0,
        authorize_url   TEXT NOT NULL,
        token_url       TEXT NOT NULL,
        userinfo_url    TEXT NOT NULL,
        client_id       TEXT NOT NULL,
        client_secret   TEXT NOT NULL,
        scope           TEXT NOT NULL DEFAULT '',
        email_key       TEXT NOT NULL DEFAULT 'email',
        updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE users (
        id          TEXT PRIMARY KEY,
        email       TEXT NOT NULL UNIQUE,
        user_type   TEXT NOT NULL DEFAULT 'GENERAL',
        created_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE user_profiles (
        user_id     TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        nickname    TEXT,
        avatar_url  TEXT,
        updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE email_auths (
        user_id         TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        password_hash   TEXT NOT NULL,
        updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE accounts (
        id                  INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id             TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        provider            TEXT NOT NULL,
        provider_account_id TEXT NOT NULL,
        created_at          TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(provider, provider_account_id)
    );

    CREATE TABLE codes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        code_type   TEXT NOT NULL,
        key         TEXT NOT NULL,
        code        TEXT NOT NULL,
        data        TEXT,
        is_verified INTEGER NOT NULL DEFAULT 0,
        expired_at  TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (datetime('now')),
        UNIQUE(code_type, key)
    );

    CREATE TABLE roles (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE role_permission_bindings (
        role_id     INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        permission  TEXT NOT NULL,
        PRIMARY KEY (role_id, permission)
    );

    CREATE TABLE role_user_bindings (
        role_id     INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
        user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at  TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (role_id, user_id)
    );

    CREATE TABLE feedbacks (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL UNIQUE,
        description TEXT,
        created_at  TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE feedback_fields (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        feedback_id INTEGER NOT NULL REFERENCES feedbacks(id) ON DELETE CASCADE,
        key         TEXT NOT NULL,
        name        TEXT NOT NULL,
        description TEXT,
        format      TEXT NOT NULL,
        options     TEXT NOT NULL DEFAULT '[]',
        is_required INTEGER NOT NULL DEFAULT 0,
        position    INTEGER NOT NULL DEFAULT 0,
        UNIQUE(feedback_id, key)
    );

    CREATE TABLE feedback_responses (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        feedback_id INTEGER NOT NULL REFERENCES feedbacks(id) ON DELETE CASCADE,
        user_id     TEXT REFERENCES users(id) ON DELETE SET NULL,
        created_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_feedback_responses_feedback
        ON feedback_responses(feedback_id, created_at);

    CREATE TABLE feedback_response_fields (
        response_id INTEGER NOT NULL REFERENCES feedback_responses(id) ON DELETE CASCADE,
        field_id    INTEGER NOT NULL REFERENCES feedback_fields(id) ON DELETE CASCADE,
        value       TEXT NOT NULL,
        PRIMARY KEY (response_id, field_id)
    );

    CREATE TABLE posts (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title       TEXT NOT NULL,
        content     TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE post_votes (
        post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        created_at  TEXT NOT NULL DEFAULT (datetime('now')),
        PRIMARY KEY (post_id, user_id)
    );

    CREATE TABLE comments (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        post_id     INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        author_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        content     TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE INDEX idx_comments_post ON comments(post_id, created_at);
";

const INITIAL_DOWN: &str = "
    DROP TABLE comments;
    DROP TABLE post_votes;
    DROP TABLE posts;
    DROP TABLE feedback_response_fields;
    DROP TABLE feedback_responses;
    DROP TABLE feedback_fields;
    DROP TABLE feedbacks;
    DROP TABLE role_user_bindings;
    DROP TABLE role_permission_bindings;
    DROP TABLE roles;
    DROP TABLE codes;
    DROP TABLE accounts;
    DROP TABLE email_auths;
    DROP TABLE user_profiles;
    DROP TABLE users;
    DROP TABLE custom_auths;
    DROP TABLE services;
";

fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            name        TEXT NOT NULL,
            applied_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;
    Ok(())
}

pub fn applied_versions(conn: &Connection) -> Result<Vec<i64>> {
    ensure_table(conn)?;
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let versions = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<i64>, _>>()?;
    Ok(versions)
}

/// Apply every pending migration in version order.
pub fn run(conn: &Connection) -> Result<()> {
    let applied = applied_versions(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        info!("Running migration {} ({})", migration.version, migration.name);
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.up)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

/// Revert applied migrations newer than `target`, newest first.
/// Returns how many were reverted.
pub fn revert_to(conn: &Connection, target: i64) -> Result<usize> {
    let applied = applied_versions(conn)?;
    let mut reverted = 0;

    for migration in MIGRATIONS.iter().rev() {
        if migration.version <= target || !applied.contains(&migration.version) {
            continue;
        }
        info!("Reverting migration {} ({})", migration.version, migration.name);
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.down)?;
        tx.execute(
            "DELETE FROM schema_migrations WHERE version = ?1",
            [migration.version],
        )?;
        tx.commit()?;
        reverted += 1;
    }

    Ok(reverted)
}
