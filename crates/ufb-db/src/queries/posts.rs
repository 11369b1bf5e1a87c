use anyhow::Result;
use rusqlite::{Connection, params};

use super::OptionalExt;
use crate::Database;
use crate::models::{CommentRow, PostRow};

/// `?1` is always the viewing user, used to fill `voted`.
const POST_SELECT: &str = "
    SELECT p.id, p.author_id, pr.nickname, p.title, p.content,
           (SELECT COUNT(*) FROM post_votes v WHERE v.post_id = p.id),
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id),
           EXISTS (SELECT 1 FROM post_votes v WHERE v.post_id = p.id AND v.user_id = ?1),
           p.created_at, p.updated_at
    FROM posts p
    LEFT JOIN user_profiles pr ON pr.user_id = p.author_id";

impl Database {
    // -- Posts --

    pub fn create_post(&self, author_id: &str, title: &str, content: &str) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO posts (author_id, title, content) VALUES (?1, ?2, ?3)",
                params![author_id, title, content],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_post(&self, id: i64, viewer_id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| query_post(conn, id, viewer_id))
    }

    pub fn list_posts(&self, viewer_id: &str, limit: u32, offset: u32) -> Result<(Vec<PostRow>, i64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} ORDER BY p.created_at DESC, p.id DESC LIMIT ?2 OFFSET ?3",
                POST_SELECT
            ))?;
            let rows = stmt
                .query_map(params![viewer_id, limit, offset], map_post)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let total: i64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |row| row.get(0))?;
            Ok((rows, total))
        })
    }

    pub fn update_post(&self, id: i64, title: &str, content: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE posts SET title = ?1, content = ?2, updated_at = datetime('now') WHERE id = ?3",
                params![title, content, id],
            )?;
            Ok(updated == 1)
        })
    }

    pub fn delete_post(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }

    // -- Votes --

    /// Toggle a vote: removes if exists, inserts if not.
    /// Returns (voted, vote_count) after the change.
    pub fn toggle_vote(&self, post_id: i64, user_id: &str) -> Result<(bool, i64)> {
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            let removed = tx.execute(
                "DELETE FROM post_votes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
            )?;
            let voted = if removed == 0 {
                tx.execute(
                    "INSERT INTO post_votes (post_id, user_id) VALUES (?1, ?2)",
                    params![post_id, user_id],
                )?;
                true
            } else {
                false
            };
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM post_votes WHERE post_id = ?1",
                [post_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok((voted, count))
        })
    }

    // -- Comments --

    pub fn create_comment(&self, post_id: i64, author_id: &str, content: &str) -> Result<CommentRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO comments (post_id, author_id, content) VALUES (?1, ?2, ?3)",
                params![post_id, author_id, content],
            )?;
            let id = conn.last_insert_rowid();
            query_comment(conn, id)?.ok_or_else(|| anyhow::anyhow!("comment {} vanished", id))
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| query_comment(conn, id))
    }

    pub fn list_comments(&self, post_id: i64) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.post_id, c.author_id, pr.nickname, c.content, c.created_at
                 FROM comments c
                 LEFT JOIN user_profiles pr ON pr.user_id = c.author_id
                 WHERE c.post_id = ?1
                 ORDER BY c.created_at, c.id",
            )?;
            let rows = stmt
                .query_map([post_id], map_comment)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn delete_comment(&self, id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let deleted = conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(deleted == 1)
        })
    }
}

fn query_post(conn: &Connection, id: i64, viewer_id: &str) -> Result<Option<PostRow>> {
    conn.query_row(
        &format!("{} WHERE p.id = ?2", POST_SELECT),
        params![viewer_id, id],
        map_post,
    )
    .optional()
}

fn query_comment(conn: &Connection, id: i64) -> Result<Option<CommentRow>> {
    conn.query_row(
        "SELECT c.id, c.post_id, c.author_id, pr.nickname, c.content, c.created_at
         FROM comments c
         LEFT JOIN user_profiles pr ON pr.user_id = c.author_id
         WHERE c.id = ?1",
        [id],
        map_comment,
    )
    .optional()
}

fn map_post(row: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    Ok(PostRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        author_nickname: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        vote_count: row.get(5)?,
        comment_count: row.get(6)?,
        voted: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_comment(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author_id: row.get(2)?,
        author_nickname: row.get(3)?,
        content: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::queries::test_support::{db, user};

    #[test]
    fn post_counts_votes_and_comments() {
        let db = db();
        let alice = user(&db, "alice@example.com");
        let bob = user(&db, "bob@example.com");
        db.update_profile(&alice, Some("alice"), None).unwrap();

        let id = db.create_post(&alice, "Dark mode", "Please add it").unwrap();
        assert_eq!(db.toggle_vote(id, &bob).unwrap(), (true, 1));
        assert_eq!(db.toggle_vote(id, &alice).unwrap(), (true, 2));
        assert_eq!(db.toggle_vote(id, &bob).unwrap(), (false, 1));

        db.create_comment(id, &bob, "+1").unwrap();

        let as_alice = db.get_post(id, &alice).unwrap().unwrap();
        assert_eq!(as_alice.author_nickname.as_deref(), Some("alice"));
        assert_eq!(as_alice.vote_count, 1);
        assert_eq!(as_alice.comment_count, 1);
        assert!(as_alice.voted);

        let as_bob = db.get_post(id, &bob).unwrap().unwrap();
        assert!(!as_bob.voted);
    }

    #[test]
    fn list_update_delete_posts() {
        let db = db();
        let alice = user(&db, "alice@example.com");
        let first = db.create_post(&alice, "one", "1").unwrap();
        let second = db.create_post(&alice, "two", "2").unwrap();

        let (rows, total) = db.list_posts(&alice, 10, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].id, second);

        assert!(db.update_post(first, "uno", "1!").unwrap());
        assert_eq!(db.get_post(first, &alice).unwrap().unwrap().title, "uno");

        assert!(db.delete_post(first).unwrap());
        assert!(db.get_post(first, &alice).unwrap().is_none());
        assert!(!db.update_post(first, "x", "y").unwrap());
    }

    #[test]
    fn comments_are_listed_in_order_and_deleted() {
        let db = db();
        let alice = user(&db, "alice@example.com");
        let post = db.create_post(&alice, "t", "c").unwrap();
        let c1 = db.create_comment(post, &alice, "first").unwrap();
        let c2 = db.create_comment(post, &alice, "second").unwrap();

        let listed: Vec<_> = db.list_comments(post).unwrap().into_iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![c1.id, c2.id]);

        assert!(db.delete_comment(c1.id).unwrap());
        assert!(db.get_comment(c1.id).unwrap().is_none());
        assert_eq!(db.list_comments(post).unwrap().len(), 1);
    }
}
