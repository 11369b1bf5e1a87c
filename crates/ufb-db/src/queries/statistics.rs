use anyhow::Result;
use rusqlite::params;

use crate::Database;

impl Database {
    /// Response counts per local day in `[start, end)`.
    ///
    /// `start`/`end` are UTC timestamps in storage format; `day_modifier` is a
    /// SQLite date modifier (e.g. `+540 minutes`) that shifts UTC into the
    /// service's offset before truncating to a date. Days without responses
    /// are absent.
    pub fn count_responses_by_day(
        &self,
        feedback_id: Option<i64>,
        start: &str,
        end: &str,
        day_modifier: &str,
    ) -> Result<Vec<(String, i64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT date(created_at, ?4) AS day, COUNT(*)
                 FROM feedback_responses
                 WHERE (?1 IS NULL OR feedback_id = ?1)
                   AND created_at >= ?2 AND created_at < ?3
                 GROUP BY day
                 ORDER BY day",
            )?;
            let rows = stmt
                .query_map(params![feedback_id, start, end, day_modifier], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
