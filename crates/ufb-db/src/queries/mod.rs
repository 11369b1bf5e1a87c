mod codes;
mod feedback;
mod posts;
mod roles;
mod service;
mod statistics;
mod users;

use anyhow::Result;

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// `?1, ?2, ...` starting after `offset` already-bound parameters.
fn placeholders(count: usize, offset: usize) -> String {
    (offset + 1..=offset + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}
