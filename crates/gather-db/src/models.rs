//! Database row types — these map directly to SQLite rows.
//! Distinct from gather-types API models to keep the DB layer independent.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub verified: bool,
    pub verify_token: Option<String>,
    pub reset_token: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub created_at: String,
}

pub struct SessionRow {
    pub token: String,
    pub user_id: String,
    pub expires_at: String,
}

pub struct PostRow {
    pub id: String,
    pub author_id: String,
    pub author_username: String,
    pub content: String,
    pub image: Option<String>,
    pub archived: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: String,
}

pub struct CommunityRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub creator_id: String,
    pub creator_username: String,
    pub created_at: String,
}

pub struct NotificationRow {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub payload: String,
    pub read: bool,
    pub created_at: String,
}

/// Parse a SQLite timestamp column into UTC.
///
/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone, but
/// RFC 3339 values can also appear. Corrupt values fall back to the epoch
/// rather than failing the whole response.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_and_rfc3339_timestamps() {
        let sqlite = parse_timestamp("2026-08-29 12:30:00");
        assert_eq!(sqlite.to_rfc3339(), "2026-08-29T12:30:00+00:00");

        let rfc = parse_timestamp("2026-08-29T12:30:00Z");
        assert_eq!(sqlite, rfc);
    }

    #[test]
    fn corrupt_timestamp_falls_back_to_default() {
        assert_eq!(parse_timestamp("not a date"), DateTime::<Utc>::default());
    }
}
