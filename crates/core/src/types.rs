/// Authenticated user identifiers are opaque strings (JWT `sub` claims).
pub type UserId = String;

/// Task identifiers are opaque strings, UUID v4 when generated by us.
pub type TaskId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
