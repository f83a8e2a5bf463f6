use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker side of a turn. Anything the backend does not label as the user
/// collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Other,
}

impl Role {
    pub fn from_raw(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") { Role::User } else { Role::Other }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogTurn {
    pub log_name: String,
    /// 0-based position within the owning log.
    pub ordinal: usize,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Alternate texts recorded for this turn, possibly empty.
    #[serde(default)]
    pub variants: Vec<String>,
    /// Index into `variants`, clamped to range at parse time.
    #[serde(default)]
    pub active_variant: usize,
}
