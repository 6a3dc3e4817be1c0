use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// One timer in a user's inventory.
///
/// `timer_id` is chosen by the client, so a save can upsert the whole
/// inventory in one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Timer {
    #[validate(length(min = 1, max = 64))]
    pub timer_id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Seconds.
    #[validate(range(min = 1))]
    pub duration: i32,
    #[validate(range(min = 1))]
    pub count: i32,
    #[sqlx(rename = "sort_order")]
    pub order: i32,
    #[validate(length(max = 32))]
    pub color: String,
}

/// Request body of a timer save: the complete desired inventory.
#[derive(Debug, Deserialize, Validate)]
pub struct SaveTimersRequest {
    #[validate]
    pub timers: Vec<Timer>,
}

impl SaveTimersRequest {
    /// Client ids must be unique inside one save.
    pub fn has_duplicate_ids(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        self.timers.iter().any(|t| !seen.insert(t.timer_id.as_str()))
    }
}
