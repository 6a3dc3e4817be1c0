use serde::{Deserialize, Serialize};
use validator::Validate;

use super::Timer;

/// A named sequence of timers, returned with its timers in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routine {
    pub id: String,
    pub name: String,
    pub count: i32,
    pub data: Vec<Timer>,
}

/// Reference to a timer inside a routine save. Extra fields (a full timer
/// object) are accepted and ignored.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoutineEntry {
    #[validate(length(min = 1, max = 64))]
    pub timer_id: String,
}

/// Upsert payload for a routine. `data` replaces the routine's timer list.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SaveRoutineRequest {
    #[validate(length(min = 1, max = 64))]
    pub id: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(range(min = 1))]
    pub count: i32,
    #[validate]
    pub data: Vec<RoutineEntry>,
}

impl SaveRoutineRequest {
    pub fn timer_ids(&self) -> Vec<String> {
        self.data.iter().map(|e| e.timer_id.clone()).collect()
    }
}
