pub mod routine;
pub mod timer;
pub mod user;

pub use routine::{Routine, RoutineEntry, SaveRoutineRequest};
pub use timer::{SaveTimersRequest, Timer};
pub use user::{NewUser, User, UserProfile};
