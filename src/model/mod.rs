pub mod task;
pub mod user;

pub use task::{is_overdue, NewTask, RawTask, TaskRecord, TaskStatus, TaskUpdate};
pub use user::{Identity, NewUser, Role, User};
