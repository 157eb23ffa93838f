pub mod job;
pub mod notification;

pub use job::{JobRow, JobStatus};
pub use notification::NotificationRow;
