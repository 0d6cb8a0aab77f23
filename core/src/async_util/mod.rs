mod condvar;
mod condwait;
mod select;
mod sleep;
mod task_group;
mod timeout;

pub use condvar::CondVar;
pub use condwait::CondWait;
pub use select::{select, Either};
pub use sleep::sleep;
pub use task_group::{TaskGroup, TaskResult};
pub use timeout::timeout;
