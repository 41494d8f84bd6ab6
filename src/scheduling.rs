//! Background work of a running service: the cron scheduler and the
//! housekeeping loops that keep run history consistent.

pub mod scheduler;
pub mod supervisor;

pub use scheduler::{Scheduler, SchedulerHandle};
pub use supervisor::{script_supervisor, Supervisor};
