//! Output drivers and task supervision.

pub mod indicator;
pub mod watchdog;
