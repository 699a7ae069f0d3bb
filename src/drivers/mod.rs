//! Platform helpers shared by the long-lived tasks.

pub mod task_pin;
