pub mod actions;
pub mod health;
pub mod metrics;
pub mod runs;
pub mod schedules;
