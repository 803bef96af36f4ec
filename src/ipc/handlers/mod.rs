pub mod analytics;
pub mod assignments;
pub mod core;
pub mod marks;
pub mod reports;
pub mod setup;
pub mod students;
