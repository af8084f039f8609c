pub mod types;
pub mod database;
pub mod config;
pub mod deadline;
pub mod error;
