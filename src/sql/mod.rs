pub mod lexer;
pub mod ast;
pub mod parser;
pub mod planner;
pub mod executor;
pub mod types;

pub use executor::SqlEngine;
pub use types::{ColumnInfo, ResultSet, SqlType, SqlValue};
