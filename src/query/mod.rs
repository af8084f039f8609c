pub mod ast;
pub mod parser;
pub mod types;
pub mod cache;
pub mod results;
pub mod executor;

pub use ast::{Arg, Call, CondOp, Value};
pub use executor::{Executor, RowPlan};
pub use results::{QueryResponse, QueryResult, StatementOutcome};
