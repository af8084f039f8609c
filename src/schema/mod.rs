pub mod naming;
pub mod field;
pub mod registry;
pub mod time_quantum;

pub use field::{FieldOptions, FieldOptionsRequest, FieldType};
pub use registry::Registry;
pub use time_quantum::TimeQuantum;
