use crate::core::error::{Error, ErrorKind, Result};
use crate::query::ast::Call;

/// Every call the executor understands.
pub const KNOWN_CALLS: &[&str] = &[
    "Set", "Clear", "ClearRow", "Row", "Range", "Union", "Intersect", "Difference", "Xor",
    "Not", "All", "ConstRow", "Count", "TopN", "Sum", "Min", "Max",
];

/// Query validation limits.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub max_call_depth: usize,
    pub max_call_args: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        ValidationConfig { max_call_depth: 32, max_call_args: 1024 }
    }
}

/// Structural checks run on each statement before it executes.
pub struct QueryValidator {
    config: ValidationConfig,
}

impl QueryValidator {
    pub fn new(config: ValidationConfig) -> Self {
        QueryValidator { config }
    }

    pub fn validate(&self, call: &Call) -> Result<()> {
        self.validate_call(call, 1)
    }

    fn validate_call(&self, call: &Call, depth: usize) -> Result<()> {
        if !KNOWN_CALLS.contains(&call.name.as_str()) {
            return Err(Error::new(ErrorKind::UnknownCall, format!("unknown call '{}'", call.name)));
        }
        if depth > self.config.max_call_depth {
            return Err(Error::invalid(format!(
                "call nesting depth {} exceeds maximum {}",
                depth, self.config.max_call_depth
            )));
        }
        let args = call.args.len() + call.children.len();
        if args > self.config.max_call_args {
            return Err(Error::invalid(format!(
                "{} has {} arguments, max is {}",
                call.name, args, self.config.max_call_args
            )));
        }
        for child in &call.children {
            if child.is_write() {
                return Err(Error::invalid(format!("{} cannot be nested inside {}", child.name, call.name)));
            }
            self.validate_call(child, depth + 1)?;
        }
        Ok(())
    }
}
