use std::fmt;
use chrono::{NaiveDateTime, Timelike};
use crate::bitmap::bsi::RangeOp;

/// Literal argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(NaiveDateTime),
    /// Bare word such as the field in `TopN(stats)`.
    Ident(String),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Ident(_) => "identifier",
            Value::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CondOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CondOp::Eq => "==",
            CondOp::Neq => "!=",
            CondOp::Lt => "<",
            CondOp::Lte => "<=",
            CondOp::Gt => ">",
            CondOp::Gte => ">=",
        }
    }
}

impl From<CondOp> for RangeOp {
    fn from(op: CondOp) -> Self {
        match op {
            CondOp::Eq => RangeOp::Eq,
            CondOp::Neq => RangeOp::Neq,
            CondOp::Lt => RangeOp::Lt,
            CondOp::Lte => RangeOp::Lte,
            CondOp::Gt => RangeOp::Gt,
            CondOp::Gte => RangeOp::Gte,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Value),
    /// `field=value`
    Keyed { key: String, value: Value },
    /// `field > value`
    Condition { field: String, op: CondOp, value: Value },
    /// `low < field <= high`
    Between { low: Value, low_op: CondOp, field: String, high_op: CondOp, high: Value },
}

/// One PQL call with its nested calls and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub children: Vec<Call>,
    pub args: Vec<Arg>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> Self {
        Call { name: name.into(), children: Vec::new(), args: Vec::new() }
    }

    pub fn with_child(mut self, child: Call) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_arg(mut self, arg: Arg) -> Self {
        self.args.push(arg);
        self
    }

    pub fn with_keyed(self, key: &str, value: Value) -> Self {
        self.with_arg(Arg::Keyed { key: key.to_string(), value })
    }

    pub fn with_positional(self, value: Value) -> Self {
        self.with_arg(Arg::Positional(value))
    }

    pub fn keyed(&self, key: &str) -> Option<&Value> {
        self.args.iter().find_map(|arg| match arg {
            Arg::Keyed { key: k, value } if k == key => Some(value),
            _ => None,
        })
    }

    pub fn positional(&self) -> Vec<&Value> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                Arg::Positional(value) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Keyed arguments whose key is not one of `reserved`.
    pub fn field_args<'a>(&'a self, reserved: &[&str]) -> Vec<(&'a str, &'a Value)> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                Arg::Keyed { key, value } if !reserved.contains(&key.as_str()) => {
                    Some((key.as_str(), value))
                }
                _ => None,
            })
            .collect()
    }

    /// Nesting depth; a call without children has depth 1.
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(Call::depth).max().unwrap_or(0)
    }

    pub fn is_write(&self) -> bool {
        matches!(self.name.as_str(), "Set" | "Clear" | "ClearRow")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) if x.fract() == 0.0 && x.is_finite() => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => {
                f.write_str("\"")?;
                for c in s.chars() {
                    match c {
                        '"' | '\\' => write!(f, "\\{}", c)?,
                        '\n' => f.write_str("\\n")?,
                        '\t' => f.write_str("\\t")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                f.write_str("\"")
            }
            Value::Timestamp(ts) if ts.second() == 0 => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%dT%H:%M:%S")),
            Value::Ident(name) => f.write_str(name),
            Value::List(values) => {
                f.write_str("[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arg::Positional(value) => write!(f, "{}", value),
            Arg::Keyed { key, value } => write!(f, "{}={}", key, value),
            Arg::Condition { field, op, value } => write!(f, "{} {} {}", field, op.symbol(), value),
            Arg::Between { low, low_op, field, high_op, high } => {
                write!(f, "{} {} {} {} {}", low, low_op.symbol(), field, high_op.symbol(), high)
            }
        }
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        let mut first = true;
        for child in &self.children {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}", child)?;
            first = false;
        }
        for arg in &self.args {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
            first = false;
        }
        f.write_str(")")
    }
}
