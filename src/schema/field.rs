use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, Result};
use crate::schema::time_quantum::TimeQuantum;

pub const DEFAULT_INT_MIN: i64 = -(1 << 31);
pub const DEFAULT_INT_MAX: i64 = (1 << 31) - 1;
pub const DEFAULT_CACHE_SIZE: u32 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Set,
    Int,
    Mutex,
    Time,
    Bool,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Set => "set",
            FieldType::Int => "int",
            FieldType::Mutex => "mutex",
            FieldType::Time => "time",
            FieldType::Bool => "bool",
        }
    }

    /// At most one row per column.
    pub fn is_exclusive(&self) -> bool {
        matches!(self, FieldType::Mutex | FieldType::Bool)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options as submitted by a client; every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FieldOptionsRequest {
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub keys: Option<bool>,
    pub time_quantum: Option<String>,
    pub cache_size: Option<u32>,
}

impl FieldOptionsRequest {
    pub fn of_type(field_type: FieldType) -> Self {
        FieldOptionsRequest { field_type: Some(field_type), ..Default::default() }
    }

    pub fn with_bounds(mut self, min: i64, max: i64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub fn with_keys(mut self, keys: bool) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_time_quantum(mut self, quantum: &str) -> Self {
        self.time_quantum = Some(quantum.to_string());
        self
    }

    /// Checks the option combination against the type and fills defaults.
    pub fn validate(self) -> Result<FieldOptions> {
        let field_type = self.field_type.unwrap_or(FieldType::Set);
        let reject = |option: &str| {
            Err(Error::schema(format!("option '{}' is not allowed on {} fields", option, field_type)))
        };

        if field_type != FieldType::Int && (self.min.is_some() || self.max.is_some()) {
            return reject("min/max");
        }
        if field_type != FieldType::Time && self.time_quantum.is_some() {
            return reject("timeQuantum");
        }
        if matches!(field_type, FieldType::Int | FieldType::Bool) && self.keys == Some(true) {
            return reject("keys");
        }
        if matches!(field_type, FieldType::Int | FieldType::Bool | FieldType::Time) && self.cache_size.is_some() {
            return reject("cacheSize");
        }

        let mut options = FieldOptions {
            field_type,
            min: None,
            max: None,
            keys: self.keys.unwrap_or(false),
            time_quantum: None,
            cache_size: None,
        };

        match field_type {
            FieldType::Int => {
                let min = self.min.unwrap_or(DEFAULT_INT_MIN);
                let max = self.max.unwrap_or(DEFAULT_INT_MAX);
                if min >= max {
                    return Err(Error::schema(format!(
                        "int field requires min < max, got min={} max={}",
                        min, max
                    )));
                }
                options.min = Some(min);
                options.max = Some(max);
            }
            FieldType::Time => {
                let Some(quantum) = self.time_quantum else {
                    return Err(Error::schema("time fields require a timeQuantum"));
                };
                options.time_quantum = Some(TimeQuantum::parse(&quantum)?);
            }
            FieldType::Set | FieldType::Mutex => {
                options.cache_size = Some(self.cache_size.unwrap_or(DEFAULT_CACHE_SIZE));
            }
            FieldType::Bool => {}
        }
        Ok(options)
    }
}

/// Validated, immutable field options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldOptions {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<i64>,
    #[serde(default)]
    pub keys: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_quantum: Option<TimeQuantum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_size: Option<u32>,
}

impl FieldOptions {
    /// Inclusive bounds of an int field.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        match (self.field_type, self.min, self.max) {
            (FieldType::Int, Some(min), Some(max)) => Some((min, max)),
            _ => None,
        }
    }

    pub fn check_value(&self, value: i64) -> Result<()> {
        match self.bounds() {
            Some((min, max)) if value < min || value > max => Err(Error::range(format!(
                "value {} is outside [{}, {}]",
                value, min, max
            ))),
            _ => Ok(()),
        }
    }
}
