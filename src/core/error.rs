use std::fmt;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Schema,
    NotFound,       // Schema refinement: unknown index/field/table
    Conflict,       // Schema refinement: name already taken
    Range,
    Unsupported,
    UnknownCall,
    Degraded,
    Timeout,
    Unauthorized,
    InvalidInput,
    Io,
    Internal,
}

impl ErrorKind {
    /// Machine-readable kind reported on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Parse => "ParseError",
            ErrorKind::Schema | ErrorKind::NotFound | ErrorKind::Conflict => "SchemaError",
            ErrorKind::Range => "RangeError",
            ErrorKind::Unsupported => "UnsupportedError",
            ErrorKind::UnknownCall => "UnknownCallError",
            ErrorKind::Degraded => "Degraded",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::Io => "IoError",
            ErrorKind::Internal => "InternalError",
        }
    }

    fn reason(&self) -> Option<&'static str> {
        match self {
            ErrorKind::NotFound => Some("not_found"),
            ErrorKind::Conflict => Some("conflict"),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
    pub position: Option<usize>,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into(), position: None }
    }

    /// Parse failure at a byte offset into the submitted text.
    pub fn parse_at(position: usize, context: impl Into<String>) -> Self {
        Error { kind: ErrorKind::Parse, context: context.into(), position: Some(position) }
    }

    pub fn schema(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, context)
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, context)
    }

    pub fn conflict(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, context)
    }

    pub fn range(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Range, context)
    }

    pub fn unsupported(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, context)
    }

    pub fn invalid(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, context)
    }

    pub fn internal(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, context)
    }

    /// True for the whole SchemaError family.
    pub fn is_schema(&self) -> bool {
        matches!(self.kind, ErrorKind::Schema | ErrorKind::NotFound | ErrorKind::Conflict)
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind.code(),
            message: self.context.clone(),
            position: self.position,
            reason: self.kind.reason(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.context)?;
        if let Some(position) = self.position {
            write!(f, " (at position {})", position)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::new(ErrorKind::Io, format!("bincode: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::new(ErrorKind::InvalidInput, format!("invalid JSON: {}", err))
    }
}

/// Wire shape of an error: `{"kind", "message", "position"?, "reason"?}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

pub type Result<T> = std::result::Result<T, Error>;
