use std::collections::HashMap;
use std::fmt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use crate::core::error::{Error, ErrorKind, Result};
use crate::index::index::IndexOptionsRequest;
use crate::schema::field::FieldOptionsRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn parse(method: &str) -> Option<Method> {
        match method.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "POST" => Some(Method::Post),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        })
    }
}

/// A request as handed over by whatever transport sits in front of the core.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: HashMap<String, String>,
    pub token: Option<String>,
    pub body: String,
}

impl ApiRequest {
    /// `target` may carry a query string (`/index/i/query?strict=true`).
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, HashMap::new()),
        };
        ApiRequest { method, path: path.to_string(), query, token: None, body: String::new() }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target)
    }

    pub fn post(target: &str, body: impl Into<String>) -> Self {
        Self::new(Method::Post, target).with_body(body)
    }

    pub fn delete(target: &str) -> Self {
        Self::new(Method::Delete, target)
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Reads an `Authorization` header value; only the bearer scheme is accepted.
    pub fn with_authorization(mut self, header: &str) -> Self {
        self.token = header.strip_prefix("Bearer ").map(|token| token.trim().to_string());
        self
    }

    pub fn query_flag(&self, key: &str) -> Result<Option<bool>> {
        match self.query.get(key).map(String::as_str) {
            None => Ok(None),
            Some("true") | Some("1") => Ok(Some(true)),
            Some("false") | Some("0") => Ok(Some(false)),
            Some(other) => Err(Error::invalid(format!("query parameter {} must be a boolean, got {:?}", key, other))),
        }
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn ok(body: Value) -> Self {
        ApiResponse { status: 200, body }
    }

    pub fn error(err: &Error) -> Self {
        ApiResponse { status: status_for(err.kind), body: error_json(err) }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub fn error_json(err: &Error) -> Value {
    serde_json::to_value(err.to_body()).unwrap_or(Value::Null)
}

pub fn status_for(kind: ErrorKind) -> u16 {
    match kind {
        ErrorKind::Parse
        | ErrorKind::Unsupported
        | ErrorKind::UnknownCall
        | ErrorKind::Range
        | ErrorKind::InvalidInput
        | ErrorKind::Schema => 400,
        ErrorKind::Unauthorized => 401,
        ErrorKind::NotFound => 404,
        ErrorKind::Conflict => 409,
        ErrorKind::Degraded => 503,
        ErrorKind::Timeout => 504,
        ErrorKind::Io | ErrorKind::Internal => 500,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateIndexBody {
    #[serde(default)]
    pub options: IndexOptionsRequest,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateFieldBody {
    #[serde(default)]
    pub options: FieldOptionsRequest,
}

/// Empty bodies decode to the default.
pub fn decode_body<T: DeserializeOwned + Default>(body: &str) -> Result<T> {
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::field::FieldType;

    #[test]
    fn target_splits_query_string() {
        let request = ApiRequest::post("/index/i/query?strict=true&x", "Row(f=1)");
        assert_eq!(request.path, "/index/i/query");
        assert_eq!(request.query_flag("strict").unwrap(), Some(true));
        assert_eq!(request.query_flag("missing").unwrap(), None);
        assert_eq!(request.query.get("x").map(String::as_str), Some(""));
        assert!(request.query_flag("x").is_err());
    }

    #[test]
    fn bearer_header() {
        assert_eq!(ApiRequest::get("/").with_authorization("Bearer abc").token.as_deref(), Some("abc"));
        assert_eq!(ApiRequest::get("/").with_authorization("Basic abc").token, None);
        assert_eq!(Method::parse("delete"), Some(Method::Delete));
        assert_eq!(Method::parse("PATCH"), None);
    }

    #[test]
    fn bodies() {
        let body: CreateFieldBody =
            decode_body(r#"{"options": {"type": "int", "min": 0, "max": 100000}}"#).unwrap();
        assert_eq!(body.options.field_type, Some(FieldType::Int));
        assert_eq!(body.options.max, Some(100_000));

        let body: CreateIndexBody = decode_body("").unwrap();
        assert_eq!(body.options.keys, None);
        let body: CreateIndexBody = decode_body(r#"{"options": {"keys": true, "shardCount": 2}}"#).unwrap();
        assert_eq!(body.options.shard_count, Some(2));

        let err = decode_body::<CreateIndexBody>(r#"{"options": {"bogus": 1}}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn statuses() {
        assert_eq!(ApiResponse::error(&Error::not_found("index x")).status, 404);
        assert_eq!(ApiResponse::error(&Error::conflict("index x")).status, 409);
        assert_eq!(ApiResponse::error(&Error::parse_at(3, "bad")).status, 400);
        assert_eq!(status_for(ErrorKind::Timeout), 504);
        assert_eq!(status_for(ErrorKind::Degraded), 503);
        assert_eq!(ApiResponse::error(&Error::range("x")).body["kind"], "RangeError");
    }
}
