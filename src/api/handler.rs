use std::sync::Arc;
use serde_json::{Value, json};
use tracing::{debug, warn};
use crate::api::types::{
    ApiRequest, ApiResponse, CreateFieldBody, CreateIndexBody, Method, decode_body, error_json, status_for,
};
use crate::core::database::Database;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::QueryOptions;
use crate::sql::types::ResultSet;

/// Decides whether a request may proceed, given its bearer token.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: Option<&str>) -> Result<()>;
}

pub struct AllowAll;

impl Authenticator for AllowAll {
    fn authenticate(&self, _token: Option<&str>) -> Result<()> {
        Ok(())
    }
}

/// Accepts exactly one shared bearer token.
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken { token: token.into() }
    }
}

impl Authenticator for StaticToken {
    fn authenticate(&self, token: Option<&str>) -> Result<()> {
        match token {
            Some(token) if token == self.token => Ok(()),
            Some(_) => Err(Error::new(ErrorKind::Unauthorized, "invalid token")),
            None => Err(Error::new(ErrorKind::Unauthorized, "missing bearer token")),
        }
    }
}

/// Maps requests onto the database and errors onto status codes.
pub struct Handler {
    db: Arc<Database>,
    auth: Arc<dyn Authenticator>,
}

impl Handler {
    pub fn new(db: Arc<Database>, auth: Arc<dyn Authenticator>) -> Self {
        Handler { db, auth }
    }

    /// A handler that skips authentication.
    pub fn open(db: Arc<Database>) -> Self {
        Self::new(db, Arc::new(AllowAll))
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn handle(&self, request: ApiRequest) -> ApiResponse {
        debug!(method = %request.method, path = %request.path, "request");
        let response = match self.auth.authenticate(request.token.as_deref()) {
            Ok(()) => match self.route(&request) {
                Ok(response) => response,
                Err(err) => ApiResponse::error(&err),
            },
            Err(err) => ApiResponse::error(&err),
        };
        if response.status >= 500 {
            warn!(method = %request.method, path = %request.path, status = response.status, "request failed");
        }
        response
    }

    fn route(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let segments: Vec<&str> = request.path.trim_matches('/').split('/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["status"]) => Ok(ApiResponse::ok(serde_json::to_value(self.db.status())?)),
            (Method::Get, ["index"]) => {
                let indexes = self.db.list_indexes();
                Ok(ApiResponse::ok(json!({ "indexes": indexes })))
            }
            (Method::Get, ["index", name]) => Ok(ApiResponse::ok(serde_json::to_value(self.db.index_info(name)?)?)),
            (Method::Post, ["index", name]) => {
                let body: CreateIndexBody = decode_body(&request.body)?;
                self.db.create_index(name, body.options)?;
                Ok(success())
            }
            (Method::Delete, ["index", name]) => {
                self.db.delete_index(name)?;
                Ok(success())
            }
            (Method::Post, ["index", index, "field", field]) => {
                let body: CreateFieldBody = decode_body(&request.body)?;
                self.db.create_field(index, field, body.options)?;
                Ok(success())
            }
            (Method::Delete, ["index", index, "field", field]) => {
                self.db.delete_field(index, field)?;
                Ok(success())
            }
            (Method::Post, ["index", index, "query"]) => {
                let options = QueryOptions { timeout: None, strict: request.query_flag("strict")? };
                let response = self.db.query(index, &request.body, &options)?;
                Ok(ApiResponse::ok(serde_json::to_value(response)?))
            }
            (Method::Post, ["sql"]) => {
                let options = QueryOptions { timeout: None, strict: request.query_flag("strict")? };
                Ok(self.sql(&request.body, &options))
            }
            _ => Err(Error::not_found(format!("no route for {} {}", request.method, request.path))),
        }
    }

    /// SQL failures keep the result-set shape and add an `error` member.
    fn sql(&self, text: &str, options: &QueryOptions) -> ApiResponse {
        let result = self.db.sql(text, options).and_then(|set| Ok(serde_json::to_value(set)?));
        match result {
            Ok(body) => ApiResponse::ok(body),
            Err(err) => {
                let mut body = serde_json::to_value(ResultSet::empty()).unwrap_or_else(|_| json!({}));
                if let Value::Object(map) = &mut body {
                    map.insert("error".to_string(), error_json(&err));
                }
                ApiResponse { status: status_for(err.kind), body }
            }
        }
    }
}

fn success() -> ApiResponse {
    ApiResponse::ok(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;

    fn handler() -> Handler {
        let db = Database::open(Config::default().with_shard_count(2).with_worker_threads(2)).unwrap();
        Handler::open(Arc::new(db))
    }

    #[test]
    fn index_routes() {
        let handler = handler();
        let response = handler.handle(ApiRequest::post("/index/user", r#"{"options": {"keys": false}}"#));
        assert_eq!(response.body, json!({ "success": true }));

        let response = handler.handle(ApiRequest::post("/index/user", ""));
        assert_eq!(response.status, 409);
        assert_eq!(response.body["kind"], "SchemaError");

        let response = handler.handle(ApiRequest::post(
            "/index/user/field/stats",
            r#"{"options": {"type": "int", "min": 0, "max": 100000}}"#,
        ));
        assert!(response.is_success());

        let response = handler.handle(ApiRequest::get("/index/user"));
        assert_eq!(response.body["name"], "user");
        assert_eq!(response.body["fields"][0]["options"]["type"], "int");

        let response = handler.handle(ApiRequest::get("/index"));
        assert_eq!(response.body["indexes"].as_array().map(Vec::len), Some(1));

        assert!(handler.handle(ApiRequest::delete("/index/user/field/stats")).is_success());
        assert!(handler.handle(ApiRequest::delete("/index/user")).is_success());
        assert_eq!(handler.handle(ApiRequest::get("/index/user")).status, 404);
    }

    #[test]
    fn query_route() {
        let handler = handler();
        handler.handle(ApiRequest::post("/index/i", ""));
        handler.handle(ApiRequest::post("/index/i/field/f", ""));
        let response = handler.handle(ApiRequest::post("/index/i/query", "Set(3, f=1) Row(f=1)"));
        assert_eq!(response.body, json!({ "results": [true, { "columns": [3] }] }));

        let response = handler.handle(ApiRequest::post("/index/i/query", "Row(f=1"));
        assert_eq!(response.status, 400);
        assert_eq!(response.body["kind"], "ParseError");

        let response = handler.handle(ApiRequest::post("/index/i/query?strict=maybe", "All()"));
        assert_eq!(response.status, 400);
    }

    #[test]
    fn sql_errors_keep_result_shape() {
        let handler = handler();
        let response = handler.handle(ApiRequest::post("/sql", "select 1"));
        assert_eq!(response.body, json!({ "schema": { "fields": [{ "name": "", "type": "INT" }] }, "data": [[1]] }));

        let response = handler.handle(ApiRequest::post("/sql", "select * from nowhere"));
        assert_eq!(response.status, 404);
        assert_eq!(response.body["data"], json!([]));
        assert_eq!(response.body["error"]["kind"], "SchemaError");
    }

    #[test]
    fn static_token() {
        let db = Database::open(Config::default().with_worker_threads(1)).unwrap();
        let handler = Handler::new(Arc::new(db), Arc::new(StaticToken::new("secret")));
        assert_eq!(handler.handle(ApiRequest::get("/status")).status, 401);
        assert_eq!(handler.handle(ApiRequest::get("/status").with_token("nope")).status, 401);
        let response = handler.handle(ApiRequest::get("/status").with_authorization("Bearer secret"));
        assert_eq!(response.body["state"], "NORMAL");
        assert_eq!(handler.handle(ApiRequest::get("/nowhere").with_token("secret")).status, 404);
    }
}
