pub mod handler;
pub mod types;

pub use handler::{AllowAll, Authenticator, Handler, StaticToken};
pub use types::{ApiRequest, ApiResponse, Method};
