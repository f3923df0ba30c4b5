pub mod auth;
pub mod request_id;

pub use auth::ApiTokenGuard;
pub use request_id::{RequestId, RequestIdMiddleware};
