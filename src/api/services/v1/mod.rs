//! `/api/v1` JSON API
//!
//! Every response uses the `{code, message, data}` envelope; list
//! endpoints return `PaginatedResponse`.

mod billing;
mod catalog;
pub mod error_code;
mod helpers;
mod patients;
mod payouts;
mod reports;
mod results;
pub mod routes;
mod types;
mod visits;

pub use error_code::ErrorCode;
pub use helpers::{
    api_result, error_from_labdesk, error_response, json_error_handler, paginated_response,
    path_error_handler, query_error_handler, success_response,
};
pub use routes::v1_routes;
pub use types::*;
