mod auth;
mod request_id;

pub use auth::api_key_middleware;
pub use request_id::{RequestId, request_id_middleware};
