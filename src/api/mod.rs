mod auth;
mod handlers;
pub mod response;
mod routes;

pub use auth::{OwnerId, USER_ID_HEADER};
pub use routes::create_router;
