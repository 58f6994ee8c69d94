pub mod account;
pub mod routes;
pub mod token;
pub mod users;
pub mod utils;

pub use routes::{HttpBody, HttpResponse, PathParams, Router, build_router};
