pub mod deliver;
pub mod headers;
pub mod json_response;

pub use deliver::*;
pub use headers::*;
pub use json_response::*;
