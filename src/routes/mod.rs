mod routes;

pub use routes::{MAX_REQUEST_BODY_BYTES, routes};
