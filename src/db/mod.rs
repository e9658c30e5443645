pub mod connection;
pub mod error_context;

pub use connection::{assert_alive, connect_once, connect_with_retry};
pub use error_context::PgErrorContext;
