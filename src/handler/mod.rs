pub mod error_handler;
pub mod instrument;


pub use error_handler::{ErrorHandler, ErrorMetrics};
pub use instrument::instrument;
