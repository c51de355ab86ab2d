pub mod collector;
pub mod fallback;
pub mod partial;


pub use collector::{create_resilient_collector, extractor, Extractor, ResilientCollector};
pub use fallback::{execute_with_fallback, FieldSource};
pub use partial::{collect_partial_results, FailedOperation, PartialResults};
