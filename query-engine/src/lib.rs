#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

mod correlation;
mod export;
mod query;

pub use correlation::CorrelationMetadata;
pub use export::{export, ExportFormat, ExportOptions};
pub use query::{QueryEngine, TopMessage};
