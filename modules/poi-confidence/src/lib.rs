pub mod cli;
pub mod config;
pub mod exporter;
pub mod loader;
pub mod pipeline;
pub mod schema;
pub mod scoring;
pub mod tables;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::Config;
pub use pipeline::{run, RunOptions, RunSummary};
pub use tables::Datasets;
pub use traits::Warehouse;
