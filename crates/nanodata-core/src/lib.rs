//! nanodata-core: sources, transforms and pipelines over the content store
//!
//! A [`DataSource`] describes how to obtain a dataset and a [`DataTransform`]
//! how to derive one; both are identified by a hash of their parameters.
//! [`Repository`] materializes them at most once per hash and hands out
//! store-backed [`Dataset`] handles.

pub mod catalog;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod pipeline_config;
pub mod progress;
pub mod repository;
pub mod source;
pub mod sources;
pub mod transform;
pub mod transforms;
pub mod variant;

pub use catalog::SchemaCatalog;
pub use http::{set_http_config, HttpConfig};
pub use logging::{init_logging, ProgressLogger};
pub use nanodata_store::{ContentHash, Dataset, Error, Result, StoreOptions};
pub use pipeline::Pipeline;
pub use pipeline_config::PipelineFile;
pub use progress::{fmt_bytes, fmt_num, ProgressContext, SharedProgress};
pub use repository::Repository;
pub use source::{DataSource, FetchTarget};
pub use transform::{apply_batchwise, DataTransform};
pub use variant::{builtin_sources, builtin_transforms, VariantRegistry};
