//! Cost allocation library
//!
//! This crate provides the core functionality for:
//! - Querying required CPU, memory and replicas from Prometheus
//! - Joining the metric vectors into per-component resource records
//! - Persisting runs and reconstructing them by time range
//! - Periodic collection and structured logging

pub mod aggregate;
pub mod allocator;
pub mod error;
pub mod models;
pub mod observability;
pub mod source;
pub mod store;

pub use aggregate::{aggregate, UnmatchedPolicy};
pub use allocator::{CollectionConfig, CollectionLoop, CollectionResults, CostAllocator};
pub use error::{Error, Result};
pub use models::*;
pub use observability::StructuredLogger;
pub use source::{
    fetch_required_vectors, Metric, MetricSource, PrometheusSource, PrometheusSourceConfig,
};
pub use store::RunStore;
