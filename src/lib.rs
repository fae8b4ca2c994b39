//! Validation and partitioning of land-plot datasets for deforestation
//! compliance checks.
//!
//! Each GeoJSON dataset is gated on its CRS, then every feature is routed
//! into one of three stores: valid, needs review, or candidate for
//! conversion to a point. Candidates can later be converted in place with
//! [`ConversionEngine`].

pub mod area;
pub mod attributes;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod conversion;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod io;
pub mod layout;
pub mod partitioner;
pub mod report;
pub mod trace;

pub use batch::{consolidate_valid, BatchReport, BatchRunner, Progress};
pub use config::PartitionConfig;
pub use conversion::{ConversionEngine, ConversionResult};
pub use dataset::{Dataset, Feature, Provenance};
pub use error::{Error, Result};
pub use layout::OutputLayout;
pub use partitioner::{partition, FeatureSink, FeatureStore, PartitionResult};
