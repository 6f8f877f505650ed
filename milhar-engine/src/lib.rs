pub mod aggregator;
pub mod analysis;
pub mod config;
pub mod generator;
pub mod projections;
pub mod sampler;
pub mod snapshot;
