//! Caching primitives shared by the shaping and rendering layers.

mod freshness;

pub use freshness::FreshnessCache;
