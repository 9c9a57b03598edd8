//! Statistics reported by the broadcast transport

pub mod metrics;

pub use metrics::StreamStatistics;
