pub mod analyze;
pub mod metrics;
pub mod webhook;
