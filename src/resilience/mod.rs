// Failure isolation for calls to the scoring service.
//
// The circuit breaker is the only state shared across concurrently processed
// messages. Each process owns its own breaker; there is no coordination
// between replicas.

pub mod circuit_breaker;

pub use circuit_breaker::{BreakerConfig, BreakerError, BreakerState, CircuitBreaker};
