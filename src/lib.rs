// toxguard: resilient toxicity moderation relay
//
// This is the library root. Each module corresponds to one piece of the
// relay: intake, the breaker-guarded scoring call, the verdict, alerting,
// and the HTTP surfaces of the relay and the scoring service.

pub mod config;
pub mod error;
pub mod metrics;
pub mod moderation;
pub mod output;
pub mod resilience;
pub mod scoring;
pub mod telegram;
pub mod toxicity;
pub mod web;
