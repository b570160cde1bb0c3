// Scoring: turning category probabilities into a moderation decision.

pub mod verdict;

pub use verdict::{decide, Verdict, DEFAULT_THRESHOLD};
