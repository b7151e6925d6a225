//! Retry distribution strategy identifiers

use serde::{Deserialize, Serialize};

/// Statistical distribution of a caller's re-reads over the retry budget
///
/// The names describe the distribution of *misses* over `[0, timeout]`
/// when many callers poll a cold key: flat distributions spread them
/// evenly, delta concentrates them at the deadline, binomial and normal
/// cluster them around a configurable centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryStrategyKind {
    /// Single read, no retries
    #[serde(rename = "no_retry")]
    NoRetry,
    /// Uniform discrete number of evenly spaced retries, including zero
    #[serde(rename = "flat_even_intervals")]
    FlatEvenIntervals,
    /// Geometrically growing intervals scaled by one random draw; flat
    /// on average with a spike at the deadline
    #[serde(rename = "flat_geometric_intervals")]
    FlatGeometricIntervals,
    /// Even steps over a randomly shrunk sub-budget
    #[serde(rename = "flat_random_intervals")]
    FlatRandomIntervals,
    /// Independent uniform steps; misses approximate a normal centred at
    /// half the budget
    #[serde(rename = "normal_random_intervals")]
    NormalRandomIntervals,
    /// Always the full schedule; every miss lands at the deadline
    #[serde(rename = "delta_even_intervals")]
    DeltaEvenIntervals,
    /// Each slot attempted with probability `factor / max_retries`
    #[serde(rename = "binomial_even_intervals")]
    BinomialEvenIntervals,
}
