//! Retry schedule sampling
//!
//! A planner validates the retry configuration once and then samples a
//! fresh sleep schedule per cold read. Invalid parameters never fail
//! construction; they log a warning and degrade to no retries.

use std::time::{Duration, Instant};

use crate::cache::config::types::RetryConfig;

use super::types::RetryStrategyKind;

/// Validated sampler of per-read retry schedules
pub(crate) struct RetryPlanner {
    timeout: Duration,
    max_retries: u32,
    strategy: RetryStrategyKind,
    factor: f64,
}

impl RetryPlanner {
    /// Validate `config`, degrading to `NoRetry` on violations
    pub(crate) fn validated(config: &RetryConfig) -> Self {
        let mut strategy = config.strategy;

        if config.timeout_ms < 1 {
            log::warn!(
                "retry timeout of {}ms is below the 1ms minimum, disabling retries",
                config.timeout_ms
            );
            strategy = RetryStrategyKind::NoRetry;
        }
        match config.strategy {
            RetryStrategyKind::FlatGeometricIntervals if config.factor <= 0.0 => {
                log::warn!(
                    "geometric retry factor {} must be positive, disabling retries",
                    config.factor
                );
                strategy = RetryStrategyKind::NoRetry;
            }
            RetryStrategyKind::BinomialEvenIntervals
                if config.factor < 0.0 || config.factor > config.max_retries as f64 =>
            {
                log::warn!(
                    "binomial retry factor {} outside [0, {}], disabling retries",
                    config.factor,
                    config.max_retries
                );
                strategy = RetryStrategyKind::NoRetry;
            }
            _ => {}
        }

        Self {
            timeout: Duration::from_millis(config.timeout_ms),
            max_retries: config.max_retries,
            strategy,
            factor: config.factor,
        }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sample the sleep schedule for one cold read
    ///
    /// The schedule's sum never exceeds the timeout; `adjust_interval`
    /// additionally charges actual elapsed time against the budget.
    pub(crate) fn plan(&self) -> Vec<Duration> {
        let n = self.max_retries;
        if n == 0 || self.strategy == RetryStrategyKind::NoRetry {
            return Vec::new();
        }
        let step = self.timeout.div_f64(n as f64);

        match self.strategy {
            RetryStrategyKind::NoRetry => Vec::new(),
            RetryStrategyKind::FlatEvenIntervals => {
                let k = ((rand::random::<f64>() * (n + 1) as f64) as u32).min(n);
                vec![step; k as usize]
            }
            RetryStrategyKind::FlatGeometricIntervals => {
                // One uniform draw scales the whole geometric schedule,
                // so a caller's total window is uniform over the budget
                let scale = 1.0 - rand::random::<f64>();
                self.geometric_intervals()
                    .into_iter()
                    .map(|interval| interval.mul_f64(scale))
                    .collect()
            }
            RetryStrategyKind::FlatRandomIntervals => {
                let sub_step = step.mul_f64(rand::random::<f64>());
                vec![sub_step; n as usize]
            }
            RetryStrategyKind::NormalRandomIntervals => (0..n)
                .map(|_| step.mul_f64(rand::random::<f64>()))
                .collect(),
            RetryStrategyKind::DeltaEvenIntervals => vec![step; n as usize],
            RetryStrategyKind::BinomialEvenIntervals => {
                let p = self.factor / n as f64;
                (0..n)
                    .filter(|_| rand::random::<f64>() < p)
                    .map(|_| step)
                    .collect()
            }
        }
    }

    /// Intervals growing by `factor`, summing to the full timeout
    ///
    /// The closed form puts a `(factor-1)/factor` share of the budget in
    /// the last interval; a factor of one degenerates to even steps.
    fn geometric_intervals(&self) -> Vec<Duration> {
        let n = self.max_retries;
        let f = self.factor;
        if (f - 1.0).abs() < f64::EPSILON {
            return vec![self.timeout.div_f64(n as f64); n as usize];
        }
        let norm = (f - 1.0) / (f.powi(n as i32) - 1.0);
        (0..n)
            .map(|j| self.timeout.mul_f64(norm * f.powi(j as i32)))
            .collect()
    }
}

/// Shrink the next planned sleep so the total stays inside the budget
///
/// Returns `None` when the budget is already overdrawn; the caller aborts
/// the retry loop and logs a configuration warning.
pub(crate) fn adjust_interval(
    next: Duration,
    started: Instant,
    timeout: Duration,
) -> Option<Duration> {
    let remaining = timeout.checked_sub(started.elapsed())?;
    Some(next.min(remaining))
}
