// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Exponential backoff shared by the key fetcher and the log shipper's
//! connect loop.
//!
//! Only [`UplinkError::NotReady`] is retried: a 401 from the control
//! plane means the workspace session has not finished building yet, and
//! there is no upper bound on how long that may take. The per-step delay
//! is capped at one minute and the loop runs until the caller's
//! cancellation token fires.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::UplinkError;

const INITIAL_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(60);
const FACTOR: f64 = 2.0;

/// Exponential backoff schedule with ±50% jitter and a capped step.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    factor: f64,
    jitter: bool,
    attempt: u32,
}

impl Backoff {
    /// The schedule used while a remote dependency is not yet ready:
    /// 500ms base, doubling, capped at one minute, unbounded attempts.
    pub fn not_ready() -> Self {
        Self {
            base: INITIAL_DELAY,
            max: MAX_DELAY,
            factor: FACTOR,
            jitter: true,
            attempt: 0,
        }
    }

    #[cfg(test)]
    fn without_jitter(base: Duration, max: Duration, factor: f64) -> Self {
        Self {
            base,
            max,
            factor,
            jitter: false,
            attempt: 0,
        }
    }

    /// Delay before the next attempt. Advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let pow = self.factor.powi(self.attempt.min(24) as i32);
        let raw = self.base.as_millis() as f64 * pow;
        let capped = raw.min(self.max.as_millis() as f64) as u64;
        self.attempt = self.attempt.saturating_add(1);
        if !self.jitter {
            return Duration::from_millis(capped);
        }
        // ±50% jitter
        let low = capped / 2;
        let high = capped.saturating_add(capped / 2);
        if low >= high {
            Duration::from_millis(capped)
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(low..=high))
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or `cancel` fires.
///
/// `NotReady` results are absorbed into the backoff schedule; any other
/// error returns immediately. Cancellation mid-sleep returns
/// [`UplinkError::Cancelled`] promptly.
pub async fn retry_not_ready<T, F, Fut>(
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, UplinkError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UplinkError>>,
{
    let mut backoff = Backoff::not_ready();
    loop {
        if cancel.is_cancelled() {
            return Err(UplinkError::Cancelled);
        }
        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UplinkError::Cancelled),
            res = op() => res,
        };
        match attempt {
            Ok(value) => return Ok(value),
            Err(err) if err.is_not_ready() => {
                let delay = backoff.next_delay();
                tracing::info!(
                    delay_ms = delay.as_millis() as u64,
                    "remote not ready yet, backing off"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(UplinkError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}
