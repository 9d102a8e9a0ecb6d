//! Sleeps and timeouts, scaled by one pace factor.
//!
//! Every fixed delay in the automation is written in seconds at pace 1.0.
//! Slow devices run at a higher pace; tests run at 0, which turns sleeps into
//! no-ops and timeouts into single attempts.

use crate::driver::AutomationDriver;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const SLOW_RESPONSE: Duration = Duration::from_millis(500);
const NORMAL_RESPONSE: Duration = Duration::from_millis(200);
const FAST_DEVICE_FLOOR_SECS: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    scale: f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

impl Pacing {
    /// Negative and non-finite factors are treated as 0.
    pub fn new(scale: f64) -> Self {
        let scale = if scale.is_finite() && scale > 0.0 { scale } else { 0.0 };
        Self { scale }
    }

    /// No sleeping, single-attempt timeouts.
    pub fn immediate() -> Self {
        Self { scale: 0.0 }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Saturates at `Duration::MAX` instead of overflowing.
    pub fn duration(&self, secs: f64) -> Duration {
        Duration::try_from_secs_f64((secs * self.scale).max(0.0)).unwrap_or(Duration::MAX)
    }

    pub async fn pause(&self, secs: f64) {
        let d = self.duration(secs);
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }

    /// Pick a delay from how quickly the device answers a cheap command,
    /// sleep for it, and return what was slept (unscaled seconds).
    pub async fn adaptive_wait(&self, driver: &dyn AutomationDriver, base: f64, max: f64) -> f64 {
        let started = Instant::now();
        let delay = match driver.window_size().await {
            Ok(_) => {
                let delay = adaptive_delay(started.elapsed(), base, max);
                debug!(
                    "Device answered in {:.2}s, waiting {:.1}s",
                    started.elapsed().as_secs_f64(),
                    delay
                );
                delay
            }
            Err(e) => {
                debug!("Responsiveness check failed ({}), using base delay {}s", e, base);
                base
            }
        };
        self.pause(delay).await;
        delay
    }
}

/// The delay `adaptive_wait` uses for a given window-size round-trip.
pub fn adaptive_delay(response: Duration, base: f64, max: f64) -> f64 {
    if response > SLOW_RESPONSE {
        (base * 1.5).min(max)
    } else if response > NORMAL_RESPONSE {
        base
    } else {
        (base * 0.7).max(FAST_DEVICE_FLOOR_SECS)
    }
}
