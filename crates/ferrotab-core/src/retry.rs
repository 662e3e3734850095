//! Backoff schedule between request attempts.

use std::time::Duration;

/// Wait inserted before each retry of a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed { delay: Duration },
    /// `unit * factor^attempt`, capped at `max`. With the defaults the first retry
    /// waits 2s, the second 4s.
    Exponential {
        unit: Duration,
        factor: f64,
        max: Duration,
        /// Spread each wait uniformly over 50%..150% of its nominal value.
        jitter: bool,
    },
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Exponential {
            unit: Duration::from_secs(1),
            factor: 2.0,
            max: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl Backoff {
    /// Never waits. Retry tests use it to stay instant.
    pub const fn none() -> Self {
        Self::Fixed {
            delay: Duration::ZERO,
        }
    }

    /// Wait before `attempt`, counted from 0 for the first call, which never waits.
    pub fn delay(self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        match self {
            Self::Fixed { delay } => delay,
            Self::Exponential {
                unit,
                factor,
                max,
                jitter,
            } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let nominal = (unit.as_secs_f64() * factor.powi(exponent)).min(max.as_secs_f64());
                if jitter {
                    Duration::from_secs_f64(nominal * (0.5 + fastrand::f64()))
                } else {
                    Duration::from_secs_f64(nominal)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_attempt_never_waits() {
        assert_eq!(Backoff::default().delay(0), Duration::ZERO);
        assert_eq!(
            Backoff::Fixed {
                delay: Duration::from_secs(5)
            }
            .delay(0),
            Duration::ZERO
        );
    }

    #[test]
    fn default_backoff_is_powers_of_two_seconds() {
        let backoff = Backoff::default();

        assert_eq!(backoff.delay(1), Duration::from_secs(2));
        assert_eq!(backoff.delay(2), Duration::from_secs(4));
        assert_eq!(backoff.delay(3), Duration::from_secs(8));
        assert_eq!(backoff.delay(10), Duration::from_secs(30)); // capped
    }

    #[test]
    fn fixed_backoff() {
        let backoff = Backoff::Fixed {
            delay: Duration::from_millis(100),
        };

        assert_eq!(backoff.delay(1), Duration::from_millis(100));
        assert_eq!(backoff.delay(10), Duration::from_millis(100));
        assert_eq!(Backoff::none().delay(3), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_half_of_the_delay() {
        let backoff = Backoff::Exponential {
            unit: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: true,
        };

        for _ in 0..10 {
            for attempt in 1..5 {
                let expected = (100.0 * 2_f64.powi(attempt as i32)).min(1000.0);
                let delay_ms = backoff.delay(attempt).as_millis() as f64;

                assert!(delay_ms >= expected * 0.49, "attempt={attempt}, delay_ms={delay_ms}");
                assert!(delay_ms <= expected * 1.51, "attempt={attempt}, delay_ms={delay_ms}");
            }
        }
    }
}
