// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Where the uniform `[0, 1)` sample behind each jittered expiry comes from.
#[derive(Debug, Clone, Copy, Default)]
enum Sample {
    #[default]
    Random,
    #[cfg(test)]
    Fixed(f64),
}

impl Sample {
    fn next(self) -> f64 {
        match self {
            Self::Random => fastrand::f64(),
            #[cfg(test)]
            Self::Fixed(value) => value,
        }
    }
}

/// Spreads expiries uniformly around a base so that entries written together do not all
/// expire together.
///
/// The result lies in `[base * (1 - deviation), base * (1 + deviation)]`.
#[derive(Debug, Clone)]
pub(crate) struct Jitter {
    deviation: f64,
    sample: Sample,
}

impl Jitter {
    pub fn new(deviation: f64) -> Self {
        let deviation = if deviation.is_nan() { 0.0 } else { deviation.clamp(0.0, 1.0) };
        Self {
            deviation,
            sample: Sample::default(),
        }
    }

    #[cfg(test)]
    pub fn fixed(mut self, sample: f64) -> Self {
        self.sample = Sample::Fixed(sample);
        self
    }

    pub fn apply(&self, base: Duration) -> Duration {
        if self.deviation <= 0.0 {
            return base;
        }

        let d = self.deviation;
        let factor = (2.0 * d).mul_add(-self.sample.next(), 1.0 + d);
        secs_to_duration_saturating(base.as_secs_f64() * factor)
    }
}

fn secs_to_duration_saturating(secs: f64) -> Duration {
    if secs <= 0.0 {
        return Duration::ZERO;
    }

    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
