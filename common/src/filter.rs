use tracing::warn;

use crate::{capabilities::Sensor, types::Reading};

/// Reduces a batch of raw samples to one representative value.
///
/// Batches of fewer than three samples return their plain mean (0 when
/// empty). Larger batches drop exactly one minimum and one maximum before
/// averaging, then round to `decimals` places.
pub fn trimmed_mean(samples: &[f32], decimals: u32) -> f32 {
    if samples.len() < 3 {
        if samples.is_empty() {
            return 0.0;
        }
        return samples.iter().sum::<f32>() / samples.len() as f32;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_by(f32::total_cmp);

    let inner = &sorted[1..sorted.len() - 1];
    let mean = inner.iter().sum::<f32>() / inner.len() as f32;
    round_to(mean, decimals)
}

fn round_to(value: f32, decimals: u32) -> f32 {
    let scale = 10_f32.powi(decimals as i32);
    (value * scale).round() / scale
}

#[derive(Debug, Clone)]
pub struct RawSample {
    values: Vec<f32>,
    capacity: usize,
}

impl RawSample {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn push(&mut self, value: f32) -> bool {
        if self.values.len() >= self.capacity {
            return false;
        }
        self.values.push(value);
        true
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub fn sample_burst(sensor: &mut dyn Sensor, buffer: &mut RawSample, decimals: u32) -> Reading {
    buffer.clear();
    while buffer.len() < buffer.capacity {
        match sensor.sample() {
            Ok(value) if value.is_finite() => {
                buffer.push(value);
            }
            Ok(value) => {
                warn!("{} returned non-finite sample {value}", sensor.name());
                return Reading::Failed;
            }
            Err(err) => {
                warn!("{} burst failed: {err}", sensor.name());
                return Reading::Failed;
            }
        }
    }
    Reading::Value(trimmed_mean(buffer.as_slice(), decimals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;

    struct Scripted {
        values: Vec<Result<f32, SensorError>>,
        calls: usize,
    }

    impl Sensor for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn sample(&mut self) -> Result<f32, SensorError> {
            let value = self.values[self.calls % self.values.len()].clone();
            self.calls += 1;
            value
        }
    }

    #[test]
    fn small_batches_return_plain_mean() {
        assert_eq!(trimmed_mean(&[], 0), 0.0);
        assert_eq!(trimmed_mean(&[7.0], 0), 7.0);
        assert_eq!(trimmed_mean(&[1.0, 2.0], 0), 1.5);
    }

    #[test]
    fn drops_one_min_and_one_max() {
        assert_eq!(trimmed_mean(&[100.0, 20.0, 21.0, 22.0, -50.0], 0), 21.0);
        assert_eq!(trimmed_mean(&[5.0, 1.0, 9.0], 0), 5.0);
    }

    #[test]
    fn duplicate_extremes_are_dropped_only_once() {
        // Without the second 0 and 10 the mean would be exactly 5.
        assert_eq!(trimmed_mean(&[0.0, 0.0, 5.0, 10.0, 10.0], 2), 5.0);
        assert_eq!(trimmed_mean(&[0.0, 0.0, 6.0, 10.0], 2), 3.0);
    }

    #[test]
    fn rounds_to_requested_precision() {
        assert_eq!(trimmed_mean(&[0.0, 21.0, 22.0, 99.0], 0), 22.0);
        assert_eq!(trimmed_mean(&[0.0, 21.0, 22.0, 99.0], 1), 21.5);
    }

    #[test]
    fn input_slice_is_left_untouched() {
        let samples = [3.0, 1.0, 2.0, 5.0];
        let _ = trimmed_mean(&samples, 0);
        assert_eq!(samples, [3.0, 1.0, 2.0, 5.0]);
    }

    #[test]
    fn raw_sample_is_bounded() {
        let mut buffer = RawSample::with_capacity(2);
        assert!(buffer.push(1.0));
        assert!(buffer.push(2.0));
        assert!(!buffer.push(3.0));
        assert_eq!(buffer.as_slice(), &[1.0, 2.0]);

        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn burst_filters_spikes() {
        let mut sensor = Scripted {
            values: vec![Ok(20.0), Ok(21.0), Ok(80.0), Ok(20.0), Ok(-10.0)],
            calls: 0,
        };
        let mut buffer = RawSample::with_capacity(5);

        assert_eq!(sample_burst(&mut sensor, &mut buffer, 0), Reading::Value(20.0));
        assert_eq!(sensor.calls, 5);
    }

    #[test]
    fn burst_fails_on_first_driver_error() {
        let mut sensor = Scripted {
            values: vec![
                Ok(20.0),
                Err(SensorError::NoResponse("bus timeout".to_string())),
            ],
            calls: 0,
        };
        let mut buffer = RawSample::with_capacity(10);

        assert_eq!(sample_burst(&mut sensor, &mut buffer, 0), Reading::Failed);
        assert_eq!(sensor.calls, 2);
    }
}
