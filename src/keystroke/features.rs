//! Keystroke timing feature extraction
//!
//! Two views of a sample are extracted:
//! - per-key hold times and per-digraph flight times, used for template matching
//! - a fixed-length aggregate vector, used by the outlier detector

use std::collections::BTreeMap;

use crate::keystroke::types::KeystrokeSample;

/// Length of the aggregate feature vector
pub const AGGREGATE_DIM: usize = 11;

/// Names of the aggregate dimensions, in vector order
pub const AGGREGATE_NAMES: [&str; AGGREGATE_DIM] = [
    "hold_mean",
    "hold_std",
    "hold_p25",
    "hold_p75",
    "flight_mean",
    "flight_std",
    "flight_p25",
    "flight_p75",
    "key_count",
    "duration_sec",
    "keys_per_sec",
];

/// Timing features of one sample
#[derive(Debug, Clone, PartialEq)]
pub struct TimingFeatures {
    /// Mean hold time per key (ms)
    pub holds: BTreeMap<String, f64>,
    /// Mean flight time per digraph (ms), keyed `"<from>><to>"`
    pub flights: BTreeMap<String, f64>,
    /// Aggregate vector (see `AGGREGATE_NAMES`)
    pub aggregate: [f64; AGGREGATE_DIM],
}

/// Feature extractor for keystroke samples
pub struct TimingFeatureExtractor;

impl TimingFeatureExtractor {
    /// Extract features from a validated sample
    pub fn extract(sample: &KeystrokeSample) -> TimingFeatures {
        let events = sample.by_press_time();

        let mut hold_acc: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut hold_all = Vec::with_capacity(events.len());
        for event in &events {
            let hold = event.hold_ms();
            hold_acc.entry(event.key.clone()).or_default().push(hold);
            hold_all.push(hold);
        }

        let mut flight_acc: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        let mut flight_all = Vec::with_capacity(events.len().saturating_sub(1));
        for pair in events.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            let flight = to.press_ms - from.release_ms;
            flight_acc
                .entry(digraph_key(&from.key, &to.key))
                .or_default()
                .push(flight);
            flight_all.push(flight);
        }

        let duration_sec = match (events.first(), events.last()) {
            (Some(first), Some(last)) => (last.press_ms - first.press_ms) / 1000.0,
            _ => 0.0,
        };
        let key_count = events.len() as f64;
        let keys_per_sec = if duration_sec > 0.0 {
            key_count / duration_sec
        } else {
            0.0
        };

        let [hm, hs, h25, h75] = summarize(&hold_all);
        let [fm, fs, f25, f75] = summarize(&flight_all);

        TimingFeatures {
            holds: average_groups(hold_acc),
            flights: average_groups(flight_acc),
            aggregate: [
                hm,
                hs,
                h25,
                h75,
                fm,
                fs,
                f25,
                f75,
                key_count,
                duration_sec,
                keys_per_sec,
            ],
        }
    }
}

/// Key for a digraph feature
pub fn digraph_key(from: &str, to: &str) -> String {
    format!("{}>{}", from, to)
}

fn average_groups(groups: BTreeMap<String, Vec<f64>>) -> BTreeMap<String, f64> {
    groups
        .into_iter()
        .map(|(key, values)| {
            let mean = mean(&values);
            (key, mean)
        })
        .collect()
}

/// Mean, population std, 25th and 75th percentile (all 0 for empty input)
fn summarize(values: &[f64]) -> [f64; 4] {
    if values.is_empty() {
        return [0.0; 4];
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    [
        mean(values),
        population_std(values),
        percentile(&sorted, 0.25),
        percentile(&sorted, 0.75),
    ]
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolated percentile of sorted values, `q` in [0, 1]
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let pos = q * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            let frac = pos - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystroke::types::KeystrokeEvent;

    fn sample() -> KeystrokeSample {
        // "abab": holds 80, 100, 80, 100; flights a>b 40, b>a 20, a>b 60
        KeystrokeSample::new(vec![
            KeystrokeEvent::new("a", 0.0, 80.0),
            KeystrokeEvent::new("b", 120.0, 220.0),
            KeystrokeEvent::new("a", 240.0, 320.0),
            KeystrokeEvent::new("b", 380.0, 480.0),
        ])
    }

    #[test]
    fn test_per_key_holds() {
        let features = TimingFeatureExtractor::extract(&sample());
        assert_eq!(features.holds.len(), 2);
        assert!((features.holds["a"] - 80.0).abs() < 1e-9);
        assert!((features.holds["b"] - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_digraph_flights() {
        let features = TimingFeatureExtractor::extract(&sample());
        assert_eq!(features.flights.len(), 2);
        assert!((features.flights["a>b"] - 50.0).abs() < 1e-9);
        assert!((features.flights["b>a"] - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_vector() {
        let features = TimingFeatureExtractor::extract(&sample());
        let agg = features.aggregate;

        assert!((agg[0] - 90.0).abs() < 1e-9); // hold mean
        assert!((agg[1] - 10.0).abs() < 1e-9); // hold std
        assert!((agg[4] - 40.0).abs() < 1e-9); // flight mean
        assert_eq!(agg[8], 4.0); // key count
        assert!((agg[9] - 0.38).abs() < 1e-9); // duration (s)
        assert!((agg[10] - 4.0 / 0.38).abs() < 1e-9); // keys/s
    }

    #[test]
    fn test_unsorted_input_is_ordered_by_press() {
        let mut shuffled = sample();
        shuffled.events.reverse();
        assert_eq!(
            TimingFeatureExtractor::extract(&shuffled),
            TimingFeatureExtractor::extract(&sample())
        );
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [10.0, 20.0, 30.0, 40.0];
        assert!((percentile(&sorted, 0.25) - 17.5).abs() < 1e-9);
        assert!((percentile(&sorted, 0.75) - 32.5).abs() < 1e-9);
        assert_eq!(percentile(&[5.0], 0.25), 5.0);
    }
}
