//! Summary statistics attached to freshly computed historical payloads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesStats {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    /// Least-squares slope per step; positive means the series is rising.
    pub trend_slope: f64,
}

impl SeriesStats {
    /// Compute statistics over the finite values of a series. Returns
    /// `None` when nothing finite remains.
    pub fn compute(values: &[f64]) -> Option<Self> {
        let clean: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if clean.is_empty() {
            return None;
        }
        let n = clean.len();
        let mean = clean.iter().sum::<f64>() / n as f64;

        let mut sorted = clean.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite values compare"));
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        let std_dev = if n > 1 {
            let ss: f64 = clean.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1) as f64).sqrt()
        } else {
            0.0
        };

        let trend_slope = if n > 1 {
            // Slope of the least-squares line over index 0..n.
            let x_mean = (n - 1) as f64 / 2.0;
            let mut num = 0.0;
            let mut den = 0.0;
            for (i, v) in clean.iter().enumerate() {
                let dx = i as f64 - x_mean;
                num += dx * (v - mean);
                den += dx * dx;
            }
            num / den
        } else {
            0.0
        };

        Some(Self {
            mean,
            median,
            std_dev,
            min: sorted[0],
            max: sorted[n - 1],
            count: n,
            trend_slope,
        })
    }
}
