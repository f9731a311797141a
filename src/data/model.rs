use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Serialize;

// ---------------------------------------------------------------------------
// TimeSeries – one measurement channel
// ---------------------------------------------------------------------------

/// A single measurement channel: parallel timestamp and value vectors.
///
/// Invariant: timestamps are strictly increasing and `timestamps.len() ==
/// values.len()`. Gaps are represented as NaN values until preprocessing
/// resolves them.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    /// Channel name (source column header).
    pub name: String,
    /// Sample timestamps, strictly increasing. Local time, no timezone.
    pub timestamps: Vec<NaiveDateTime>,
    /// Sample values – same length as `timestamps`. NaN marks a gap.
    pub values: Vec<f64>,
}

impl TimeSeries {
    /// Build a series, checking the length and ordering invariants.
    pub fn try_new(
        name: impl Into<String>,
        timestamps: Vec<NaiveDateTime>,
        values: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        let name = name.into();
        if timestamps.len() != values.len() {
            return Err(SeriesError::LengthMismatch {
                name,
                timestamps: timestamps.len(),
                values: values.len(),
            });
        }
        for (i, pair) in timestamps.windows(2).enumerate() {
            if pair[1] <= pair[0] {
                return Err(SeriesError::NotIncreasing {
                    name,
                    row: i + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }
        Ok(TimeSeries {
            name,
            timestamps,
            values,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Spacing between the first two samples, if any.
    pub fn first_step(&self) -> Option<Duration> {
        match self.timestamps.as_slice() {
            [a, b, ..] => Some(*b - *a),
            _ => None,
        }
    }

    /// Whether all samples sit on a uniform grid with the given step.
    pub fn is_uniform(&self, step: Duration) -> bool {
        self.timestamps.windows(2).all(|w| w[1] - w[0] == step)
    }

    /// Number of NaN samples.
    pub fn gap_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }
}

/// Invariant violations when constructing a [`TimeSeries`].
#[derive(Debug, thiserror::Error)]
pub enum SeriesError {
    #[error("channel '{name}': {timestamps} timestamps but {values} values")]
    LengthMismatch {
        name: String,
        timestamps: usize,
        values: usize,
    },
    #[error("channel '{name}': timestamp at row {row} ({current}) not after previous ({previous})")]
    NotIncreasing {
        name: String,
        row: usize,
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },
}

// ---------------------------------------------------------------------------
// SensorDataset – all channels loaded from one file
// ---------------------------------------------------------------------------

/// The full parsed dataset: one [`TimeSeries`] per measurement column,
/// all sharing the same timestamp axis.
#[derive(Debug, Clone)]
pub struct SensorDataset {
    pub channels: Vec<TimeSeries>,
}

impl SensorDataset {
    /// Look up a channel by its column name.
    pub fn channel(&self, name: &str) -> Option<&TimeSeries> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    /// Number of rows (samples per channel).
    pub fn len(&self) -> usize {
        self.channels.first().map_or(0, |c| c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// TimeFrequencyMap – wavelet power over (scale, time)
// ---------------------------------------------------------------------------

/// Wavelet power map: row-major `periods.len() × timestamps.len()` matrix.
/// Row `s` holds the power of scale `s` (period `periods_hours[s]`) over
/// time. `coi_hours[t]` is the cone-of-influence period at time `t`; power
/// at periods above it is edge-contaminated.
#[derive(Debug, Clone)]
pub struct TimeFrequencyMap {
    pub timestamps: Vec<NaiveDateTime>,
    pub periods_hours: Vec<f64>,
    pub power: Vec<f64>,
    pub coi_hours: Vec<f64>,
}

impl TimeFrequencyMap {
    pub fn n_scales(&self) -> usize {
        self.periods_hours.len()
    }

    pub fn n_times(&self) -> usize {
        self.timestamps.len()
    }

    /// Power at (scale row, time column).
    pub fn at(&self, scale: usize, time: usize) -> f64 {
        self.power[scale * self.n_times() + time]
    }

    /// Scale row with the highest total power.
    pub fn dominant_scale(&self) -> Option<usize> {
        let n_times = self.n_times();
        if n_times == 0 {
            return None;
        }
        (0..self.n_scales()).max_by(|&a, &b| {
            let pa: f64 = self.power[a * n_times..(a + 1) * n_times].iter().sum();
            let pb: f64 = self.power[b * n_times..(b + 1) * n_times].iter().sum();
            pa.total_cmp(&pb)
        })
    }
}

// ---------------------------------------------------------------------------
// ModelEvaluation – one fitted chill model, ready for ranking
// ---------------------------------------------------------------------------

/// Best-fit result of one candidate chill model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelEvaluation {
    /// Model name as reported to the operator.
    pub model: String,
    /// Fitted parameters (requirement threshold, base temperature, ...).
    pub params: BTreeMap<String, f64>,
    /// Predicted dormancy-release date per season, in season order.
    pub predicted: Vec<NaiveDate>,
    /// RMSE between predicted and observed release dates, in days.
    /// None when the model failed to fit.
    pub score_days: Option<f64>,
    /// Human-readable failure report when the fit did not converge.
    pub failure: Option<String>,
}

impl ModelEvaluation {
    pub fn failed(model: impl Into<String>, reason: impl Into<String>) -> Self {
        ModelEvaluation {
            model: model.into(),
            params: BTreeMap::new(),
            predicted: Vec::new(),
            score_days: None,
            failure: Some(reason.into()),
        }
    }
}

/// The comparator's full output: observed targets plus the ranked fits.
#[derive(Debug, Clone, Serialize)]
pub struct FitSummary {
    /// Observed dormancy-release dates the models were fitted against.
    pub observed: Vec<NaiveDate>,
    /// Whether `observed` came from annotations or was derived from the
    /// fluorescence channel.
    pub observed_source: String,
    /// Evaluations sorted best-first; failed models sort last.
    pub ranking: Vec<ModelEvaluation>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn rejects_non_increasing_timestamps() {
        let err = TimeSeries::try_new("f", vec![ts(1, 0), ts(1, 0)], vec![1.0, 2.0]);
        assert!(matches!(err, Err(SeriesError::NotIncreasing { row: 1, .. })));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = TimeSeries::try_new("f", vec![ts(1, 0)], vec![1.0, 2.0]);
        assert!(matches!(err, Err(SeriesError::LengthMismatch { .. })));
    }

    #[test]
    fn uniformity_and_step() {
        let s = TimeSeries::try_new("f", vec![ts(1, 0), ts(1, 1), ts(1, 2)], vec![0.0; 3])
            .unwrap();
        let step = s.first_step().unwrap();
        assert_eq!(step, chrono::Duration::hours(1));
        assert!(s.is_uniform(step));
    }

    #[test]
    fn dominant_scale_picks_strongest_row() {
        let map = TimeFrequencyMap {
            timestamps: vec![ts(1, 0), ts(1, 1)],
            periods_hours: vec![6.0, 24.0],
            power: vec![0.1, 0.2, 5.0, 4.0],
            coi_hours: vec![0.0, 0.0],
        };
        assert_eq!(map.dominant_scale(), Some(1));
    }
}
