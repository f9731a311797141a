use chrono::Duration;
use clap::ValueEnum;

use super::model::{SeriesError, TimeSeries};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// What to do with interior gaps after resampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GapFill {
    /// Remove gap points; the cleaned series may become non-uniform.
    Drop,
    /// Linearly interpolate between the neighbouring samples.
    Interpolate,
}

/// Detrending method applied after gap handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Detrend {
    None,
    /// Subtract the series mean.
    Mean,
    /// Subtract an ordinary-least-squares line.
    Linear,
}

/// Preprocessing options: resampling interval, gap policy, detrending.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
    pub interval: Duration,
    pub gap_fill: GapFill,
    pub detrend: Detrend,
}

/// Failures the preprocessor can report.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("channel '{0}' is empty")]
    Empty(String),
    #[error("resampling interval must be positive")]
    NonPositiveInterval,
    #[error("channel '{0}' contains no valid samples after resampling")]
    AllGaps(String),
    #[error(transparent)]
    Series(#[from] SeriesError),
}

// ---------------------------------------------------------------------------
// Pipeline stage
// ---------------------------------------------------------------------------

/// Clean a raw series: resample to a uniform grid, trim leading/trailing
/// gaps, apply the gap policy to interior gaps, then detrend.
///
/// Resampling snaps each sample to the nearest grid point (grid anchored at
/// the first timestamp); grid cells holding several samples take their
/// mean. A series already uniform at `interval` resamples to itself.
/// Leading and trailing gaps are always trimmed, never imputed.
pub fn preprocess(
    series: &TimeSeries,
    opts: &PreprocessOptions,
) -> Result<TimeSeries, PreprocessError> {
    if series.is_empty() {
        return Err(PreprocessError::Empty(series.name.clone()));
    }
    let step_ms = opts.interval.num_milliseconds();
    if step_ms <= 0 {
        return Err(PreprocessError::NonPositiveInterval);
    }

    // ---- Bin samples onto the uniform grid ----
    let t0 = series.timestamps[0];
    let span_ms = (series.timestamps[series.len() - 1] - t0).num_milliseconds();
    // Nearest-grid-point snapping can round the last sample up a bin.
    let n_bins = ((span_ms + step_ms / 2) / step_ms) as usize + 1;

    let mut sums = vec![0.0_f64; n_bins];
    let mut counts = vec![0_u32; n_bins];
    for (ts, &v) in series.timestamps.iter().zip(&series.values) {
        if v.is_nan() {
            continue;
        }
        let offset_ms = (*ts - t0).num_milliseconds();
        let bin = ((offset_ms + step_ms / 2) / step_ms) as usize;
        if bin < n_bins {
            sums[bin] += v;
            counts[bin] += 1;
        }
    }

    let mut grid: Vec<f64> = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| if c == 0 { f64::NAN } else { s / c as f64 })
        .collect();

    // ---- Trim leading/trailing gaps ----
    let first = grid.iter().position(|v| !v.is_nan());
    let Some(first) = first else {
        return Err(PreprocessError::AllGaps(series.name.clone()));
    };
    let last = grid.iter().rposition(|v| !v.is_nan()).unwrap();
    grid.truncate(last + 1);
    grid.drain(..first);
    let grid_start = t0 + Duration::milliseconds(first as i64 * step_ms);

    // ---- Interior gap policy ----
    let (timestamps, mut values) = match opts.gap_fill {
        GapFill::Interpolate => {
            interpolate_gaps(&mut grid);
            let timestamps = (0..grid.len())
                .map(|i| grid_start + Duration::milliseconds(i as i64 * step_ms))
                .collect();
            (timestamps, grid)
        }
        GapFill::Drop => {
            let mut timestamps = Vec::with_capacity(grid.len());
            let mut values = Vec::with_capacity(grid.len());
            for (i, &v) in grid.iter().enumerate() {
                if !v.is_nan() {
                    timestamps.push(grid_start + Duration::milliseconds(i as i64 * step_ms));
                    values.push(v);
                }
            }
            (timestamps, values)
        }
    };

    // ---- Detrend ----
    match opts.detrend {
        Detrend::None => {}
        Detrend::Mean => {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            for v in &mut values {
                *v -= mean;
            }
        }
        Detrend::Linear => {
            let t0 = timestamps[0];
            let xs: Vec<f64> = timestamps
                .iter()
                .map(|t| (*t - t0).num_milliseconds() as f64 / 3_600_000.0)
                .collect();
            let (slope, intercept) = least_squares_line(&xs, &values);
            for (v, x) in values.iter_mut().zip(&xs) {
                *v -= slope * x + intercept;
            }
        }
    }

    Ok(TimeSeries::try_new(series.name.clone(), timestamps, values)?)
}

/// Fill interior NaN runs by linear interpolation between their
/// non-NaN neighbours. Assumes the slice starts and ends on valid values.
fn interpolate_gaps(values: &mut [f64]) {
    let mut i = 0;
    while i < values.len() {
        if !values[i].is_nan() {
            i += 1;
            continue;
        }
        let left = i - 1;
        let mut right = i;
        while values[right].is_nan() {
            right += 1;
        }
        let run = (right - left) as f64;
        let (a, b) = (values[left], values[right]);
        for j in (left + 1)..right {
            let frac = (j - left) as f64 / run;
            values[j] = a + (b - a) * frac;
        }
        i = right + 1;
    }
}

/// OLS fit of `y = slope * x + intercept`.
fn least_squares_line(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        num += (x - mean_x) * (y - mean_y);
        den += (x - mean_x) * (x - mean_x);
    }
    if den == 0.0 {
        (0.0, mean_y)
    } else {
        (num / den, mean_y - num / den * mean_x)
    }
}
