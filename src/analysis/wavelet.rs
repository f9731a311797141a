use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

use crate::data::model::{TimeFrequencyMap, TimeSeries};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scale range for the continuous wavelet transform, expressed as Fourier
/// periods. Scales are log-spaced between the two bounds.
#[derive(Debug, Clone)]
pub struct WaveletConfig {
    pub min_period_hours: f64,
    pub max_period_hours: f64,
    pub n_scales: usize,
    /// Morlet centre frequency. 6.0 is the usual admissibility choice.
    pub omega0: f64,
}

impl Default for WaveletConfig {
    fn default() -> Self {
        WaveletConfig {
            min_period_hours: 6.0,
            max_period_hours: 24.0 * 64.0,
            n_scales: 64,
            omega0: 6.0,
        }
    }
}

/// Failures the transformer can report.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("channel '{0}' has fewer than 4 samples")]
    TooShort(String),
    #[error("channel '{0}' is not on a uniform grid; resample it first")]
    NonUniform(String),
    #[error("channel '{0}' still contains gaps; use the interpolate gap policy")]
    GapsPresent(String),
    #[error("invalid scale range: min {min} must be positive and below max {max}")]
    BadScaleRange { min: f64, max: f64 },
    #[error("at least 2 scales required, got {0}")]
    TooFewScales(usize),
}

// ---------------------------------------------------------------------------
// Morlet CWT
// ---------------------------------------------------------------------------

/// Conversion factor between Morlet scale and Fourier period
/// (Torrence & Compo 1998, Table 1).
fn fourier_factor(omega0: f64) -> f64 {
    4.0 * PI / (omega0 + (2.0 + omega0 * omega0).sqrt())
}

/// Continuous wavelet transform of a cleaned series with a Morlet wavelet,
/// computed as one FFT of the signal plus one inverse FFT per scale.
///
/// The input must be uniform and gap-free (the preprocessing stage
/// guarantees this for the interpolate gap policy). Deterministic for
/// identical inputs.
pub fn cwt(series: &TimeSeries, cfg: &WaveletConfig) -> Result<TimeFrequencyMap, TransformError> {
    let n = series.len();
    if n < 4 {
        return Err(TransformError::TooShort(series.name.clone()));
    }
    let step = series
        .first_step()
        .ok_or_else(|| TransformError::TooShort(series.name.clone()))?;
    if !series.is_uniform(step) {
        return Err(TransformError::NonUniform(series.name.clone()));
    }
    if series.gap_count() > 0 {
        return Err(TransformError::GapsPresent(series.name.clone()));
    }
    if !(cfg.min_period_hours > 0.0 && cfg.min_period_hours < cfg.max_period_hours) {
        return Err(TransformError::BadScaleRange {
            min: cfg.min_period_hours,
            max: cfg.max_period_hours,
        });
    }
    if cfg.n_scales < 2 {
        return Err(TransformError::TooFewScales(cfg.n_scales));
    }

    let dt_hours = step.num_milliseconds() as f64 / 3_600_000.0;
    let factor = fourier_factor(cfg.omega0);

    // Log-spaced periods, min → max inclusive.
    let log_min = cfg.min_period_hours.ln();
    let log_max = cfg.max_period_hours.ln();
    let periods_hours: Vec<f64> = (0..cfg.n_scales)
        .map(|j| (log_min + (log_max - log_min) * j as f64 / (cfg.n_scales - 1) as f64).exp())
        .collect();

    // ---- Forward FFT of the signal ----
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    let ifft = planner.plan_fft_inverse(n);

    let mut spectrum: Vec<Complex<f64>> = series
        .values
        .iter()
        .map(|&v| Complex::new(v, 0.0))
        .collect();
    fft.process(&mut spectrum);

    // Angular frequency per FFT bin.
    let angular: Vec<f64> = (0..n)
        .map(|k| {
            let k_signed = if k <= n / 2 {
                k as f64
            } else {
                k as f64 - n as f64
            };
            2.0 * PI * k_signed / (n as f64 * dt_hours)
        })
        .collect();

    // ---- One inverse FFT per scale ----
    let mut power = vec![0.0_f64; cfg.n_scales * n];
    let norm_ifft = 1.0 / n as f64;
    for (j, &period) in periods_hours.iter().enumerate() {
        let scale = period / factor;
        // Daughter wavelet in the frequency domain (analytic: zero for ω ≤ 0).
        let norm = (2.0 * PI * scale / dt_hours).sqrt() * PI.powf(-0.25);
        let mut row: Vec<Complex<f64>> = spectrum
            .iter()
            .zip(&angular)
            .map(|(&x, &w)| {
                if w > 0.0 {
                    let arg = scale * w - cfg.omega0;
                    x * norm * (-0.5 * arg * arg).exp()
                } else {
                    Complex::new(0.0, 0.0)
                }
            })
            .collect();
        ifft.process(&mut row);
        for (t, c) in row.iter().enumerate() {
            power[j * n + t] = c.scale(norm_ifft).norm_sqr();
        }
    }

    // Cone of influence: the longest trustworthy period at each time is set
    // by the distance to the nearest series edge and the Morlet e-folding
    // time sqrt(2)·s.
    let coi_hours: Vec<f64> = (0..n)
        .map(|t| {
            let edge = t.min(n - 1 - t) as f64 * dt_hours;
            factor * edge / std::f64::consts::SQRT_2
        })
        .collect();

    Ok(TimeFrequencyMap {
        timestamps: series.timestamps.clone(),
        periods_hours,
        power,
        coi_hours,
    })
}
