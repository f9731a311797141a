//! Fit candidate chill models against observed dormancy-release dates and
//! rank them by goodness of fit.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use log::{info, warn};

use super::chill;
use crate::data::model::{ModelEvaluation, TimeSeries};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Comparator options.
#[derive(Debug, Clone)]
pub struct CompareConfig {
    /// Day of year where a dormancy season starts (accumulation reset).
    pub season_start_doy: u32,
    /// Requirement-threshold grid resolution.
    pub requirement_steps: usize,
}

impl Default for CompareConfig {
    fn default() -> Self {
        CompareConfig {
            // Oct 1 (non-leap ordinal 274).
            season_start_doy: 274,
            requirement_steps: 40,
        }
    }
}

// ---------------------------------------------------------------------------
// Observed release dates derived from the fluorescence channel
// ---------------------------------------------------------------------------

/// Derive one dormancy-release date per season from the fluorescence
/// channel: the first sustained upward crossing of the seasonal midpoint
/// after the winter minimum.
///
/// The series is smoothed with a centred moving average before the
/// midpoint scan; a crossing counts as sustained when the smoothed signal
/// stays above the midpoint for three days.
pub fn derive_release_dates(fluor: &TimeSeries, season_start_doy: u32) -> Vec<NaiveDate> {
    let smoothed = moving_average(&fluor.values, smoothing_window(fluor));
    let sustain = sustain_window(fluor);

    let mut dates = Vec::new();
    for (start, end) in season_ranges(&fluor.timestamps, season_start_doy) {
        let season = &smoothed[start..end];
        if season.len() < 2 * sustain {
            continue;
        }
        let (min_idx, min_v) = match argmin(season) {
            Some(m) => m,
            None => continue,
        };
        let max_v = season.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !(max_v > min_v) {
            continue;
        }
        let midpoint = (max_v + min_v) / 2.0;

        let mut release = None;
        for i in min_idx..season.len() {
            if season[i] >= midpoint {
                let hold_end = (i + sustain).min(season.len());
                if season[i..hold_end].iter().all(|&v| v >= midpoint) {
                    release = Some(i);
                    break;
                }
            }
        }
        if let Some(i) = release {
            dates.push(fluor.timestamps[start + i].date());
        }
    }
    dates
}

/// Seven days of samples, at least one.
fn smoothing_window(series: &TimeSeries) -> usize {
    samples_per_day(series).saturating_mul(7).max(1)
}

/// Three days of samples.
fn sustain_window(series: &TimeSeries) -> usize {
    samples_per_day(series).saturating_mul(3).max(1)
}

fn samples_per_day(series: &TimeSeries) -> usize {
    match series.first_step() {
        Some(step) if step.num_milliseconds() > 0 => {
            (86_400_000 / step.num_milliseconds()).max(1) as usize
        }
        _ => 1,
    }
}

fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(values.len());
            values[lo..hi].iter().sum::<f64>() / (hi - lo) as f64
        })
        .collect()
}

fn argmin(values: &[f64]) -> Option<(usize, f64)> {
    values
        .iter()
        .cloned()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Contiguous index ranges of the timestamp slice belonging to one season.
fn season_ranges(timestamps: &[NaiveDateTime], season_start_doy: u32) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    for i in 1..=timestamps.len() {
        let boundary = i == timestamps.len()
            || chill::season_index(&timestamps[i], season_start_doy)
                != chill::season_index(&timestamps[start], season_start_doy);
        if boundary {
            ranges.push((start, i));
            start = i;
        }
    }
    ranges
}

// ---------------------------------------------------------------------------
// Candidate catalogue
// ---------------------------------------------------------------------------

/// One parameter point of a candidate model: its fixed parameters and the
/// hourly cumulative CU curve they produce.
struct ParamPoint {
    params: BTreeMap<String, f64>,
    curve: Vec<f64>,
}

fn param_points(model: &str, temp: &TimeSeries) -> Vec<ParamPoint> {
    let fixed = |curve: Vec<f64>| {
        vec![ParamPoint {
            params: BTreeMap::new(),
            curve,
        }]
    };
    match model {
        "chilling_hours" => fixed(chill::chilling_hours(&temp.values)),
        "utah" => fixed(chill::utah(&temp.values, false)),
        "utah_classic" => fixed(chill::utah(&temp.values, true)),
        "positive_chill_units" => fixed(chill::positive_chill_units(&temp.values)),
        "low_chill" => fixed(chill::low_chill(&temp.values)),
        "north_carolina" => fixed(chill::north_carolina(&temp.values)),
        "dynamic" => fixed(chill::dynamic(&temp.values)),
        "landsberg" => (1..=10)
            .map(|b| {
                let base = b as f64;
                ParamPoint {
                    params: BTreeMap::from([("base_temp".to_string(), base)]),
                    curve: chill::landsberg(temp, base),
                }
            })
            .collect(),
        other => {
            warn!("unknown chill model '{other}' requested");
            Vec::new()
        }
    }
}

/// The full candidate list, comparator order.
pub const CANDIDATE_MODELS: &[&str] = &[
    "chilling_hours",
    "utah",
    "utah_classic",
    "positive_chill_units",
    "low_chill",
    "north_carolina",
    "landsberg",
    "dynamic",
];

// ---------------------------------------------------------------------------
// Fitting
// ---------------------------------------------------------------------------

/// Fit every candidate model against the observed release dates and return
/// the evaluations ranked best-first (failed models last).
///
/// `temp` must be the hourly-resampled temperature channel. Fitting
/// failures are reported per model and never abort the comparison.
pub fn compare_models(
    temp: &TimeSeries,
    observed: &[NaiveDate],
    cfg: &CompareConfig,
) -> Vec<ModelEvaluation> {
    let mut evaluations: Vec<ModelEvaluation> = CANDIDATE_MODELS
        .iter()
        .map(|&name| {
            let eval = fit_model(name, temp, observed, cfg);
            match (&eval.score_days, &eval.failure) {
                (Some(score), _) => {
                    info!("model {name}: RMSE {score:.2} days, params {:?}", eval.params)
                }
                (None, Some(reason)) => warn!("model {name}: fit failed: {reason}"),
                _ => {}
            }
            eval
        })
        .collect();

    evaluations.sort_by(|a, b| match (a.score_days, b.score_days) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.model.cmp(&b.model),
    });
    evaluations
}

/// Grid-search one model: every parameter point × a requirement-threshold
/// grid, scored by RMSE in days against the observed release dates.
pub fn fit_model(
    model: &str,
    temp: &TimeSeries,
    observed: &[NaiveDate],
    cfg: &CompareConfig,
) -> ModelEvaluation {
    if observed.is_empty() {
        return ModelEvaluation::failed(model, "no observed release dates to fit against");
    }

    let seasons = season_ranges(&temp.timestamps, cfg.season_start_doy);
    // Match each observed date to the season range containing it.
    let targets: Vec<(usize, usize, NaiveDate)> = observed
        .iter()
        .filter_map(|&date| {
            let noon = date.and_hms_opt(12, 0, 0).unwrap();
            let season = chill::season_index(&noon, cfg.season_start_doy);
            seasons
                .iter()
                .find(|&&(s, _)| {
                    chill::season_index(&temp.timestamps[s], cfg.season_start_doy) == season
                })
                .map(|&(s, e)| (s, e, date))
        })
        .collect();
    if targets.is_empty() {
        return ModelEvaluation::failed(model, "observed dates fall outside the temperature record");
    }

    let mut best: Option<ModelEvaluation> = None;
    for point in param_points(model, temp) {
        let reset = chill::reset_per_season(&temp.timestamps, &point.curve, cfg.season_start_doy);

        // The requirement must be reachable in every target season.
        let cap = targets
            .iter()
            .map(|&(s, e, _)| {
                reset[s..e].iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            })
            .fold(f64::INFINITY, f64::min);
        if !(cap > 0.0) {
            continue;
        }

        for step in 0..cfg.requirement_steps {
            let frac = 0.05 + 0.9 * step as f64 / (cfg.requirement_steps - 1).max(1) as f64;
            let requirement = cap * frac;

            let mut predicted = Vec::with_capacity(targets.len());
            let mut sq_sum = 0.0;
            let mut feasible = true;
            for &(s, e, obs_date) in &targets {
                match reset[s..e].iter().position(|&v| v >= requirement) {
                    Some(offset) => {
                        let date = temp.timestamps[s + offset].date();
                        let err_days = (date - obs_date).num_days() as f64;
                        sq_sum += err_days * err_days;
                        predicted.push(date);
                    }
                    None => {
                        feasible = false;
                        break;
                    }
                }
            }
            if !feasible {
                continue;
            }
            let rmse = (sq_sum / targets.len() as f64).sqrt();
            if best
                .as_ref()
                .and_then(|b| b.score_days)
                .map_or(true, |s| rmse < s)
            {
                let mut params = point.params.clone();
                params.insert("requirement".to_string(), requirement);
                best = Some(ModelEvaluation {
                    model: model.to_string(),
                    params,
                    predicted,
                    score_days: Some(rmse),
                    failure: None,
                });
            }
        }
    }

    best.unwrap_or_else(|| {
        ModelEvaluation::failed(
            model,
            "no parameter point reached its requirement in every observed season",
        )
    })
}

/// Rebuild the season-reset accumulation curve behind a finished
/// evaluation, for plotting. None for failed fits or unknown models.
pub fn evaluation_curve(
    eval: &ModelEvaluation,
    temp: &TimeSeries,
    cfg: &CompareConfig,
) -> Option<Vec<f64>> {
    if eval.failure.is_some() {
        return None;
    }
    let curve = match eval.model.as_str() {
        "chilling_hours" => chill::chilling_hours(&temp.values),
        "utah" => chill::utah(&temp.values, false),
        "utah_classic" => chill::utah(&temp.values, true),
        "positive_chill_units" => chill::positive_chill_units(&temp.values),
        "low_chill" => chill::low_chill(&temp.values),
        "north_carolina" => chill::north_carolina(&temp.values),
        "dynamic" => chill::dynamic(&temp.values),
        "landsberg" => chill::landsberg(temp, *eval.params.get("base_temp")?),
        _ => return None,
    };
    Some(chill::reset_per_season(
        &temp.timestamps,
        &curve,
        cfg.season_start_doy,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// Two dormancy seasons of hourly temperatures: cold early (5 °C),
    /// warm late (15 °C). Chilling hours accumulate 1 CU/h for the first
    /// 600 h of each season.
    fn two_season_temps() -> TimeSeries {
        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        for year in [2020, 2021] {
            let start = NaiveDate::from_ymd_opt(year, 11, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap();
            for h in 0..(120 * 24) {
                timestamps.push(start + Duration::hours(h));
                values.push(if h < 600 { 5.0 } else { 15.0 });
            }
        }
        TimeSeries::try_new("temp", timestamps, values).unwrap()
    }

    #[test]
    fn recovers_known_requirement() {
        let temp = two_season_temps();
        // Ground truth: chilling hours with requirement 400 → hour 399.
        // Hour 399 after Nov 1 00:00 falls on Nov 17.
        let observed: Vec<NaiveDate> = [2020, 2021]
            .iter()
            .map(|&y| NaiveDate::from_ymd_opt(y, 11, 17).unwrap())
            .collect();
        let cfg = CompareConfig::default();
        let eval = fit_model("chilling_hours", &temp, &observed, &cfg);
        let score = eval.score_days.expect("fit should converge");
        assert!(score <= 1.5, "score {score}");
        let req = eval.params["requirement"];
        assert!((req - 400.0).abs() < 30.0, "requirement {req}");
    }

    #[test]
    fn ranking_sorts_failures_last() {
        let temp = two_season_temps();
        let observed = vec![NaiveDate::from_ymd_opt(2020, 11, 17).unwrap()];
        let evals = compare_models(&temp, &observed, &CompareConfig::default());
        assert_eq!(evals.len(), CANDIDATE_MODELS.len());
        let first_failure = evals.iter().position(|e| e.failure.is_some());
        if let Some(pos) = first_failure {
            assert!(evals[pos..].iter().all(|e| e.failure.is_some()));
        }
        assert!(evals
            .windows(2)
            .filter(|w| w[0].score_days.is_some() && w[1].score_days.is_some())
            .all(|w| w[0].score_days <= w[1].score_days));
    }

    #[test]
    fn fit_fails_without_observations() {
        let temp = two_season_temps();
        let eval = fit_model("utah", &temp, &[], &CompareConfig::default());
        assert!(eval.failure.is_some());
    }

    #[test]
    fn warm_record_reports_infeasible_models() {
        // Never below 12 °C: chilling hours accumulate nothing.
        let start = NaiveDate::from_ymd_opt(2020, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let timestamps: Vec<_> = (0..24 * 30).map(|h| start + Duration::hours(h)).collect();
        let temp = TimeSeries::try_new("temp", timestamps, vec![25.0; 24 * 30]).unwrap();
        let observed = vec![NaiveDate::from_ymd_opt(2020, 11, 20).unwrap()];
        let eval = fit_model("chilling_hours", &temp, &observed, &CompareConfig::default());
        assert!(eval.failure.is_some());
    }

    #[test]
    fn derives_release_after_winter_minimum() {
        // One season: fluorescence dips mid-winter then recovers.
        let start = NaiveDate::from_ymd_opt(2020, 10, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let n = 180 * 24;
        let timestamps: Vec<_> = (0..n).map(|h| start + Duration::hours(h as i64)).collect();
        let values: Vec<f64> = (0..n)
            .map(|h| {
                let day = h as f64 / 24.0;
                // Minimum near day 90.
                1.0 - ((day - 90.0) / 45.0).powi(2).min(1.0)
            })
            .map(|v| 1.0 - v) // dip shape: high → low → high
            .collect();
        let fluor = TimeSeries::try_new("fluorescence", timestamps, values).unwrap();
        let dates = derive_release_dates(&fluor, 274);
        assert_eq!(dates.len(), 1);
        let min_date = start.date() + Duration::days(90);
        assert!(dates[0] > min_date, "release {} not after minimum", dates[0]);
    }
}
