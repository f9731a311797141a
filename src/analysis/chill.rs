//! Chill requirement models.
//!
//! The catalogue follows the dormancy literature's common models; each one
//! maps an hourly temperature series (°C) to cumulative chill units (CU).
//! All functions assume the series was resampled to a 1 h grid — the
//! comparator enforces that before calling in here.

use chrono::{Datelike, NaiveDateTime};

use crate::data::model::TimeSeries;

// ---------------------------------------------------------------------------
// Hour-weight models
// ---------------------------------------------------------------------------

/// Chilling hours (Weinberger 1950): one CU per hour below 7.2 °C.
pub fn chilling_hours(temps: &[f64]) -> Vec<f64> {
    cumulative(temps, |t| if t < 7.2 { 1.0 } else { 0.0 })
}

/// Utah model (Richardson et al. 1974): stepped hour weights.
///
/// With `classic_thresholds` the original Fahrenheit-derived bounds are
/// used; otherwise the widely-circulated Celsius table (about 0.3 °C
/// higher) applies.
pub fn utah(temps: &[f64], classic_thresholds: bool) -> Vec<f64> {
    if classic_thresholds {
        cumulative(temps, |t| match t {
            t if t > 1.1 && t <= 2.2 => 0.5,
            t if t > 2.2 && t <= 8.9 => 1.0,
            t if t > 8.9 && t <= 12.2 => 0.5,
            t if t > 15.6 && t <= 18.3 => -0.5,
            t if t > 18.3 => -1.0,
            _ => 0.0,
        })
    } else {
        cumulative(temps, |t| match t {
            t if t > 1.4 && t <= 2.4 => 0.5,
            t if t > 2.4 && t <= 9.1 => 1.0,
            t if t > 9.1 && t <= 12.4 => 0.5,
            t if t > 15.9 && t <= 18.0 => -0.5,
            t if t > 18.0 => -1.0,
            _ => 0.0,
        })
    }
}

/// Positive chill units: the Utah table without the negative weights,
/// for warm climates where negations would zero out the total.
pub fn positive_chill_units(temps: &[f64]) -> Vec<f64> {
    cumulative(temps, |t| match t {
        t if t > 1.4 && t <= 2.4 => 0.5,
        t if t > 2.4 && t <= 9.1 => 1.0,
        t if t > 9.1 && t <= 12.4 => 0.5,
        _ => 0.0,
    })
}

/// Low-chill model (Gilreath & Buchanan 1981).
pub fn low_chill(temps: &[f64]) -> Vec<f64> {
    cumulative(temps, |t| {
        if (1.8..=8.0).contains(&t) {
            1.0
        } else if t > 19.5 {
            -1.0
        } else {
            0.0
        }
    })
}

/// North Carolina model (Shaltout & Unrath 1983).
pub fn north_carolina(temps: &[f64]) -> Vec<f64> {
    cumulative(temps, |t| {
        if (1.6..=7.2).contains(&t) {
            1.0
        } else if t > 23.3 {
            -2.0
        } else {
            0.0
        }
    })
}

fn cumulative(temps: &[f64], weight: impl Fn(f64) -> f64) -> Vec<f64> {
    let mut total = 0.0;
    temps
        .iter()
        .map(|&t| {
            total += weight(t);
            total
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Landsberg
// ---------------------------------------------------------------------------

/// Landsberg model: cumulative daily mean temperature divided by the crop
/// base temperature.
///
/// The daily total is spread evenly over the day's hours so that the
/// returned curve stays aligned with the hourly series; at day boundaries
/// it equals the daily-resolution accumulation.
pub fn landsberg(series: &TimeSeries, base_temp: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len());
    let mut total = 0.0;
    let mut day_start = 0;
    while day_start < series.len() {
        let date = series.timestamps[day_start].date();
        let mut day_end = day_start;
        while day_end < series.len() && series.timestamps[day_end].date() == date {
            day_end += 1;
        }
        let day = &series.values[day_start..day_end];
        let day_mean = day.iter().sum::<f64>() / day.len() as f64;
        let per_hour = day_mean / base_temp / day.len() as f64;
        for _ in day_start..day_end {
            total += per_hour;
            out.push(total);
        }
        day_start = day_end;
    }
    out
}

// ---------------------------------------------------------------------------
// Dynamic model
// ---------------------------------------------------------------------------

// Fishman/Erez/Couvillon rate constants (two-step intermediate model).
const DYN_A0: f64 = 139_500.0;
const DYN_A1: f64 = 2.567e18;
const DYN_E0: f64 = 4_153.5;
const DYN_E1: f64 = 12_888.8;
const DYN_SLOPE: f64 = 1.6;
const DYN_TRANSITION_K: f64 = 277.0;

/// Dynamic model (Fishman, Erez & Couvillon 1987): a thermally labile
/// intermediate accumulates towards a temperature-dependent equilibrium;
/// once it reaches unity a temperature-gated fraction is banked as an
/// irreversible chill portion.
pub fn dynamic(temps: &[f64]) -> Vec<f64> {
    let mut portions = Vec::with_capacity(temps.len());
    let mut banked = 0.0;
    let mut intermediate = 0.0;
    for &t in temps {
        let tk = t + 273.0;
        let equilibrium = (DYN_A0 / DYN_A1) * ((DYN_E1 - DYN_E0) / tk).exp();
        let rate = DYN_A1 * (-DYN_E1 / tk).exp();
        intermediate = equilibrium - (equilibrium - intermediate) * (-rate).exp();
        if intermediate >= 1.0 {
            let sigmoid_arg = DYN_SLOPE * DYN_TRANSITION_K * (tk - DYN_TRANSITION_K) / tk;
            let gate = sigmoid_arg.exp() / (1.0 + sigmoid_arg.exp());
            banked += gate * intermediate;
            intermediate *= 1.0 - gate;
        }
        portions.push(banked);
    }
    portions
}

// ---------------------------------------------------------------------------
// Season reset
// ---------------------------------------------------------------------------

/// Dormancy season index of a timestamp for a season starting at
/// `start_doy` (day of year). Seasons are labelled by the calendar year
/// they start in; the 365/366 day difference is absorbed by the integer
/// division.
pub fn season_index(ts: &NaiveDateTime, start_doy: u32) -> i32 {
    ts.year() + (ts.ordinal() as i32 - start_doy as i32).div_euclid(366)
}

/// Restart a cumulative curve at the beginning of each dormancy season by
/// subtracting the season's first value.
pub fn reset_per_season(
    timestamps: &[NaiveDateTime],
    cumulative: &[f64],
    start_doy: u32,
) -> Vec<f64> {
    let mut out = Vec::with_capacity(cumulative.len());
    let mut season = None;
    let mut offset = 0.0;
    for (ts, &v) in timestamps.iter().zip(cumulative) {
        let s = season_index(ts, start_doy);
        if season != Some(s) {
            season = Some(s);
            offset = v;
        }
        out.push(v - offset);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn hourly_temps(values: Vec<f64>) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2020, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let timestamps = (0..values.len())
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        TimeSeries::try_new("temp", timestamps, values).unwrap()
    }

    #[test]
    fn chilling_hours_counts_cold_hours() {
        let cu = chilling_hours(&[5.0, 7.1, 7.2, 10.0, 3.0]);
        assert_eq!(cu, vec![1.0, 2.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn utah_weights_match_table() {
        // 2.0 → 0.5, 5.0 → 1.0, 10.0 → 0.5, 17.0 → -0.5, 20.0 → -1.0, 14.0 → 0.0
        let cu = utah(&[2.0, 5.0, 10.0, 17.0, 20.0, 14.0], false);
        assert_eq!(cu, vec![0.5, 1.5, 2.0, 1.5, 0.5, 0.5]);
    }

    #[test]
    fn utah_classic_thresholds_differ() {
        // 1.2 °C: 0.5 CU under classic bounds, 0.0 under the common table.
        assert_eq!(utah(&[1.2], true)[0], 0.5);
        assert_eq!(utah(&[1.2], false)[0], 0.0);
    }

    #[test]
    fn positive_chill_units_never_decrease() {
        let cu = positive_chill_units(&[5.0, 20.0, 25.0, 5.0]);
        assert!(cu.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(cu.last(), Some(&2.0));
    }

    #[test]
    fn north_carolina_double_negative_weight() {
        let cu = north_carolina(&[5.0, 24.0]);
        assert_eq!(cu, vec![1.0, -1.0]);
    }

    #[test]
    fn landsberg_matches_daily_accumulation_at_boundaries() {
        // Two full days at 6 °C and 12 °C means; base temp 3.
        let mut temps = vec![6.0; 24];
        temps.extend(vec![12.0; 24]);
        let series = hourly_temps(temps);
        let cu = landsberg(&series, 3.0);
        assert!((cu[23] - 2.0).abs() < 1e-9);
        assert!((cu[47] - 6.0).abs() < 1e-9);
    }

    #[test]
    fn dynamic_accumulates_in_chilling_range() {
        // ~6 °C is near the model's optimum; two weeks must bank portions.
        let cu = dynamic(&vec![6.0; 24 * 14]);
        assert!(cu.last().unwrap() > &1.0, "portions: {:?}", cu.last());
        assert!(cu.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn dynamic_flat_under_heat() {
        let cu = dynamic(&vec![30.0; 24 * 14]);
        assert!(cu.last().unwrap() < &1e-6);
    }

    #[test]
    fn season_reset_restarts_accumulation() {
        // Hourly curve spanning an Oct 1 season boundary.
        let start = NaiveDate::from_ymd_opt(2020, 9, 30)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let timestamps: Vec<_> = (0..72).map(|i| start + Duration::hours(i as i64)).collect();
        let cumulative: Vec<f64> = (0..72).map(|i| i as f64).collect();
        let start_doy = NaiveDate::from_ymd_opt(2020, 10, 1).unwrap().ordinal();
        let reset = reset_per_season(&timestamps, &cumulative, start_doy);
        assert_eq!(reset[0], 0.0);
        // First hour of Oct 1 is sample 24; the new season restarts there.
        assert_eq!(reset[24], 0.0);
        assert_eq!(reset[23], 23.0);
        assert_eq!(reset[71], 47.0);
    }
}
