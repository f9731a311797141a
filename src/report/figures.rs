use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use super::colormap::{generate_palette, SequentialMap};
use crate::analysis::compare::{evaluation_curve, CompareConfig};
use crate::data::annotations::Annotations;
use crate::data::model::{FitSummary, TimeFrequencyMap, TimeSeries};

/// Figure dimensions shared by every rendered plot.
const FIGURE_SIZE: (u32, u32) = (1400, 800);

// ---------------------------------------------------------------------------
// Time-series figure
// ---------------------------------------------------------------------------

/// Render the measurement channels as stacked panels, one per channel,
/// with ground-truth annotation overlays on the first panel.
///
/// Overlays follow the paper's convention: filled circles for destructive
/// tests without budbreak, hollow circles for budbreak, dashed vertical
/// lines for the release dates the fit was targeted at, and labelled phase
/// bands along the bottom.
pub fn render_timeseries(
    path: &Path,
    channels: &[&TimeSeries],
    annotations: Option<&Annotations>,
    release_dates: &[NaiveDate],
) -> Result<()> {
    if channels.is_empty() {
        bail!("no channels to plot");
    }
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).context("filling figure background")?;
    let panels = root.split_evenly((channels.len(), 1));
    let colors = generate_palette(channels.len());

    for (panel_idx, (panel, series)) in panels.iter().zip(channels).enumerate() {
        let (t_min, t_max) = time_extent(&series.timestamps)?;
        let (v_min, v_max) = value_extent(&series.values);
        let pad = 0.05 * (v_max - v_min).max(1e-12);

        let mut chart = ChartBuilder::on(panel)
            .margin(10)
            .x_label_area_size(36)
            .y_label_area_size(60)
            .caption(&series.name, ("sans-serif", 22))
            .build_cartesian_2d(RangedDateTime::from(t_min..t_max), (v_min - pad)..(v_max + pad))
            .context("building time-series chart")?;
        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc(&series.name)
            .x_labels(10)
            .draw()
            .context("drawing time-series mesh")?;

        chart
            .draw_series(LineSeries::new(
                series
                    .timestamps
                    .iter()
                    .zip(&series.values)
                    .filter(|(_, v)| !v.is_nan())
                    .map(|(t, &v)| (*t, v)),
                colors[panel_idx].stroke_width(1),
            ))
            .context("drawing channel line")?;

        // Annotation overlays go on the first panel only.
        if panel_idx == 0 {
            draw_release_lines(&mut chart, release_dates, v_min - pad, v_max + pad)?;
            if let Some(ann) = annotations {
                draw_annotations(&mut chart, ann, v_min - pad, v_max - v_min)?;
            }
        }
    }

    root.present().context("writing time-series figure")?;
    Ok(())
}

/// Chart context shared by the time-series panels.
type PanelChart<'a, 'b> =
    ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedDateTime<NaiveDateTime>, RangedCoordf64>>;

fn draw_release_lines<'a>(
    chart: &mut PanelChart<'a, 'a>,
    release_dates: &[NaiveDate],
    y_lo: f64,
    y_hi: f64,
) -> Result<()> {
    let style = BLACK.stroke_width(1);
    for date in release_dates {
        let x = date.and_hms_opt(0, 0, 0).unwrap();
        chart
            .draw_series(DashedLineSeries::new(
                [(x, y_lo), (x, (y_lo + y_hi) / 2.0)],
                6,
                4,
                style,
            ))
            .context("drawing release line")?;
    }
    Ok(())
}

fn draw_annotations<'a>(
    chart: &mut PanelChart<'a, 'a>,
    ann: &Annotations,
    y_base: f64,
    y_span: f64,
) -> Result<()> {
    let marker_y = y_base + 0.08 * y_span;

    chart
        .draw_series(ann.dormant.iter().map(|d| {
            Circle::new(
                (d.and_hms_opt(12, 0, 0).unwrap(), marker_y),
                6,
                BLACK.filled(),
            )
        }))
        .context("drawing dormant markers")?
        .label("No budbreak")
        .legend(|(x, y)| Circle::new((x, y), 5, BLACK.filled()));

    chart
        .draw_series(ann.release.iter().map(|d| {
            Circle::new(
                (d.and_hms_opt(12, 0, 0).unwrap(), marker_y),
                6,
                BLACK.stroke_width(2),
            )
        }))
        .context("drawing budbreak markers")?
        .label("Budbreak")
        .legend(|(x, y)| Circle::new((x, y), 5, BLACK.stroke_width(2)));

    // Phase bands hug the bottom of the panel.
    let band_lo = y_base + 0.01 * y_span;
    let band_hi = y_base + 0.05 * y_span;
    for span in &ann.phases {
        let color = match span.phase {
            crate::data::annotations::Phase::Vegetative => RGBColor(155, 187, 89),
            crate::data::annotations::Phase::Endodormancy => RGBColor(128, 100, 162),
            crate::data::annotations::Phase::Ecodormancy => RGBColor(75, 172, 198),
        };
        let x0 = span.start.and_hms_opt(0, 0, 0).unwrap();
        let x1 = span.end.and_hms_opt(23, 59, 59).unwrap();
        chart
            .draw_series(std::iter::once(Rectangle::new(
                [(x0, band_lo), (x1, band_hi)],
                color.filled(),
            )))
            .context("drawing phase band")?;
        let mid = x0 + (x1 - x0) / 2;
        chart
            .draw_series(std::iter::once(Text::new(
                span.phase.label().to_string(),
                (mid, band_hi),
                ("sans-serif", 16),
            )))
            .context("labelling phase band")?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .context("drawing annotation legend")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Scalogram figure
// ---------------------------------------------------------------------------

/// Render the wavelet power map as a heatmap: time on x, log period on y,
/// log10 power mapped through the sequential colormap. The cone of
/// influence is overlaid as a dashed boundary; power above it is
/// edge-contaminated.
pub fn render_scalogram(path: &Path, map: &TimeFrequencyMap, channel_name: &str) -> Result<()> {
    if map.n_times() == 0 || map.n_scales() == 0 {
        bail!("empty time-frequency map");
    }
    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).context("filling figure background")?;

    let (t_min, t_max) = time_extent(&map.timestamps)?;
    let p_min = map.periods_hours[0];
    let p_max = map.periods_hours[map.n_scales() - 1];

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(36)
        .y_label_area_size(70)
        .caption(
            format!("Wavelet power – {channel_name}"),
            ("sans-serif", 22),
        )
        .build_cartesian_2d(RangedDateTime::from(t_min..t_max), (p_min..p_max).log_scale())
        .context("building scalogram chart")?;
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Period (hours)")
        .x_labels(10)
        .draw()
        .context("drawing scalogram mesh")?;

    // Column-averaged cells keep the figure below ~1k rectangles wide.
    let n_times = map.n_times();
    let group = n_times.div_ceil(1024).max(1);
    let log_power: Vec<f64> = map.power.iter().map(|&p| (p.max(1e-300)).log10()).collect();
    let colormap = SequentialMap::from_values(&log_power);

    let mut cells = Vec::new();
    for s in 0..map.n_scales() {
        // Cell boundaries at the geometric midpoints of neighbouring periods.
        let p_lo = if s == 0 {
            map.periods_hours[0]
        } else {
            (map.periods_hours[s - 1] * map.periods_hours[s]).sqrt()
        };
        let p_hi = if s + 1 == map.n_scales() {
            map.periods_hours[s]
        } else {
            (map.periods_hours[s] * map.periods_hours[s + 1]).sqrt()
        };
        let mut t = 0;
        while t < n_times {
            let t_end = (t + group).min(n_times);
            let mean: f64 = log_power[s * n_times + t..s * n_times + t_end]
                .iter()
                .sum::<f64>()
                / (t_end - t) as f64;
            // Right edge of the cell is the next column's start (or the
            // series end for the last column) so cells have width.
            let x_hi = if t_end < n_times {
                map.timestamps[t_end]
            } else {
                map.timestamps[n_times - 1]
            };
            cells.push(Rectangle::new(
                [(map.timestamps[t], p_lo), (x_hi, p_hi)],
                colormap.color_for(mean).filled(),
            ));
            t = t_end;
        }
    }
    chart.draw_series(cells).context("drawing scalogram cells")?;

    // Cone of influence boundary, clamped into the plotted period range.
    chart
        .draw_series(DashedLineSeries::new(
            map.timestamps
                .iter()
                .zip(&map.coi_hours)
                .map(|(t, &c)| (*t, c.clamp(p_min, p_max))),
            8,
            5,
            WHITE.stroke_width(2),
        ))
        .context("drawing cone of influence")?;

    root.present().context("writing scalogram figure")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Chill-model figure
// ---------------------------------------------------------------------------

/// Render the successful models' accumulated chill units at their best-fit
/// parameters, each with its fitted requirement level, plus the observed
/// release dates the fits were scored against.
pub fn render_chill_models(
    path: &Path,
    temp: &TimeSeries,
    summary: &FitSummary,
    cfg: &CompareConfig,
) -> Result<()> {
    let fitted: Vec<(&crate::data::model::ModelEvaluation, Vec<f64>)> = summary
        .ranking
        .iter()
        .filter_map(|eval| evaluation_curve(eval, temp, cfg).map(|c| (eval, c)))
        .collect();
    if fitted.is_empty() {
        bail!("no successfully fitted models to plot");
    }

    let root = BitMapBackend::new(path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE).context("filling figure background")?;

    let (t_min, t_max) = time_extent(&temp.timestamps)?;
    // Curves are normalised per model so differently-scaled units share a
    // panel (the dynamic model banks portions, chilling hours bank hours).
    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .x_label_area_size(36)
        .y_label_area_size(60)
        .caption("Chill accumulation – best-fit models", ("sans-serif", 22))
        .build_cartesian_2d(RangedDateTime::from(t_min..t_max), 0.0..1.1_f64)
        .context("building chill-model chart")?;
    chart
        .configure_mesh()
        .x_desc("Time")
        .y_desc("Accumulation / requirement")
        .x_labels(10)
        .draw()
        .context("drawing chill-model mesh")?;

    let colors = generate_palette(fitted.len());
    for (idx, (eval, curve)) in fitted.iter().enumerate() {
        let requirement = eval.params.get("requirement").copied().unwrap_or(1.0);
        let color = colors[idx];
        let label = match eval.score_days {
            Some(s) => format!("{} (RMSE {:.1} d)", eval.model, s),
            None => eval.model.clone(),
        };
        chart
            .draw_series(LineSeries::new(
                temp.timestamps
                    .iter()
                    .zip(curve)
                    .map(|(t, &v)| (*t, (v / requirement).clamp(0.0, 1.1))),
                color.stroke_width(2),
            ))
            .context("drawing accumulation curve")?
            .label(label)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 16, y)], color.stroke_width(2))
            });
    }

    // Normalised requirement level.
    chart
        .draw_series(DashedLineSeries::new(
            [(t_min, 1.0), (t_max, 1.0)],
            6,
            4,
            BLACK.stroke_width(1),
        ))
        .context("drawing requirement level")?;

    // Observed release dates.
    for date in &summary.observed {
        let x = date.and_hms_opt(0, 0, 0).unwrap();
        chart
            .draw_series(DashedLineSeries::new(
                [(x, 0.0), (x, 1.05)],
                4,
                4,
                RGBColor(120, 120, 120).stroke_width(1),
            ))
            .context("drawing observed release date")?;
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .context("drawing chill-model legend")?;

    root.present().context("writing chill-model figure")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Fit summary
// ---------------------------------------------------------------------------

/// Serialise the ranked fit summary next to the figures.
pub fn write_summary(path: &Path, summary: &FitSummary) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(file, summary).context("serialising fit summary")?;
    Ok(())
}

/// Output paths for one report run.
#[derive(Debug, Clone)]
pub struct ReportPaths {
    pub timeseries: PathBuf,
    pub scalogram: PathBuf,
    pub chill_models: PathBuf,
    pub summary: PathBuf,
}

impl ReportPaths {
    pub fn in_dir(dir: &Path) -> Self {
        ReportPaths {
            timeseries: dir.join("timeseries.png"),
            scalogram: dir.join("scalogram.png"),
            chill_models: dir.join("chill_models.png"),
            summary: dir.join("fit_summary.json"),
        }
    }
}

// -- shared helpers --

fn time_extent(timestamps: &[NaiveDateTime]) -> Result<(NaiveDateTime, NaiveDateTime)> {
    match (timestamps.first(), timestamps.last()) {
        (Some(&a), Some(&b)) if a < b => Ok((a, b)),
        _ => bail!("series too short to plot"),
    }
}

fn value_extent(values: &[f64]) -> (f64, f64) {
    let lo = values
        .iter()
        .cloned()
        .filter(|v| !v.is_nan())
        .fold(f64::INFINITY, f64::min);
    let hi = values
        .iter()
        .cloned()
        .filter(|v| !v.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if lo.is_finite() && hi.is_finite() {
        (lo, hi)
    } else {
        (0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::BTreeMap;

    use crate::analysis::wavelet::{cwt, WaveletConfig};
    use crate::data::model::ModelEvaluation;

    fn hourly_series(name: &str, values: Vec<f64>) -> TimeSeries {
        let start = NaiveDate::from_ymd_opt(2020, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let timestamps = (0..values.len())
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        TimeSeries::try_new(name, timestamps, values).unwrap()
    }

    #[test]
    fn renders_all_figures() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ReportPaths::in_dir(dir.path());

        let fluor = hourly_series(
            "fluorescence",
            (0..512).map(|i| (i as f64 * 0.1).sin()).collect(),
        );
        let temp = hourly_series("temp", vec![5.0; 512]);

        render_timeseries(
            &paths.timeseries,
            &[&fluor, &temp],
            None,
            &[NaiveDate::from_ymd_opt(2020, 11, 10).unwrap()],
        )
        .unwrap();
        assert!(paths.timeseries.exists());

        let map = cwt(&fluor, &WaveletConfig {
            min_period_hours: 6.0,
            max_period_hours: 96.0,
            n_scales: 16,
            omega0: 6.0,
        })
        .unwrap();
        render_scalogram(&paths.scalogram, &map, "fluorescence").unwrap();
        assert!(paths.scalogram.exists());

        let summary = FitSummary {
            observed: vec![NaiveDate::from_ymd_opt(2020, 11, 10).unwrap()],
            observed_source: "derived".to_string(),
            ranking: vec![ModelEvaluation {
                model: "chilling_hours".to_string(),
                params: BTreeMap::from([("requirement".to_string(), 200.0)]),
                predicted: vec![NaiveDate::from_ymd_opt(2020, 11, 9).unwrap()],
                score_days: Some(1.0),
                failure: None,
            }],
        };
        render_chill_models(&paths.chill_models, &temp, &summary, &CompareConfig::default())
            .unwrap();
        assert!(paths.chill_models.exists());

        write_summary(&paths.summary, &summary).unwrap();
        let text = std::fs::read_to_string(&paths.summary).unwrap();
        assert!(text.contains("chilling_hours"));
    }

    #[test]
    fn empty_map_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let map = TimeFrequencyMap {
            timestamps: Vec::new(),
            periods_hours: Vec::new(),
            power: Vec::new(),
            coi_hours: Vec::new(),
        };
        assert!(render_scalogram(&dir.path().join("s.png"), &map, "f").is_err());
    }

    #[test]
    fn summary_with_annotations_renders() {
        let dir = tempfile::tempdir().unwrap();
        let fluor = hourly_series("fluorescence", vec![0.5; 256]);
        let ann = Annotations {
            dormant: vec![NaiveDate::from_ymd_opt(2020, 11, 3).unwrap()],
            release: vec![NaiveDate::from_ymd_opt(2020, 11, 8).unwrap()],
            phases: Vec::new(),
        };
        render_timeseries(&dir.path().join("ts.png"), &[&fluor], Some(&ann), &[]).unwrap();
    }
}
