//! fluoroscope – time-frequency analysis of chlorophyll fluorescence
//! time series.
//!
//! One run executes the full analysis pipeline on a sensor file:
//! load → preprocess → wavelet transform → chill model comparison →
//! figures. Stages run strictly in sequence; re-running on identical
//! input reproduces the outputs.

mod analysis;
mod data;
mod report;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use clap::Parser;
use log::{info, warn};

use analysis::compare::{compare_models, derive_release_dates, CompareConfig};
use analysis::wavelet::{cwt, WaveletConfig};
use data::annotations::Annotations;
use data::loader::load_file;
use data::model::FitSummary;
use data::preprocess::{preprocess, Detrend, GapFill, PreprocessOptions};
use report::figures::{
    render_chill_models, render_scalogram, render_timeseries, write_summary, ReportPaths,
};

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "fluoroscope")]
#[command(about = "Time-frequency analysis of chlorophyll fluorescence time series")]
#[command(version)]
struct Args {
    /// Input dataset (.csv, .json, or .parquet)
    input: PathBuf,

    /// Name of the timestamp column
    #[arg(long, default_value = "timestamp")]
    timestamp_col: String,

    /// Name of the fluorescence channel
    #[arg(long, default_value = "fluorescence")]
    fluorescence_col: String,

    /// Name of the temperature channel (°C)
    #[arg(long, default_value = "temp")]
    temperature_col: String,

    /// Resampling interval for the fluorescence channel, in hours
    #[arg(long, default_value_t = 1)]
    resample_hours: u32,

    /// Interior gap policy after resampling
    #[arg(long, value_enum, default_value = "interpolate")]
    gap_fill: GapFill,

    /// Detrending applied to the fluorescence channel
    #[arg(long, value_enum, default_value = "mean")]
    detrend: Detrend,

    /// Shortest wavelet period, in hours
    #[arg(long, default_value_t = 6.0)]
    min_period_hours: f64,

    /// Longest wavelet period, in hours
    #[arg(long, default_value_t = 1536.0)]
    max_period_hours: f64,

    /// Number of log-spaced wavelet scales
    #[arg(long, default_value_t = 64)]
    n_scales: usize,

    /// Day of year where a dormancy season starts (chill reset)
    #[arg(long, default_value_t = 274)]
    season_start_doy: u32,

    /// Optional ground-truth annotations (JSON)
    #[arg(long)]
    annotations: Option<PathBuf>,

    /// Directory the figures and fit summary are written to
    #[arg(long, default_value = "figures")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    run(&args)
}

fn run(args: &Args) -> Result<()> {
    // ---- Loader ----
    let dataset = load_file(&args.input, &args.timestamp_col)
        .with_context(|| format!("loading {}", args.input.display()))?;
    info!(
        "loaded {} rows, channels: {:?}",
        dataset.len(),
        dataset.channel_names()
    );

    let fluor_raw = dataset.channel(&args.fluorescence_col).with_context(|| {
        format!(
            "dataset has no '{}' channel (available: {:?})",
            args.fluorescence_col,
            dataset.channel_names()
        )
    })?;
    let temp_raw = dataset.channel(&args.temperature_col).with_context(|| {
        format!(
            "dataset has no '{}' channel (available: {:?})",
            args.temperature_col,
            dataset.channel_names()
        )
    })?;

    // ---- Preprocessor ----
    let fluor = preprocess(
        fluor_raw,
        &PreprocessOptions {
            interval: Duration::hours(args.resample_hours.max(1) as i64),
            gap_fill: args.gap_fill,
            detrend: args.detrend,
        },
    )
    .context("cleaning fluorescence channel")?;
    info!(
        "fluorescence: {} samples after cleaning ({} gaps in raw input)",
        fluor.len(),
        fluor_raw.gap_count()
    );

    // Chill models need absolute °C on an hourly grid; gaps must be
    // filled for the accumulations to stay continuous.
    let temp = preprocess(
        temp_raw,
        &PreprocessOptions {
            interval: Duration::hours(1),
            gap_fill: GapFill::Interpolate,
            detrend: Detrend::None,
        },
    )
    .context("cleaning temperature channel")?;

    // ---- Transformer ----
    let wavelet_cfg = WaveletConfig {
        min_period_hours: args.min_period_hours,
        max_period_hours: args.max_period_hours,
        n_scales: args.n_scales,
        omega0: 6.0,
    };
    let map = cwt(&fluor, &wavelet_cfg).context("wavelet transform")?;
    if let Some(dominant) = map.dominant_scale() {
        info!(
            "dominant wavelet period: {:.1} hours",
            map.periods_hours[dominant]
        );
    }

    // ---- Model comparator ----
    let annotations = match &args.annotations {
        Some(path) => Some(Annotations::load(path)?),
        None => None,
    };
    let compare_cfg = CompareConfig {
        season_start_doy: args.season_start_doy,
        ..CompareConfig::default()
    };
    let (observed, observed_source) = match annotations.as_ref() {
        Some(ann) if !ann.release.is_empty() => (ann.release.clone(), "annotations"),
        _ => (
            derive_release_dates(&fluor, args.season_start_doy),
            "derived from fluorescence",
        ),
    };
    info!("observed release dates ({observed_source}): {observed:?}");

    let ranking = compare_models(&temp, &observed, &compare_cfg);
    let summary = FitSummary {
        observed,
        observed_source: observed_source.to_string(),
        ranking,
    };

    // ---- Reporter ----
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;
    let paths = ReportPaths::in_dir(&args.out_dir);

    let best_predicted = summary
        .ranking
        .iter()
        .find(|e| e.failure.is_none())
        .map(|e| e.predicted.clone())
        .unwrap_or_default();
    render_timeseries(
        &paths.timeseries,
        &[&fluor, &temp],
        annotations.as_ref(),
        &best_predicted,
    )?;
    render_scalogram(&paths.scalogram, &map, &fluor.name)?;
    if let Err(e) = render_chill_models(&paths.chill_models, &temp, &summary, &compare_cfg) {
        warn!("skipping chill-model figure: {e:#}");
    }
    write_summary(&paths.summary, &summary)?;

    info!(
        "wrote {}, {}, {}, {}",
        paths.timeseries.display(),
        paths.scalogram.display(),
        paths.chill_models.display(),
        paths.summary.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;

    /// One dormancy season, hourly: cold early winter, a fluorescence dip
    /// recovering in spring.
    fn write_sample_csv(path: &Path) {
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(file, "timestamp,fluorescence,temp").unwrap();
        let start = chrono::NaiveDate::from_ymd_opt(2020, 10, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        for h in 0..(200 * 24) {
            let ts = start + Duration::hours(h);
            let day = h as f64 / 24.0;
            let dip = 0.45 * (-(day - 90.0) * (day - 90.0) / (2.0 * 35.0 * 35.0)).exp();
            let fluor = 0.8 - dip;
            let temp = if h < 1400 { 5.0 } else { 15.0 };
            writeln!(file, "{},{fluor:.5},{temp:.1}", ts.format("%Y-%m-%d %H:%M:%S")).unwrap();
        }
    }

    fn args_for(input: &Path, out_dir: &Path) -> Args {
        Args {
            input: input.to_path_buf(),
            timestamp_col: "timestamp".to_string(),
            fluorescence_col: "fluorescence".to_string(),
            temperature_col: "temp".to_string(),
            resample_hours: 1,
            gap_fill: GapFill::Interpolate,
            detrend: Detrend::Mean,
            min_period_hours: 12.0,
            max_period_hours: 24.0 * 32.0,
            n_scales: 24,
            season_start_doy: 274,
            annotations: None,
            out_dir: out_dir.to_path_buf(),
        }
    }

    #[test]
    fn full_pipeline_produces_outputs_and_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.csv");
        write_sample_csv(&input);

        let out_a = dir.path().join("a");
        let out_b = dir.path().join("b");
        run(&args_for(&input, &out_a)).unwrap();
        run(&args_for(&input, &out_b)).unwrap();

        for name in ["timeseries.png", "scalogram.png", "fit_summary.json"] {
            assert!(out_a.join(name).exists(), "missing {name}");
        }
        let summary_a = std::fs::read_to_string(out_a.join("fit_summary.json")).unwrap();
        let summary_b = std::fs::read_to_string(out_b.join("fit_summary.json")).unwrap();
        assert_eq!(summary_a, summary_b);
        assert!(summary_a.contains("chilling_hours"));
    }

    #[test]
    fn missing_channel_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("sample.csv");
        write_sample_csv(&input);
        let mut args = args_for(&input, &dir.path().join("out"));
        args.fluorescence_col = "qy".to_string();
        let err = run(&args).unwrap_err();
        assert!(format!("{err:#}").contains("no 'qy' channel"), "{err:#}");
    }
}
