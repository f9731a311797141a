//! Writes a synthetic fluorescence/temperature dataset for trying out the
//! pipeline: `sample_data.csv` and `sample_data.parquet` in the current
//! directory. Deterministic – re-running reproduces the same files.

use std::f64::consts::PI;
use std::sync::Arc;

use arrow::array::{Float64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use parquet::arrow::ArrowWriter;

/// Hourly air temperature (°C): annual cycle, diurnal cycle, noise.
fn temperature(ts: &NaiveDateTime, rng: &mut SimpleRng) -> f64 {
    let doy = ts.ordinal() as f64;
    let annual = 12.0 - 10.0 * (2.0 * PI * (doy - 15.0) / 365.0).cos();
    let diurnal = 4.0 * (2.0 * PI * (ts.hour() as f64 - 6.0) / 24.0).sin();
    annual + diurnal + rng.gauss(0.0, 1.5)
}

/// Hourly chlorophyll fluorescence proxy: a stable vegetative baseline
/// with a deep winter dormancy dip, plus a small diurnal ripple.
fn fluorescence(ts: &NaiveDateTime, rng: &mut SimpleRng) -> f64 {
    // Distance (days) to the nearest Jan 10, the dip centre.
    let dip_centre = NaiveDate::from_ymd_opt(ts.year(), 1, 10).unwrap();
    let next_centre = NaiveDate::from_ymd_opt(ts.year() + 1, 1, 10).unwrap();
    let d0 = (ts.date() - dip_centre).num_days() as f64;
    let d1 = (ts.date() - next_centre).num_days() as f64;
    let days = if d0.abs() < d1.abs() { d0 } else { d1 };

    let dip = 0.45 * (-days * days / (2.0 * 35.0 * 35.0)).exp();
    let diurnal = 0.03 * (2.0 * PI * ts.hour() as f64 / 24.0).sin();
    0.8 - dip + diurnal + rng.gauss(0.0, 0.01)
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

fn main() {
    let mut rng = SimpleRng::new(42);

    // Hourly timestamps: Oct 2019 → Apr 2022, covering three dormancy
    // seasons like the orchard dataset in the paper.
    let start = NaiveDate::from_ymd_opt(2019, 10, 1)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let end = NaiveDate::from_ymd_opt(2022, 4, 30)
        .unwrap()
        .and_hms_opt(23, 0, 0)
        .unwrap();
    let n_hours = ((end - start).num_hours() + 1) as usize;

    let timestamps: Vec<NaiveDateTime> = (0..n_hours)
        .map(|h| start + Duration::hours(h as i64))
        .collect();
    let temps: Vec<f64> = timestamps.iter().map(|t| temperature(t, &mut rng)).collect();
    let mut fluor: Vec<Option<f64>> = timestamps
        .iter()
        .map(|t| Some(fluorescence(t, &mut rng)))
        .collect();

    // A few sensor outages: gap runs the preprocessor has to handle.
    for _ in 0..5 {
        let at = (rng.next_f64() * (n_hours - 48) as f64) as usize;
        let len = 6 + (rng.next_f64() * 30.0) as usize;
        for v in fluor.iter_mut().skip(at).take(len) {
            *v = None;
        }
    }

    let ts_strings: Vec<String> = timestamps
        .iter()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .collect();

    // ---- CSV ----
    let csv_path = "sample_data.csv";
    let mut writer = csv::Writer::from_path(csv_path).expect("Failed to create CSV file");
    writer
        .write_record(["timestamp", "fluorescence", "temp"])
        .expect("Failed to write CSV header");
    for i in 0..n_hours {
        let fluor_cell = fluor[i].map(|v| format!("{v:.5}")).unwrap_or_default();
        writer
            .write_record([
                ts_strings[i].as_str(),
                fluor_cell.as_str(),
                format!("{:.3}", temps[i]).as_str(),
            ])
            .expect("Failed to write CSV row");
    }
    writer.flush().expect("Failed to flush CSV");

    // ---- Parquet ----
    let ts_array = StringArray::from(ts_strings.iter().map(|s| s.as_str()).collect::<Vec<_>>());
    let fluor_array = Float64Array::from(fluor.clone());
    let temp_array = Float64Array::from(temps.clone());

    let schema = Arc::new(Schema::new(vec![
        Field::new("timestamp", DataType::Utf8, false),
        Field::new("fluorescence", DataType::Float64, true),
        Field::new("temp", DataType::Float64, false),
    ]));

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(ts_array),
            Arc::new(fluor_array),
            Arc::new(temp_array),
        ],
    )
    .expect("Failed to create RecordBatch");

    let parquet_path = "sample_data.parquet";
    let file = std::fs::File::create(parquet_path).expect("Failed to create output file");
    let mut writer = ArrowWriter::try_new(file, schema, None).expect("Failed to create writer");
    writer.write(&batch).expect("Failed to write batch");
    writer.close().expect("Failed to close writer");

    let gaps = fluor.iter().filter(|v| v.is_none()).count();
    println!("Wrote {n_hours} hourly rows ({gaps} fluorescence gaps) to {csv_path} and {parquet_path}");
}
