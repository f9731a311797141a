use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use arrow::array::{
    Array, AsArray, Float32Array, Float64Array, Int32Array, Int64Array, StringArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{SensorDataset, TimeSeries};

/// Accepted text timestamp layouts, tried in order.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d",
];

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a sensor dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, a timestamp column, numeric measurement columns
/// * `.json`    – `[{ "timestamp": ..., "<channel>": <number>, ... }, ...]`
/// * `.parquet` – Pandas/Polars export with the same schema
///
/// Every non-timestamp column becomes one [`TimeSeries`] channel. Empty
/// cells load as NaN gaps; anything else malformed fails the load with the
/// offending row number. Timestamps must be strictly increasing.
pub fn load_file(path: &Path, timestamp_col: &str) -> Result<SensorDataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "csv" => load_csv(path, timestamp_col),
        "json" => load_json(path, timestamp_col),
        "parquet" | "pq" => load_parquet(path, timestamp_col),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

/// Parse one textual timestamp; falls back to integer epoch seconds.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(ts);
        }
        // Date-only layouts need the explicit midnight expansion.
        if let Ok(d) = chrono::NaiveDate::parse_from_str(s, fmt) {
            return Ok(d.and_hms_opt(0, 0, 0).unwrap());
        }
    }
    if let Ok(epoch) = s.parse::<i64>() {
        return epoch_to_datetime(epoch, TimeUnit::Second);
    }
    bail!("'{s}' is not a recognised timestamp")
}

fn epoch_to_datetime(value: i64, unit: TimeUnit) -> Result<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Second => DateTime::from_timestamp(value, 0),
        TimeUnit::Millisecond => DateTime::from_timestamp_millis(value),
        TimeUnit::Microsecond => DateTime::from_timestamp_micros(value),
        TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(value)),
    };
    dt.map(|d| d.naive_utc())
        .with_context(|| format!("epoch value {value} out of range"))
}

/// Assemble per-channel series from shared row data, enforcing the
/// strictly-increasing timestamp invariant.
fn build_dataset(
    timestamps: Vec<NaiveDateTime>,
    channel_names: Vec<String>,
    columns: Vec<Vec<f64>>,
) -> Result<SensorDataset> {
    if timestamps.is_empty() {
        bail!("input contains no data rows");
    }
    let mut channels = Vec::with_capacity(channel_names.len());
    for (name, values) in channel_names.into_iter().zip(columns) {
        let series = TimeSeries::try_new(name, timestamps.clone(), values)?;
        channels.push(series);
    }
    if channels.is_empty() {
        bail!("input contains no measurement columns");
    }
    Ok(SensorDataset { channels })
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one row per sample:
///   `timestamp,fluorescence,temp`
///   `2020-11-01 00:00:00,0.42,6.1`
fn load_csv(path: &Path, timestamp_col: &str) -> Result<SensorDataset> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let ts_idx = headers
        .iter()
        .position(|h| h == timestamp_col)
        .with_context(|| format!("CSV missing '{timestamp_col}' column"))?;

    let channel_names: Vec<String> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != ts_idx)
        .map(|(_, h)| h.clone())
        .collect();

    let mut timestamps = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); channel_names.len()];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        if record.len() != headers.len() {
            bail!(
                "CSV row {row_no}: expected {} fields, found {}",
                headers.len(),
                record.len()
            );
        }

        let ts = parse_timestamp(record.get(ts_idx).unwrap_or(""))
            .with_context(|| format!("CSV row {row_no}, column '{timestamp_col}'"))?;
        timestamps.push(ts);

        let mut chan = 0;
        for (col_idx, field) in record.iter().enumerate() {
            if col_idx == ts_idx {
                continue;
            }
            columns[chan].push(
                parse_measurement(field)
                    .with_context(|| format!("CSV row {row_no}, column '{}'", headers[col_idx]))?,
            );
            chan += 1;
        }
    }

    build_dataset(timestamps, channel_names, columns)
}

/// Empty cell → NaN gap; otherwise must parse as a float.
fn parse_measurement(s: &str) -> Result<f64> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(f64::NAN);
    }
    s.parse::<f64>()
        .with_context(|| format!("'{s}' is not a number"))
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default
/// `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "timestamp": "2020-11-01 00:00:00", "fluorescence": 0.42, "temp": 6.1 },
///   ...
/// ]
/// ```
fn load_json(path: &Path, timestamp_col: &str) -> Result<SensorDataset> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let root: JsonValue = serde_json::from_str(&text).context("parsing JSON")?;

    let records = root.as_array().context("Expected top-level JSON array")?;
    if records.is_empty() {
        bail!("input contains no data rows");
    }

    // Channel order follows the first record.
    let first = records[0]
        .as_object()
        .context("Row 0 is not a JSON object")?;
    let channel_names: Vec<String> = first
        .keys()
        .filter(|k| k.as_str() != timestamp_col)
        .cloned()
        .collect();
    if !first.contains_key(timestamp_col) {
        bail!("JSON records missing '{timestamp_col}' field");
    }

    let mut timestamps = Vec::with_capacity(records.len());
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(records.len()); channel_names.len()];

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .with_context(|| format!("Row {i} is not a JSON object"))?;

        let ts_val = obj
            .get(timestamp_col)
            .with_context(|| format!("Row {i}: missing '{timestamp_col}'"))?;
        let ts = match ts_val {
            JsonValue::String(s) => parse_timestamp(s),
            JsonValue::Number(n) => {
                let epoch = n
                    .as_i64()
                    .with_context(|| format!("Row {i}: non-integer epoch timestamp"))?;
                epoch_to_datetime(epoch, TimeUnit::Second)
            }
            other => bail!("Row {i}: timestamp is {other}, expected string or number"),
        }
        .with_context(|| format!("Row {i}, field '{timestamp_col}'"))?;
        timestamps.push(ts);

        for (chan, name) in channel_names.iter().enumerate() {
            let v = match obj.get(name) {
                None | Some(JsonValue::Null) => f64::NAN,
                Some(JsonValue::Number(n)) => n
                    .as_f64()
                    .with_context(|| format!("Row {i}, field '{name}': not a number"))?,
                Some(other) => bail!("Row {i}, field '{name}': {other} is not a number"),
            };
            columns[chan].push(v);
        }
    }

    build_dataset(timestamps, channel_names, columns)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one row per sample.
///
/// Expected schema:
/// - timestamp column: Utf8 text, Int64 epoch seconds, or a native
///   Timestamp type (any unit)
/// - measurement columns: Float64 / Float32 / Int64 / Int32, nulls → NaN
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`).
fn load_parquet(path: &Path, timestamp_col: &str) -> Result<SensorDataset> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut timestamps = Vec::new();
    let mut channel_names: Vec<String> = Vec::new();
    let mut columns: Vec<Vec<f64>> = Vec::new();

    // Row numbers in error contexts count from the start of the file, not
    // the current record batch.
    let mut row_offset = 0usize;
    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let ts_idx = schema
            .index_of(timestamp_col)
            .map_err(|_| anyhow::anyhow!("Parquet file missing '{timestamp_col}' column"))?;

        if channel_names.is_empty() {
            channel_names = schema
                .fields()
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != ts_idx)
                .map(|(_, f)| f.name().clone())
                .collect();
            columns = vec![Vec::new(); channel_names.len()];
        }

        let ts_col = batch.column(ts_idx);
        for row in 0..batch.num_rows() {
            let file_row = row_offset + row;
            timestamps.push(
                extract_timestamp(ts_col, row)
                    .with_context(|| format!("Row {file_row}: failed to read '{timestamp_col}'"))?,
            );
        }

        for (chan, name) in channel_names.iter().enumerate() {
            let col_idx = schema
                .index_of(name)
                .map_err(|_| anyhow::anyhow!("Parquet batch missing '{name}' column"))?;
            let col = batch.column(col_idx);
            for row in 0..batch.num_rows() {
                let file_row = row_offset + row;
                columns[chan].push(
                    extract_measurement(col, row)
                        .with_context(|| format!("Row {file_row}: failed to read '{name}'"))?,
                );
            }
        }
        row_offset += batch.num_rows();
    }

    build_dataset(timestamps, channel_names, columns)
}

// -- Parquet / Arrow helpers --

fn extract_timestamp(col: &Arc<dyn Array>, row: usize) -> Result<NaiveDateTime> {
    if col.is_null(row) {
        bail!("null timestamp");
    }
    match col.data_type() {
        DataType::Utf8 => {
            let arr = col
                .as_any()
                .downcast_ref::<StringArray>()
                .context("expected StringArray")?;
            parse_timestamp(arr.value(row))
        }
        DataType::Int64 => {
            let arr = col
                .as_any()
                .downcast_ref::<Int64Array>()
                .context("expected Int64Array")?;
            epoch_to_datetime(arr.value(row), TimeUnit::Second)
        }
        DataType::Timestamp(unit, _) => {
            use arrow::datatypes::{
                TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
                TimestampSecondType,
            };
            let raw = match unit {
                TimeUnit::Second => col.as_primitive::<TimestampSecondType>().value(row),
                TimeUnit::Millisecond => col.as_primitive::<TimestampMillisecondType>().value(row),
                TimeUnit::Microsecond => col.as_primitive::<TimestampMicrosecondType>().value(row),
                TimeUnit::Nanosecond => col.as_primitive::<TimestampNanosecondType>().value(row),
            };
            epoch_to_datetime(raw, *unit)
        }
        other => bail!("timestamp column has unsupported type {other:?}"),
    }
}

fn extract_measurement(col: &Arc<dyn Array>, row: usize) -> Result<f64> {
    if col.is_null(row) {
        return Ok(f64::NAN);
    }
    match col.data_type() {
        DataType::Float64 => Ok(col
            .as_any()
            .downcast_ref::<Float64Array>()
            .context("expected Float64Array")?
            .value(row)),
        DataType::Float32 => Ok(col
            .as_any()
            .downcast_ref::<Float32Array>()
            .context("expected Float32Array")?
            .value(row) as f64),
        DataType::Int64 => Ok(col
            .as_any()
            .downcast_ref::<Int64Array>()
            .context("expected Int64Array")?
            .value(row) as f64),
        DataType::Int32 => Ok(col
            .as_any()
            .downcast_ref::<Int32Array>()
            .context("expected Int32Array")?
            .value(row) as f64),
        other => bail!("measurement column has unsupported type {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(ext: &str, contents: &str) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.into_temp_path()
    }

    #[test]
    fn csv_row_count_and_order() {
        let path = write_temp(
            "csv",
            "timestamp,fluorescence,temp\n\
             2020-11-01 00:00:00,0.42,6.1\n\
             2020-11-01 01:00:00,0.40,5.8\n\
             2020-11-01 02:00:00,0.39,5.2\n",
        );
        let ds = load_file(&path, "timestamp").unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.channel_names(), vec!["fluorescence", "temp"]);
        let fluor = ds.channel("fluorescence").unwrap();
        assert!(fluor.timestamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fluor.values, vec![0.42, 0.40, 0.39]);
    }

    #[test]
    fn csv_malformed_timestamp_reports_row() {
        let path = write_temp(
            "csv",
            "timestamp,temp\n\
             2020-11-01 00:00:00,6.1\n\
             not-a-date,5.8\n",
        );
        let err = load_file(&path, "timestamp").unwrap_err();
        assert!(format!("{err:#}").contains("row 1"), "{err:#}");
    }

    #[test]
    fn csv_non_numeric_measurement_fails() {
        let path = write_temp(
            "csv",
            "timestamp,temp\n2020-11-01 00:00:00,warm\n",
        );
        let err = load_file(&path, "timestamp").unwrap_err();
        assert!(format!("{err:#}").contains("not a number"), "{err:#}");
    }

    #[test]
    fn csv_empty_cell_is_gap() {
        let path = write_temp(
            "csv",
            "timestamp,temp\n\
             2020-11-01 00:00:00,6.1\n\
             2020-11-01 01:00:00,\n",
        );
        let ds = load_file(&path, "timestamp").unwrap();
        assert_eq!(ds.channel("temp").unwrap().gap_count(), 1);
    }

    #[test]
    fn csv_duplicate_timestamp_rejected() {
        let path = write_temp(
            "csv",
            "timestamp,temp\n\
             2020-11-01 00:00:00,6.1\n\
             2020-11-01 00:00:00,5.8\n",
        );
        assert!(load_file(&path, "timestamp").is_err());
    }

    #[test]
    fn json_records_load() {
        let path = write_temp(
            "json",
            r#"[
              { "timestamp": "2020-11-01 00:00:00", "fluorescence": 0.42 },
              { "timestamp": "2020-11-01 01:00:00", "fluorescence": null }
            ]"#,
        );
        let ds = load_file(&path, "timestamp").unwrap();
        let fluor = ds.channel("fluorescence").unwrap();
        assert_eq!(fluor.len(), 2);
        assert!(fluor.values[1].is_nan());
    }

    #[test]
    fn parquet_round_trip_with_null_gap() {
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let schema = Arc::new(Schema::new(vec![
            Field::new("timestamp", DataType::Utf8, false),
            Field::new("fluorescence", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![
                    "2020-11-01 00:00:00",
                    "2020-11-01 01:00:00",
                    "2020-11-01 02:00:00",
                ])),
                Arc::new(Float64Array::from(vec![Some(0.42), None, Some(0.39)])),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.parquet");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let ds = load_file(&path, "timestamp").unwrap();
        let fluor = ds.channel("fluorescence").unwrap();
        assert_eq!(fluor.len(), 3);
        assert_eq!(fluor.values[0], 0.42);
        assert!(fluor.values[1].is_nan());
        assert_eq!(fluor.gap_count(), 1);
    }

    #[test]
    fn parquet_error_reports_file_row_across_batches() {
        use arrow::datatypes::{Field, Schema};
        use arrow::record_batch::RecordBatch;
        use chrono::NaiveDate;
        use parquet::arrow::ArrowWriter;

        // 3000 rows span several reader batches; the bad timestamp sits
        // well past the first one.
        let start = NaiveDate::from_ymd_opt(2020, 11, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let timestamps: Vec<String> = (0..3000)
            .map(|h| {
                if h == 2500 {
                    "not-a-date".to_string()
                } else {
                    (start + chrono::Duration::hours(h))
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                }
            })
            .collect();
        let schema = Arc::new(Schema::new(vec![
            Field::new("timestamp", DataType::Utf8, false),
            Field::new("temp", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from_iter_values(timestamps)),
                Arc::new(Float64Array::from(vec![5.0; 3000])),
            ],
        )
        .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.parquet");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let err = load_file(&path, "timestamp").unwrap_err();
        assert!(format!("{err:#}").contains("Row 2500"), "{err:#}");
    }

    #[test]
    fn unsupported_extension_rejected() {
        let path = write_temp("xlsx", "x");
        assert!(load_file(&path, "timestamp").is_err());
    }

    #[test]
    fn timestamp_formats_accepted() {
        assert!(parse_timestamp("2020-11-01 06:30:00").is_ok());
        assert!(parse_timestamp("2020-11-01T06:30:00").is_ok());
        assert!(parse_timestamp("2020-11-01 06:30").is_ok());
        assert!(parse_timestamp("2020-11-01").is_ok());
        assert!(parse_timestamp("1604188800").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
