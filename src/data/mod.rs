/// Data layer: core types, loading, and cleaning.
///
/// Architecture:
/// ```text
///  .csv / .json / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → SensorDataset
///   └──────────┘
///        │
///        ▼
///   ┌───────────────┐
///   │ SensorDataset  │  Vec<TimeSeries>, one per measurement column
///   └───────────────┘
///        │
///        ▼
///   ┌────────────┐
///   │ preprocess  │  resample / gap policy / detrend → cleaned TimeSeries
///   └────────────┘
/// ```
pub mod annotations;
pub mod loader;
pub mod model;
pub mod preprocess;
