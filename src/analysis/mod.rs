/// Analysis layer: time-frequency decomposition and chill model comparison.
///
/// ```text
///   cleaned TimeSeries (fluorescence) ──► wavelet ──► TimeFrequencyMap
///   cleaned TimeSeries (temperature)  ──► chill ──► cumulative CU curves
///                                          │
///                                          ▼
///                                       compare ──► ranked ModelEvaluations
/// ```
pub mod chill;
pub mod compare;
pub mod wavelet;
