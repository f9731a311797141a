use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;

// ---------------------------------------------------------------------------
// Ground-truth annotations
// ---------------------------------------------------------------------------

/// Dormancy phase labels used on the time-series figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Vegetative,
    Endodormancy,
    Ecodormancy,
}

impl Phase {
    /// Short label drawn inside the phase band.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Vegetative => "V",
            Phase::Endodormancy => "EnD",
            Phase::Ecodormancy => "EcD",
        }
    }
}

/// One labelled date span.
#[derive(Debug, Clone, Deserialize)]
pub struct PhaseSpan {
    pub phase: Phase,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Destructive-test observations and phase labels for the orchard the
/// dataset was recorded in.
///
/// ```json
/// {
///   "dormant": ["2019-11-25", "2019-12-27"],
///   "release": ["2020-01-27"],
///   "phases": [
///     { "phase": "vegetative", "start": "2020-03-15", "end": "2020-09-01" }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Annotations {
    /// Sampling dates where cuttings showed no budbreak (still dormant).
    #[serde(default)]
    pub dormant: Vec<NaiveDate>,
    /// Sampling dates where cuttings showed budbreak (dormancy released).
    #[serde(default)]
    pub release: Vec<NaiveDate>,
    /// Labelled dormancy phase spans.
    #[serde(default)]
    pub phases: Vec<PhaseSpan>,
}

impl Annotations {
    /// Load annotations from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading annotations file {}", path.display()))?;
        let ann: Annotations = serde_json::from_str(&text).context("parsing annotations JSON")?;
        for span in &ann.phases {
            if span.end < span.start {
                anyhow::bail!(
                    "phase span {} ends ({}) before it starts ({})",
                    span.phase.label(),
                    span.end,
                    span.start
                );
            }
        }
        Ok(ann)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_and_validates() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
              "dormant": ["2019-11-25", "2019-12-27"],
              "release": ["2020-01-27"],
              "phases": [
                {{ "phase": "endodormancy", "start": "2019-10-17", "end": "2020-01-15" }}
              ]
            }}"#
        )
        .unwrap();
        let ann = Annotations::load(file.path()).unwrap();
        assert_eq!(ann.dormant.len(), 2);
        assert_eq!(ann.release[0], NaiveDate::from_ymd_opt(2020, 1, 27).unwrap());
        assert_eq!(ann.phases[0].phase, Phase::Endodormancy);
    }

    #[test]
    fn rejects_inverted_span() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "phases": [
              {{ "phase": "vegetative", "start": "2020-09-01", "end": "2020-03-15" }}
            ] }}"#
        )
        .unwrap();
        assert!(Annotations::load(file.path()).is_err());
    }
}
