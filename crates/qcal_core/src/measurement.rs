//! Measurement result types
//!
//! The raw result handed back by the hardware driver and the
//! post-processed output the pipeline validates and commits.

use crate::types::Qid;
use chrono::{DateTime, Utc};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw result of one hardware run
///
/// The driver is an opaque collaborator; the engine only inspects the
/// optional per-qid R² map for the goodness-of-fit gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Driver-defined raw payload
    pub raw_result: serde_json::Value,
    /// Per-qid coefficient of determination, when the run fitted a curve
    pub r2: Option<HashMap<Qid, f64>>,
}

impl RunResult {
    /// Create a result with no fit statistics
    pub fn new(raw_result: serde_json::Value) -> Self {
        Self {
            raw_result,
            r2: None,
        }
    }

    /// Attach per-qid R² values
    pub fn with_r2(mut self, r2: HashMap<Qid, f64>) -> Self {
        self.r2 = Some(r2);
        self
    }

    /// R² for one qid, when present
    pub fn r2_for(&self, qid: &str) -> Option<f64> {
        self.r2.as_ref()?.get(qid).copied()
    }
}

/// One calibrated output parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParameter {
    /// Measured value
    pub value: f64,
    /// Physical unit, e.g. "GHz", "ns"
    pub unit: String,
    /// Fit uncertainty, when known
    pub error: Option<f64>,
    /// Human-readable description
    pub description: String,
    /// When the value was calibrated
    pub calibrated_at: DateTime<Utc>,
    /// Execution that produced the value, stamped at commit time
    pub execution_id: Option<String>,
    /// Task that produced the value, stamped at commit time
    pub task_id: Option<String>,
}

impl OutputParameter {
    /// Create a parameter with value and unit; commit stamps the rest
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
            error: None,
            description: String::new(),
            calibrated_at: Utc::now(),
            execution_id: None,
            task_id: None,
        }
    }

    /// Attach a fit uncertainty
    pub fn with_error(mut self, error: f64) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A figure produced by postprocessing, in two representations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Figure {
    /// Figure name, used in artifact file names
    pub name: String,
    /// Rendered image bytes
    pub image_png: Vec<u8>,
    /// Machine-readable serialization of the same figure
    pub spec_json: serde_json::Value,
}

/// A raw numeric array captured during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    /// Array name, used in artifact file names
    pub name: String,
    /// Complex samples; persisted as real/imag CSV columns
    pub samples: Vec<Complex64>,
}

/// Post-processed output of one task run for one qid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostProcessResult {
    /// Output parameters to commit
    pub output_parameters: HashMap<String, OutputParameter>,
    /// Figures to persist
    pub figures: Vec<Figure>,
    /// Raw arrays to persist
    pub raw_data: Vec<RawData>,
}

impl PostProcessResult {
    /// Create an empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output parameter
    pub fn with_parameter(mut self, name: impl Into<String>, param: OutputParameter) -> Self {
        self.output_parameters.insert(name.into(), param);
        self
    }

    /// Add a figure
    pub fn with_figure(mut self, figure: Figure) -> Self {
        self.figures.push(figure);
        self
    }

    /// Add a raw array
    pub fn with_raw_data(mut self, raw: RawData) -> Self {
        self.raw_data.push(raw);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use serde_json::json;

    #[test]
    fn test_run_result_r2_lookup() {
        let mut r2 = HashMap::new();
        r2.insert("5".to_string(), 0.93);

        let run = RunResult::new(json!({"iq": []})).with_r2(r2);
        assert_relative_eq!(run.r2_for("5").unwrap(), 0.93);
        assert!(run.r2_for("6").is_none());

        let bare = RunResult::new(json!(null));
        assert!(bare.r2_for("5").is_none());
    }

    #[test]
    fn test_output_parameter_builder() {
        let param = OutputParameter::new(7.21, "GHz")
            .with_error(0.002)
            .with_description("resonator dip");

        assert_relative_eq!(param.value, 7.21);
        assert_eq!(param.unit, "GHz");
        assert_eq!(param.error, Some(0.002));
        assert!(param.execution_id.is_none());
    }

    #[test]
    fn test_postprocess_result_builders() {
        let result = PostProcessResult::new()
            .with_parameter("qubit_frequency", OutputParameter::new(7.9, "GHz"))
            .with_figure(Figure {
                name: "fit".into(),
                image_png: vec![0x89, 0x50],
                spec_json: json!({"trace": "lorentzian"}),
            })
            .with_raw_data(RawData {
                name: "iq".into(),
                samples: vec![Complex64::new(0.1, -0.2)],
            });

        assert_eq!(result.output_parameters.len(), 1);
        assert_eq!(result.figures.len(), 1);
        assert_eq!(result.raw_data.len(), 1);
    }

    #[test]
    fn test_serde_round_trip() {
        let run = RunResult::new(json!({"counts": {"00": 512}}));
        let json = serde_json::to_string(&run).unwrap();
        let back: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(run, back);
    }
}
