//! Interpretation of the classification service's JSON answer.

use crate::error::{AnalysisError, GENERIC_FAILURE};
use crate::{AnalysisResult, Diagnosis, ImageRef};
use serde::Deserialize;
use serde_json::Value;

/// Fields of a successful answer. Everything the result needs is required here.
#[derive(Debug, Deserialize)]
struct SuccessPayload {
    prediction: String,
    confidence: f64,
    gradcam_overlay: String,
    #[serde(default)]
    preprocessed_image: Option<Value>,
}

/// Turns a body received with a success status into a result.
///
/// The application-level `success` flag decides first; only a successful
/// answer is checked for the result fields.
pub fn interpret(body: &[u8]) -> Result<AnalysisResult, AnalysisError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| AnalysisError::Malformed(format!("body is not JSON: {e}")))?;

    let success = value.get("success").and_then(Value::as_bool).unwrap_or(false);
    if !success {
        let message = value
            .get("error")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(GENERIC_FAILURE);
        return Err(AnalysisError::Application(message.to_string()));
    }

    let payload: SuccessPayload = serde_json::from_value(value)
        .map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    if payload.prediction.trim().is_empty() {
        return Err(AnalysisError::Malformed("empty prediction".into()));
    }
    if !(0.0..=1.0).contains(&payload.confidence) {
        return Err(AnalysisError::Malformed(format!(
            "confidence {} outside [0,1]",
            payload.confidence
        )));
    }
    if payload.gradcam_overlay.trim().is_empty() {
        return Err(AnalysisError::Malformed("empty gradcam_overlay".into()));
    }

    let preprocessed = match payload.preprocessed_image {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(ImageRef::new(s)),
        Some(Value::Null) | None => None,
        Some(other) => {
            tracing::warn!("ignoring unusable preprocessed_image: {other}");
            None
        }
    };

    Ok(AnalysisResult {
        diagnosis: Diagnosis::from(payload.prediction),
        confidence: payload.confidence,
        overlay: ImageRef::new(payload.gradcam_overlay),
        preprocessed,
    })
}
