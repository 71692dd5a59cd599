use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod client;
pub mod config;
pub mod error;
pub mod response;
pub mod session;
pub mod upload;

pub use client::{AnalysisClient, HealthStatus, PendingAnalysis};
pub use config::ClientConfig;
pub use error::{AnalysisError, ErrorKind, Rejection};
pub use session::{Outcome, Session, Ticket};
pub use upload::{AcceptedUpload, CandidateSource, UploadCandidate, UploadValidator};

/// Diagnosis tag returned by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Diagnosis {
    Benign,
    Malignant,
    /// Any tag the service adds later.
    Other(String),
}

impl Diagnosis {
    pub fn as_tag(&self) -> &str {
        match self {
            Diagnosis::Benign => "benign",
            Diagnosis::Malignant => "malignant",
            Diagnosis::Other(tag) => tag,
        }
    }

    /// Capitalized label for headings, e.g. `Benign`.
    pub fn headline(&self) -> String {
        let tag = self.as_tag();
        let mut chars = tag.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn is_malignant(&self) -> bool {
        matches!(self, Diagnosis::Malignant)
    }
}

impl From<String> for Diagnosis {
    fn from(tag: String) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "benign" => Diagnosis::Benign,
            "malignant" => Diagnosis::Malignant,
            _ => Diagnosis::Other(tag.trim().to_string()),
        }
    }
}

impl From<Diagnosis> for String {
    fn from(d: Diagnosis) -> Self {
        d.as_tag().to_string()
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_tag().to_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageRefError {
    #[error("not a data URI")]
    NotEmbedded,
    #[error("data URI has no ',' separator")]
    MissingPayload,
    #[error("only base64 data URIs are supported")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    Decode(String),
}

/// Image handed back by the service: a remote URI or a `data:` URI.
///
/// Kept opaque until the shell asks to decode it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

/// Decoded payload of a `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl ImageRef {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_embedded(&self) -> bool {
        self.0
            .get(..5)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
    }

    pub fn decode_embedded(&self) -> Result<EmbeddedImage, ImageRefError> {
        if !self.is_embedded() {
            return Err(ImageRefError::NotEmbedded);
        }
        let (header, payload) = self.0[5..]
            .split_once(',')
            .ok_or(ImageRefError::MissingPayload)?;
        let mut params = header.split(';');
        let media_type = params
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or("text/plain")
            .to_string();
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(ImageRefError::NotBase64);
        }
        let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(cleaned)
            .map_err(|e| ImageRefError::Decode(e.to_string()))?;
        Ok(EmbeddedImage { media_type, bytes })
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_embedded() {
            write!(f, "<embedded image, {} chars>", self.0.len())
        } else {
            f.write_str(&self.0)
        }
    }
}

/// A successful analysis as rendered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub diagnosis: Diagnosis,
    /// Model confidence in [0,1].
    pub confidence: f64,
    /// Grad-CAM heat map over the lesion.
    pub overlay: ImageRef,
    /// The image as the model saw it, when the service returns it.
    pub preprocessed: Option<ImageRef>,
}

impl AnalysisResult {
    /// Confidence as a percentage with one decimal, e.g. `87.0%`.
    pub fn confidence_percent(&self) -> String {
        format!("{:.1}%", self.confidence * 100.0)
    }
}
