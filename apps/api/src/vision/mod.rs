//! Per-photo vision analysis.
//!
//! `PhotoAnalyzer` is the seam: the pipeline only ever sees `PhotoFindings`.
//! Default backend is `ClaudePhotoAnalyzer`, optionally primed with
//! Rekognition labels.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

pub mod claude;
pub mod prompts;
pub mod rekognition;

/// How urgent an observed condition is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedLabel {
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub issue: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub label: String,
    pub value: f64,
    pub unit: String,
}

/// Everything one photo contributed to the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoFindings {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub labels: Vec<DetectedLabel>,
    #[serde(default)]
    pub observations: Vec<Observation>,
    #[serde(default)]
    pub materials: Vec<String>,
    #[serde(default)]
    pub measurements: Vec<Measurement>,
    #[serde(default)]
    pub recommended_work: Vec<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl PhotoFindings {
    /// Trims text, drops empty entries and out-of-range numbers, clamps confidence.
    pub fn normalize(mut self) -> Self {
        self.summary = self.summary.trim().to_string();
        self.labels = merge_labels(Vec::new(), self.labels);
        self.observations.retain(|o| !o.issue.trim().is_empty());
        for o in &mut self.observations {
            o.issue = o.issue.trim().to_string();
            o.location = o
                .location
                .take()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty());
        }
        self.materials = clean_strings(self.materials);
        self.recommended_work = clean_strings(self.recommended_work);
        self.measurements
            .retain(|m| m.value.is_finite() && m.value > 0.0 && !m.label.trim().is_empty());
        self.confidence = if self.confidence.is_finite() {
            self.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self
    }
}

/// Detector labels first, then model labels whose name is not already present
/// (case-insensitive). Blank names are dropped and confidence clamped to 0..=1.
pub fn merge_labels(detected: Vec<DetectedLabel>, from_model: Vec<DetectedLabel>) -> Vec<DetectedLabel> {
    let mut merged: Vec<DetectedLabel> = Vec::with_capacity(detected.len() + from_model.len());
    for mut label in detected.into_iter().chain(from_model) {
        label.name = label.name.trim().to_string();
        if label.name.is_empty()
            || merged.iter().any(|l| l.name.eq_ignore_ascii_case(&label.name))
        {
            continue;
        }
        label.confidence = if label.confidence.is_finite() {
            label.confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        merged.push(label);
    }
    merged
}

fn clean_strings(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Job-level context that helps the model interpret a photo.
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    pub trade: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

/// One photo handed to an analyzer.
#[derive(Debug, Clone)]
pub struct PhotoInput {
    pub photo_id: Uuid,
    pub s3_key: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub context: JobContext,
}

/// Implement this to swap vision backends without touching the pipeline.
///
/// Carried in `AppState` as `Arc<dyn PhotoAnalyzer>`.
#[async_trait]
pub trait PhotoAnalyzer: Send + Sync {
    async fn analyze(&self, photo: &PhotoInput) -> Result<PhotoFindings, AppError>;
}

/// Content types accepted for upload. These are the formats the vision model reads.
pub const SUPPORTED_IMAGE_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
];

pub fn extension_for(content_type: &str) -> Option<&'static str> {
    SUPPORTED_IMAGE_TYPES
        .iter()
        .find(|(ct, _)| ct.eq_ignore_ascii_case(content_type.trim()))
        .map(|(_, ext)| *ext)
}
