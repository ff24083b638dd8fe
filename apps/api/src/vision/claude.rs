//! Claude-backed photo analyzer.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::prompts::{fill_template, EVIDENCE_INSTRUCTION};
use crate::llm_client::{ImageInput, LlmClient};
use crate::vision::prompts::{PHOTO_ANALYSIS_PROMPT, PHOTO_ANALYSIS_SYSTEM};
use crate::vision::rekognition::RekognitionLabeler;
use crate::vision::{merge_labels, DetectedLabel, PhotoAnalyzer, PhotoFindings, PhotoInput};

pub struct ClaudePhotoAnalyzer {
    llm: LlmClient,
    labeler: Option<RekognitionLabeler>,
}

impl ClaudePhotoAnalyzer {
    pub fn new(llm: LlmClient, labeler: Option<RekognitionLabeler>) -> Self {
        Self { llm, labeler }
    }

    async fn labels_for(&self, photo: &PhotoInput) -> Vec<DetectedLabel> {
        let Some(labeler) = &self.labeler else {
            return Vec::new();
        };
        // Labels are hints only; analysis proceeds without them.
        match labeler.detect_labels(&photo.s3_key, &photo.bytes).await {
            Ok(labels) => labels,
            Err(e) => {
                warn!("Label detection failed for photo {}: {e}", photo.photo_id);
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl PhotoAnalyzer for ClaudePhotoAnalyzer {
    async fn analyze(&self, photo: &PhotoInput) -> Result<PhotoFindings, AppError> {
        let labels = self.labels_for(photo).await;
        let prompt = build_photo_prompt(photo, &labels);

        let image = ImageInput {
            media_type: photo.content_type.clone(),
            data: photo.bytes.clone(),
        };

        let findings: PhotoFindings = self
            .llm
            .call_json_with_images(&prompt, std::slice::from_ref(&image), PHOTO_ANALYSIS_SYSTEM)
            .await
            .map_err(|e| AppError::Vision(format!("photo {}: {e}", photo.photo_id)))?;

        let mut findings = findings.normalize();
        findings.labels = merge_labels(labels, std::mem::take(&mut findings.labels));

        info!(
            "Photo {} analyzed: {} observations, confidence {:.2}",
            photo.photo_id,
            findings.observations.len(),
            findings.confidence
        );
        Ok(findings)
    }
}

fn build_photo_prompt(photo: &PhotoInput, labels: &[DetectedLabel]) -> String {
    let labels_text = if labels.is_empty() {
        "(none)".to_string()
    } else {
        labels
            .iter()
            .map(|l| format!("- {} ({:.0}%)", l.name, l.confidence * 100.0))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let ctx = &photo.context;

    fill_template(
        PHOTO_ANALYSIS_PROMPT,
        &[
            ("trade", ctx.trade.as_deref().unwrap_or("unspecified")),
            ("address", ctx.address.as_deref().unwrap_or("unspecified")),
            ("notes", ctx.notes.as_deref().unwrap_or("none")),
            ("labels", &labels_text),
            ("evidence_instruction", EVIDENCE_INSTRUCTION),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::JobContext;
    use uuid::Uuid;

    fn photo(context: JobContext) -> PhotoInput {
        PhotoInput {
            photo_id: Uuid::new_v4(),
            s3_key: "jobs/x/photos/y.jpg".to_string(),
            content_type: "image/jpeg".to_string(),
            bytes: vec![1, 2, 3],
            context,
        }
    }

    #[test]
    fn test_prompt_includes_context_and_labels() {
        let p = photo(JobContext {
            trade: Some("roofing".to_string()),
            address: Some("12 Elm St".to_string()),
            notes: None,
        });
        let labels = vec![DetectedLabel {
            name: "Roof".to_string(),
            confidence: 0.91,
        }];
        let prompt = build_photo_prompt(&p, &labels);
        assert!(prompt.contains("Trade: roofing"));
        assert!(prompt.contains("Address: 12 Elm St"));
        assert!(prompt.contains("Contractor notes: none"));
        assert!(prompt.contains("- Roof (91%)"));
        assert!(!prompt.contains("{evidence_instruction}"));
    }

    #[test]
    fn test_prompt_without_labels() {
        let prompt = build_photo_prompt(&photo(JobContext::default()), &[]);
        assert!(prompt.contains("(none)"));
        assert!(prompt.contains("Trade: unspecified"));
    }

    #[test]
    fn test_notes_are_not_expanded() {
        let p = photo(JobContext {
            trade: Some("{notes}".to_string()),
            address: None,
            notes: Some("customer wrote {labels} and {trade}".to_string()),
        });
        let prompt = build_photo_prompt(&p, &[]);
        assert!(prompt.contains("Trade: {notes}"));
        assert!(prompt.contains("Contractor notes: customer wrote {labels} and {trade}"));
        assert_eq!(prompt.matches("(none)").count(), 1);
    }

    #[test]
    fn test_schema_asks_for_labels() {
        assert!(PHOTO_ANALYSIS_PROMPT.contains(r#""labels": ["#));
        let prompt = build_photo_prompt(&photo(JobContext::default()), &[]);
        assert!(prompt.contains(r#""confidence": number between 0 and 1}"#));
    }
}
