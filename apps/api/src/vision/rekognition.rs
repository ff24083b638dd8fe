//! AWS Rekognition label detection, used as cheap hints for the vision prompt.

use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Image, S3Object};
use tracing::debug;

use crate::errors::AppError;
use crate::vision::DetectedLabel;

const MAX_LABELS: i32 = 25;
const MIN_CONFIDENCE: f32 = 70.0;
/// Rekognition rejects inline image bytes above this size; larger photos are read from S3.
const MAX_INLINE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Clone)]
pub struct RekognitionLabeler {
    client: aws_sdk_rekognition::Client,
    bucket: String,
}

impl RekognitionLabeler {
    pub fn new(client: aws_sdk_rekognition::Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    pub async fn detect_labels(
        &self,
        s3_key: &str,
        bytes: &[u8],
    ) -> Result<Vec<DetectedLabel>, AppError> {
        let image = if bytes.len() <= MAX_INLINE_BYTES {
            Image::builder().bytes(Blob::new(bytes.to_vec())).build()
        } else {
            Image::builder()
                .s3_object(S3Object::builder().bucket(&self.bucket).name(s3_key).build())
                .build()
        };

        let output = self
            .client
            .detect_labels()
            .image(image)
            .max_labels(MAX_LABELS)
            .min_confidence(MIN_CONFIDENCE)
            .send()
            .await
            .map_err(|e| AppError::Vision(format!("Rekognition failed for {s3_key}: {e}")))?;

        let labels = to_detected_labels(
            output
                .labels()
                .iter()
                .map(|l| (l.name(), l.confidence())),
        );
        debug!("Rekognition returned {} labels for {}", labels.len(), s3_key);
        Ok(labels)
    }
}

/// Confidence comes back as a percentage; findings store it as 0..1.
fn to_detected_labels<'a>(
    raw: impl Iterator<Item = (Option<&'a str>, Option<f32>)>,
) -> Vec<DetectedLabel> {
    let mut labels: Vec<DetectedLabel> = raw
        .filter_map(|(name, confidence)| {
            let name = name?.trim();
            (!name.is_empty()).then(|| DetectedLabel {
                name: name.to_string(),
                confidence: (confidence.unwrap_or(0.0) / 100.0).clamp(0.0, 1.0),
            })
        })
        .collect();
    labels.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_scaled_sorted_and_filtered() {
        let raw = vec![
            (Some("Roof"), Some(88.0)),
            (None, Some(99.0)),
            (Some("  "), Some(95.0)),
            (Some("Shingle"), Some(97.5)),
        ];
        let labels = to_detected_labels(raw.into_iter());
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].name, "Shingle");
        assert!((labels[0].confidence - 0.975).abs() < 1e-6);
        assert_eq!(labels[1].name, "Roof");
    }
}
