//! Folds per-photo findings into one job-level picture for the draft prompt.
//!
//! Pure and deterministic: the same photos in the same order always produce
//! the same `JobFindings`.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vision::{PhotoFindings, Severity};

const TOP_LABELS: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedObservation {
    pub issue: String,
    pub locations: Vec<String>,
    pub severity: Severity,
    pub occurrences: u32,
    pub photo_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoMeasurement {
    pub photo_id: Uuid,
    pub label: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCount {
    pub name: String,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobFindings {
    pub analyzed_count: usize,
    pub failed_count: usize,
    pub summaries: Vec<String>,
    pub observations: Vec<AggregatedObservation>,
    pub materials: Vec<String>,
    pub measurements: Vec<PhotoMeasurement>,
    pub recommended_work: Vec<String>,
    pub top_labels: Vec<LabelCount>,
    pub overall_severity: Option<Severity>,
    pub mean_confidence: f32,
}

/// Case- and whitespace-insensitive key used for de-duplication.
fn dedup_key(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn push_unique(target: &mut Vec<String>, seen: &mut HashSet<String>, value: &str) {
    let key = dedup_key(value);
    if !key.is_empty() && seen.insert(key) {
        target.push(value.trim().to_string());
    }
}

pub fn aggregate_findings(analyzed: &[(Uuid, PhotoFindings)], failed_count: usize) -> JobFindings {
    let mut observations: Vec<AggregatedObservation> = Vec::new();
    let mut observation_index: HashMap<String, usize> = HashMap::new();
    let mut materials = Vec::new();
    let mut seen_materials = HashSet::new();
    let mut work = Vec::new();
    let mut seen_work = HashSet::new();
    let mut measurements = Vec::new();
    let mut summaries = Vec::new();
    let mut label_counts: HashMap<String, (String, u32)> = HashMap::new();
    let mut confidence_sum = 0.0f32;

    for (photo_id, findings) in analyzed {
        if !findings.summary.is_empty() {
            summaries.push(findings.summary.clone());
        }
        confidence_sum += findings.confidence;

        for obs in &findings.observations {
            let key = dedup_key(&obs.issue);
            if key.is_empty() {
                continue;
            }
            let idx = *observation_index.entry(key).or_insert_with(|| {
                observations.push(AggregatedObservation {
                    issue: obs.issue.trim().to_string(),
                    locations: Vec::new(),
                    severity: obs.severity,
                    occurrences: 0,
                    photo_ids: Vec::new(),
                });
                observations.len() - 1
            });
            let agg = &mut observations[idx];
            agg.occurrences += 1;
            agg.severity = agg.severity.max(obs.severity);
            if !agg.photo_ids.contains(photo_id) {
                agg.photo_ids.push(*photo_id);
            }
            if let Some(loc) = &obs.location {
                if !agg.locations.iter().any(|l| dedup_key(l) == dedup_key(loc)) {
                    agg.locations.push(loc.clone());
                }
            }
        }

        for m in &findings.materials {
            push_unique(&mut materials, &mut seen_materials, m);
        }
        for w in &findings.recommended_work {
            push_unique(&mut work, &mut seen_work, w);
        }
        for m in &findings.measurements {
            measurements.push(PhotoMeasurement {
                photo_id: *photo_id,
                label: m.label.clone(),
                value: m.value,
                unit: m.unit.clone(),
            });
        }

        // A label counts once per photo.
        let mut photo_labels: Vec<String> =
            findings.labels.iter().map(|l| dedup_key(&l.name)).collect();
        photo_labels.sort();
        photo_labels.dedup();
        for key in photo_labels {
            let display = findings
                .labels
                .iter()
                .find(|l| dedup_key(&l.name) == key)
                .map(|l| l.name.clone())
                .unwrap_or_else(|| key.clone());
            label_counts.entry(key).or_insert((display, 0)).1 += 1;
        }
    }

    // Most severe first, then most frequently seen; ties keep first-seen order.
    observations.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(b.occurrences.cmp(&a.occurrences))
    });

    let mut top_labels: Vec<LabelCount> = label_counts
        .into_values()
        .map(|(name, count)| LabelCount { name, count })
        .collect();
    top_labels.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    top_labels.truncate(TOP_LABELS);

    let overall_severity = observations.iter().map(|o| o.severity).max();
    let mean_confidence = if analyzed.is_empty() {
        0.0
    } else {
        confidence_sum / analyzed.len() as f32
    };

    JobFindings {
        analyzed_count: analyzed.len(),
        failed_count,
        summaries,
        observations,
        materials,
        measurements,
        recommended_work: work,
        top_labels,
        overall_severity,
        mean_confidence,
    }
}
