//! The draft payload: three priced packages a contractor picks from before
//! the draft becomes a real proposal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::drafting::aggregate::JobFindings;
use crate::proposals::pricing::{
    derive_price_range, subtotal_cents, validate_scope_items, ScopeItem,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Good,
    Better,
    Best,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Good, Tier::Better, Tier::Best];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Good => "GOOD",
            Tier::Better => "BETTER",
            Tier::Best => "BEST",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPackage {
    pub tier: Tier,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub line_items: Vec<ScopeItem>,
    /// Filled in by `normalize_draft`; model-supplied values are ignored.
    #[serde(default)]
    pub price_low_cents: i64,
    #[serde(default)]
    pub price_high_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPayload {
    pub summary: String,
    pub packages: Vec<DraftPackage>,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub exclusions: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl DraftPayload {
    pub fn package(&self, tier: Tier) -> Option<&DraftPackage> {
        self.packages.iter().find(|p| p.tier == tier)
    }
}

/// Checks the structural rules a draft must satisfy before it is shown.
/// Returns every problem found so a retry prompt can list them all.
pub fn validate_draft(draft: &DraftPayload) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if draft.packages.len() != Tier::ALL.len() {
        problems.push(format!(
            "expected exactly 3 packages, got {}",
            draft.packages.len()
        ));
    }

    for tier in Tier::ALL {
        let count = draft.packages.iter().filter(|p| p.tier == tier).count();
        if count != 1 {
            problems.push(format!("expected one {tier} package, found {count}"));
        }
    }

    for package in &draft.packages {
        if package.title.trim().is_empty() {
            problems.push(format!("{} package has no title", package.tier));
        }
        if let Err(e) = validate_scope_items(&package.line_items) {
            problems.push(format!("{} package: {e}", package.tier));
        } else if subtotal_cents(&package.line_items) <= 0 {
            problems.push(format!("{} package is priced at zero", package.tier));
        }
    }

    // Higher tiers must not be cheaper than lower ones.
    let subtotals: Vec<(Tier, i64)> = Tier::ALL
        .into_iter()
        .filter_map(|tier| draft.package(tier).map(|p| (tier, subtotal_cents(&p.line_items))))
        .collect();
    for pair in subtotals.windows(2) {
        let ((lower, lower_total), (higher, higher_total)) = (pair[0], pair[1]);
        if higher_total < lower_total {
            problems.push(format!(
                "{higher} package ({higher_total} cents) is cheaper than {lower} ({lower_total} cents)"
            ));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Orders packages by tier, recomputes each price range from its line items,
/// and records analysis gaps as warnings. Expects a draft that passed `validate_draft`.
pub fn normalize_draft(mut draft: DraftPayload, findings: &JobFindings) -> DraftPayload {
    draft.packages.sort_by_key(|p| p.tier);
    for package in &mut draft.packages {
        package.title = package.title.trim().to_string();
        package.description = package.description.trim().to_string();
        let (low, high) = derive_price_range(subtotal_cents(&package.line_items));
        package.price_low_cents = low;
        package.price_high_cents = high;
    }
    draft.summary = draft.summary.trim().to_string();

    if findings.failed_count > 0 {
        draft.warnings.push(format!(
            "{} of {} photos could not be analyzed; the scope may be incomplete.",
            findings.failed_count,
            findings.failed_count + findings.analyzed_count
        ));
    }
    if findings.analyzed_count > 0 && findings.mean_confidence < 0.5 {
        draft.warnings.push(
            "Photo analysis confidence was low; verify the scope on site.".to_string(),
        );
    }
    draft
}

#[cfg(test)]
mod tests {
    use super::*;

    fn package(tier: Tier, unit_price: i64) -> DraftPackage {
        DraftPackage {
            tier,
            title: format!("{tier} roof repair"),
            description: String::new(),
            line_items: vec![ScopeItem {
                description: "Replace shingles".to_string(),
                quantity: 10.0,
                unit: "sq".to_string(),
                unit_price_cents: unit_price,
            }],
            price_low_cents: 0,
            price_high_cents: 0,
        }
    }

    fn draft(packages: Vec<DraftPackage>) -> DraftPayload {
        DraftPayload {
            summary: " Roof needs work ".to_string(),
            packages,
            assumptions: vec![],
            exclusions: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn test_valid_draft_passes() {
        let d = draft(vec![
            package(Tier::Good, 300_00),
            package(Tier::Better, 400_00),
            package(Tier::Best, 550_00),
        ]);
        assert!(validate_draft(&d).is_ok());
    }

    #[test]
    fn test_tier_parsing_is_uppercase() {
        let tier: Tier = serde_json::from_str("\"BETTER\"").unwrap();
        assert_eq!(tier, Tier::Better);
        assert!(serde_json::from_str::<Tier>("\"better\"").is_err());
    }

    #[test]
    fn test_missing_and_duplicate_tiers_reported() {
        let d = draft(vec![
            package(Tier::Good, 300_00),
            package(Tier::Good, 400_00),
        ]);
        let problems = validate_draft(&d).unwrap_err();
        assert!(problems.iter().any(|p| p.contains("exactly 3")));
        assert!(problems.iter().any(|p| p.contains("one GOOD package, found 2")));
        assert!(problems.iter().any(|p| p.contains("one BEST package, found 0")));
    }

    #[test]
    fn test_price_inversion_reported() {
        let d = draft(vec![
            package(Tier::Good, 500_00),
            package(Tier::Better, 400_00),
            package(Tier::Best, 600_00),
        ]);
        let problems = validate_draft(&d).unwrap_err();
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("BETTER package"));
    }

    #[test]
    fn test_empty_and_zero_priced_packages_reported() {
        let mut empty = package(Tier::Good, 100);
        empty.line_items.clear();
        let d = draft(vec![empty, package(Tier::Better, 0), package(Tier::Best, 100)]);
        let problems = validate_draft(&d).unwrap_err();
        assert!(problems.iter().any(|p| p.starts_with("GOOD package")));
        assert!(problems.iter().any(|p| p.contains("BETTER package is priced at zero")));
    }

    #[test]
    fn test_normalize_orders_and_prices_packages() {
        let mut best = package(Tier::Best, 500_00);
        best.price_low_cents = 1;
        best.price_high_cents = 2;
        let d = draft(vec![best, package(Tier::Good, 300_00), package(Tier::Better, 400_00)]);
        let normalized = normalize_draft(d, &JobFindings {
            analyzed_count: 3,
            mean_confidence: 0.9,
            ..Default::default()
        });

        let tiers: Vec<_> = normalized.packages.iter().map(|p| p.tier).collect();
        assert_eq!(tiers, Tier::ALL.to_vec());
        let best = normalized.package(Tier::Best).unwrap();
        assert_eq!(best.price_low_cents, 5_000_00);
        assert_eq!(best.price_high_cents, 5_750_00);
        assert_eq!(normalized.summary, "Roof needs work");
        assert!(normalized.warnings.is_empty());
    }

    #[test]
    fn test_normalize_warns_about_failed_photos_and_low_confidence() {
        let d = draft(vec![
            package(Tier::Good, 100),
            package(Tier::Better, 200),
            package(Tier::Best, 300),
        ]);
        let normalized = normalize_draft(d, &JobFindings {
            analyzed_count: 2,
            failed_count: 1,
            mean_confidence: 0.3,
            ..Default::default()
        });
        assert_eq!(normalized.warnings.len(), 2);
        assert!(normalized.warnings[0].starts_with("1 of 3 photos"));
    }
}
