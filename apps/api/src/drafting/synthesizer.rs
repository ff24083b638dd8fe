//! Draft synthesis: one LLM call that turns `JobFindings` into a `DraftPayload`,
//! retried with the validation problems fed back when the draft is malformed.

use std::future::Future;

use tracing::{info, warn};

use crate::drafting::aggregate::JobFindings;
use crate::drafting::draft::{validate_draft, DraftPayload};
use crate::drafting::prompts::{DRAFT_PROMPT_TEMPLATE, DRAFT_SYSTEM, RETRY_FEEDBACK_TEMPLATE};
use crate::errors::AppError;
use crate::llm_client::prompts::{fill_template, EVIDENCE_INSTRUCTION, PRICING_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};
use crate::models::job::MobileJobRow;

/// Extra attempts after the first when the draft fails validation.
const MAX_SYNTHESIS_RETRIES: u32 = 2;

pub async fn synthesize_draft(
    llm: &LlmClient,
    job: &MobileJobRow,
    findings: &JobFindings,
) -> Result<DraftPayload, AppError> {
    synthesize_with(job, findings, move |prompt: String| async move {
        llm.call_json::<DraftPayload>(&prompt, DRAFT_SYSTEM).await
    })
    .await
}

/// The attempt loop around `call`, which sends one prompt to the model.
async fn synthesize_with<F, Fut>(
    job: &MobileJobRow,
    findings: &JobFindings,
    mut call: F,
) -> Result<DraftPayload, AppError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<DraftPayload, LlmError>>,
{
    let findings_json = serde_json::to_string_pretty(findings)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to serialize findings: {e}")))?;

    let mut problems: Vec<String> = Vec::new();

    for attempt in 0..=MAX_SYNTHESIS_RETRIES {
        let prompt = build_draft_prompt(job, &findings_json, &problems);

        let draft = match call(prompt).await {
            Ok(d) => d,
            Err(LlmError::Parse(e)) => {
                warn!(
                    "Draft attempt {}/{} for job {} returned unparseable JSON: {e}",
                    attempt + 1,
                    MAX_SYNTHESIS_RETRIES + 1,
                    job.id
                );
                problems = vec![format!("the response was not valid JSON for the schema: {e}")];
                continue;
            }
            Err(e) => return Err(AppError::Llm(format!("Draft synthesis failed: {e}"))),
        };

        match validate_draft(&draft) {
            Ok(()) => {
                info!(
                    "Draft for job {} synthesized on attempt {}",
                    job.id,
                    attempt + 1
                );
                return Ok(draft);
            }
            Err(found) => {
                warn!(
                    "Draft attempt {}/{} for job {} rejected: {}",
                    attempt + 1,
                    MAX_SYNTHESIS_RETRIES + 1,
                    job.id,
                    found.join("; ")
                );
                problems = found;
            }
        }
    }

    Err(AppError::Llm(format!(
        "Draft synthesis failed after {} attempts: {}",
        MAX_SYNTHESIS_RETRIES + 1,
        problems.join("; ")
    )))
}

fn build_draft_prompt(job: &MobileJobRow, findings_json: &str, problems: &[String]) -> String {
    let retry_feedback = if problems.is_empty() {
        String::new()
    } else {
        let list = problems
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n");
        fill_template(RETRY_FEEDBACK_TEMPLATE, &[("problems", &list)])
    };

    fill_template(
        DRAFT_PROMPT_TEMPLATE,
        &[
            ("customer_name", &job.customer_name),
            ("address", job.address.as_deref().unwrap_or("unspecified")),
            ("trade", job.trade.as_deref().unwrap_or("general")),
            ("notes", job.notes.as_deref().unwrap_or("none")),
            ("evidence_instruction", EVIDENCE_INSTRUCTION),
            ("pricing_instruction", PRICING_INSTRUCTION),
            ("retry_feedback", &retry_feedback),
            ("findings_json", findings_json),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafting::draft::{DraftPackage, Tier};
    use crate::proposals::pricing::ScopeItem;
    use chrono::Utc;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn job() -> MobileJobRow {
        MobileJobRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            customer_name: "Dana Ortiz".to_string(),
            address: None,
            trade: Some("roofing".to_string()),
            notes: None,
            status: "drafting".to_string(),
            draft: None,
            draft_error: None,
            draft_attempts: 1,
            proposal_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_prompt_has_no_feedback() {
        let prompt = build_draft_prompt(&job(), "{}", &[]);
        assert!(prompt.contains("Customer: Dana Ortiz"));
        assert!(prompt.contains("Trade: roofing"));
        assert!(prompt.contains("Address: unspecified"));
        assert!(!prompt.contains("REJECTED"));
        assert!(!prompt.contains("{retry_feedback}"));
    }

    #[test]
    fn test_retry_prompt_lists_problems() {
        let problems = vec![
            "expected one BEST package, found 0".to_string(),
            "GOOD package is priced at zero".to_string(),
        ];
        let prompt = build_draft_prompt(&job(), "{}", &problems);
        assert!(prompt.contains("REJECTED"));
        assert!(prompt.contains("- expected one BEST package, found 0"));
        assert!(prompt.contains("- GOOD package is priced at zero"));
    }

    #[test]
    fn test_findings_are_not_expanded() {
        let prompt = build_draft_prompt(&job(), r#"{"note": "{trade}"}"#, &[]);
        assert!(prompt.contains(r#"{"note": "{trade}"}"#));
    }

    #[test]
    fn test_user_text_is_not_expanded() {
        let mut job = job();
        job.customer_name = "{findings_json}".to_string();
        job.notes = Some("see {customer_name} and {retry_feedback}".to_string());
        let prompt = build_draft_prompt(&job, r#"{"analyzed_count": 4}"#, &[]);
        assert!(prompt.contains("Customer: {findings_json}"));
        assert!(prompt.contains("Contractor notes: see {customer_name} and {retry_feedback}"));
        assert_eq!(prompt.matches(r#""analyzed_count": 4"#).count(), 1);
    }

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
            summary: "Roof needs work".to_string(),
            packages,
            assumptions: vec![],
            exclusions: vec![],
            warnings: vec![],
        }
    }

    fn valid_draft() -> DraftPayload {
        draft(vec![
            package(Tier::Good, 10_000),
            package(Tier::Better, 15_000),
            package(Tier::Best, 22_000),
        ])
    }

    fn parse_error() -> LlmError {
        LlmError::Parse(serde_json::from_str::<serde_json::Value>("not json").unwrap_err())
    }

    #[tokio::test]
    async fn test_invalid_drafts_exhaust_retries() {
        let prompts = Mutex::new(Vec::new());
        let result = synthesize_with(&job(), &JobFindings::default(), |prompt| {
            prompts.lock().unwrap().push(prompt);
            async { Ok(draft(vec![package(Tier::Good, 10_000)])) }
        })
        .await;

        match result {
            Err(AppError::Llm(msg)) => assert!(msg.contains("after 3 attempts"), "{msg}"),
            other => panic!("unexpected result: {other:?}"),
        }
        let prompts = prompts.into_inner().unwrap();
        assert_eq!(prompts.len(), MAX_SYNTHESIS_RETRIES as usize + 1);
        assert!(!prompts[0].contains("REJECTED"));
        assert!(prompts[1].contains("expected one BEST package, found 0"));
    }

    #[tokio::test]
    async fn test_parse_error_is_retried_with_feedback() {
        let prompts = Mutex::new(Vec::new());
        let result = synthesize_with(&job(), &JobFindings::default(), |prompt| {
            let mut prompts = prompts.lock().unwrap();
            prompts.push(prompt);
            let first = prompts.len() == 1;
            async move {
                if first {
                    Err(parse_error())
                } else {
                    Ok(valid_draft())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), valid_draft());
        let prompts = prompts.into_inner().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_api_error_is_not_retried() {
        let mut calls = 0;
        let result = synthesize_with(&job(), &JobFindings::default(), |_| {
            calls += 1;
            async {
                Err(LlmError::Api {
                    status: 401,
                    message: "invalid x-api-key".to_string(),
                })
            }
        })
        .await;

        assert!(matches!(result, Err(AppError::Llm(_))));
        assert_eq!(calls, 1);
    }
}
