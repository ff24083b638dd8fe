// Draft synthesis prompt templates.

pub const DRAFT_SYSTEM: &str = "\
You are a senior residential estimator writing a proposal for a contractor. \
You turn aggregated job-site findings into three priced options. \
You MUST respond with valid JSON only. No markdown fences, no explanations.";

pub const DRAFT_PROMPT_TEMPLATE: &str = r#"Write a proposal draft for this job.

JOB:
Customer: {customer_name}
Address: {address}
Trade: {trade}
Contractor notes: {notes}

AGGREGATED PHOTO FINDINGS (JSON):
{findings_json}

{evidence_instruction}

{pricing_instruction}

Produce exactly three packages:
- GOOD: the minimum work that fixes the observed problems.
- BETTER: GOOD plus the most valuable preventive work.
- BEST: a complete, premium solution.
Each higher package must cost at least as much as the one below it.

OUTPUT SCHEMA (return exactly this structure):
{
  "summary": "2-3 sentences the homeowner will read",
  "packages": [
    {
      "tier": "GOOD" | "BETTER" | "BEST",
      "title": "string",
      "description": "string",
      "line_items": [
        {"description": "string", "quantity": number, "unit": "string", "unit_price_cents": integer}
      ]
    }
  ],
  "assumptions": ["string"],
  "exclusions": ["string"]
}
{retry_feedback}
Return ONLY the JSON object. Nothing else, no code fences."#;

pub const RETRY_FEEDBACK_TEMPLATE: &str = "
YOUR PREVIOUS ANSWER WAS REJECTED FOR THESE REASONS. Fix all of them:
{problems}
";
