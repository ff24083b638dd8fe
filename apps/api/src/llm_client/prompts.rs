// Shared prompt fragments. Each service that calls the LLM keeps its own
// prompts.rs alongside it; only cross-cutting instructions live here.

/// Keeps the model from inventing conditions it cannot see.
pub const EVIDENCE_INSTRUCTION: &str = "\
    CRITICAL: Only report conditions that are visible in the photos or stated in the findings. \
    Do NOT invent damage, measurements, or materials. \
    If something is uncertain, say so in an assumption instead of stating it as fact.";

/// Pricing instruction shared by every draft prompt.
pub const PRICING_INSTRUCTION: &str = "\
    All prices are integer US cents. unit_price_cents is the price for ONE unit. \
    Quantities must be positive. Use realistic residential contractor pricing for the region \
    if given, otherwise US national averages.";

/// Substitutes `{name}` placeholders in a single pass. Values are inserted
/// verbatim, so placeholder-looking text inside a value is never expanded.
/// Braces that do not name a known placeholder are kept as written.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let matched = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match matched {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_template_replaces_known_placeholders() {
        let out = fill_template("Hi {name}, {count} items", &[("name", "Dana"), ("count", "3")]);
        assert_eq!(out, "Hi Dana, 3 items");
    }

    #[test]
    fn test_fill_template_does_not_expand_values() {
        let out = fill_template(
            "A={a} B={b}",
            &[("a", "{b}"), ("b", "second")],
        );
        assert_eq!(out, "A={b} B=second");
    }

    #[test]
    fn test_fill_template_keeps_unknown_braces() {
        let out = fill_template(r#"{"k": {n}} {unknown} {"#, &[("n", "1")]);
        assert_eq!(out, r#"{"k": 1} {unknown} {"#);
    }
}
