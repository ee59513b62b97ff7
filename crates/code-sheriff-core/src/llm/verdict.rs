use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::ClassifyError;
use crate::scanner::{Candidate, Verdict};

pub(crate) const SYSTEM_PROMPT: &str = "You are a security expert analyzing source code for malicious intent. Respond only with strict JSON: {\"is_malicious\": true|false, \"malicious_probability\": 0.0-1.0, \"reasoning\": \"...\", \"identified_threats\": [\"...\"]}.";

static FENCED_JSON: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*\n(.*?)\n?\s*```\s*$").expect("fence regex is valid")
});

/// User message asking the model to judge one file.
pub fn build_prompt(candidate: &Candidate, content: &str) -> String {
    format!(
        "Analyze the following {language} code from file '{path}' and determine if it contains malicious code.\n\
Malicious code includes but is not limited to: backdoors, data exfiltration, encryption for ransomware,\n\
system manipulation without consent, obfuscated harmful functionality.\n\n\
CODE TO ANALYZE:\n```\n{content}\n```\n\n\
Provide your analysis in the following JSON format:\n\
{{\n  \"is_malicious\": true/false,\n  \"malicious_probability\": 0.0-1.0,\n  \"reasoning\": \"why the code is or isn't considered malicious\",\n  \"identified_threats\": [\"specific\", \"threats\"]\n}}\n\n\
Only respond with valid JSON. Do not include any other text in your response.",
        language = candidate.language(),
        path = candidate.display_path(),
        content = content,
    )
}

#[derive(Deserialize)]
struct ModelVerdict {
    malicious_probability: f64,
    reasoning: String,
    #[serde(default)]
    identified_threats: Option<Vec<String>>,
}

/// Interpret the model's text output as a verdict.
pub fn parse_model_output(content: &str) -> Result<Verdict, ClassifyError> {
    let body = FENCED_JSON
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content)
        .trim();

    let verdict: ModelVerdict = serde_json::from_str(body)
        .map_err(|err| ClassifyError::MalformedResponse(format!("expected JSON verdict: {err}")))?;

    let probability = verdict.malicious_probability;
    if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
        return Err(ClassifyError::MalformedResponse(format!(
            "malicious_probability must be within 0.0..=1.0 (got {probability})"
        )));
    }

    Ok(Verdict {
        probability,
        reasoning: verdict.reasoning,
        threats: verdict
            .identified_threats
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let verdict = parse_model_output(
            r#"{"is_malicious": true, "malicious_probability": 0.95, "reasoning": "reverse shell", "identified_threats": ["backdoor", " "]}"#,
        )
        .unwrap();
        assert_eq!(verdict.probability, 0.95);
        assert_eq!(verdict.reasoning, "reverse shell");
        assert_eq!(verdict.threats, vec!["backdoor".to_string()]);
    }

    #[test]
    fn tolerates_markdown_fences() {
        let output = "```json\n{\"malicious_probability\": 0.1, \"reasoning\": \"benign\"}\n```";
        let verdict = parse_model_output(output).unwrap();
        assert_eq!(verdict.probability, 0.1);
        assert!(verdict.threats.is_empty());
    }

    #[test]
    fn null_threats_become_empty() {
        let verdict = parse_model_output(
            r#"{"malicious_probability": 0.0, "reasoning": "ok", "identified_threats": null}"#,
        )
        .unwrap();
        assert!(verdict.threats.is_empty());
    }

    #[test]
    fn missing_probability_is_malformed() {
        let err = parse_model_output(r#"{"is_malicious": false, "reasoning": "?"}"#).unwrap_err();
        assert!(matches!(err, ClassifyError::MalformedResponse(_)));
    }

    #[test]
    fn probability_out_of_range_is_malformed() {
        let err =
            parse_model_output(r#"{"malicious_probability": 1.2, "reasoning": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("0.0..=1.0"));
    }

    #[test]
    fn prose_is_malformed() {
        let err = parse_model_output("I think this file is fine.").unwrap_err();
        assert!(matches!(err, ClassifyError::MalformedResponse(_)));
    }

    #[test]
    fn prompt_names_file_and_language() {
        let prompt = build_prompt(&Candidate::new("src/run.sh"), "rm -rf /");
        assert!(prompt.contains("shell code from file 'src/run.sh'"));
        assert!(prompt.contains("rm -rf /"));
    }
}
