use crate::provider::{ChatMessage, Provider};
use crate::questionnaire::Question;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Coarse triage classification derived from report wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

pub fn severity_of(text: &str) -> Severity {
    let lower = text.to_ascii_lowercase();
    if lower.contains("emergency") || lower.contains("immediate") {
        return Severity::High;
    }
    if lower.contains("urgent") || lower.contains("soon") {
        return Severity::Medium;
    }
    Severity::Low
}

/// Render "question: answer" lines for the report prompt. Answers are
/// keyed by question id; list answers are comma-joined, missing ones
/// rendered as N/A.
pub fn answer_summary(questions: &[Question], answers: &Map<String, Value>) -> String {
    questions
        .iter()
        .map(|q| {
            let rendered = answers
                .get(&q.id.to_string())
                .map(render_answer)
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "N/A".to_string());
            format!("{}: {}", q.text, rendered)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_answer(v: &Value) -> String {
    match v {
        Value::Array(items) => items
            .iter()
            .map(render_answer)
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Ask the provider for a narrative report over completed questionnaire
/// answers: doctor-facing analysis first, then patient-facing advice.
pub async fn generate_report(
    provider: &(dyn Provider + Send + Sync),
    questions: &[Question],
    answers: &Map<String, Value>,
) -> anyhow::Result<String> {
    let summary = answer_summary(questions, answers);

    let messages = vec![
        ChatMessage::system(
            "Generate a health report based on questionnaire answers. \
             First provide a doctor-facing analysis, then patient-facing advice.",
        ),
        ChatMessage::user(summary),
    ];

    provider
        .send_chat(messages)
        .await
        .context("report generation failed")
}

/// Structured patient case for a full analysis request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientCase {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub symptoms: Value,
    #[serde(default)]
    pub vitals: Value,
    #[serde(default)]
    pub history: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub context: Value,
}

pub fn analysis_prompt(case: &PatientCase) -> String {
    let age = case
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let gender = case.gender.as_deref().unwrap_or("");
    let symptoms = compact_json(&case.symptoms);
    let vitals = compact_json(&case.vitals);
    let history = case.history.as_deref().unwrap_or("none");
    let medications = case.medications.as_deref().unwrap_or("none");
    let context = compact_json(&case.context);

    format!(
        r#"You are a medical diagnosis assistant analyzing:
- Patient: {age}yo {gender}
- Symptoms: {symptoms}
- Vitals: {vitals}
- History: {history}
- Medications: {medications}
- Context: {context}

Provide structured analysis with:
1. Differential Diagnosis (ranked)
2. Recommended Tests
3. Treatment Options
4. Risk Assessment
5. Follow-up Plan

Use medical terminology but explain complex terms. Format as markdown."#
    )
}

fn compact_json(v: &Value) -> String {
    match v {
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Ask the provider for a differential-diagnosis style case analysis.
/// Errors surface to the caller; no canned analysis is substituted.
pub async fn analyze_case(
    provider: &(dyn Provider + Send + Sync),
    case: &PatientCase,
) -> anyhow::Result<String> {
    let messages = vec![
        ChatMessage::system(analysis_prompt(case)),
        ChatMessage::user("Please analyze this case comprehensively."),
    ];

    provider
        .send_chat(messages)
        .await
        .context("case analysis failed")
}
