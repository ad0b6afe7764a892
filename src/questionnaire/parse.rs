use super::sanitize::{sanitize, slice_array_span};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionKind {
    Radio,
    Checkbox,
    Range,
    Text,
    Scale,
}

impl QuestionKind {
    fn from_value(v: Option<&Value>) -> Self {
        match v.and_then(Value::as_str) {
            Some("radio") => Self::Radio,
            Some("checkbox") => Self::Checkbox,
            Some("range") => Self::Range,
            Some("scale") => Self::Scale,
            // Out-of-enum or missing types are coerced to free text.
            _ => Self::Text,
        }
    }

    pub fn has_options(self) -> bool {
        matches!(self, Self::Radio | Self::Checkbox)
    }

    pub fn has_bounds(self) -> bool {
        matches!(self, Self::Range | Self::Scale)
    }
}

/// A fully normalized questionnaire item. Every value handed to callers
/// satisfies the schema: `options` present iff radio/checkbox, `min`/`max`
/// present iff range/scale — never a partially-typed element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// Sanitize, parse and normalize a raw model response into questions.
pub fn parse_questions(raw: &str) -> anyhow::Result<Vec<Question>> {
    let text = sanitize(raw);

    let value: Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(_) => {
            // Last resort: re-extract the outermost array span and clean
            // it up once more before giving up.
            let span = slice_array_span(&text);
            if !span.starts_with('[') {
                return Err(anyhow!("no JSON array found in response"));
            }
            let cleaned = sanitize(&span);
            serde_json::from_str(&cleaned).context("no JSON array found in response")?
        }
    };

    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("response is not a JSON array"))?;

    Ok(items
        .iter()
        .enumerate()
        .map(|(i, item)| normalize_question(item, i))
        .collect())
}

fn normalize_question(item: &Value, index: usize) -> Question {
    let kind = QuestionKind::from_value(item.get("type"));

    let id = item
        .get("id")
        .and_then(question_id)
        .unwrap_or((index + 1) as u32);

    let text = item
        .get("text")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Question {}", index + 1));

    let required = item.get("required").map(truthy).unwrap_or(false);

    let options = kind.has_options().then(|| {
        item.get("options")
            .and_then(Value::as_array)
            .map(|opts| opts.iter().map(value_to_string).collect())
            .unwrap_or_else(|| vec!["Yes".to_string(), "No".to_string()])
    });

    let (min, max) = if kind.has_bounds() {
        (
            Some(finite_number(item.get("min")).unwrap_or(1.0)),
            Some(finite_number(item.get("max")).unwrap_or(10.0)),
        )
    } else {
        (None, None)
    };

    Question {
        id,
        text,
        kind,
        required,
        options,
        min,
        max,
    }
}

/// Coerce whatever the model put in `id` into a u32: numbers are rounded
/// and clamped, numeric strings parsed. Anything else yields None and the
/// caller assigns the positional id.
fn question_id(v: &Value) -> Option<u32> {
    match v {
        Value::Number(n) => {
            let f = n.as_f64().filter(|f| f.is_finite())?;
            Some(f.round().clamp(0.0, u32::MAX as f64) as u32)
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::Null => false,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn finite_number(v: Option<&Value>) -> Option<f64> {
    v.and_then(Value::as_f64).filter(|f| f.is_finite())
}
