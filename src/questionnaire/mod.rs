pub mod parse;
pub mod sanitize;

pub use parse::{Question, QuestionKind};

use crate::provider::{ChatMessage, Provider};
use anyhow::Context;
use parse::parse_questions;
use serde_json::Value;

/// Produces a validated clinical questionnaire from free-form patient
/// context, tolerating an unreliable upstream generator: one generation
/// call, then at most one repair round-trip before failing for good. No
/// fallback content is ever fabricated here; unrecoverable failures are
/// the caller's to handle.
pub struct QuestionnaireGenerator {
    provider: Box<dyn Provider + Send + Sync>,
}

impl QuestionnaireGenerator {
    pub fn new(provider: Box<dyn Provider + Send + Sync>) -> Self {
        Self { provider }
    }

    pub async fn generate(&self, context: &Value) -> anyhow::Result<Vec<Question>> {
        let context_summary =
            serde_json::to_string(context).context("failed to serialize patient context")?;

        let messages = vec![
            ChatMessage::system(generation_prompt(&context_summary)),
            ChatMessage::user(USER_REMINDER),
        ];

        let response = self
            .provider
            .send_chat(messages)
            .await
            .context("AI questionnaire generation failed")?;

        match parse_questions(&response) {
            Ok(questions) => Ok(questions),
            Err(parse_err) => {
                tracing::debug!("first parse failed, attempting repair: {parse_err:#}");
                self.repair(response).await
            }
        }
    }

    /// One-shot repair: feed the model its own malformed output together
    /// with the exact schema and re-run the parse. No further retries.
    async fn repair(&self, failed_response: String) -> anyhow::Result<Vec<Question>> {
        let messages = vec![
            ChatMessage::system(REPAIR_INSTRUCTIONS),
            ChatMessage::user(failed_response),
        ];

        let repaired = self
            .provider
            .send_chat(messages)
            .await
            .context("AI questionnaire repair call failed")?;

        parse_questions(&repaired)
            .context("failed to parse AI-generated questionnaire, even after repair")
    }
}

fn generation_prompt(context_summary: &str) -> String {
    format!(
        r#"You are a medical questionnaire generator. Using the provided patient context, generate a thorough clinical questionnaire designed to capture symptoms, vitals, relevant history, and document-relevant questions.

STRICT OUTPUT FORMAT (CRITICAL):
- Return ONLY valid JSON.
- Output must be ONLY a valid JSON array (no prose, no markdown, no backticks, no code fences).
- Use double quotes for all keys and string values.
- Include at least 15 items.
- Each item MUST include exactly these fields: id (number), text (string), type (one of: "radio", "checkbox", "range", "text", "scale"), required (boolean).
- Include an "options" (array of strings) ONLY when type is "radio" or "checkbox".
- For type "range" or "scale", include numeric min and max fields.
- Keep wording concise and clinically relevant.
- Use the patient context to tailor a subset of questions.

EXAMPLE (FORMAT ONLY, NOT CONTENT):
[
  {{"id": 1, "text": "Chief complaint?", "type": "text", "required": true}},
  {{"id": 2, "text": "Do you have a fever?", "type": "radio", "required": true, "options": ["Yes", "No"]}}
]

Return ONLY the JSON array. Do not include any text before or after.

Patient context: {context_summary}"#
    )
}

const USER_REMINDER: &str = "Return ONLY valid JSON. Output only the JSON array of questions as described. No commentary. No markdown or code fences.";

const REPAIR_INSTRUCTIONS: &str = r#"You will receive a draft questionnaire response that may contain prose or invalid JSON. Convert it into a VALID JSON array that follows this schema EXACTLY and return ONLY valid JSON (no prose, no markdown, no code fences):
- Each item: { id:number, text:string, type:"radio"|"checkbox"|"range"|"text"|"scale", required:boolean, options?:string[], min?:number, max?:number }
- Use double quotes for all keys and string values.
- Include at least 15 items.
- Include options only for radio/checkbox.
- Include min and max only for range/scale."#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::stub::StubProvider;
    use crate::provider::Role;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays a fixed sequence of replies and records every conversation
    /// it was sent.
    #[derive(Clone, Default)]
    struct ScriptedProvider {
        replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
        seen: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                replies: Arc::new(Mutex::new(
                    replies
                        .into_iter()
                        .map(|r| r.map(str::to_string).map_err(str::to_string))
                        .collect(),
                )),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        fn conversation(&self, i: usize) -> Vec<ChatMessage> {
            self.seen.lock().unwrap()[i].clone()
        }
    }

    impl Provider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn send_chat(
            &self,
            messages: Vec<ChatMessage>,
        ) -> std::pin::Pin<
            Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>,
        > {
            let replies = self.replies.clone();
            let seen = self.seen.clone();
            Box::pin(async move {
                seen.lock().unwrap().push(messages);
                match replies.lock().unwrap().pop_front() {
                    Some(Ok(text)) => Ok(text),
                    Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
                    None => Err(anyhow::anyhow!("scripted provider ran out of replies")),
                }
            })
        }
    }

    fn valid_questionnaire() -> &'static str {
        StubProvider::CANNED_RESPONSE
    }

    #[tokio::test]
    async fn valid_response_parses_in_one_call() {
        let provider = ScriptedProvider::new(vec![Ok(valid_questionnaire())]);
        let generator = QuestionnaireGenerator::new(Box::new(provider.clone()));

        let questions = generator
            .generate(&serde_json::json!({"vitals": [], "uploads": []}))
            .await
            .unwrap();

        assert_eq!(questions.len(), 15);
        assert_eq!(provider.calls(), 1);
        for q in &questions {
            assert_eq!(q.options.is_some(), q.kind.has_options());
            assert_eq!(q.min.is_some(), q.kind.has_bounds());
            assert_eq!(q.max.is_some(), q.kind.has_bounds());
        }
    }

    #[tokio::test]
    async fn context_is_embedded_in_system_prompt() {
        let provider = ScriptedProvider::new(vec![Ok(valid_questionnaire())]);
        let generator = QuestionnaireGenerator::new(Box::new(provider.clone()));

        let context = serde_json::json!({"vitals": [{"spo2": 97}], "uploads": ["scan.pdf"]});
        generator.generate(&context).await.unwrap();

        let first = provider.conversation(0);
        assert_eq!(first[0].role, Role::System);
        assert!(first[0].content.contains(r#""uploads":["scan.pdf"]"#));
        assert!(first[0].content.contains("FORMAT ONLY"));
        assert_eq!(first[1].role, Role::User);
    }

    #[tokio::test]
    async fn invalid_then_repaired_succeeds() {
        let provider = ScriptedProvider::new(vec![
            Ok("Sorry, here is the questionnaire you asked for."),
            Ok(valid_questionnaire()),
        ]);
        let generator = QuestionnaireGenerator::new(Box::new(provider.clone()));

        let questions = generator.generate(&serde_json::json!({})).await.unwrap();
        assert_eq!(questions.len(), 15);
        assert_eq!(provider.calls(), 2);

        // The repair turn carries the raw failed output back to the model.
        let repair = provider.conversation(1);
        assert_eq!(repair[0].role, Role::System);
        assert!(repair[0].content.contains("VALID JSON array"));
        assert_eq!(
            repair[1].content,
            "Sorry, here is the questionnaire you asked for."
        );
    }

    #[tokio::test]
    async fn repair_failure_is_terminal_with_no_third_call() {
        let provider = ScriptedProvider::new(vec![
            Ok("not json"),
            Ok("still not json"),
            Ok(valid_questionnaire()),
        ]);
        let generator = QuestionnaireGenerator::new(Box::new(provider.clone()));

        let err = generator.generate(&serde_json::json!({})).await.unwrap_err();
        assert!(err.to_string().contains("failed to parse AI-generated questionnaire"));
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn provider_error_on_first_call_surfaces() {
        let provider = ScriptedProvider::new(vec![Err("OpenAI quota exceeded: HTTP 429")]);
        let generator = QuestionnaireGenerator::new(Box::new(provider.clone()));

        let err = generator.generate(&serde_json::json!({})).await.unwrap_err();
        assert!(format!("{err:#}").contains("quota"));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn stub_provider_round_trip() {
        let generator = QuestionnaireGenerator::new(Box::new(StubProvider::new()));
        let questions = generator.generate(&serde_json::json!({})).await.unwrap();
        assert_eq!(questions.len(), 15);
    }
}
