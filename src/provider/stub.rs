use super::{ChatMessage, Provider};

/// Offline provider for development and tests: answers every conversation
/// with a canned, schema-valid questionnaire array so the downstream
/// parsing pipeline can run without network access or tokens.
#[derive(Debug, Default, Clone)]
pub struct StubProvider;

impl StubProvider {
    pub fn new() -> Self {
        Self
    }

    pub const CANNED_RESPONSE: &'static str = r#"[
  {"id": 1, "text": "What is your chief complaint?", "type": "text", "required": true},
  {"id": 2, "text": "Do you currently have a fever?", "type": "radio", "required": true, "options": ["Yes", "No"]},
  {"id": 3, "text": "Rate your pain today.", "type": "scale", "required": true, "min": 1, "max": 10},
  {"id": 4, "text": "Which symptoms apply?", "type": "checkbox", "required": false, "options": ["Cough", "Headache", "Nausea", "Fatigue"]},
  {"id": 5, "text": "How many hours did you sleep last night?", "type": "range", "required": false, "min": 0, "max": 14},
  {"id": 6, "text": "List any current medications.", "type": "text", "required": false},
  {"id": 7, "text": "Do you have any known allergies?", "type": "radio", "required": true, "options": ["Yes", "No"]},
  {"id": 8, "text": "Describe any recent injuries.", "type": "text", "required": false},
  {"id": 9, "text": "Have you had shortness of breath?", "type": "radio", "required": true, "options": ["Yes", "No"]},
  {"id": 10, "text": "Rate your stress level this week.", "type": "scale", "required": false, "min": 1, "max": 10},
  {"id": 11, "text": "Which vaccinations have you had this year?", "type": "checkbox", "required": false, "options": ["Influenza", "COVID-19", "Tetanus", "None"]},
  {"id": 12, "text": "How many days have you felt unwell?", "type": "range", "required": true, "min": 0, "max": 30},
  {"id": 13, "text": "Do you smoke?", "type": "radio", "required": true, "options": ["Yes", "No"]},
  {"id": 14, "text": "Describe your appetite recently.", "type": "text", "required": false},
  {"id": 15, "text": "Any family history of chronic illness?", "type": "text", "required": false}
]"#;
}

impl Provider for StubProvider {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn send_chat(
        &self,
        _messages: Vec<ChatMessage>,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = anyhow::Result<String>> + Send>,
    > {
        Box::pin(async { Ok(Self::CANNED_RESPONSE.to_string()) })
    }
}
