use serde::Deserialize;

/// Closing instruction the keyword model was fine-tuned with.
pub const KEYWORD_INSTRUCTION: &str = "Keywords should be visual, searchable on Pinterest, \
and capture their aesthetic essence. The Culture, Role, Period and bio give important \
information about the personality. Take them into account when generating keywords";

/// Personality description posted to `/generate`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PersonalityPayload {
    pub personality_name: Option<String>,
    pub culture: Option<String>,
    pub role: Option<String>,
    pub period: Option<String>,
    pub bio: Option<String>,
}

impl PersonalityPayload {
    pub fn name(&self) -> &str {
        self.personality_name.as_deref().unwrap_or("")
    }

    /// `Label: value` fragments for the non-empty context fields.
    fn context(&self) -> Vec<String> {
        [
            ("Culture", &self.culture),
            ("Role", &self.role),
            ("Period", &self.period),
            ("Bio", &self.bio),
        ]
        .into_iter()
        .filter_map(|(label, value)| match value.as_deref() {
            Some(v) if !v.is_empty() => Some(format!("{}: {}", label, v)),
            _ => None,
        })
        .collect()
    }
}

pub fn build_prompt(payload: &PersonalityPayload) -> String {
    let mut parts = vec![format!("Generate Pinterest keywords for {}", payload.name())];

    let context = payload.context();
    if !context.is_empty() {
        parts.push(context.join(" | "));
    }

    parts.push(KEYWORD_INSTRUCTION.to_string());
    parts.join(" - ")
}
