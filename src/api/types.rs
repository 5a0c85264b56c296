use serde::Serialize;

const PROMPT_PREVIEW_CHARS: usize = 100;

/// Successful `/generate` response
#[derive(Debug, Clone, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub keywords: String,
    pub personality: String,
    pub prompt_used: String,
}

impl GenerateResponse {
    pub fn new(keywords: String, personality: &str, prompt: &str) -> Self {
        Self {
            success: true,
            keywords,
            personality: personality.to_string(),
            prompt_used: prompt_preview(prompt),
        }
    }
}

/// First hundred characters of the prompt, always followed by an ellipsis.
pub fn prompt_preview(prompt: &str) -> String {
    let mut preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
    preview.push_str("...");
    preview
}

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_prompt_still_gets_ellipsis() {
        assert_eq!(prompt_preview("0123456789"), "0123456789...");
    }

    #[test]
    fn long_prompt_is_cut_at_100_chars() {
        let prompt = "x".repeat(250);
        let preview = prompt_preview(&prompt);
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("x..."));
    }

    #[test]
    fn preview_counts_characters_not_bytes() {
        let prompt = "é".repeat(120);
        let preview = prompt_preview(&prompt);
        assert_eq!(preview, format!("{}...", "é".repeat(100)));
    }
}
