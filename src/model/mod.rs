mod loader;
mod t5;

pub use loader::load_model;
pub use t5::T5Model;

use candle_core::Tensor;
use crate::error::{InferenceError, Result};

/// Encoder-decoder model driven step by step by the keyword generator.
pub trait Seq2SeqModel: Send {
    /// Encodes a `(batch, seq)` tensor of prompt ids.
    fn encode(&mut self, input_ids: &Tensor) -> Result<Tensor>;

    /// Runs the decoder over the full `(batch, len)` prefix and returns the
    /// `(batch, vocab)` logits of the last position.
    fn decode(&mut self, decoder_input_ids: &Tensor, encoder_output: &Tensor) -> Result<Tensor>;

    fn reset_cache(&mut self);

    fn decoder_start_token_id(&self) -> u32;

    fn eos_token_id(&self) -> u32;

    fn vocab_size(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelArchitecture {
    T5,
}

/// Detect model architecture from config.json
pub fn detect_architecture(config: &serde_json::Value) -> Result<ModelArchitecture> {
    if let Some(archs) = config.get("architectures").and_then(|v| v.as_array()) {
        for arch in archs.iter().filter_map(|a| a.as_str()) {
            let arch_lower = arch.to_lowercase();
            if arch_lower.starts_with("t5") || arch_lower.starts_with("mt5") {
                return Ok(ModelArchitecture::T5);
            }
        }
    }

    if let Some(model_type) = config.get("model_type").and_then(|v| v.as_str()) {
        if matches!(model_type.to_lowercase().as_str(), "t5" | "mt5") {
            return Ok(ModelArchitecture::T5);
        }
    }

    Err(InferenceError::Config(format!(
        "unsupported architecture (architectures={}, model_type={})",
        config.get("architectures").unwrap_or(&serde_json::Value::Null),
        config.get("model_type").unwrap_or(&serde_json::Value::Null),
    )))
}
