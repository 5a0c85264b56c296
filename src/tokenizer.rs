use std::path::{Path, PathBuf};

use serde_json::Value;
use tokenizers::{PaddingParams, Tokenizer, TruncationParams};
use tracing::{info, warn};

use crate::error::{InferenceError, Result};

/// Named special tokens as declared by `tokenizer_config.json` or
/// `special_tokens_map.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecialTokens {
    pub pad_token: Option<String>,
    pub eos_token: Option<String>,
}

impl SpecialTokens {
    /// Reads the pad and eos declarations from the given JSON files; earlier
    /// files win. Missing files are skipped.
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut tokens = Self::default();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            let json: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
            tokens.merge(Self::from_json(&json));
        }
        Ok(tokens)
    }

    pub fn from_json(json: &Value) -> Self {
        Self {
            pad_token: token_content(json.get("pad_token")),
            eos_token: token_content(json.get("eos_token")),
        }
    }

    fn merge(&mut self, other: Self) {
        if self.pad_token.is_none() {
            self.pad_token = other.pad_token;
        }
        if self.eos_token.is_none() {
            self.eos_token = other.eos_token;
        }
    }
}

// Declarations are either a bare string or an AddedToken object.
fn token_content(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("content")?.as_str().map(str::to_string),
        _ => None,
    }
}

pub struct TokenizerWrapper {
    tokenizer: Tokenizer,
    pad_token_id: u32,
    eos_token_id: u32,
}

impl TokenizerWrapper {
    pub fn load(
        path: &Path,
        special_token_files: &[PathBuf],
        max_input_tokens: usize,
    ) -> Result<Self> {
        info!("Loading tokenizer from {:?}", path);
        let tokenizer =
            Tokenizer::from_file(path).map_err(|e| InferenceError::Tokenizer(e.to_string()))?;
        let special = SpecialTokens::from_files(special_token_files)?;

        let wrapper = Self::new(tokenizer, &special, max_input_tokens)?;
        info!(
            "Tokenizer loaded with {} tokens (pad={}, eos={})",
            wrapper.vocab_size(),
            wrapper.pad_token_id(),
            wrapper.eos_token_id()
        );
        Ok(wrapper)
    }

    /// Configures truncation and makes sure a padding token exists, falling
    /// back to the end-of-sequence token.
    pub fn new(
        mut tokenizer: Tokenizer,
        special: &SpecialTokens,
        max_input_tokens: usize,
    ) -> Result<Self> {
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_input_tokens,
                ..Default::default()
            }))
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        let eos = special
            .eos_token
            .as_deref()
            .and_then(|t| tokenizer.token_to_id(t).map(|id| (t.to_string(), id)))
            .or_else(|| {
                ["</s>", "<|endoftext|>", "<eos>"]
                    .into_iter()
                    .find_map(|t| tokenizer.token_to_id(t).map(|id| (t.to_string(), id)))
            });

        let pad = match tokenizer.get_padding() {
            Some(params) => Some((params.pad_token.clone(), params.pad_id)),
            None => special
                .pad_token
                .as_deref()
                .and_then(|t| tokenizer.token_to_id(t).map(|id| (t.to_string(), id))),
        };

        let (pad_token, pad_token_id) = match (pad, &eos) {
            (Some(pad), _) => pad,
            (None, Some(eos)) => {
                warn!("Tokenizer has no padding token, using {:?}", eos.0);
                eos.clone()
            }
            (None, None) => {
                return Err(InferenceError::Tokenizer(
                    "tokenizer defines neither a padding nor an end-of-sequence token"
                        .to_string(),
                ))
            }
        };
        let eos_token_id = eos.map(|(_, id)| id).unwrap_or(pad_token_id);

        tokenizer.with_padding(Some(PaddingParams {
            pad_id: pad_token_id,
            pad_token,
            ..Default::default()
        }));

        Ok(Self {
            tokenizer,
            pad_token_id,
            eos_token_id,
        })
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))?;

        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, true)
            .map_err(|e| InferenceError::Tokenizer(e.to_string()))
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }

    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    pub fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Whitespace word-level tokenizer over `words`, with `<pad>`, `</s>`
    /// and `<unk>` at ids 0, 1 and 2.
    pub(crate) fn word_level(words: &[&str], with_pad: bool) -> Tokenizer {
        let mut vocab = serde_json::Map::new();
        let mut added = Vec::new();
        let specials: &[&str] = if with_pad {
            &["<pad>", "</s>", "<unk>"]
        } else {
            &["</s>", "<unk>"]
        };
        for (id, token) in specials.iter().chain(words.iter()).enumerate() {
            vocab.insert(token.to_string(), json!(id));
            if specials.contains(token) {
                added.push(json!({
                    "id": id,
                    "content": token,
                    "single_word": false,
                    "lstrip": false,
                    "rstrip": false,
                    "normalized": false,
                    "special": true
                }));
            }
        }
        let definition = json!({
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": added,
            "normalizer": null,
            "pre_tokenizer": { "type": "Whitespace" },
            "post_processor": null,
            "decoder": null,
            "model": { "type": "WordLevel", "vocab": vocab, "unk_token": "<unk>" }
        });
        Tokenizer::from_bytes(definition.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn reads_plain_and_object_declarations() {
        let special = SpecialTokens::from_json(&json!({
            "pad_token": "<pad>",
            "eos_token": { "content": "</s>", "special": true }
        }));
        assert_eq!(special.pad_token.as_deref(), Some("<pad>"));
        assert_eq!(special.eos_token.as_deref(), Some("</s>"));

        let empty = SpecialTokens::from_json(&json!({ "pad_token": null }));
        assert_eq!(empty, SpecialTokens::default());
    }

    #[test]
    fn keeps_declared_pad_token() {
        let special = SpecialTokens {
            pad_token: Some("<pad>".into()),
            eos_token: Some("</s>".into()),
        };
        let wrapper = TokenizerWrapper::new(word_level(&["rose"], true), &special, 256).unwrap();
        assert_eq!(wrapper.pad_token_id(), 0);
        assert_eq!(wrapper.eos_token_id(), 1);
    }

    #[test]
    fn missing_pad_falls_back_to_eos() {
        let special = SpecialTokens {
            pad_token: None,
            eos_token: Some("</s>".into()),
        };
        let wrapper = TokenizerWrapper::new(word_level(&["rose"], false), &special, 256).unwrap();
        assert_eq!(wrapper.pad_token_id(), wrapper.eos_token_id());
        let padding = wrapper.tokenizer.get_padding().unwrap();
        assert_eq!(padding.pad_token, "</s>");
    }

    #[test]
    fn eos_is_found_without_declarations() {
        let wrapper =
            TokenizerWrapper::new(word_level(&["rose"], false), &SpecialTokens::default(), 256)
                .unwrap();
        assert_eq!(wrapper.eos_token_id(), 0);
        assert_eq!(wrapper.pad_token_id(), 0);
    }

    #[test]
    fn truncates_long_inputs() {
        let wrapper = TokenizerWrapper::new(
            word_level(&["gold"], true),
            &SpecialTokens::default(),
            4,
        )
        .unwrap();
        let ids = wrapper.encode("gold gold gold gold gold gold").unwrap();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn decode_skips_special_tokens() {
        let wrapper =
            TokenizerWrapper::new(word_level(&["gold", "silk"], true), &SpecialTokens::default(), 256)
                .unwrap();
        let text = wrapper.decode(&[0, 3, 4, 1]).unwrap();
        assert_eq!(text, "gold silk");
    }
}
