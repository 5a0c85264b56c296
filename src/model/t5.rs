use std::path::PathBuf;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::t5::{Config, T5ForConditionalGeneration};
use tracing::info;

use super::Seq2SeqModel;
use crate::error::{InferenceError, Result};

const WEIGHT_DTYPE: DType = DType::F32;

pub struct T5Model {
    model: T5ForConditionalGeneration,
    config: Config,
}

impl T5Model {
    /// `pad_token_id` fills in the decoder start token when the checkpoint
    /// leaves it unset.
    pub fn load(
        config_path: &PathBuf,
        weight_paths: &[PathBuf],
        pad_token_id: u32,
        device: &Device,
    ) -> Result<Self> {
        info!("Loading T5 model configuration...");
        let config_str = std::fs::read_to_string(config_path)?;
        let mut config: Config = serde_json::from_str(&config_str)?;

        fill_decoder_start(&mut config, pad_token_id);
        // Beams are reordered every step and candle's cache cannot follow,
        // so the decoder recomputes the whole prefix instead.
        config.use_cache = false;

        info!(
            "T5 config: vocab_size={}, d_model={}, layers={}, heads={}",
            config.vocab_size, config.d_model, config.num_layers, config.num_heads
        );

        let vb = var_builder(weight_paths, WEIGHT_DTYPE, device)?;

        info!("Building T5 model...");
        let model = T5ForConditionalGeneration::load(vb, &config)?;

        info!("T5 model loaded successfully");
        Ok(Self { model, config })
    }
}

/// Checkpoints without a decoder start token start decoding from the
/// tokenizer's padding token.
fn fill_decoder_start(config: &mut Config, pad_token_id: u32) {
    if config.decoder_start_token_id.is_none() {
        info!(
            "decoder_start_token_id unset, using padding token {}",
            pad_token_id
        );
        config.decoder_start_token_id = Some(pad_token_id as usize);
    }
}

fn var_builder<'a>(
    weight_paths: &[PathBuf],
    dtype: DType,
    device: &Device,
) -> Result<VarBuilder<'a>> {
    match weight_paths {
        [single] if single.extension().is_some_and(|ext| ext == "bin") => {
            Ok(VarBuilder::from_pth(single, dtype, device)?)
        }
        [] => Err(InferenceError::ModelLoad("no weight files".to_string())),
        paths => Ok(unsafe { VarBuilder::from_mmaped_safetensors(paths, dtype, device)? }),
    }
}

impl Seq2SeqModel for T5Model {
    fn encode(&mut self, input_ids: &Tensor) -> Result<Tensor> {
        Ok(self.model.encode(input_ids)?)
    }

    fn decode(&mut self, decoder_input_ids: &Tensor, encoder_output: &Tensor) -> Result<Tensor> {
        let logits = self.model.decode(decoder_input_ids, encoder_output)?;
        Ok(logits.to_dtype(DType::F32)?)
    }

    fn reset_cache(&mut self) {
        self.model.clear_kv_cache();
    }

    fn decoder_start_token_id(&self) -> u32 {
        self.config
            .decoder_start_token_id
            .unwrap_or(self.config.pad_token_id) as u32
    }

    fn eos_token_id(&self) -> u32 {
        self.config.eos_token_id as u32
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }
}
