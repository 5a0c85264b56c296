use clap::Parser;
use serde::{Deserialize, Serialize};

/// Hub repository of the fine-tuned keyword model.
pub const DEFAULT_MODEL_ID: &str = "Amama02/pinterest-personality-keywords-v2";

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Pinterest keyword generation server")]
pub struct Args {
    #[arg(short, long, default_value = DEFAULT_MODEL_ID)]
    pub model: String,

    #[arg(long, default_value = "main")]
    pub revision: String,

    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 7860)]
    pub port: u16,

    #[arg(long)]
    pub cpu: bool,

    #[arg(long, env)]
    pub hf_token: Option<String>,

    /// Seed for the beam sampler; omit for fresh entropy on every request.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Generate once for this personality and exit instead of serving.
    #[arg(long)]
    pub personality_name: Option<String>,

    #[arg(long, requires = "personality_name")]
    pub culture: Option<String>,

    #[arg(long, requires = "personality_name")]
    pub role: Option<String>,

    #[arg(long, requires = "personality_name")]
    pub period: Option<String>,

    #[arg(long, requires = "personality_name")]
    pub bio: Option<String>,
}

/// Decoding hyperparameters. The model was tuned against these values, so
/// only the seed is exposed on the command line. Decoding always samples and
/// stops once `num_beams` hypotheses have finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_input_tokens: usize,
    /// Upper bound on the decoder sequence, counting the start token.
    pub max_length: usize,
    pub num_beams: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub repetition_penalty: f32,
    pub length_penalty: f32,
    pub no_repeat_ngram_size: usize,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 256,
            max_length: 300,
            num_beams: 8,
            temperature: 0.9,
            top_p: 0.95,
            repetition_penalty: 2.0,
            length_penalty: 1.2,
            no_repeat_ngram_size: 2,
            seed: None,
        }
    }
}

impl From<&Args> for GenerationConfig {
    fn from(args: &Args) -> Self {
        Self {
            seed: args.seed,
            ..Self::default()
        }
    }
}
