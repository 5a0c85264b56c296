mod routes;
mod types;

pub use routes::create_router;

use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::GenerationConfig;
use crate::model::Seq2SeqModel;
use crate::tokenizer::TokenizerWrapper;
use candle_core::Device;

/// Shared application state, built once at startup.
pub struct AppState {
    pub model: Arc<Mutex<Box<dyn Seq2SeqModel>>>,
    pub tokenizer: Arc<TokenizerWrapper>,
    pub device: Device,
    pub model_id: String,
    pub generation: GenerationConfig,
}
