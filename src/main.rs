mod api;
mod config;
mod device;
mod error;
mod generation;
mod model;
mod prompt;
mod sampling;
mod tokenizer;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::{Args, GenerationConfig};
use crate::device::{device_info, select_device};
use crate::generation::KeywordGenerator;
use crate::model::{detect_architecture, load_model, ModelArchitecture, Seq2SeqModel, T5Model};
use crate::prompt::{build_prompt, PersonalityPayload};
use crate::tokenizer::TokenizerWrapper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "pinterest_keywords=info,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let generation = GenerationConfig::from(&args);

    let device = select_device(args.cpu);
    info!("Using device: {}", device_info(&device));

    let model_files = load_model(&args.model, &args.revision, args.hf_token.as_deref())?;

    let tokenizer = TokenizerWrapper::load(
        &model_files.tokenizer,
        &model_files.special_tokens,
        generation.max_input_tokens,
    )?;

    let config_json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&model_files.config)?)?;
    let architecture = detect_architecture(&config_json)?;
    info!("Detected architecture: {:?}", architecture);

    let model: Box<dyn Seq2SeqModel> = match architecture {
        ModelArchitecture::T5 => Box::new(T5Model::load(
            &model_files.config,
            &model_files.weights,
            tokenizer.pad_token_id(),
            &device,
        )?),
    };

    info!(
        "Model ready: vocab_size={}, decoder_start={}, eos={}",
        model.vocab_size(),
        model.decoder_start_token_id(),
        model.eos_token_id()
    );

    match personality_from_args(&args) {
        Some(payload) => run_single(model, &tokenizer, &device, &payload, &generation),
        None => run_server(model, tokenizer, device, generation, &args).await,
    }
}

fn personality_from_args(args: &Args) -> Option<PersonalityPayload> {
    Some(PersonalityPayload {
        personality_name: Some(args.personality_name.clone()?),
        culture: args.culture.clone(),
        role: args.role.clone(),
        period: args.period.clone(),
        bio: args.bio.clone(),
    })
}

fn run_single(
    mut model: Box<dyn Seq2SeqModel>,
    tokenizer: &TokenizerWrapper,
    device: &candle_core::Device,
    payload: &PersonalityPayload,
    generation: &GenerationConfig,
) -> anyhow::Result<()> {
    let prompt = build_prompt(payload);
    println!("Prompt: {}", prompt);

    let mut generator = KeywordGenerator::new(model.as_mut(), tokenizer, device);
    let output = generator.generate(&prompt, generation)?;

    println!("Keywords: {}", output.text);
    println!(
        "({} tokens, {} decoding steps, {}ms)",
        output.tokens.len(),
        output.steps,
        output.total_time_ms
    );

    Ok(())
}

async fn run_server(
    model: Box<dyn Seq2SeqModel>,
    tokenizer: TokenizerWrapper,
    device: candle_core::Device,
    generation: GenerationConfig,
    args: &Args,
) -> anyhow::Result<()> {
    let state = Arc::new(AppState {
        model: Arc::new(Mutex::new(model)),
        tokenizer: Arc::new(tokenizer),
        device,
        model_id: args.model.clone(),
        generation,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = api::create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr = SocketAddr::new(args.host.parse()?, args.port);

    info!(
        "Serving {} on http://{} (GET /, POST /generate)",
        state.model_id, addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
