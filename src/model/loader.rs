use std::collections::BTreeSet;
use std::path::PathBuf;

use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
use hf_hub::{Repo, RepoType};
use tracing::{debug, info};

use crate::error::{InferenceError, Result};

pub struct ModelFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    /// `tokenizer_config.json` and `special_tokens_map.json`, when the repo has them.
    pub special_tokens: Vec<PathBuf>,
    pub weights: Vec<PathBuf>,
}

/// Load model files from HuggingFace Hub
pub fn load_model(model_id: &str, revision: &str, token: Option<&str>) -> Result<ModelFiles> {
    info!("Resolving {} (revision: {})", model_id, revision);

    let api = match token {
        Some(t) => ApiBuilder::new()
            .with_token(Some(t.to_string()))
            .build()
            .map_err(|e| InferenceError::Hub(e.to_string()))?,
        None => Api::new().map_err(|e| InferenceError::Hub(e.to_string()))?,
    };

    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let config = fetch(&repo, "config.json")?;
    let tokenizer = fetch(&repo, "tokenizer.json")?;

    let special_tokens = ["tokenizer_config.json", "special_tokens_map.json"]
        .into_iter()
        .filter_map(|name| match repo.get(name) {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("{} not available: {}", name, e);
                None
            }
        })
        .collect();

    let weights = download_weights(&repo)?;

    info!(
        "Model files ready: config={:?}, tokenizer={:?}, weights={} files",
        config,
        tokenizer,
        weights.len()
    );

    Ok(ModelFiles {
        config,
        tokenizer,
        special_tokens,
        weights,
    })
}

fn fetch(repo: &ApiRepo, filename: &str) -> Result<PathBuf> {
    info!("Downloading {}...", filename);
    repo.get(filename)
        .map_err(|e| InferenceError::Hub(format!("Failed to download {}: {}", filename, e)))
}

fn download_weights(repo: &ApiRepo) -> Result<Vec<PathBuf>> {
    if let Ok(path) = repo.get("model.safetensors") {
        return Ok(vec![path]);
    }

    if let Ok(index) = repo.get("model.safetensors.index.json") {
        let index: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(index)?)?;
        let shards = shard_names(&index)?;
        return shards.iter().map(|name| fetch(repo, name)).collect();
    }

    if let Ok(path) = repo.get("pytorch_model.bin") {
        return Ok(vec![path]);
    }

    Err(InferenceError::Hub(
        "Could not find model weights (tried model.safetensors, sharded safetensors, pytorch_model.bin)".to_string()
    ))
}

/// Distinct shard file names listed in a safetensors index, in sorted order.
fn shard_names(index: &serde_json::Value) -> Result<BTreeSet<String>> {
    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| InferenceError::ModelLoad("safetensors index has no weight_map".to_string()))?;

    Ok(weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect())
}
