use std::time::Instant;

use candle_core::{Device, Tensor, D};
use tracing::{debug, info};

use crate::config::GenerationConfig;
use crate::error::{InferenceError, Result};
use crate::model::Seq2SeqModel;
use crate::sampling::{apply_no_repeat_ngram, apply_repetition_penalty, BeamSampler, Candidate};
use crate::tokenizer::TokenizerWrapper;

pub struct GenerationOutput {
    pub text: String,
    pub tokens: Vec<u32>,
    pub steps: usize,
    pub total_time_ms: u128,
}

#[derive(Debug, Clone)]
struct Beam {
    /// Decoder tokens, starting with the decoder start token.
    tokens: Vec<u32>,
    score: f32,
}

/// Finished hypotheses, best first, capped at the beam count. Search stops
/// as soon as the pool is full.
struct BeamHypotheses {
    hypotheses: Vec<(f32, Vec<u32>)>,
    num_beams: usize,
    length_penalty: f32,
}

impl BeamHypotheses {
    fn new(num_beams: usize, length_penalty: f32) -> Self {
        Self {
            hypotheses: Vec::with_capacity(num_beams + 1),
            num_beams,
            length_penalty,
        }
    }

    fn normalize(&self, score: f32, len: usize) -> f32 {
        score / (len.max(1) as f32).powf(self.length_penalty)
    }

    fn worst_score(&self) -> f32 {
        self.hypotheses
            .last()
            .map(|(s, _)| *s)
            .unwrap_or(f32::NEG_INFINITY)
    }

    fn add(&mut self, tokens: Vec<u32>, sum_log_probs: f32) {
        if sum_log_probs == f32::NEG_INFINITY {
            return;
        }
        let score = self.normalize(sum_log_probs, tokens.len());
        if self.hypotheses.len() < self.num_beams || score > self.worst_score() {
            let at = self.hypotheses.partition_point(|(s, _)| *s >= score);
            self.hypotheses.insert(at, (score, tokens));
            self.hypotheses.truncate(self.num_beams);
        }
    }

    fn is_done(&self) -> bool {
        self.hypotheses.len() >= self.num_beams
    }

    fn best(&self) -> Option<&[u32]> {
        self.hypotheses.first().map(|(_, t)| t.as_slice())
    }
}

pub struct KeywordGenerator<'a> {
    model: &'a mut dyn Seq2SeqModel,
    tokenizer: &'a TokenizerWrapper,
    device: &'a Device,
}

impl<'a> KeywordGenerator<'a> {
    pub fn new(
        model: &'a mut dyn Seq2SeqModel,
        tokenizer: &'a TokenizerWrapper,
        device: &'a Device,
    ) -> Self {
        Self {
            model,
            tokenizer,
            device,
        }
    }

    /// Beam search over the encoder-decoder model, sampling the next beams
    /// from the warped distribution.
    pub fn generate(&mut self, prompt: &str, config: &GenerationConfig) -> Result<GenerationOutput> {
        let start_time = Instant::now();

        self.model.reset_cache();

        let input_ids = self.tokenizer.encode(prompt)?;
        if input_ids.is_empty() {
            return Err(InferenceError::Inference("Empty prompt".to_string()));
        }
        debug!("Prompt tokens: {}", input_ids.len());

        let num_beams = config.num_beams.max(1);
        let min_tokens_to_keep = if num_beams > 1 { 2 } else { 1 };
        let eos_token = self.model.eos_token_id();
        let start_token = self.model.decoder_start_token_id();

        let input = Tensor::new(input_ids.as_slice(), self.device)?.unsqueeze(0)?;
        let encoder_output = self.model.encode(&input)?.repeat((num_beams, 1, 1))?;

        let mut sampler = BeamSampler::new(config.seed);
        let mut finished = BeamHypotheses::new(num_beams, config.length_penalty);
        let mut beams: Vec<Beam> = (0..num_beams)
            .map(|_| Beam {
                tokens: vec![start_token],
                score: 0.0,
            })
            .collect();

        let mut cur_len = 1;
        let mut steps = 0;
        let mut stopped = false;

        while cur_len < config.max_length {
            let flat: Vec<u32> = beams.iter().flat_map(|b| b.tokens.iter().copied()).collect();
            let decoder_input = Tensor::from_vec(flat, (num_beams, cur_len), self.device)?;
            let logits = self.model.decode(&decoder_input, &encoder_output)?;
            let log_probs: Vec<Vec<f32>> =
                candle_nn::ops::log_softmax(&logits, D::Minus1)?.to_vec2()?;

            let scores: Vec<Vec<f32>> = beams
                .iter()
                .zip(log_probs)
                .map(|(beam, mut row)| {
                    apply_repetition_penalty(&mut row, &beam.tokens, config.repetition_penalty);
                    apply_no_repeat_ngram(&mut row, &beam.tokens, config.no_repeat_ngram_size);
                    row.iter_mut().for_each(|s| *s += beam.score);
                    row
                })
                .collect();

            let candidates = sampler.sample(
                &scores,
                2 * num_beams,
                config.temperature,
                config.top_p,
                min_tokens_to_keep,
            );

            let next = advance_beams(&beams, candidates, eos_token, &mut finished, num_beams);
            cur_len += 1;
            steps += 1;

            if next.is_empty() || finished.is_done() {
                debug!("Beam search finished after {} steps", steps);
                stopped = true;
                break;
            }
            beams = pad_beams(next, num_beams);
        }

        if !stopped {
            for beam in beams {
                finished.add(beam.tokens, beam.score);
            }
        }

        let best = finished
            .best()
            .ok_or_else(|| InferenceError::Inference("no hypothesis survived decoding".to_string()))?;
        let tokens: Vec<u32> = match best.split_first() {
            Some((first, rest)) if *first == start_token => rest.to_vec(),
            _ => best.to_vec(),
        };
        let text = self.tokenizer.decode(&tokens)?;

        let total_time = start_time.elapsed();
        info!(
            "Generated {} tokens in {} steps ({:?})",
            tokens.len(),
            steps,
            total_time
        );

        Ok(GenerationOutput {
            text,
            tokens,
            steps,
            total_time_ms: total_time.as_millis(),
        })
    }
}

/// Candidates ending in EOS close a hypothesis when ranked within the beam
/// count; the rest extend the next beams.
fn advance_beams(
    beams: &[Beam],
    candidates: Vec<Candidate>,
    eos_token: u32,
    finished: &mut BeamHypotheses,
    num_beams: usize,
) -> Vec<Beam> {
    let mut next = Vec::with_capacity(num_beams);
    for (rank, candidate) in candidates.into_iter().enumerate() {
        if !candidate.score.is_finite() {
            continue;
        }
        let source = &beams[candidate.beam];
        if candidate.token == eos_token {
            if rank < num_beams {
                finished.add(source.tokens.clone(), candidate.score);
            }
        } else {
            let mut tokens = source.tokens.clone();
            tokens.push(candidate.token);
            next.push(Beam {
                tokens,
                score: candidate.score,
            });
            if next.len() == num_beams {
                break;
            }
        }
    }
    next
}

// The decoder batch is fixed at `num_beams`; missing beams become dead copies.
fn pad_beams(mut beams: Vec<Beam>, num_beams: usize) -> Vec<Beam> {
    let filler = Beam {
        tokens: beams[0].tokens.clone(),
        score: f32::NEG_INFINITY,
    };
    beams.resize(num_beams, filler);
    beams
}
