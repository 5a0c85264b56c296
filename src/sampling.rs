use std::collections::HashSet;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// A scored continuation of one beam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub beam: usize,
    pub token: u32,
    /// Accumulated log-probability of the beam extended by `token`.
    pub score: f32,
}

/// Divides scores of already generated tokens when positive and multiplies
/// them when negative. Each distinct token is penalized once, however often
/// it occurs.
pub fn apply_repetition_penalty(scores: &mut [f32], context: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }
    let seen: HashSet<u32> = context.iter().copied().collect();
    for token in seen {
        let idx = token as usize;
        if idx < scores.len() {
            let score = scores[idx];
            scores[idx] = if score < 0.0 {
                score * penalty
            } else {
                score / penalty
            };
        }
    }
}

/// Bans every token that would complete an n-gram already present in `tokens`.
pub fn apply_no_repeat_ngram(scores: &mut [f32], tokens: &[u32], ngram_size: usize) {
    let n = ngram_size;
    if n == 0 || tokens.len() + 1 < n {
        return;
    }

    let prefix = &tokens[tokens.len() + 1 - n..];
    for window in tokens.windows(n) {
        if &window[..n - 1] == prefix {
            let banned = window[n - 1] as usize;
            if banned < scores.len() {
                scores[banned] = f32::NEG_INFINITY;
            }
        }
    }
}

pub fn apply_temperature(scores: &mut [f32], temperature: f64) {
    if temperature > 0.0 && temperature != 1.0 {
        let t = temperature as f32;
        scores.iter_mut().for_each(|s| *s /= t);
    }
}

/// Nucleus filtering: keeps the smallest set of highest-scoring tokens whose
/// probability mass reaches `top_p`, and never fewer than `min_tokens_to_keep`.
pub fn apply_top_p(scores: &mut [f32], top_p: f64, min_tokens_to_keep: usize) {
    if top_p >= 1.0 || scores.is_empty() {
        return;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let max = scores[order[0]];
    if max == f32::NEG_INFINITY {
        return;
    }
    let total: f64 = scores.iter().map(|&s| ((s - max) as f64).exp()).sum();

    let mut cumulative = 0.0f64;
    let mut keep = order.len();
    for (rank, &idx) in order.iter().enumerate() {
        if cumulative >= top_p && rank >= min_tokens_to_keep {
            keep = rank;
            break;
        }
        cumulative += ((scores[idx] - max) as f64).exp() / total;
    }

    for &idx in &order[keep..] {
        scores[idx] = f32::NEG_INFINITY;
    }
}

/// Draws beam candidates from the flattened `beams x vocab` distribution.
pub struct BeamSampler {
    rng: StdRng,
}

impl BeamSampler {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    /// Warps each row with temperature and top-p, samples `k` distinct
    /// entries without replacement, and returns them ordered by their
    /// un-warped score.
    pub fn sample(
        &mut self,
        scores: &[Vec<f32>],
        k: usize,
        temperature: f64,
        top_p: f64,
        min_tokens_to_keep: usize,
    ) -> Vec<Candidate> {
        let vocab_size = match scores.first() {
            Some(row) if !row.is_empty() => row.len(),
            _ => return Vec::new(),
        };

        let mut warped: Vec<f32> = Vec::with_capacity(scores.len() * vocab_size);
        for row in scores {
            let mut row = row.clone();
            apply_temperature(&mut row, temperature);
            apply_top_p(&mut row, top_p, min_tokens_to_keep);
            warped.extend(row);
        }

        let max = warped.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if max == f32::NEG_INFINITY {
            return Vec::new();
        }
        let weights: Vec<f64> = warped
            .iter()
            .map(|&s| ((s - max) as f64).exp())
            .collect();

        let mut candidates: Vec<Candidate> = self
            .sample_without_replacement(weights, k)
            .into_iter()
            .map(|idx| {
                let (beam, token) = (idx / vocab_size, idx % vocab_size);
                Candidate {
                    beam,
                    token: token as u32,
                    score: scores[beam][token],
                }
            })
            .collect();

        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }

    /// Sequential weighted draws; a drawn index is zeroed so it cannot repeat.
    /// Stops early when the remaining mass is exhausted.
    fn sample_without_replacement(&mut self, mut weights: Vec<f64>, k: usize) -> Vec<usize> {
        let mut picked = Vec::with_capacity(k);
        let mut total: f64 = weights.iter().sum();

        while picked.len() < k && total > 0.0 {
            let target = self.rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut choice = None;
            for (idx, &w) in weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                cumulative += w;
                choice = Some(idx);
                if target < cumulative {
                    break;
                }
            }

            let Some(idx) = choice else { break };
            total -= weights[idx];
            weights[idx] = 0.0;
            picked.push(idx);
        }

        picked
    }
}
