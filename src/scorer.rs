//! Response Scorer
//!
//! Fixed-shape two-layer perceptron producing one score per canned response.
//!
//! The scorer is never trained. After each fallback turn its parameters are
//! perturbed with Gaussian noise scaled by the message length and every array
//! is renormalized to unit Euclidean norm. That drift is the whole "learning"
//! mechanism.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::history::WORD;

/// Number of input features: `[char_length, word_count]`
pub const INPUT_FEATURES: usize = 2;

/// Hidden layer width
pub const HIDDEN_UNITS: usize = 12;

/// Default per-element noise std-dev applied by [`Scorer::mutate`]
pub const DEFAULT_NOISE_STD: f64 = 0.02;

/// Characters per unit of mutation strength (`reward = chars / 50`)
pub const REWARD_DIVISOR: f64 = 50.0;

/// Serialized scorer parameters, stored verbatim inside the agent state.
///
/// Shapes: `w1` is `INPUT_FEATURES x HIDDEN_UNITS`, `b1` is `HIDDEN_UNITS`,
/// `w2` is `HIDDEN_UNITS x outputs`, `b2` is `outputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerWeights {
    pub w1: Vec<Vec<f64>>,
    pub b1: Vec<f64>,
    pub w2: Vec<Vec<f64>>,
    pub b2: Vec<f64>,
}

impl ScorerWeights {
    /// Check every array against the fixed shape for `outputs` responses
    pub fn matches_shape(&self, outputs: usize) -> bool {
        self.w1.len() == INPUT_FEATURES
            && self.w1.iter().all(|row| row.len() == HIDDEN_UNITS)
            && self.b1.len() == HIDDEN_UNITS
            && self.w2.len() == HIDDEN_UNITS
            && self.w2.iter().all(|row| row.len() == outputs)
            && self.b2.len() == outputs
    }

    /// Euclidean norms of `[w1, b1, w2, b2]`
    pub fn norms(&self) -> [f64; 4] {
        [
            matrix_norm(&self.w1),
            vector_norm(&self.b1),
            matrix_norm(&self.w2),
            vector_norm(&self.b2),
        ]
    }
}

/// Two-layer perceptron: `tanh(x·W1 + b1)·W2 + b2`
#[derive(Debug, Clone)]
pub struct Scorer {
    weights: ScorerWeights,
    outputs: usize,
}

impl Scorer {
    /// Draw every parameter independently from a standard normal distribution
    pub fn initialize<R: Rng>(outputs: usize, rng: &mut R) -> Self {
        let mut normal_vec = |len: usize| -> Vec<f64> {
            (0..len).map(|_| rng.sample::<f64, _>(StandardNormal)).collect()
        };

        let w1 = (0..INPUT_FEATURES).map(|_| normal_vec(HIDDEN_UNITS)).collect();
        let b1 = normal_vec(HIDDEN_UNITS);
        let w2 = (0..HIDDEN_UNITS).map(|_| normal_vec(outputs)).collect();
        let b2 = normal_vec(outputs);

        Self {
            weights: ScorerWeights { w1, b1, w2, b2 },
            outputs,
        }
    }

    /// Wrap previously persisted weights. Returns `None` on any shape mismatch.
    pub fn from_weights(weights: ScorerWeights, outputs: usize) -> Option<Self> {
        if weights.matches_shape(outputs) {
            Some(Self { weights, outputs })
        } else {
            None
        }
    }

    /// Reuse persisted weights when they fit, otherwise start from fresh random ones
    pub fn load_or_initialize<R: Rng>(
        weights: Option<ScorerWeights>,
        outputs: usize,
        rng: &mut R,
    ) -> Self {
        match weights.and_then(|w| Self::from_weights(w, outputs)) {
            Some(scorer) => {
                debug!("Loaded scorer weights ({} outputs)", outputs);
                scorer
            }
            None => {
                debug!("No usable scorer weights, initializing randomly");
                Self::initialize(outputs, rng)
            }
        }
    }

    pub fn weights(&self) -> &ScorerWeights {
        &self.weights
    }

    pub fn outputs(&self) -> usize {
        self.outputs
    }

    /// Score every response for the given features
    pub fn forward(&self, features: [f64; INPUT_FEATURES]) -> Vec<f64> {
        let w = &self.weights;

        let hidden: Vec<f64> = (0..HIDDEN_UNITS)
            .map(|j| {
                let z: f64 = features
                    .iter()
                    .enumerate()
                    .map(|(i, x)| x * w.w1[i][j])
                    .sum();
                (z + w.b1[j]).tanh()
            })
            .collect();

        (0..self.outputs)
            .map(|k| {
                let z: f64 = hidden
                    .iter()
                    .enumerate()
                    .map(|(j, h)| h * w.w2[j][k])
                    .sum();
                z + w.b2[k]
            })
            .collect()
    }

    /// Perturb with the default noise level, scaled by `reward_scale`
    pub fn mutate<R: Rng>(&mut self, rng: &mut R, reward_scale: f64) {
        self.mutate_with(rng, reward_scale, DEFAULT_NOISE_STD);
    }

    /// Add `N(0, noise_std) * reward_scale` to every element, then divide each
    /// array by its Euclidean norm. Zero-norm arrays are left as they are.
    pub fn mutate_with<R: Rng>(&mut self, rng: &mut R, reward_scale: f64, noise_std: f64) {
        let mut noise = || rng.sample::<f64, _>(StandardNormal) * noise_std * reward_scale;

        let w = &mut self.weights;
        for row in w.w1.iter_mut() {
            row.iter_mut().for_each(|v| *v += noise());
        }
        w.b1.iter_mut().for_each(|v| *v += noise());
        for row in w.w2.iter_mut() {
            row.iter_mut().for_each(|v| *v += noise());
        }
        w.b2.iter_mut().for_each(|v| *v += noise());

        normalize_matrix(&mut w.w1);
        normalize_vector(&mut w.b1);
        normalize_matrix(&mut w.w2);
        normalize_vector(&mut w.b2);

        debug!("Scorer mutated (reward scale {:.3})", reward_scale);
    }
}

/// Scorer input for a message: `[char_length, word_count]`
pub fn features(text: &str) -> [f64; INPUT_FEATURES] {
    [
        text.chars().count() as f64,
        WORD.find_iter(text).count() as f64,
    ]
}

/// Mutation strength for a message: `char_length / 50`
pub fn reward_scale(text: &str) -> f64 {
    text.chars().count() as f64 / REWARD_DIVISOR
}

/// Index of the first maximum. Returns `None` for an empty slice.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

fn vector_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

fn matrix_norm(m: &[Vec<f64>]) -> f64 {
    m.iter()
        .flat_map(|row| row.iter())
        .map(|x| x * x)
        .sum::<f64>()
        .sqrt()
}

fn normalize_vector(v: &mut [f64]) {
    let norm = vector_norm(v);
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

fn normalize_matrix(m: &mut [Vec<f64>]) {
    let norm = matrix_norm(m);
    if norm > 0.0 {
        m.iter_mut()
            .flat_map(|row| row.iter_mut())
            .for_each(|x| *x /= norm);
    }
}
