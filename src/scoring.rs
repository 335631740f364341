use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prompt used when scoring an image the user uploaded.
pub const UPLOADED_IMAGE_PROMPT: &str = "uploaded image";

const SCORE_CEILING: f64 = 95.0;
const AI_BASE_SCORE: f64 = 45.0;
const UPLOADED_BASE_SCORE: f64 = 40.0;
const MAX_WORD_BONUS: f64 = 20.0;
const MAX_COMPLEXITY: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViralityMetrics {
    pub engagement: u8,
    pub shareability: u8,
    pub appeal: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViralityScore {
    pub total: u8,
    pub metrics: ViralityMetrics,
}

/// (random spread, complexity weight) per sub-metric.
struct MetricWeights {
    spread: f64,
    complexity: f64,
}

const ENGAGEMENT: MetricWeights = MetricWeights {
    spread: 25.0,
    complexity: 10.0,
};
const SHAREABILITY: MetricWeights = MetricWeights {
    spread: 20.0,
    complexity: 8.0,
};
const APPEAL: MetricWeights = MetricWeights {
    spread: 30.0,
    complexity: 12.0,
};

/// Score before randomness: the base for the source plus the word bonus.
pub fn baseline(prompt: &str, ai_generated: bool) -> f64 {
    let word_count = prompt.split_whitespace().count() as f64;
    let base = if ai_generated { AI_BASE_SCORE } else { UPLOADED_BASE_SCORE };
    base + (word_count * 1.5).min(MAX_WORD_BONUS)
}

pub fn prompt_complexity(prompt: &str) -> f64 {
    (prompt.chars().count() as f64 / 30.0).min(MAX_COMPLEXITY)
}

fn metric<R: Rng + ?Sized>(
    rng: &mut R,
    base: f64,
    complexity: f64,
    weights: &MetricWeights,
) -> u8 {
    let raw = base + rng.gen_range(0.0..weights.spread) + complexity * weights.complexity;
    raw.min(SCORE_CEILING).round() as u8
}

/// Synthetic score with caller-supplied randomness. `image` is an opaque
/// handle; only the prompt and the source flag feed the formula.
pub fn virality_score_with<R: Rng + ?Sized>(
    rng: &mut R,
    image: &str,
    prompt: &str,
    ai_generated: bool,
) -> ViralityScore {
    let base = baseline(prompt, ai_generated);
    let complexity = prompt_complexity(prompt);

    let engagement = metric(rng, base, complexity, &ENGAGEMENT);
    let shareability = metric(rng, base, complexity, &SHAREABILITY);
    let appeal = metric(rng, base, complexity, &APPEAL);
    let sum = u16::from(engagement) + u16::from(shareability) + u16::from(appeal);
    let total = (f64::from(sum) / 3.0).round() as u8;

    debug!(image, ai_generated, total, "scored image");
    ViralityScore {
        total,
        metrics: ViralityMetrics {
            engagement,
            shareability,
            appeal,
        },
    }
}

pub fn virality_score(image: &str, prompt: &str, ai_generated: bool) -> ViralityScore {
    virality_score_with(&mut rand::thread_rng(), image, prompt, ai_generated)
}
