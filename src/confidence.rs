//! Confidence estimation for recognized text.
//!
//! Two independent signals are produced: a token score from the generation trace
//! (geometric mean of the chosen tokens' probabilities) and a heuristic score from
//! surface features of the text. When a trace is available the two are blended,
//! otherwise the heuristic stands alone.

use ndarray::{ArrayView1, ArrayView2, Axis};
use tracing::instrument;

use crate::{ConfidenceResult, TokenConfidence};

/// Returned when no usable token trace exists. Means "unknown", not "bad".
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;
/// Floor applied to each token probability before aggregation.
pub const MIN_TOKEN_PROBABILITY: f64 = 0.01;
pub const TOKEN_WEIGHT: f64 = 0.7;
pub const HEURISTIC_WEIGHT: f64 = 0.3;

const HEURISTIC_BASE: f64 = 0.7;
const EMPTY_TEXT_CONFIDENCE: f64 = 0.1;
const SHORT_TEXT_CHARS: usize = 10;
const LONG_TEXT_CHARS: usize = 5000;
const REPEAT_RUN: usize = 5;
const SMALL_IMAGE_AREA: u64 = 50_000;

/// Per-step scores from a generation trace, one row per generated token.
#[derive(Debug, Clone, Copy)]
pub enum StepScores<'a> {
    Probabilities(ArrayView2<'a, f32>),
    /// Unnormalized scores; softmax is applied per row.
    Logits(ArrayView2<'a, f32>),
}

impl StepScores<'_> {
    pub fn steps(&self) -> usize {
        match self {
            StepScores::Probabilities(scores) | StepScores::Logits(scores) => {
                scores.len_of(Axis(0))
            }
        }
    }

    fn probability(&self, step: usize, token_id: usize) -> Option<f64> {
        match self {
            StepScores::Probabilities(scores) => {
                scores.row(step).get(token_id).map(|&p| p as f64)
            }
            StepScores::Logits(scores) => softmax_at(scores.row(step), token_id),
        }
    }
}

fn softmax_at(logits: ArrayView1<f32>, index: usize) -> Option<f64> {
    let chosen = *logits.get(index)? as f64;
    let max = logits
        .iter()
        .map(|&v| v as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    let sum = logits.iter().map(|&v| (v as f64 - max).exp()).sum::<f64>();
    Some((chosen - max).exp() / sum)
}

/// Everything needed to score a single recognition call.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceInput<'a> {
    pub token_ids: &'a [u32],
    pub step_scores: Option<StepScores<'a>>,
    /// Number of leading prompt tokens in `token_ids` that are not scored.
    pub prompt_length: usize,
    pub text: &'a str,
    pub image_size: (u32, u32),
}

/// Geometric mean of the probabilities assigned to the generated tokens.
///
/// Tokens past the end of the trace are ignored. Without a trace, or with nothing to
/// score, the neutral value is returned.
#[instrument(level = "debug", skip(token_ids, step_scores))]
pub fn token_confidence(
    token_ids: &[u32],
    step_scores: Option<&StepScores>,
    prompt_length: usize,
) -> TokenConfidence {
    let neutral = TokenConfidence {
        confidence: NEUTRAL_CONFIDENCE,
        token_probabilities: Vec::new(),
    };
    let Some(scores) = step_scores.filter(|scores| scores.steps() > 0) else {
        log::warn!("No token scores available, using neutral token confidence");
        return neutral;
    };

    let generated = token_ids.get(prompt_length..).unwrap_or_default();
    let mut token_probabilities = Vec::with_capacity(generated.len().min(scores.steps()));
    for (step, &token_id) in generated.iter().take(scores.steps()).enumerate() {
        let Some(probability) = scores.probability(step, token_id as usize) else {
            log::warn!("Token id {token_id} at step {step} is outside the score vocabulary");
            return neutral;
        };
        token_probabilities.push(probability.max(MIN_TOKEN_PROBABILITY).min(1.0));
    }

    if token_probabilities.is_empty() {
        return neutral;
    }
    let mean_log = token_probabilities.iter().map(|p| p.ln()).sum::<f64>()
        / token_probabilities.len() as f64;
    let confidence = mean_log.exp();
    log::trace!(
        "Token confidence {confidence:.4} over {} tokens",
        token_probabilities.len()
    );
    TokenConfidence {
        confidence,
        token_probabilities,
    }
}

/// True when some character repeats `run` or more times in a row. Line breaks never count.
fn has_repeated_run(text: &str, run: usize) -> bool {
    let mut previous = None;
    let mut length = 0;
    for c in text.chars() {
        if c != '\n' && Some(c) == previous {
            length += 1;
        } else {
            length = 1;
        }
        if c != '\n' && length >= run {
            return true;
        }
        previous = Some(c);
    }
    false
}

/// Model-independent quality estimate from the text itself and the source image size.
#[instrument(level = "debug", skip(text), fields(len = text.len()))]
pub fn heuristic_confidence(text: &str, image_size: (u32, u32)) -> f64 {
    let text = text.trim();
    if text.is_empty() {
        return EMPTY_TEXT_CONFIDENCE;
    }
    let mut confidence = HEURISTIC_BASE;

    let total_chars = text.chars().count();
    if total_chars < SHORT_TEXT_CHARS {
        confidence *= 0.7;
    } else if total_chars > LONG_TEXT_CHARS {
        confidence *= 0.9;
    }

    if has_repeated_run(text, REPEAT_RUN) {
        confidence *= 0.6;
    }

    let clean = text
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    let ratio = clean as f64 / total_chars as f64;
    confidence *= 0.5 + ratio * 0.5;

    let (width, height) = image_size;
    if (width as u64) * (height as u64) < SMALL_IMAGE_AREA {
        confidence *= 0.85;
    }

    confidence.clamp(0.0, 1.0)
}

pub fn combine(
    token_confidence: Option<f64>,
    heuristic_confidence: f64,
    has_token_scores: bool,
) -> f64 {
    match token_confidence {
        Some(token) if has_token_scores => {
            TOKEN_WEIGHT * token + HEURISTIC_WEIGHT * heuristic_confidence
        }
        _ => heuristic_confidence,
    }
}

/// Scores a recognition call end to end.
#[instrument(skip(input), fields(prompt_length = input.prompt_length))]
pub fn score_confidence(input: &ConfidenceInput) -> ConfidenceResult {
    let used_token_scores = input.step_scores.is_some();
    let token = used_token_scores.then(|| {
        token_confidence(
            input.token_ids,
            input.step_scores.as_ref(),
            input.prompt_length,
        )
        .confidence
    });
    let heuristic = heuristic_confidence(input.text, input.image_size);
    let confidence = combine(token, heuristic, used_token_scores).clamp(0.0, 1.0);
    log::debug!(
        "Confidence: token={token:?}, heuristic={heuristic:.3}, combined={confidence:.3}"
    );
    ConfidenceResult {
        confidence,
        token_confidence: token,
        heuristic_confidence: heuristic,
        used_token_scores,
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};

    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn missing_scores_are_neutral() {
        let result = token_confidence(&[1, 2, 3], None, 0);
        assert_eq!(result.confidence, 0.5);
        assert!(result.token_probabilities.is_empty());

        let empty = Array2::<f32>::zeros((0, 4));
        let scores = StepScores::Probabilities(empty.view());
        assert_eq!(token_confidence(&[1], Some(&scores), 0).confidence, 0.5);
    }

    #[test]
    fn geometric_mean_of_chosen_tokens() {
        let probs = array![[0.1f32, 0.8, 0.1], [0.5, 0.25, 0.25]];
        let scores = StepScores::Probabilities(probs.view());
        // Prompt token 7 is skipped, then tokens 1 and 0 are scored.
        let result = token_confidence(&[7, 1, 0], Some(&scores), 1);
        assert_eq!(result.token_probabilities.len(), 2);
        assert_close(result.confidence, (0.8f32 as f64 * 0.5).sqrt());
    }

    #[test]
    fn low_probabilities_are_floored() {
        let probs = array![[0.0f32, 1.0]];
        let scores = StepScores::Probabilities(probs.view());
        let result = token_confidence(&[0], Some(&scores), 0);
        assert_close(result.confidence, MIN_TOKEN_PROBABILITY);
    }

    #[test]
    fn one_bad_token_drags_the_mean_down() {
        let probs = array![[0.9f32, 0.1], [0.9, 0.1], [0.9, 0.1], [0.02, 0.98]];
        let scores = StepScores::Probabilities(probs.view());
        let result = token_confidence(&[0, 0, 0, 0], Some(&scores), 0);
        let arithmetic = result.token_probabilities.iter().sum::<f64>() / 4.0;
        assert!(result.confidence < arithmetic);
    }

    #[test]
    fn tokens_beyond_trace_are_ignored() {
        let probs = array![[0.25f32, 0.75]];
        let scores = StepScores::Probabilities(probs.view());
        let result = token_confidence(&[1, 0, 0, 0], Some(&scores), 0);
        assert_eq!(result.token_probabilities.len(), 1);
        assert_close(result.confidence, 0.75);
    }

    #[test]
    fn prompt_longer_than_sequence_is_neutral() {
        let probs = array![[0.25f32, 0.75]];
        let scores = StepScores::Probabilities(probs.view());
        assert_eq!(token_confidence(&[1], Some(&scores), 5).confidence, 0.5);
    }

    #[test]
    fn logits_are_softmaxed() {
        let logits = array![[0.0f32, 0.0], [2.0f32.ln(), 0.0]];
        let scores = StepScores::Logits(logits.view());
        let result = token_confidence(&[1, 0], Some(&scores), 0);
        assert_close(result.token_probabilities[0], 0.5);
        assert!((result.token_probabilities[1] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn unknown_token_is_neutral() {
        let probs = array![[0.5f32, 0.5]];
        let scores = StepScores::Probabilities(probs.view());
        assert_eq!(token_confidence(&[9], Some(&scores), 0).confidence, 0.5);
    }

    #[test]
    fn empty_text_scores_point_one() {
        assert_eq!(heuristic_confidence("", (1000, 1000)), 0.1);
        assert_eq!(heuristic_confidence("   \n\t", (1000, 1000)), 0.1);
    }

    #[test]
    fn clean_medium_text_keeps_base() {
        assert_close(heuristic_confidence("Hello world 2024", (1000, 1000)), 0.7);
    }

    #[test]
    fn short_text_and_small_image_penalties() {
        assert_close(heuristic_confidence("Hi", (1000, 1000)), 0.7 * 0.7);
        assert_close(
            heuristic_confidence("Hello world 2024", (200, 200)),
            0.7 * 0.85,
        );
    }

    #[test]
    fn long_text_penalty() {
        let text = "ab ".repeat(2000);
        assert_close(heuristic_confidence(&text, (1000, 1000)), 0.7 * 0.9);
    }

    #[test]
    fn repetition_penalty() {
        assert_close(
            heuristic_confidence("Total: aaaaa due", (1000, 1000)),
            0.7 * 0.6 * (0.5 + (15.0 / 16.0) * 0.5),
        );
        // Four in a row is fine.
        assert_close(heuristic_confidence("Totals aaaa due", (1000, 1000)), 0.7);
    }

    #[test]
    fn junk_characters_scale_down() {
        // Half of the characters are punctuation.
        let text = "a#b#c#d#e#f#";
        assert_close(heuristic_confidence(text, (1000, 1000)), 0.7 * 0.75);
    }

    #[test]
    fn combine_weights_token_score() {
        assert_close(combine(Some(0.9), 0.3, true), 0.72);
        assert_eq!(combine(Some(0.9), 0.3, false), 0.3);
        assert_eq!(combine(None, 0.3, true), 0.3);
    }

    #[test]
    fn score_without_trace_is_heuristic_only() {
        let input = ConfidenceInput {
            token_ids: &[1, 2],
            step_scores: None,
            prompt_length: 0,
            text: "Hello world 2024",
            image_size: (1000, 1000),
        };
        let result = score_confidence(&input);
        assert!(!result.used_token_scores);
        assert_eq!(result.token_confidence, None);
        assert_close(result.confidence, result.heuristic_confidence);
    }

    #[test]
    fn score_with_trace_blends() {
        let probs = array![[0.1f32, 0.9], [0.1, 0.9]];
        let input = ConfidenceInput {
            token_ids: &[5, 1, 1],
            step_scores: Some(StepScores::Probabilities(probs.view())),
            prompt_length: 1,
            text: "Hello world 2024",
            image_size: (1000, 1000),
        };
        let result = score_confidence(&input);
        assert!(result.used_token_scores);
        let token = result.token_confidence.unwrap();
        assert!((token - 0.9).abs() < 1e-6);
        assert_close(result.confidence, 0.7 * token + 0.3 * 0.7);
    }
}
