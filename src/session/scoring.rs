//! Derived quality and efficiency scores for session summaries.
//!
//! Both scores are deterministic functions of the session aggregates and
//! always lie in `[0, 1]`.

/// Cost-per-call above which the efficiency penalty saturates, in USD.
const COST_PER_CALL_TARGET: f64 = 0.30;

/// A computed score with its human-readable comment.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub value: f64,
    pub comment: String,
}

/// Quality: starts at 1.0, loses 0.1 per API error and 0.05 per rejected
/// tool decision, clamping at zero after each deduction.
pub fn quality(api_errors: u64, rejections: u64) -> Score {
    let mut value = 1.0_f64;
    value = (value - 0.1 * api_errors as f64).max(0.0);
    value = (value - 0.05 * rejections as f64).max(0.0);

    Score {
        value,
        comment: format!("{api_errors} errors, {rejections} rejections"),
    }
}

/// Token counts feeding the efficiency score.
#[derive(Debug, Clone, Copy, Default)]
pub struct EfficiencyInputs {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_creation_tokens: u64,
    pub total_cost_usd: f64,
    pub api_call_count: u64,
}

/// Efficiency: the mean of the cache-usage ratio and the cost-per-call
/// term `1 - min(1, cost_per_call / 0.30)`, equally weighted.
pub fn efficiency(inputs: EfficiencyInputs) -> Score {
    let cached = inputs.cache_read_tokens + inputs.cache_creation_tokens;
    let all_tokens = inputs.input_tokens + inputs.output_tokens + cached;
    let cache_ratio = cached as f64 / (all_tokens.max(1)) as f64;

    let cost_per_call = inputs.total_cost_usd / inputs.api_call_count.max(1) as f64;
    let cost_term = 1.0 - (cost_per_call / COST_PER_CALL_TARGET).min(1.0);

    let value = ((cache_ratio + cost_term) / 2.0).clamp(0.0, 1.0);

    Score {
        value,
        comment: format!("cache ratio {cache_ratio:.2}, cost per call ${cost_per_call:.4}"),
    }
}
