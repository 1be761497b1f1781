//! Claude model pricing table, keyed by model-name prefix with
//! longest-match lookup and a conservative Sonnet-tier fallback
//! (SPEC_FULL §4.2, §9).

/// Per-million-token USD rates.
#[derive(Clone, Copy, Debug)]
pub struct ModelRate {
    pub input_per_million: f64,
    pub output_per_million: f64,
    pub cache_read_per_million: f64,
    pub cache_write_per_million: f64,
}

const SONNET_FALLBACK: ModelRate = ModelRate {
    input_per_million: 3.0,
    output_per_million: 15.0,
    cache_read_per_million: 0.30,
    cache_write_per_million: 3.75,
};

/// Longest-prefix-first; new model ids are representable without code
/// changes by falling back to `SONNET_FALLBACK` rather than erroring.
const TABLE: &[(&str, ModelRate)] = &[
    (
        "claude-opus",
        ModelRate {
            input_per_million: 15.0,
            output_per_million: 75.0,
            cache_read_per_million: 1.50,
            cache_write_per_million: 18.75,
        },
    ),
    ("claude-sonnet", SONNET_FALLBACK),
    (
        "claude-haiku",
        ModelRate {
            input_per_million: 0.80,
            output_per_million: 4.0,
            cache_read_per_million: 0.08,
            cache_write_per_million: 1.0,
        },
    ),
];

pub fn rate_for_model(model: &str) -> ModelRate {
    TABLE
        .iter()
        .filter(|(prefix, _)| model.starts_with(prefix))
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(_, rate)| *rate)
        .unwrap_or(SONNET_FALLBACK)
}

pub fn estimate_cost_usd(rate: ModelRate, input_tokens: u64, output_tokens: u64, cache_read_tokens: u64, cache_write_tokens: u64) -> f64 {
    let cost = input_tokens as f64 / 1_000_000.0 * rate.input_per_million
        + output_tokens as f64 / 1_000_000.0 * rate.output_per_million
        + cache_read_tokens as f64 / 1_000_000.0 * rate.cache_read_per_million
        + cache_write_tokens as f64 / 1_000_000.0 * rate.cache_write_per_million;
    (cost * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_prefix_wins_over_shorter_match() {
        let rate = rate_for_model("claude-opus-4-5-20260101");
        assert_eq!(rate.input_per_million, 15.0);
    }

    #[test]
    fn unknown_model_falls_back_to_sonnet_tier() {
        let rate = rate_for_model("claude-future-model-x");
        assert_eq!(rate.input_per_million, SONNET_FALLBACK.input_per_million);
    }

    #[test]
    fn cost_is_rounded_to_the_cent() {
        let rate = rate_for_model("claude-haiku-3-5");
        let cost = estimate_cost_usd(rate, 1_000_000, 0, 0, 0);
        assert_eq!(cost, 0.80);
    }
}
