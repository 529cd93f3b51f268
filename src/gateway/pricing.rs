//! Per-token prices for the models the router knows about, in nanodollars
//! (1e-9 USD).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_nanos_per_token: i64,
    pub output_nanos_per_token: i64,
}

impl ModelPricing {
    const fn nanos(input: i64, output: i64) -> Self {
        Self {
            input_nanos_per_token: input,
            output_nanos_per_token: output,
        }
    }

    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> i64 {
        i64::from(input_tokens) * self.input_nanos_per_token
            + i64::from(output_tokens) * self.output_nanos_per_token
    }
}

/// Charged for ids missing from the table.
pub const FALLBACK_PRICING: ModelPricing = ModelPricing::nanos(1_000, 5_000);

// USD per 1M tokens times 1000. Input/output USD: gpt-4o 2.50/10,
// gpt-4o-mini 0.15/0.60, gpt-5 1.25/10, gpt-5-mini 0.25/2, claude-sonnet-4.5 3/15.
const GPT_4O: ModelPricing = ModelPricing::nanos(2_500, 10_000);
const GPT_4O_MINI: ModelPricing = ModelPricing::nanos(150, 600);
const GPT_5: ModelPricing = ModelPricing::nanos(1_250, 10_000);
const GPT_5_MINI: ModelPricing = ModelPricing::nanos(250, 2_000);
const CLAUDE_SONNET_4_5: ModelPricing = ModelPricing::nanos(3_000, 15_000);

/// Keyed by bare model name; the `vendor/` prefix and any `-YYYY-MM-DD`
/// snapshot suffix are stripped before lookup.
const PRICES: &[(&str, ModelPricing)] = &[
    ("gpt-4o", GPT_4O),
    ("gpt-4o-mini", GPT_4O_MINI),
    ("gpt-5", GPT_5),
    ("gpt-5-mini", GPT_5_MINI),
    ("claude-sonnet-4.5", CLAUDE_SONNET_4_5),
];

fn base_name(model_id: &str) -> &str {
    let name = model_id.rsplit('/').next().unwrap_or(model_id);
    // Snapshot suffixes look like "-2024-11-20".
    match name.len().checked_sub(11) {
        Some(cut)
            if name.is_char_boundary(cut)
                && name[cut..].starts_with('-')
                && name[cut + 1..]
                    .bytes()
                    .all(|b| b.is_ascii_digit() || b == b'-') =>
        {
            &name[..cut]
        }
        _ => name,
    }
}

pub fn get_pricing(model_id: &str) -> Option<ModelPricing> {
    let name = base_name(model_id);
    PRICES
        .iter()
        .find(|(known, _)| *known == name)
        .map(|(_, pricing)| *pricing)
}

/// Estimated cost of one completion.
pub fn chat_cost(model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
    get_pricing(model)
        .unwrap_or(FALLBACK_PRICING)
        .cost(input_tokens, output_tokens)
}
