//! Token usage accounting and pricing.
//!
//! Rates come from configuration, quoted per 1,000 tokens with separate
//! prompt and completion prices. Unknown models fall back to the
//! configured default model's rates so accounting never fails a turn.

use crate::config::PricingConfig;
use crate::models::{TokenUsage, UsageRecord};

pub struct PricingTable {
    config: PricingConfig,
}

impl PricingTable {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    /// Build the usage record for one completion call.
    ///
    /// `cost` is the provider cost, `customer_price` is cost plus the
    /// configured markup; both are rounded to six decimal places.
    pub fn calculate(&self, model: &str, usage: TokenUsage) -> UsageRecord {
        let rates = self
            .config
            .models
            .get(model)
            .or_else(|| self.config.models.get(&self.config.default_model));

        let (prompt_rate, completion_rate) = match rates {
            Some(r) => (r.prompt_per_1k, r.completion_per_1k),
            None => (0.0, 0.0),
        };

        let cost = (usage.prompt_tokens as f64 / 1000.0) * prompt_rate
            + (usage.completion_tokens as f64 / 1000.0) * completion_rate;
        let customer_price = cost * (1.0 + self.config.markup);

        UsageRecord {
            model: model.to_string(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.prompt_tokens + usage.completion_tokens,
            cost: round6(cost),
            customer_price: round6(customer_price),
        }
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
