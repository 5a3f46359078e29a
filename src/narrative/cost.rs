//! Token usage and dollar cost accounting for generation calls.

use serde::{Deserialize, Serialize};

/// Price in dollars per 1K tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub prompt: f64,
    pub completion: f64,
}

pub const MODEL_PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o-mini", ModelPrice { prompt: 0.00015, completion: 0.0006 }),
    ("gpt-4o", ModelPrice { prompt: 0.005, completion: 0.015 }),
];

/// Unknown models are priced at zero.
pub fn price_for(model: &str) -> ModelPrice {
    MODEL_PRICES
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, price)| *price)
        .unwrap_or(ModelPrice { prompt: 0.0, completion: 0.0 })
}

/// Token counts reported by the generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepCost {
    pub name: String,
    pub model: String,
    pub usage: Usage,
}

impl StepCost {
    pub fn dollars(&self) -> f64 {
        let price = price_for(&self.model);
        (self.usage.prompt_tokens as f64 * price.prompt
            + self.usage.completion_tokens as f64 * price.completion)
            / 1000.0
    }
}

/// Running tally of generation steps within one command.
#[derive(Debug, Default)]
pub struct CostSession {
    steps: Vec<StepCost>,
}

impl CostSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, model: &str, usage: Usage) {
        self.steps.push(StepCost { name: name.to_string(), model: model.to_string(), usage });
    }

    pub fn steps(&self) -> &[StepCost] {
        &self.steps
    }

    pub fn total_dollars(&self) -> f64 {
        self.steps.iter().map(StepCost::dollars).sum()
    }

    pub fn log_summary(&self) {
        if self.steps.is_empty() {
            return;
        }
        for step in &self.steps {
            tracing::info!(
                step = %step.name,
                model = %step.model,
                prompt_tokens = step.usage.prompt_tokens,
                completion_tokens = step.usage.completion_tokens,
                "cost ${:.4}",
                step.dollars()
            );
        }
        tracing::info!("total LLM cost ${:.4}", self.total_dollars());
    }
}
