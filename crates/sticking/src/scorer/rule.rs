use crate::rules::{RuleContext, RuleEngine, RuleOutcome};
use crate::symbol::{Distribution, StickingSymbol};
use crate::{Error, Result};

use super::{ScorerError, ScorerState, SequenceScorer, StepContext, StepEvent, StepScore};

/// Softmax over rule bonuses.
///
/// Lower temperature sharpens the preference, higher flattens it toward 50/50.
#[derive(Debug, Clone)]
pub struct RuleScorer {
    rules: RuleEngine,
    temperature: f64,
}

impl RuleScorer {
    pub fn new(rules: RuleEngine, temperature: f64) -> Result<Self> {
        if !temperature.is_finite() || temperature <= 0.0 {
            return Err(Error::Config(format!(
                "temperature must be positive, got {temperature}"
            )));
        }
        Ok(Self { rules, temperature })
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    fn distribution(&self, step: &StepEvent<'_>, context: &StepContext<'_>) -> Distribution {
        let outcome = self.rules.evaluate(&RuleContext {
            event: step.event,
            last_hand: context.last_hand,
            hand_interval: step.hand_interval,
        });

        match outcome {
            RuleOutcome::Forced(StickingSymbol::K) => Distribution::forced_kick(),
            RuleOutcome::Forced(StickingSymbol::L) => Distribution::hands(1.0, 0.0),
            RuleOutcome::Forced(StickingSymbol::R) => Distribution::hands(0.0, 1.0),
            RuleOutcome::Soft(bonus) => {
                let l = bonus.left / self.temperature;
                let r = bonus.right / self.temperature;
                let m = l.max(r);
                let el = (l - m).exp();
                let er = (r - m).exp();
                let z = el + er;
                Distribution::hands(el / z, er / z)
            }
        }
    }
}

impl Default for RuleScorer {
    fn default() -> Self {
        Self {
            rules: RuleEngine::default(),
            temperature: 1.0,
        }
    }
}

impl SequenceScorer for RuleScorer {
    fn name(&self) -> &'static str {
        "rule"
    }

    fn score_next(
        &self,
        step: &StepEvent<'_>,
        context: &StepContext<'_>,
    ) -> std::result::Result<StepScore, ScorerError> {
        Ok(StepScore {
            distribution: self.distribution(step, context),
            state: ScorerState::Stateless,
        })
    }
}
