//! Hard constraints and soft hand heuristics.
//!
//! The kick constraint is absolute. Hand choice is only nudged: every rule
//! adds a bonus to one hand and the scorer turns bonuses into probabilities.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::onset::{DrumType, OnsetEvent};
use crate::symbol::{Hand, StickingSymbol};
use crate::{Error, Result};

/// Tolerance, in beats, for treating a hit as on the beat.
const ON_BEAT_TOLERANCE: f64 = 0.05;

/// How hits on a drum type relate to the previous hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandPolicy {
    /// Prefer the hand opposite the previous hand hit.
    Alternate,
    /// Alternate, but favour repeating the hand on fast successive hits.
    AlternateWithDoubles,
    /// No hand preference.
    Free,
}

impl HandPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alternate => "alternate",
            Self::AlternateWithDoubles => "alternate_with_doubles",
            Self::Free => "free",
        }
    }
}

impl FromStr for HandPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "alternate" => Ok(Self::Alternate),
            "alternate_with_doubles" | "doubles" => Ok(Self::AlternateWithDoubles),
            "free" => Ok(Self::Free),
            other => Err(Error::Config(format!("unknown hand policy: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleConfig {
    /// Hand preferred for the first hand hit.
    pub initial_hand: Hand,
    /// Seconds. Faster successive hand hits on a doubles drum favour the same hand.
    pub double_stroke_threshold: f64,
    pub alternation_bonus: f64,
    pub double_stroke_bonus: f64,
    /// Lead-hand bonus on on-beat hits. 0 disables.
    pub accent_bonus: f64,
    pub beats_per_bar: u32,
    policies: [HandPolicy; DrumType::COUNT],
}

impl RuleConfig {
    pub fn policy(&self, drum: DrumType) -> HandPolicy {
        self.policies[drum.index()]
    }

    pub fn set_policy(&mut self, drum: DrumType, policy: HandPolicy) {
        self.policies[drum.index()] = policy;
    }

    pub fn with_policy(mut self, drum: DrumType, policy: HandPolicy) -> Self {
        self.set_policy(drum, policy);
        self
    }
}

impl Default for RuleConfig {
    fn default() -> Self {
        let mut policies = [HandPolicy::Alternate; DrumType::COUNT];
        policies[DrumType::Snare.index()] = HandPolicy::AlternateWithDoubles;

        Self {
            initial_hand: Hand::Right,
            double_stroke_threshold: 0.12,
            alternation_bonus: 1.0,
            double_stroke_bonus: 1.5,
            accent_bonus: 0.0,
            beats_per_bar: 4,
            policies,
        }
    }
}

/// What the rules know when an event is about to be assigned.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub event: &'a OnsetEvent,
    /// Most recent hand in this hypothesis. Kicks never change it.
    pub last_hand: Option<Hand>,
    /// Seconds since the previous hand (non-kick) onset.
    pub hand_interval: Option<f64>,
}

/// Additive preference for each hand.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HandBonus {
    pub left: f64,
    pub right: f64,
}

impl HandBonus {
    pub fn add(&mut self, hand: Hand, amount: f64) {
        match hand {
            Hand::Left => self.left += amount,
            Hand::Right => self.right += amount,
        }
    }

    pub fn get(&self, hand: Hand) -> f64 {
        match hand {
            Hand::Left => self.left,
            Hand::Right => self.right,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleOutcome {
    /// The symbol is fixed; it receives all probability mass.
    Forced(StickingSymbol),
    Soft(HandBonus),
}

/// Pure evaluation of the heuristics for one event in one hypothesis.
#[derive(Debug, Clone, Default)]
pub struct RuleEngine {
    config: RuleConfig,
}

impl RuleEngine {
    pub fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RuleConfig {
        &self.config
    }

    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let drum = ctx.event.drum_type;
        if drum.is_kick() {
            return RuleOutcome::Forced(StickingSymbol::K);
        }

        let mut bonus = HandBonus::default();

        match self.config.policy(drum) {
            HandPolicy::Free => {}
            HandPolicy::Alternate => {
                bonus.add(self.alternating_hand(ctx), self.config.alternation_bonus);
            }
            HandPolicy::AlternateWithDoubles => {
                bonus.add(self.alternating_hand(ctx), self.config.alternation_bonus);
                if let (Some(last), Some(ioi)) = (ctx.last_hand, ctx.hand_interval) {
                    if ioi < self.config.double_stroke_threshold {
                        bonus.add(last, self.config.double_stroke_bonus);
                    }
                }
            }
        }

        if self.config.accent_bonus > 0.0 && self.is_on_beat(ctx.event) {
            bonus.add(self.config.initial_hand, self.config.accent_bonus);
        }

        RuleOutcome::Soft(bonus)
    }

    fn alternating_hand(&self, ctx: &RuleContext<'_>) -> Hand {
        ctx.last_hand
            .map(|h| h.opposite())
            .unwrap_or(self.config.initial_hand)
    }

    fn is_on_beat(&self, event: &OnsetEvent) -> bool {
        match event.position_in_bar {
            Some(pos) => {
                let beats = pos * self.config.beats_per_bar as f64;
                (beats - beats.round()).abs() < ON_BEAT_TOLERANCE
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn soft(outcome: RuleOutcome) -> HandBonus {
        match outcome {
            RuleOutcome::Soft(b) => b,
            RuleOutcome::Forced(s) => panic!("expected soft outcome, got forced {s}"),
        }
    }

    fn ctx(
        event: &OnsetEvent,
        last_hand: Option<Hand>,
        hand_interval: Option<f64>,
    ) -> RuleContext<'_> {
        RuleContext {
            event,
            last_hand,
            hand_interval,
        }
    }

    #[test]
    fn kick_is_forced() {
        let engine = RuleEngine::default();
        let kick = OnsetEvent::new(0.0, DrumType::Kick, 1.0);
        assert_eq!(
            engine.evaluate(&ctx(&kick, Some(Hand::Left), Some(0.01))),
            RuleOutcome::Forced(StickingSymbol::K)
        );
    }

    #[test]
    fn first_hand_hit_prefers_initial_hand() {
        let engine = RuleEngine::default();
        let snare = OnsetEvent::new(0.0, DrumType::Snare, 0.8);
        let b = soft(engine.evaluate(&ctx(&snare, None, None)));
        assert!(b.right > b.left);

        let lefty = RuleEngine::new(RuleConfig {
            initial_hand: Hand::Left,
            ..RuleConfig::default()
        });
        let b = soft(lefty.evaluate(&ctx(&snare, None, None)));
        assert!(b.left > b.right);
    }

    #[test]
    fn cymbals_alternate() {
        let engine = RuleEngine::default();
        for drum in [DrumType::HihatClosed, DrumType::HihatOpen, DrumType::Ride] {
            let hat = OnsetEvent::new(1.0, drum, 0.5);
            // Fast hits do not trigger doubles on cymbals.
            let b = soft(engine.evaluate(&ctx(&hat, Some(Hand::Right), Some(0.05))));
            assert!(b.left > b.right, "{drum} should alternate");
        }
    }

    #[test]
    fn fast_snare_favours_repeat() {
        let engine = RuleEngine::default();
        let snare = OnsetEvent::new(1.0, DrumType::Snare, 0.8);

        let slow = soft(engine.evaluate(&ctx(&snare, Some(Hand::Right), Some(0.25))));
        assert!(slow.left > slow.right);

        let fast = soft(engine.evaluate(&ctx(&snare, Some(Hand::Right), Some(0.08))));
        assert!(fast.right > fast.left);
        assert_eq!(fast.right, 1.5);
        assert_eq!(fast.left, 1.0);
    }

    #[test]
    fn free_policy_has_no_preference() {
        let engine =
            RuleEngine::new(RuleConfig::default().with_policy(DrumType::TomLo, HandPolicy::Free));
        let tom = OnsetEvent::new(1.0, DrumType::TomLo, 0.8);
        let b = soft(engine.evaluate(&ctx(&tom, Some(Hand::Left), Some(0.3))));
        assert_eq!(b, HandBonus::default());
    }

    #[test]
    fn accent_goes_to_lead_hand_on_the_beat() {
        let engine = RuleEngine::new(RuleConfig {
            accent_bonus: 0.5,
            ..RuleConfig::default()
        });
        let on_beat = OnsetEvent::new(1.0, DrumType::Crash, 0.9).at_position(0.25);
        let off_beat = OnsetEvent::new(1.0, DrumType::Crash, 0.9).at_position(0.375);

        // Previous was R, so alternation favours L by 1.0; accent adds 0.5 to R.
        let b = soft(engine.evaluate(&ctx(&on_beat, Some(Hand::Right), Some(0.3))));
        assert_eq!((b.left, b.right), (1.0, 0.5));

        let b = soft(engine.evaluate(&ctx(&off_beat, Some(Hand::Right), Some(0.3))));
        assert_eq!((b.left, b.right), (1.0, 0.0));
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!("free".parse::<HandPolicy>().unwrap(), HandPolicy::Free);
        assert_eq!(
            HandPolicy::AlternateWithDoubles.as_str().parse::<HandPolicy>().unwrap(),
            HandPolicy::AlternateWithDoubles
        );
        assert!("sometimes".parse::<HandPolicy>().is_err());
    }
}
