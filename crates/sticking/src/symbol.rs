use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::onset::DrumType;
use crate::{Error, Result};

/// Probability mass below this is treated as zero when checking forbidden symbols.
const MASS_EPSILON: f64 = 1e-12;

/// Tolerance on a distribution's total mass.
const SUM_TOLERANCE: f64 = 1e-6;

/// One limb assignment: left hand, right hand, or kick foot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StickingSymbol {
    L,
    R,
    K,
}

impl StickingSymbol {
    pub const ALL: [StickingSymbol; 3] = [StickingSymbol::L, StickingSymbol::R, StickingSymbol::K];

    pub fn as_char(&self) -> char {
        match self {
            Self::L => 'L',
            Self::R => 'R',
            Self::K => 'K',
        }
    }

    pub fn hand(&self) -> Option<Hand> {
        match self {
            Self::L => Some(Hand::Left),
            Self::R => Some(Hand::Right),
            Self::K => None,
        }
    }

    /// The only symbol set allowed for `drum`: kicks map to K, everything else to a hand.
    pub fn is_allowed_for(&self, drum: DrumType) -> bool {
        drum.is_kick() == matches!(self, Self::K)
    }
}

impl std::fmt::Display for StickingSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hand {
    Left,
    Right,
}

impl Hand {
    pub fn opposite(&self) -> Hand {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    pub fn symbol(&self) -> StickingSymbol {
        match self {
            Self::Left => StickingSymbol::L,
            Self::Right => StickingSymbol::R,
        }
    }
}

impl FromStr for Hand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l" | "left" => Ok(Hand::Left),
            "r" | "right" => Ok(Hand::Right),
            other => Err(Error::Config(format!("unknown hand: {other}"))),
        }
    }
}

/// Probability mass over {L, R, K} for one event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub left: f64,
    pub right: f64,
    pub kick: f64,
}

impl Distribution {
    pub fn forced_kick() -> Self {
        Self {
            left: 0.0,
            right: 0.0,
            kick: 1.0,
        }
    }

    pub fn hands(left: f64, right: f64) -> Self {
        Self {
            left,
            right,
            kick: 0.0,
        }
    }

    pub fn prob(&self, symbol: StickingSymbol) -> f64 {
        match symbol {
            StickingSymbol::L => self.left,
            StickingSymbol::R => self.right,
            StickingSymbol::K => self.kick,
        }
    }

    /// Symbols with non-zero mass, in L, R, K order.
    pub fn support(&self) -> impl Iterator<Item = (StickingSymbol, f64)> + '_ {
        StickingSymbol::ALL
            .into_iter()
            .map(move |s| (s, self.prob(s)))
            .filter(|&(_, p)| p > MASS_EPSILON)
    }

    /// Check that this is a proper distribution for an event of type `drum`.
    ///
    /// Never renormalizes: a bad distribution is the scorer's bug.
    pub fn validate(&self, drum: DrumType, index: usize) -> Result<()> {
        let invalid = |reason: String| Error::InvalidScore { index, reason };

        for symbol in StickingSymbol::ALL {
            let p = self.prob(symbol);
            if !p.is_finite() || p < 0.0 {
                return Err(invalid(format!("P({symbol}) = {p} is not a probability")));
            }
            if !symbol.is_allowed_for(drum) && p > MASS_EPSILON {
                return Err(invalid(format!(
                    "P({symbol}) = {p} on a {drum} event, which forbids {symbol}"
                )));
            }
        }

        let total = self.left + self.right + self.kick;
        if (total - 1.0).abs() > SUM_TOLERANCE {
            return Err(invalid(format!("mass sums to {total}")));
        }

        Ok(())
    }
}

/// Render symbols as "K R L R".
pub fn sticking_string(symbols: &[StickingSymbol]) -> String {
    symbols
        .iter()
        .map(|s| s.as_char().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
