use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::{Error, Result};

/// Drum classes produced by the upstream classification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumType {
    Kick,
    Snare,
    HihatClosed,
    HihatOpen,
    TomHi,
    TomMid,
    TomLo,
    Crash,
    Ride,
}

impl DrumType {
    pub const COUNT: usize = 9;

    pub const ALL: [DrumType; Self::COUNT] = [
        DrumType::Kick,
        DrumType::Snare,
        DrumType::HihatClosed,
        DrumType::HihatOpen,
        DrumType::TomHi,
        DrumType::TomMid,
        DrumType::TomLo,
        DrumType::Crash,
        DrumType::Ride,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kick => "kick",
            Self::Snare => "snare",
            Self::HihatClosed => "hihat_closed",
            Self::HihatOpen => "hihat_open",
            Self::TomHi => "tom_hi",
            Self::TomMid => "tom_mid",
            Self::TomLo => "tom_lo",
            Self::Crash => "crash",
            Self::Ride => "ride",
        }
    }

    /// Stable row index into per-drum tables (embeddings, policies).
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn is_kick(&self) -> bool {
        matches!(self, Self::Kick)
    }

    /// Hi-hats and ride: the timekeeping cymbals.
    pub fn is_cymbal(&self) -> bool {
        matches!(self, Self::HihatClosed | Self::HihatOpen | Self::Ride)
    }
}

impl std::fmt::Display for DrumType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrumType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DrumType::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| Error::Config(format!("unknown drum type: {s}")))
    }
}

/// A single classified drum hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnsetEvent {
    /// Seconds from the start of the clip.
    pub timestamp: f64,
    pub drum_type: DrumType,
    /// Normalized hit strength in [0, 1].
    pub velocity: f64,
    /// Fraction of the bar elapsed at this hit, in [0, 1), when known.
    #[serde(default)]
    pub position_in_bar: Option<f64>,
}

impl OnsetEvent {
    pub fn new(timestamp: f64, drum_type: DrumType, velocity: f64) -> Self {
        Self {
            timestamp,
            drum_type,
            velocity,
            position_in_bar: None,
        }
    }

    pub fn at_position(mut self, position_in_bar: f64) -> Self {
        self.position_in_bar = Some(position_in_bar);
        self
    }
}

/// An ordered, validated run of onsets. Immutable once built.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<OnsetEvent>", into = "Vec<OnsetEvent>")]
pub struct OnsetSequence {
    events: Vec<OnsetEvent>,
}

impl OnsetSequence {
    /// Validate ordering and value ranges. Equal timestamps keep their
    /// relative order.
    pub fn new(events: Vec<OnsetEvent>) -> Result<Self> {
        let mut previous: Option<f64> = None;

        for (i, event) in events.iter().enumerate() {
            if !event.timestamp.is_finite() || event.timestamp < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "event {i}: timestamp {} is not a finite non-negative value",
                    event.timestamp
                )));
            }
            if let Some(prev) = previous {
                if event.timestamp < prev {
                    return Err(Error::InvalidInput(format!(
                        "event {i}: timestamp {} precedes previous {}",
                        event.timestamp, prev
                    )));
                }
            }
            if !(0.0..=1.0).contains(&event.velocity) {
                return Err(Error::InvalidInput(format!(
                    "event {i}: velocity {} outside [0, 1]",
                    event.velocity
                )));
            }
            if let Some(pos) = event.position_in_bar {
                if !(0.0..1.0).contains(&pos) {
                    return Err(Error::InvalidInput(format!(
                        "event {i}: position_in_bar {pos} outside [0, 1)"
                    )));
                }
            }
            previous = Some(event.timestamp);
        }

        Ok(Self { events })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn as_slice(&self) -> &[OnsetEvent] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&OnsetEvent> {
        self.events.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OnsetEvent> {
        self.events.iter()
    }

    /// Seconds since the previous onset of any kind, per event.
    pub fn intervals(&self) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(self.events.len());
        let mut last: Option<f64> = None;
        for event in &self.events {
            out.push(last.map(|t| event.timestamp - t));
            last = Some(event.timestamp);
        }
        out
    }

    /// Seconds since the previous hand (non-kick) onset, per event.
    pub fn hand_intervals(&self) -> Vec<Option<f64>> {
        let mut out = Vec::with_capacity(self.events.len());
        let mut last_hand: Option<f64> = None;
        for event in &self.events {
            out.push(last_hand.map(|t| event.timestamp - t));
            if !event.drum_type.is_kick() {
                last_hand = Some(event.timestamp);
            }
        }
        out
    }
}

impl TryFrom<Vec<OnsetEvent>> for OnsetSequence {
    type Error = Error;

    fn try_from(events: Vec<OnsetEvent>) -> Result<Self> {
        Self::new(events)
    }
}

impl From<OnsetSequence> for Vec<OnsetEvent> {
    fn from(seq: OnsetSequence) -> Self {
        seq.events
    }
}

impl<'a> IntoIterator for &'a OnsetSequence {
    type Item = &'a OnsetEvent;
    type IntoIter = std::slice::Iter<'a, OnsetEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn hit(t: f64, drum: DrumType) -> OnsetEvent {
        OnsetEvent::new(t, drum, 0.8)
    }

    #[test]
    fn drum_names_round_trip_through_from_str() {
        for drum in DrumType::ALL {
            assert_eq!(drum.as_str().parse::<DrumType>().unwrap(), drum);
        }
        assert!("cowbell".parse::<DrumType>().is_err());
    }

    #[test]
    fn serde_names_match_as_str() {
        let json = serde_json::to_string(&DrumType::HihatClosed).unwrap();
        assert_eq!(json, "\"hihat_closed\"");
    }

    #[test]
    fn simultaneous_hits_are_kept_in_order() {
        let seq = OnsetSequence::new(vec![
            hit(0.0, DrumType::HihatClosed),
            hit(0.0, DrumType::Kick),
            hit(0.25, DrumType::Snare),
        ])
        .unwrap();
        let drums: Vec<DrumType> = seq.iter().map(|e| e.drum_type).collect();
        assert_eq!(
            drums,
            vec![DrumType::HihatClosed, DrumType::Kick, DrumType::Snare]
        );
    }

    #[test]
    fn decreasing_timestamps_rejected() {
        let err = OnsetSequence::new(vec![hit(0.5, DrumType::Snare), hit(0.4, DrumType::Snare)])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(OnsetSequence::new(vec![OnsetEvent::new(0.0, DrumType::Snare, 1.5)]).is_err());
        assert!(OnsetSequence::new(vec![OnsetEvent::new(f64::NAN, DrumType::Snare, 0.5)]).is_err());
        assert!(
            OnsetSequence::new(vec![hit(0.0, DrumType::Snare).at_position(1.0)]).is_err()
        );
    }

    #[test]
    fn hand_intervals_skip_kicks() {
        let seq = OnsetSequence::new(vec![
            hit(0.0, DrumType::Snare),
            hit(0.1, DrumType::Kick),
            hit(0.3, DrumType::Snare),
        ])
        .unwrap();
        let hand = seq.hand_intervals();
        assert_eq!(hand[0], None);
        assert!((hand[1].unwrap() - 0.1).abs() < 1e-9);
        assert!((hand[2].unwrap() - 0.3).abs() < 1e-9);

        let any = seq.intervals();
        assert!((any[2].unwrap() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn deserialize_validates() {
        let bad = r#"[{"timestamp": 1.0, "drum_type": "snare", "velocity": 0.5},
                      {"timestamp": 0.5, "drum_type": "snare", "velocity": 0.5}]"#;
        assert!(serde_json::from_str::<OnsetSequence>(bad).is_err());

        let good = r#"[{"timestamp": 0.0, "drum_type": "kick", "velocity": 0.9}]"#;
        let seq: OnsetSequence = serde_json::from_str(good).unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.as_slice()[0].position_in_bar, None);
    }
}
