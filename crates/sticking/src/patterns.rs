//! Rudiment and motif detection over a hypothesis's hand sequence.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::onset::OnsetEvent;
use crate::symbol::Hand;

/// Hand hits remembered for motif matching. A paradiddle spans four, plus the
/// hit before it to find the group boundary.
const HISTORY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Motif {
    DoubleStroke,
    TripleStroke,
    /// Four or more strokes with one hand.
    StrokeRun,
    Paradiddle,
    Flam,
}

impl Motif {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::DoubleStroke => "Double stroke",
            Self::TripleStroke => "Triple stroke",
            Self::StrokeRun => "Stroke run",
            Self::Paradiddle => "Paradiddle",
            Self::Flam => "Flam",
        }
    }
}

/// One detected motif, anchored where it starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternTag {
    pub motif: Motif,
    pub event_index: usize,
    pub position_in_bar: Option<f64>,
    /// Hand hits the motif covers.
    pub strokes: u32,
}

impl PatternTag {
    /// "beat 2.5" from the bar position, or "hit 7" when the position is unknown.
    pub fn location(&self, beats_per_bar: u32) -> String {
        match self.position_in_bar {
            Some(pos) => format!("beat {}", trim_number(pos * beats_per_bar as f64 + 1.0)),
            None => format!("hit {}", self.event_index + 1),
        }
    }

    /// "Double stroke", or "7-stroke run" for a long single-hand run.
    pub fn name(&self) -> String {
        match self.motif {
            Motif::StrokeRun => format!("{}-stroke run", self.strokes),
            motif => motif.display_name().to_string(),
        }
    }
}

/// Per-hypothesis motif state, cloned into every child.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MotifTracker {
    recent: Vec<(Hand, usize)>,
    run_length: u32,
    run_start: usize,
    /// Index into `tags` of the tag describing the current run.
    run_tag: Option<usize>,
    tags: Vec<PatternTag>,
}

impl MotifTracker {
    pub fn tags(&self) -> &[PatternTag] {
        &self.tags
    }

    pub fn motifs(&self) -> BTreeSet<Motif> {
        self.tags.iter().map(|t| t.motif).collect()
    }

    /// Record `hand` striking `events[index]` and tag any motif it completes.
    pub fn observe(
        &mut self,
        hand: Hand,
        index: usize,
        events: &[OnsetEvent],
        flam_threshold: f64,
    ) {
        let previous = self.recent.last().copied();

        if let Some((prev_hand, prev_index)) = previous {
            if prev_hand != hand {
                let gap = events[index].timestamp - events[prev_index].timestamp;
                if gap < flam_threshold {
                    self.tag(Motif::Flam, prev_index, 2, events);
                }
            }
        }

        match previous {
            Some((prev_hand, _)) if prev_hand == hand => self.run_length += 1,
            _ => {
                self.run_length = 1;
                self.run_start = index;
                self.run_tag = None;
            }
        }

        self.recent.push((hand, index));
        if self.recent.len() > HISTORY {
            self.recent.remove(0);
        }

        match self.run_length {
            1 => {}
            2 => match self.paradiddle_start() {
                Some(start) => self.tag(Motif::Paradiddle, start, 4, events),
                None => self.tag(Motif::DoubleStroke, self.run_start, 2, events),
            },
            n => {
                let motif = if n == 3 {
                    Motif::TripleStroke
                } else {
                    Motif::StrokeRun
                };
                if let Some(tag) = self.run_tag.and_then(|i| self.tags.get_mut(i)) {
                    tag.motif = motif;
                    tag.event_index = self.run_start;
                    tag.position_in_bar = events[self.run_start].position_in_bar;
                    tag.strokes = n;
                }
            }
        }
    }

    /// Event index where a paradiddle ending on this hit starts.
    ///
    /// The last four hands read X Y X X with Y the opposite hand, and the hit
    /// before them (if any) is not X, so R R L R R is two doubles.
    fn paradiddle_start(&self) -> Option<usize> {
        let n = self.recent.len();
        if n < 4 {
            return None;
        }
        let h: Vec<Hand> = self.recent[n - 4..].iter().map(|&(hand, _)| hand).collect();
        let grouped = h[1] == h[0].opposite() && h[2] == h[0] && h[3] == h[0];
        let boundary = n == 4 || self.recent[n - 5].0 != h[0];
        (grouped && boundary).then(|| self.recent[n - 4].1)
    }

    /// Tags the run's opening pair; later strokes of the run rewrite it.
    fn tag(&mut self, motif: Motif, event_index: usize, strokes: u32, events: &[OnsetEvent]) {
        if motif != Motif::Flam {
            self.run_tag = Some(self.tags.len());
        }
        self.tags.push(PatternTag {
            motif,
            event_index,
            position_in_bar: events[event_index].position_in_bar,
            strokes,
        });
    }
}

/// Human-readable summary of a tag list.
///
/// "Standard alternating" when nothing was detected, otherwise one clause
/// per motif in order of first appearance, e.g.
/// "Double stroke at beat 2.5, Flam x2 from beat 1".
pub fn pattern_label(tags: &[PatternTag], beats_per_bar: u32) -> String {
    if tags.is_empty() {
        return "Standard alternating".to_string();
    }

    let mut order: Vec<String> = Vec::new();
    for tag in tags {
        let name = tag.name();
        if !order.contains(&name) {
            order.push(name);
        }
    }

    order
        .into_iter()
        .map(|name| {
            let occurrences: Vec<&PatternTag> = tags.iter().filter(|t| t.name() == name).collect();
            let first = occurrences[0].location(beats_per_bar);
            if occurrences.len() == 1 {
                format!("{} at {}", name, first)
            } else {
                format!("{} x{} from {}", name, occurrences.len(), first)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn trim_number(value: f64) -> String {
    let s = format!("{:.2}", value);
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}
