//! Union-of-sources press aggregation.
//!
//! Several on-screen controls (or overlapping touch zones) can legally
//! claim the same logical direction at the same time. Tracking "held" as a
//! boolean loses a press whenever two claimants overlap and one releases,
//! so every logical direction keeps a count of active claimants instead: a
//! direction is held while its count is above zero.
//!
//! Press/release pairing is not guaranteed by the platform (a pointer
//! cancel may arrive without its press having been seen here), so the
//! decrement floors at zero rather than trusting the caller.

use crate::protocol::{PadDirection, StateMessage};
use tracing::warn;

/// One logical cardinal direction, shared by the pad and the stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinal {
    Up,
    Down,
    Left,
    Right,
}

/// An 8-way claim a pad control can make. Diagonals count as both of
/// their constituent cardinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadInput {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl PadInput {
    fn cardinals(self) -> (Cardinal, Option<Cardinal>) {
        match self {
            PadInput::Up => (Cardinal::Up, None),
            PadInput::Down => (Cardinal::Down, None),
            PadInput::Left => (Cardinal::Left, None),
            PadInput::Right => (Cardinal::Right, None),
            PadInput::UpLeft => (Cardinal::Up, Some(Cardinal::Left)),
            PadInput::UpRight => (Cardinal::Up, Some(Cardinal::Right)),
            PadInput::DownLeft => (Cardinal::Down, Some(Cardinal::Left)),
            PadInput::DownRight => (Cardinal::Down, Some(Cardinal::Right)),
        }
    }
}

/// Active-claimant counts for the four cardinals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounters {
    up: u32,
    down: u32,
    left: u32,
    right: u32,
}

impl UsageCounters {
    fn slot(&mut self, cardinal: Cardinal) -> &mut u32 {
        match cardinal {
            Cardinal::Up => &mut self.up,
            Cardinal::Down => &mut self.down,
            Cardinal::Left => &mut self.left,
            Cardinal::Right => &mut self.right,
        }
    }

    pub fn press(&mut self, cardinal: Cardinal) {
        *self.slot(cardinal) += 1;
    }

    /// Decrement, flooring at zero. An unpaired release is tolerated.
    pub fn release(&mut self, cardinal: Cardinal) {
        let count = self.slot(cardinal);
        if *count == 0 {
            warn!("Release of {:?} without a matching press", cardinal);
            return;
        }
        *count -= 1;
    }

    pub fn active(&self, cardinal: Cardinal) -> bool {
        match cardinal {
            Cardinal::Up => self.up > 0,
            Cardinal::Down => self.down > 0,
            Cardinal::Left => self.left > 0,
            Cardinal::Right => self.right > 0,
        }
    }

    pub fn count(&self, cardinal: Cardinal) -> u32 {
        match cardinal {
            Cardinal::Up => self.up,
            Cardinal::Down => self.down,
            Cardinal::Left => self.left,
            Cardinal::Right => self.right,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Resolves overlapping pad and stick claims into the single value the
/// host sees. Every update returns the state patch to transmit; the caller
/// sends it immediately, there is no batching for discrete events.
#[derive(Debug, Default)]
pub struct InputAggregator {
    pad: UsageCounters,
    stick: UsageCounters,
}

impl InputAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pad press or release and return the resulting dpad patch.
    pub fn pad_input(&mut self, input: PadInput, down: bool) -> StateMessage {
        let (first, second) = input.cardinals();
        if down {
            self.pad.press(first);
            if let Some(c) = second {
                self.pad.press(c);
            }
        } else {
            self.pad.release(first);
            if let Some(c) = second {
                self.pad.release(c);
            }
        }
        StateMessage::dpad(self.pad_direction())
    }

    /// Combined 8-way (or neutral) pad output.
    ///
    /// Per axis: a side wins only while the opposite side is idle, so two
    /// opposing claims cancel to none. A lone vertical or horizontal wins
    /// outright; when both axes are active the diagonal combining them is
    /// emitted.
    pub fn pad_direction(&self) -> PadDirection {
        let vertical = if self.pad.active(Cardinal::Up) && !self.pad.active(Cardinal::Down) {
            Some(Cardinal::Up)
        } else if self.pad.active(Cardinal::Down) && !self.pad.active(Cardinal::Up) {
            Some(Cardinal::Down)
        } else {
            None
        };
        let horizontal = if self.pad.active(Cardinal::Left) && !self.pad.active(Cardinal::Right) {
            Some(Cardinal::Left)
        } else if self.pad.active(Cardinal::Right) && !self.pad.active(Cardinal::Left) {
            Some(Cardinal::Right)
        } else {
            None
        };

        match (vertical, horizontal) {
            (None, None) => PadDirection::Neutral,
            (Some(Cardinal::Up), None) => PadDirection::Up,
            (Some(Cardinal::Down), None) => PadDirection::Down,
            (None, Some(Cardinal::Left)) => PadDirection::Left,
            (None, Some(Cardinal::Right)) => PadDirection::Right,
            (Some(Cardinal::Up), Some(Cardinal::Left)) => PadDirection::UpLeft,
            (Some(Cardinal::Up), Some(Cardinal::Right)) => PadDirection::UpRight,
            (Some(Cardinal::Down), Some(Cardinal::Left)) => PadDirection::DownLeft,
            (Some(Cardinal::Down), Some(Cardinal::Right)) => PadDirection::DownRight,
            // cardinals() never yields a horizontal in the vertical slot
            _ => PadDirection::Neutral,
        }
    }

    /// Record a stick claim and return the resulting axis patch.
    pub fn stick_input(&mut self, cardinal: Cardinal, down: bool) -> StateMessage {
        if down {
            self.stick.press(cardinal);
        } else {
            self.stick.release(cardinal);
        }
        let (x, y) = self.stick_axes();
        StateMessage::left_axis(x as f64, y as f64)
    }

    /// Discrete 9-point stick emulation: each axis counter collapses to a
    /// binary active flag, combined as `x = right − left`, `y = up − down`.
    pub fn stick_axes(&self) -> (i8, i8) {
        let x = self.stick.active(Cardinal::Right) as i8 - self.stick.active(Cardinal::Left) as i8;
        let y = self.stick.active(Cardinal::Up) as i8 - self.stick.active(Cardinal::Down) as i8;
        (x, y)
    }

    pub fn pad_counters(&self) -> &UsageCounters {
        &self.pad
    }

    /// Explicit teardown; counters are never reset any other way.
    pub fn clear(&mut self) {
        self.pad.clear();
        self.stick.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_floors_at_zero_on_unpaired_release() {
        let mut counters = UsageCounters::default();
        counters.release(Cardinal::Up);
        assert_eq!(counters.count(Cardinal::Up), 0);
        counters.press(Cardinal::Up);
        counters.release(Cardinal::Up);
        counters.release(Cardinal::Up);
        assert_eq!(counters.count(Cardinal::Up), 0);
    }

    #[test]
    fn counter_zero_once_releases_catch_up_with_presses() {
        let mut counters = UsageCounters::default();
        for _ in 0..5 {
            counters.press(Cardinal::Left);
        }
        for _ in 0..7 {
            counters.release(Cardinal::Left);
        }
        assert_eq!(counters.count(Cardinal::Left), 0);
        assert!(!counters.active(Cardinal::Left));
    }

    #[test]
    fn combined_pad_mapping_is_total_over_all_sixteen_states() {
        use Cardinal::*;
        use PadDirection as D;
        // (up, down, left, right) held → expected combined output.
        let table = [
            ((false, false, false, false), D::Neutral),
            ((true, false, false, false), D::Up),
            ((false, true, false, false), D::Down),
            ((false, false, true, false), D::Left),
            ((false, false, false, true), D::Right),
            ((true, false, true, false), D::UpLeft),
            ((true, false, false, true), D::UpRight),
            ((false, true, true, false), D::DownLeft),
            ((false, true, false, true), D::DownRight),
            // opposing claims cancel their axis
            ((true, true, false, false), D::Neutral),
            ((false, false, true, true), D::Neutral),
            ((true, true, true, false), D::Left),
            ((true, true, false, true), D::Right),
            ((true, false, true, true), D::Up),
            ((false, true, true, true), D::Down),
            ((true, true, true, true), D::Neutral),
        ];
        for ((up, down, left, right), expected) in table {
            let mut agg = InputAggregator::new();
            for (held, card) in [(up, Up), (down, Down), (left, Left), (right, Right)] {
                if held {
                    agg.pad_input(
                        match card {
                            Up => PadInput::Up,
                            Down => PadInput::Down,
                            Left => PadInput::Left,
                            Right => PadInput::Right,
                        },
                        true,
                    );
                }
            }
            assert_eq!(
                agg.pad_direction(),
                expected,
                "state ({up},{down},{left},{right})"
            );
        }
    }

    #[test]
    fn diagonal_press_claims_both_cardinals() {
        let mut agg = InputAggregator::new();
        agg.pad_input(PadInput::UpRight, true);
        assert_eq!(agg.pad_counters().count(Cardinal::Up), 1);
        assert_eq!(agg.pad_counters().count(Cardinal::Right), 1);
        assert_eq!(agg.pad_direction(), PadDirection::UpRight);

        agg.pad_input(PadInput::UpRight, false);
        assert_eq!(agg.pad_direction(), PadDirection::Neutral);
    }

    #[test]
    fn three_sources_release_in_turn() {
        let mut agg = InputAggregator::new();
        for _ in 0..3 {
            agg.pad_input(PadInput::Up, true);
        }
        agg.pad_input(PadInput::Up, false);
        agg.pad_input(PadInput::Up, false);
        assert_eq!(agg.pad_counters().count(Cardinal::Up), 1);
        assert_eq!(agg.pad_direction(), PadDirection::Up);

        let patch = agg.pad_input(PadInput::Up, false);
        assert_eq!(agg.pad_counters().count(Cardinal::Up), 0);
        assert_eq!(patch, StateMessage::dpad(PadDirection::Neutral));
    }

    #[test]
    fn stick_axes_are_binary_not_additive() {
        let mut agg = InputAggregator::new();
        agg.stick_input(Cardinal::Right, true);
        agg.stick_input(Cardinal::Right, true);
        assert_eq!(agg.stick_axes(), (1, 0));

        agg.stick_input(Cardinal::Left, true);
        assert_eq!(agg.stick_axes(), (0, 0));

        let patch = agg.stick_input(Cardinal::Up, true);
        assert_eq!(agg.stick_axes(), (0, 1));
        assert_eq!(patch, StateMessage::left_axis(0.0, 1.0));

        agg.stick_input(Cardinal::Right, false);
        agg.stick_input(Cardinal::Right, false);
        agg.stick_input(Cardinal::Left, false);
        assert_eq!(agg.stick_axes(), (0, 1));
    }

    #[test]
    fn every_update_yields_a_patch() {
        let mut agg = InputAggregator::new();
        let down = agg.pad_input(PadInput::Left, true);
        assert_eq!(down.dpad, Some(PadDirection::Left));
        let up = agg.pad_input(PadInput::Left, false);
        assert_eq!(up.dpad, Some(PadDirection::Neutral));
    }
}
