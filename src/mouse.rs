//! Mouse stroke classification: decomposing button bitmasks into discrete
//! events and detecting movement.

use crate::stroke::{MouseStroke, mouse_state};

/// Mouse button identifiers, indices 0-6.
///
/// Indices 0-4 are the five click buttons; 5 and 6 are the vertical and
/// horizontal wheels, whose "state" is the rotation sign rather than
/// press/release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Left button (index 0).
    Left,
    /// Right button (index 1).
    Right,
    /// Middle button (index 2).
    Middle,
    /// Extra button 1, typically back (index 3).
    X1,
    /// Extra button 2, typically forward (index 4).
    X2,
    /// Vertical wheel (index 5).
    WheelVertical,
    /// Horizontal wheel (index 6).
    WheelHorizontal,
}

impl MouseButton {
    /// The button's index (0-6).
    pub fn index(self) -> u16 {
        match self {
            MouseButton::Left => 0,
            MouseButton::Right => 1,
            MouseButton::Middle => 2,
            MouseButton::X1 => 3,
            MouseButton::X2 => 4,
            MouseButton::WheelVertical => 5,
            MouseButton::WheelHorizontal => 6,
        }
    }

    /// Look up a button by index.
    pub fn from_index(index: u16) -> Option<Self> {
        Some(match index {
            0 => MouseButton::Left,
            1 => MouseButton::Right,
            2 => MouseButton::Middle,
            3 => MouseButton::X1,
            4 => MouseButton::X2,
            5 => MouseButton::WheelVertical,
            6 => MouseButton::WheelHorizontal,
            _ => return None,
        })
    }

    /// True for the two wheel pseudo-buttons.
    pub fn is_wheel(self) -> bool {
        matches!(self, MouseButton::WheelVertical | MouseButton::WheelHorizontal)
    }
}

/// One discrete button or wheel change extracted from a mouse stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    /// Which button changed.
    pub button: MouseButton,
    /// 1 = pressed, 0 = released; for wheels, the rotation sign (-1 or 1).
    pub state: i8,
    /// The state-field bit this event contributed. Blocking the event strips
    /// exactly this bit from the forwarded stroke.
    pub state_bit: u16,
}

/// Decompose a mouse stroke's state bitmask into discrete button events.
///
/// Every set bit yields exactly one event, so two buttons changing in one
/// stroke are both reported. Wheel direction comes from the sign of the
/// stroke's `rolling` field.
pub fn button_events(stroke: &MouseStroke) -> Vec<ButtonEvent> {
    let mut events = Vec::new();

    for bit in 0..10u16 {
        let mask = 1 << bit;
        if stroke.state & mask == 0 {
            continue;
        }
        // Even bits are presses, odd bits releases, for buttons 0-4.
        let button = MouseButton::from_index(bit / 2).unwrap();
        events.push(ButtonEvent {
            button,
            state: if bit % 2 == 0 { 1 } else { 0 },
            state_bit: mask,
        });
    }

    for (mask, button) in [
        (mouse_state::WHEEL, MouseButton::WheelVertical),
        (mouse_state::HWHEEL, MouseButton::WheelHorizontal),
    ] {
        if stroke.state & mask != 0 {
            events.push(ButtonEvent {
                button,
                state: if stroke.rolling < 0 { -1 } else { 1 },
                state_bit: mask,
            });
        }
    }

    events
}

/// Strip a blocked button event's bit from the stroke, preserving every
/// other bit so unblocked buttons in the same stroke still propagate. The
/// rolling magnitude is zeroed once no wheel bit remains set.
pub fn block_button(stroke: &mut MouseStroke, event: &ButtonEvent) {
    stroke.state &= !event.state_bit;
    if stroke.state & mouse_state::ANY_WHEEL == 0 {
        stroke.rolling = 0;
    }
}

/// Per-device movement detector.
///
/// Relative strokes report movement iff x or y is non-zero; a real relative
/// mouse never emits (0,0). Absolute devices can legitimately rest at the
/// origin, so an absolute (0,0) is reported exactly once per contiguous run
/// of zero samples. This de-duplication is a documented behavioral contract:
/// the flag clears the moment a non-zero absolute sample arrives.
#[derive(Debug, Default)]
pub struct MoveTracker {
    reported_absolute_zero: bool,
}

impl MoveTracker {
    /// Create a tracker with no zero sample seen yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether this stroke carries reportable movement, updating the
    /// absolute-zero de-duplication state.
    pub fn has_movement(&mut self, stroke: &MouseStroke) -> bool {
        if !stroke.is_absolute() {
            return stroke.x != 0 || stroke.y != 0;
        }
        if stroke.x == 0 && stroke.y == 0 {
            if self.reported_absolute_zero {
                return false;
            }
            self.reported_absolute_zero = true;
            return true;
        }
        self.reported_absolute_zero = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::mouse_state::*;

    #[test]
    fn test_relative_movement() {
        let mut tracker = MoveTracker::new();
        assert!(!tracker.has_movement(&MouseStroke::relative_move(0, 0)));
        assert!(tracker.has_movement(&MouseStroke::relative_move(1, 0)));
        assert!(tracker.has_movement(&MouseStroke::relative_move(0, -1)));
    }

    #[test]
    fn test_absolute_zero_reported_once_per_run() {
        let mut tracker = MoveTracker::new();
        let samples = [(0, 0), (0, 0), (5, 5), (0, 0)];
        let reported: Vec<bool> = samples
            .iter()
            .map(|&(x, y)| tracker.has_movement(&MouseStroke::absolute_move(x, y)))
            .collect();
        assert_eq!(reported, vec![true, false, true, true]);
    }

    #[test]
    fn test_single_button_decomposition() {
        let events = button_events(&MouseStroke::buttons(LEFT_DOWN));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].button, MouseButton::Left);
        assert_eq!(events[0].state, 1);

        let events = button_events(&MouseStroke::buttons(X2_UP));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].button, MouseButton::X2);
        assert_eq!(events[0].state, 0);
    }

    #[test]
    fn test_wheel_direction_from_rolling_sign() {
        let mut stroke = MouseStroke::buttons(WHEEL);
        stroke.rolling = 120;
        assert_eq!(button_events(&stroke)[0].state, 1);

        stroke.rolling = -120;
        let events = button_events(&stroke);
        assert_eq!(events[0].button, MouseButton::WheelVertical);
        assert_eq!(events[0].state, -1);
    }

    #[test]
    fn test_multi_bit_stroke_yields_independent_events() {
        let mut stroke = MouseStroke::buttons(LEFT_DOWN | WHEEL);
        stroke.rolling = 120;

        let events = button_events(&stroke);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].button, MouseButton::Left);
        assert_eq!(events[1].button, MouseButton::WheelVertical);
    }

    #[test]
    fn test_blocking_strips_only_the_blocked_bit() {
        let mut stroke = MouseStroke::buttons(LEFT_DOWN | WHEEL);
        stroke.rolling = 120;

        let events = button_events(&stroke);
        let wheel = events
            .iter()
            .find(|e| e.button == MouseButton::WheelVertical)
            .unwrap();
        block_button(&mut stroke, wheel);

        assert_eq!(stroke.state, LEFT_DOWN, "left button bit stays intact");
        assert_eq!(stroke.rolling, 0, "rolling cleared with the last wheel bit");
    }

    #[test]
    fn test_blocking_keeps_rolling_while_other_wheel_bit_set() {
        let mut stroke = MouseStroke::buttons(WHEEL | HWHEEL);
        stroke.rolling = -120;

        let events = button_events(&stroke);
        let vertical = events
            .iter()
            .find(|e| e.button == MouseButton::WheelVertical)
            .unwrap();
        block_button(&mut stroke, vertical);

        assert_eq!(stroke.state, HWHEEL);
        assert_eq!(stroke.rolling, -120);
    }
}
