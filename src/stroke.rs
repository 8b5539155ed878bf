//! Raw stroke types and device ID helpers.
//!
//! These mirror the filter driver's wire representation exactly. Strokes are
//! ephemeral: the driver produces them, the dispatch loop consumes, rewrites,
//! or forwards them within a single pass, and nothing persists them.

/// Highest device ID the driver assigns.
pub const MAX_DEVICES: i32 = 20;

/// First keyboard device ID.
pub const KEYBOARD_FIRST: i32 = 1;
/// Last keyboard device ID.
pub const KEYBOARD_LAST: i32 = 10;
/// First mouse device ID.
pub const MOUSE_FIRST: i32 = 11;
/// Last mouse device ID.
pub const MOUSE_LAST: i32 = 20;

/// Check whether a driver device ID is in the keyboard range (1-10).
#[inline]
pub fn is_keyboard(device: i32) -> bool {
    (KEYBOARD_FIRST..=KEYBOARD_LAST).contains(&device)
}

/// Check whether a driver device ID is in the mouse range (11-20).
#[inline]
pub fn is_mouse(device: i32) -> bool {
    (MOUSE_FIRST..=MOUSE_LAST).contains(&device)
}

/// Raw key state values as delivered by the driver.
///
/// Bit 0 distinguishes up from down, bit 1 marks an E0 prefix, bit 2 marks
/// the E1 prefix used by one legacy two-stroke sequence. Observed values are
/// 0 through 5.
pub mod key_state {
    /// Key pressed.
    pub const DOWN: u16 = 0;
    /// Key released.
    pub const UP: u16 = 1;
    /// E0 (extended) prefix flag.
    pub const E0: u16 = 2;
    /// E1 prefix flag.
    pub const E1: u16 = 4;
}

/// Mouse state bitmask values as delivered by the driver.
///
/// Bits 0-9 are press/release pairs for the five click buttons; bits 10 and
/// 11 are the vertical and horizontal wheels, whose direction is carried in
/// the stroke's `rolling` field.
pub mod mouse_state {
    /// Left button pressed.
    pub const LEFT_DOWN: u16 = 1 << 0;
    /// Left button released.
    pub const LEFT_UP: u16 = 1 << 1;
    /// Right button pressed.
    pub const RIGHT_DOWN: u16 = 1 << 2;
    /// Right button released.
    pub const RIGHT_UP: u16 = 1 << 3;
    /// Middle button pressed.
    pub const MIDDLE_DOWN: u16 = 1 << 4;
    /// Middle button released.
    pub const MIDDLE_UP: u16 = 1 << 5;
    /// Extra button 1 (back) pressed.
    pub const X1_DOWN: u16 = 1 << 6;
    /// Extra button 1 (back) released.
    pub const X1_UP: u16 = 1 << 7;
    /// Extra button 2 (forward) pressed.
    pub const X2_DOWN: u16 = 1 << 8;
    /// Extra button 2 (forward) released.
    pub const X2_UP: u16 = 1 << 9;
    /// Vertical wheel rotated.
    pub const WHEEL: u16 = 1 << 10;
    /// Horizontal wheel rotated.
    pub const HWHEEL: u16 = 1 << 11;

    /// Both wheel bits.
    pub const ANY_WHEEL: u16 = WHEEL | HWHEEL;
}

/// One wheel detent, the driver's native rolling unit.
pub const WHEEL_DELTA: i16 = 120;

/// Mouse flag values.
pub mod mouse_flag {
    /// Coordinates are absolute; clear means relative motion deltas.
    pub const MOVE_ABSOLUTE: u16 = 1 << 0;
}

/// A raw keyboard stroke as delivered by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    /// Driver-native scan code (0-127).
    pub code: u16,
    /// Raw state, see [`key_state`].
    pub state: u16,
    /// Opaque driver information tag, passed through unchanged.
    pub information: u32,
}

impl KeyStroke {
    /// Create a key stroke with a zero information tag.
    pub fn new(code: u16, state: u16) -> Self {
        Self {
            code,
            state,
            information: 0,
        }
    }
}

/// A raw mouse stroke as delivered by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MouseStroke {
    /// Button/wheel change bitmask, see [`mouse_state`].
    pub state: u16,
    /// Movement mode flags, see [`mouse_flag`].
    pub flags: u16,
    /// Signed wheel magnitude; sign is the rotation direction.
    pub rolling: i16,
    /// X coordinate (delta when relative, position when absolute).
    pub x: i32,
    /// Y coordinate (delta when relative, position when absolute).
    pub y: i32,
    /// Opaque driver information tag, passed through unchanged.
    pub information: u32,
}

impl MouseStroke {
    /// Create a relative movement stroke.
    pub fn relative_move(x: i32, y: i32) -> Self {
        Self {
            x,
            y,
            ..Self::default()
        }
    }

    /// Create an absolute movement stroke.
    pub fn absolute_move(x: i32, y: i32) -> Self {
        Self {
            flags: mouse_flag::MOVE_ABSOLUTE,
            x,
            y,
            ..Self::default()
        }
    }

    /// Create a button change stroke from a state bitmask.
    pub fn buttons(state: u16) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    /// True if the coordinates are absolute.
    #[inline]
    pub fn is_absolute(&self) -> bool {
        self.flags & mouse_flag::MOVE_ABSOLUTE != 0
    }
}

/// One raw input event, keyboard or mouse variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stroke {
    /// Keyboard stroke.
    Key(KeyStroke),
    /// Mouse stroke.
    Mouse(MouseStroke),
}

impl From<KeyStroke> for Stroke {
    fn from(stroke: KeyStroke) -> Self {
        Stroke::Key(stroke)
    }
}

impl From<MouseStroke> for Stroke {
    fn from(stroke: MouseStroke) -> Self {
        Stroke::Mouse(stroke)
    }
}
