//! Scan-code translation between raw driver strokes and canonical key events.
//!
//! The driver reports most keys as a single stroke, but a fixed set of keys
//! (the navigation cluster, Print Screen, Pause) arrives as a *pair* of
//! strokes: an invisible prefix stroke plus the real key stroke. This module
//! folds both shapes into one stable `(code, state)` representation that the
//! subscription table is keyed on, and provides the exact inverse for
//! injection.
//!
//! The canonical code space extends the raw scan-code range by +256 for
//! extended (E0/E1-prefixed) keys whose raw code collides with a different
//! physical key. `normalize(denormalize(..))` and `denormalize(normalize(..))`
//! are round trips for everything the driver can legally produce.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::stroke::{KeyStroke, key_state};

/// Canonical key state. The driver reports down as 0 and up as 1; canonical
/// state flips that so `Down` reads as the active state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    /// Key released.
    Up,
    /// Key pressed.
    Down,
}

impl KeyState {
    /// Derive the canonical state from a raw driver state value.
    #[inline]
    pub fn from_raw(raw: u16) -> Self {
        if raw % 2 == 0 { KeyState::Down } else { KeyState::Up }
    }

    /// The raw up/down bit for this state (down=0, up=1).
    #[inline]
    pub fn raw_bit(self) -> u16 {
        match self {
            KeyState::Down => 0,
            KeyState::Up => 1,
        }
    }

    /// True if this is the pressed state.
    #[inline]
    pub fn is_down(self) -> bool {
        self == KeyState::Down
    }
}

/// A normalized key event: the representation subscriptions are keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalKey {
    /// Collision-free key code (raw scan code, +256 for extended variants).
    pub code: u16,
    /// Pressed or released.
    pub state: KeyState,
    /// Set when the stroke is the standalone prefix half of a two-stroke
    /// sequence. Ignored strokes skip subscription matching but must still be
    /// forwarded to the OS untouched.
    pub ignore: bool,
}

/// Offset applied to extended scan codes to keep them collision-free.
pub const EXTENDED_OFFSET: u16 = 256;

/// Prefix stroke code for wrapped two-stroke keys (shift-like).
const WRAP_PREFIX: u16 = 42;
/// Prefix stroke code for the prefixed two-stroke key (left-control-like).
const PAUSE_PREFIX: u16 = 29;
/// The real key code inside the Pause sequence.
const PAUSE_KEY: u16 = 69;

/// Raw right-shift scan code. Collides with another physical key's code, so
/// it is aliased to a distinct canonical code before any other rule runs.
const RIGHT_SHIFT_RAW: u16 = 54;
/// Canonical code right shift is aliased to.
const RIGHT_SHIFT_CANONICAL: u16 = RIGHT_SHIFT_RAW + EXTENDED_OFFSET;

/// Extended codes whose raw form is already unambiguous (the Win/Menu
/// cluster); the +256 offset is not applied to them.
const NO_OFFSET_EXTENDED: [u16; 3] = [91, 92, 93];

/// Key codes reported by the driver as a wrapped pair: prefix press, key
/// press, then key release, prefix release. Navigation cluster plus Print
/// Screen.
const WRAPPED_KEYS: [u16; 11] = [71, 72, 73, 75, 77, 79, 80, 81, 82, 83, 55];

type PairKey = (u16, u16, u16, u16);

struct PairTables {
    /// (prefix code, prefix state, key code, key state) -> canonical event.
    forward: HashMap<PairKey, (u16, KeyState)>,
    /// (canonical code, state) -> the exact stroke pair that produces it.
    reverse: HashMap<(u16, KeyState), [KeyStroke; 2]>,
}

fn pair_tables() -> &'static PairTables {
    static TABLES: OnceLock<PairTables> = OnceLock::new();
    TABLES.get_or_init(|| {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();

        let mut insert = |pair: [KeyStroke; 2], code: u16, state: KeyState| {
            forward.insert(
                (pair[0].code, pair[0].state, pair[1].code, pair[1].state),
                (code, state),
            );
            reverse.insert((code, state), pair);
        };

        for key in WRAPPED_KEYS {
            let canonical = key + EXTENDED_OFFSET;
            // Press: prefix then key, both E0-down.
            insert(
                [
                    KeyStroke::new(WRAP_PREFIX, key_state::E0),
                    KeyStroke::new(key, key_state::E0),
                ],
                canonical,
                KeyState::Down,
            );
            // Release: key then prefix, both E0-up.
            insert(
                [
                    KeyStroke::new(key, key_state::E0 | key_state::UP),
                    KeyStroke::new(WRAP_PREFIX, key_state::E0 | key_state::UP),
                ],
                canonical,
                KeyState::Up,
            );
        }

        // Pause is the one prefixed sequence, and the one key carrying the
        // legacy E1 (+4) state offset. Release mirrors the press order.
        let pause_canonical = PAUSE_KEY + EXTENDED_OFFSET;
        insert(
            [
                KeyStroke::new(PAUSE_PREFIX, key_state::E1),
                KeyStroke::new(PAUSE_KEY, key_state::E1),
            ],
            pause_canonical,
            KeyState::Down,
        );
        insert(
            [
                KeyStroke::new(PAUSE_PREFIX, key_state::E1 | key_state::UP),
                KeyStroke::new(PAUSE_KEY, key_state::E1 | key_state::UP),
            ],
            pause_canonical,
            KeyState::Up,
        );

        PairTables { forward, reverse }
    })
}

/// True if this stroke is the standalone prefix half of a two-stroke
/// sequence and must not fire subscription callbacks on its own.
#[inline]
fn is_dangling_prefix(stroke: &KeyStroke) -> bool {
    (stroke.code == WRAP_PREFIX && stroke.state >= key_state::E0)
        || (stroke.code == PAUSE_PREFIX && stroke.state >= key_state::E1)
}

/// Normalize a single raw stroke into its canonical event.
///
/// Used by the dispatch hot path, where the halves of a two-stroke sequence
/// arrive as separate strokes: the prefix half comes back with
/// `ignore = true`, and the real key half normalizes to the same canonical
/// code the pair table documents.
pub fn normalize_single(stroke: &KeyStroke) -> CanonicalKey {
    let state = KeyState::from_raw(stroke.state);
    let ignore = is_dangling_prefix(stroke);

    // The right-shift alias runs before any extended-offset handling.
    let code = if stroke.code == RIGHT_SHIFT_RAW {
        RIGHT_SHIFT_CANONICAL
    } else if stroke.state >= key_state::E0 && !NO_OFFSET_EXTENDED.contains(&stroke.code) {
        stroke.code + EXTENDED_OFFSET
    } else {
        stroke.code
    };

    CanonicalKey {
        code,
        state,
        ignore,
    }
}

/// Normalize one or two raw strokes into a canonical key event.
///
/// Two strokes must form a documented two-stroke sequence; anything else is
/// malformed driver input and fails loudly. A misroute here either drops a
/// keystroke or leaves a modifier stuck, so nothing falls through silently.
pub fn normalize(strokes: &[KeyStroke]) -> Result<CanonicalKey> {
    match strokes {
        [single] => Ok(normalize_single(single)),
        [first, second] => {
            let key = (first.code, first.state, second.code, second.state);
            match pair_tables().forward.get(&key) {
                Some(&(code, state)) => Ok(CanonicalKey {
                    code,
                    state,
                    ignore: false,
                }),
                None => Err(Error::MalformedStrokes(format!(
                    "unknown stroke pair ({},{}) ({},{})",
                    first.code, first.state, second.code, second.state
                ))),
            }
        }
        other => Err(Error::MalformedStrokes(format!(
            "expected 1 or 2 strokes, got {}",
            other.len()
        ))),
    }
}

/// Produce the exact raw stroke sequence for a canonical key event.
///
/// Canonical codes backed by a two-stroke sequence yield both strokes in
/// driver order; everything else yields a single stroke.
pub fn denormalize(code: u16, state: KeyState) -> Vec<KeyStroke> {
    if let Some(pair) = pair_tables().reverse.get(&(code, state)) {
        return pair.to_vec();
    }

    if code == RIGHT_SHIFT_CANONICAL {
        return vec![KeyStroke::new(RIGHT_SHIFT_RAW, state.raw_bit())];
    }
    if NO_OFFSET_EXTENDED.contains(&code) {
        return vec![KeyStroke::new(code, state.raw_bit() | key_state::E0)];
    }
    if code >= EXTENDED_OFFSET {
        return vec![KeyStroke::new(
            code - EXTENDED_OFFSET,
            state.raw_bit() | key_state::E0,
        )];
    }
    vec![KeyStroke::new(code, state.raw_bit())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_stroke_round_trip() {
        // Plain key: raw (2, down) -> canonical (2, Down) -> raw (2, down).
        let stroke = KeyStroke::new(2, key_state::DOWN);
        let key = normalize(&[stroke]).unwrap();
        assert_eq!((key.code, key.state, key.ignore), (2, KeyState::Down, false));
        assert_eq!(denormalize(key.code, key.state), vec![stroke]);

        let up = KeyStroke::new(2, key_state::UP);
        let key = normalize(&[up]).unwrap();
        assert_eq!((key.code, key.state), (2, KeyState::Up));
        assert_eq!(denormalize(key.code, key.state), vec![up]);
    }

    #[test]
    fn test_extended_single_stroke_offset() {
        // Right control arrives as code 29 with the E0 flag.
        let stroke = KeyStroke::new(29, key_state::E0);
        let key = normalize(&[stroke]).unwrap();
        assert_eq!((key.code, key.state), (285, KeyState::Down));
        assert_eq!(denormalize(285, KeyState::Down), vec![stroke]);
    }

    #[test]
    fn test_no_offset_extended_codes() {
        for code in [91u16, 92, 93] {
            let stroke = KeyStroke::new(code, key_state::E0);
            let key = normalize(&[stroke]).unwrap();
            assert_eq!(key.code, code, "win cluster keeps its raw code");
            assert_eq!(denormalize(code, KeyState::Down), vec![stroke]);
        }
    }

    #[test]
    fn test_right_shift_alias() {
        // Raw 54 collides with another key, so it maps to 310 with or
        // without the extended flag.
        let plain = KeyStroke::new(54, key_state::DOWN);
        let key = normalize(&[plain]).unwrap();
        assert_eq!((key.code, key.state), (310, KeyState::Down));
        assert_eq!(denormalize(310, KeyState::Down), vec![plain]);

        let extended = KeyStroke::new(54, key_state::E0 | key_state::UP);
        assert_eq!(normalize(&[extended]).unwrap().code, 310);
    }

    #[test]
    fn test_home_pair_round_trip() {
        // Home: press pair (42,2)(71,2) -> (327, Down).
        let press = [KeyStroke::new(42, 2), KeyStroke::new(71, 2)];
        let key = normalize(&press).unwrap();
        assert_eq!((key.code, key.state), (327, KeyState::Down));
        assert_eq!(denormalize(327, KeyState::Down), press.to_vec());

        // Release pair (71,3)(42,3) -> (327, Up).
        let release = [KeyStroke::new(71, 3), KeyStroke::new(42, 3)];
        let key = normalize(&release).unwrap();
        assert_eq!((key.code, key.state), (327, KeyState::Up));
        assert_eq!(denormalize(327, KeyState::Up), release.to_vec());
    }

    #[test]
    fn test_all_wrapped_keys_round_trip() {
        for raw in [71u16, 72, 73, 75, 77, 79, 80, 81, 82, 83, 55] {
            let canonical = raw + 256;
            let press = [KeyStroke::new(42, 2), KeyStroke::new(raw, 2)];
            let key = normalize(&press).unwrap();
            assert_eq!((key.code, key.state), (canonical, KeyState::Down));
            assert_eq!(denormalize(canonical, KeyState::Down), press.to_vec());

            let release = [KeyStroke::new(raw, 3), KeyStroke::new(42, 3)];
            let key = normalize(&release).unwrap();
            assert_eq!((key.code, key.state), (canonical, KeyState::Up));
            assert_eq!(denormalize(canonical, KeyState::Up), release.to_vec());
        }
    }

    #[test]
    fn test_pause_pair_round_trip() {
        // Pause carries the legacy +4 state offset and releases in the same
        // prefix-first order it presses in.
        let press = [KeyStroke::new(29, 4), KeyStroke::new(69, 4)];
        let key = normalize(&press).unwrap();
        assert_eq!((key.code, key.state), (325, KeyState::Down));
        assert_eq!(denormalize(325, KeyState::Down), press.to_vec());

        let release = [KeyStroke::new(29, 5), KeyStroke::new(69, 5)];
        let key = normalize(&release).unwrap();
        assert_eq!((key.code, key.state), (325, KeyState::Up));
        assert_eq!(denormalize(325, KeyState::Up), release.to_vec());
    }

    #[test]
    fn test_pair_halves_normalize_consistently() {
        // Processed stroke-by-stroke on the hot path, the prefix half is
        // marked ignore and the key half lands on the pair's canonical code.
        let prefix = normalize(&[KeyStroke::new(42, 2)]).unwrap();
        assert!(prefix.ignore);

        let key = normalize(&[KeyStroke::new(71, 2)]).unwrap();
        assert!(!key.ignore);
        assert_eq!((key.code, key.state), (327, KeyState::Down));

        let pause_prefix = normalize(&[KeyStroke::new(29, 4)]).unwrap();
        assert!(pause_prefix.ignore);
        let pause_key = normalize(&[KeyStroke::new(69, 4)]).unwrap();
        assert!(!pause_key.ignore);
        assert_eq!((pause_key.code, pause_key.state), (325, KeyState::Down));

        // A real left control press is not a dangling prefix.
        assert!(!normalize(&[KeyStroke::new(29, 0)]).unwrap().ignore);
    }

    #[test]
    fn test_malformed_input_is_an_error() {
        let strokes = [
            KeyStroke::new(1, 0),
            KeyStroke::new(2, 0),
            KeyStroke::new(3, 0),
        ];
        assert!(matches!(
            normalize(&strokes),
            Err(Error::MalformedStrokes(_))
        ));
        assert!(matches!(normalize(&[]), Err(Error::MalformedStrokes(_))));

        // Two strokes that are not a documented pair fail loudly.
        let bogus = [KeyStroke::new(30, 0), KeyStroke::new(31, 0)];
        assert!(matches!(normalize(&bogus), Err(Error::MalformedStrokes(_))));
    }
}
