//! Platform-agnostic input events.
//!
//! The host (browser canvas, native window, test harness) converts its
//! native pointer and keyboard events into these before handing them to
//! the session. Pointer coordinates are in map pixels, with the map's
//! top-left corner at the origin.

use serde::{Deserialize, Serialize};

/// A single modifier key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modifier {
    #[default]
    Shift,
    Ctrl,
    Alt,
    Meta,
}

/// Modifier keys held during an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        ctrl: false,
        alt: false,
        meta: false,
    };

    pub fn only(modifier: Modifier) -> Self {
        let mut mods = Self::NONE;
        match modifier {
            Modifier::Shift => mods.shift = true,
            Modifier::Ctrl => mods.ctrl = true,
            Modifier::Alt => mods.alt = true,
            Modifier::Meta => mods.meta = true,
        }
        mods
    }

    pub fn has(&self, modifier: Modifier) -> bool {
        match modifier {
            Modifier::Shift => self.shift,
            Modifier::Ctrl => self.ctrl,
            Modifier::Alt => self.alt,
            Modifier::Meta => self.meta,
        }
    }
}

/// Input events the editing session understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown { x: f32, y: f32, modifiers: Modifiers },
    PointerMove { x: f32, y: f32, modifiers: Modifiers },
    PointerUp { x: f32, y: f32 },
    /// `key` is the `KeyboardEvent.key` value (e.g. `"s"`, `"Delete"`).
    Key { key: String, modifiers: Modifiers },
}

impl InputEvent {
    pub fn pointer_down(x: f32, y: f32) -> Self {
        Self::PointerDown {
            x,
            y,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn pointer_move(x: f32, y: f32) -> Self {
        Self::PointerMove {
            x,
            y,
            modifiers: Modifiers::NONE,
        }
    }

    pub fn pointer_up(x: f32, y: f32) -> Self {
        Self::PointerUp { x, y }
    }

    pub fn key(key: impl Into<String>, modifiers: Modifiers) -> Self {
        Self::Key {
            key: key.into(),
            modifiers,
        }
    }

    /// Same event with `modifiers` held. No effect on `PointerUp`.
    #[must_use]
    pub fn with_modifiers(mut self, held: Modifiers) -> Self {
        match &mut self {
            Self::PointerDown { modifiers, .. }
            | Self::PointerMove { modifiers, .. }
            | Self::Key { modifiers, .. } => *modifiers = held,
            Self::PointerUp { .. } => {}
        }
        self
    }

    /// Position of a pointer event, `None` for key events.
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            Self::PointerDown { x, y, .. }
            | Self::PointerMove { x, y, .. }
            | Self::PointerUp { x, y } => Some((*x, *y)),
            Self::Key { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_of_pointer_events() {
        assert_eq!(InputEvent::pointer_down(3.0, 4.5).position(), Some((3.0, 4.5)));
        assert_eq!(InputEvent::pointer_up(-1.0, 0.0).position(), Some((-1.0, 0.0)));
        assert_eq!(InputEvent::key("s", Modifiers::NONE).position(), None);
    }

    #[test]
    fn modifier_lookup() {
        let mods = Modifiers::only(Modifier::Alt);
        assert!(mods.has(Modifier::Alt));
        assert!(!mods.has(Modifier::Shift));
        let ev = InputEvent::pointer_move(1.0, 1.0).with_modifiers(mods);
        assert!(matches!(ev, InputEvent::PointerMove { modifiers, .. } if modifiers.alt));
    }

    #[test]
    fn modifier_from_config_string() {
        let m: Modifier = serde_json::from_str("\"meta\"").unwrap();
        assert_eq!(m, Modifier::Meta);
    }
}
