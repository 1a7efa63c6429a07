//! Keyboard shortcut mapping.
//!
//! Maps key + modifier combos to semantic `ShortcutAction`s. On macOS
//! `meta` is ⌘; elsewhere `ctrl` plays the same role.

/// Actions that keyboard shortcuts can trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutAction {
    // ── Tools ──
    ToolBrush,
    ToolEraser,
    /// Flip between brush and eraser.
    ToggleEraser,

    // ── Layers ──
    Delete,
    /// Crop the active layer to its content.
    Trim,
    SelectAll,
    Deselect,

    // ── File ──
    Save,
    Export,
}

/// Resolves key events into shortcut actions.
pub struct ShortcutMap;

impl ShortcutMap {
    /// Resolve a key event to an action.
    ///
    /// `key` is the `KeyboardEvent.key` value (e.g. `"s"`, `"Delete"`).
    /// Returns `None` if the key combo has no binding.
    pub fn resolve(key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> Option<ShortcutAction> {
        let cmd = ctrl || meta;
        if alt {
            return None;
        }

        if cmd && shift {
            return match key {
                "e" | "E" => Some(ShortcutAction::Export),
                "t" | "T" => Some(ShortcutAction::Trim),
                _ => None,
            };
        }

        if cmd {
            return match key {
                "s" | "S" => Some(ShortcutAction::Save),
                "a" | "A" => Some(ShortcutAction::SelectAll),
                _ => None,
            };
        }

        if shift {
            return None;
        }

        match key {
            "b" | "B" => Some(ShortcutAction::ToolBrush),
            "e" | "E" => Some(ShortcutAction::ToolEraser),
            "x" | "X" => Some(ShortcutAction::ToggleEraser),
            "Delete" | "Backspace" => Some(ShortcutAction::Delete),
            "Escape" => Some(ShortcutAction::Deselect),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_tool_shortcuts() {
        assert_eq!(
            ShortcutMap::resolve("b", false, false, false, false),
            Some(ShortcutAction::ToolBrush)
        );
        assert_eq!(
            ShortcutMap::resolve("E", false, false, false, false),
            Some(ShortcutAction::ToolEraser)
        );
        assert_eq!(
            ShortcutMap::resolve("x", false, false, false, false),
            Some(ShortcutAction::ToggleEraser)
        );
    }

    #[test]
    fn resolve_save_on_both_platforms() {
        // Cmd+S
        assert_eq!(
            ShortcutMap::resolve("s", false, false, false, true),
            Some(ShortcutAction::Save)
        );
        // Ctrl+S
        assert_eq!(
            ShortcutMap::resolve("s", true, false, false, false),
            Some(ShortcutAction::Save)
        );
        // Plain s is unbound
        assert_eq!(ShortcutMap::resolve("s", false, false, false, false), None);
    }

    #[test]
    fn resolve_layer_actions() {
        assert_eq!(
            ShortcutMap::resolve("Backspace", false, false, false, false),
            Some(ShortcutAction::Delete)
        );
        assert_eq!(
            ShortcutMap::resolve("t", false, true, false, true),
            Some(ShortcutAction::Trim)
        );
        assert_eq!(
            ShortcutMap::resolve("Escape", false, false, false, false),
            Some(ShortcutAction::Deselect)
        );
        assert_eq!(
            ShortcutMap::resolve("e", true, true, false, false),
            Some(ShortcutAction::Export)
        );
    }

    #[test]
    fn alt_combos_are_unbound() {
        assert_eq!(ShortcutMap::resolve("s", false, false, true, true), None);
        assert_eq!(ShortcutMap::resolve("b", false, false, true, false), None);
    }
}
