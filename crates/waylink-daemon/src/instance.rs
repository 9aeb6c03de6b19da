//! The host instance the daemon runs inside.

/// xkb rules applied when the layout is pushed to the compositor.
pub const DEFAULT_XKB_RULES: &str = "evdev";

/// Services the host process provides to the display module.
pub trait Instance {
    /// Ask the host to shut down.
    fn exit(&self);

    /// Apply keyboard parameters to the display addressed by `display`.
    fn set_xkb_parameters(&self, display: &str, rules: &str, model: &str, options: &str);

    /// Default keyboard layout of the current input-method group, e.g.
    /// `"us"` or `"de-nodeadkeys"`.
    fn current_group_default_layout(&self) -> String;
}
