//! Keyboard layout strings.

/// Split a layout string such as `"de-nodeadkeys"` into layout and variant.
///
/// The variant is everything after the first `-`, or empty when there is
/// none.
pub fn parse_layout(layout: &str) -> (String, String) {
    match layout.split_once('-') {
        Some((layout, variant)) => (layout.to_string(), variant.to_string()),
        None => (layout.to_string(), String::new()),
    }
}
