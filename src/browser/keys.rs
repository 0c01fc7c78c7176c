//! WebDriver key codes (private-use code points from the W3C key table).

pub const SPACE: &str = "\u{E00D}";
pub const ENTER: &str = "\u{E007}";
pub const ESCAPE: &str = "\u{E00C}";
pub const ARROW_DOWN: &str = "\u{E015}";
pub const CONTROL: &str = "\u{E009}";
pub const DELETE: &str = "\u{E017}";

/// Ctrl+A: press Control, type `a`, release with the NULL key.
pub const SELECT_ALL: &str = "\u{E009}a\u{E000}";

/// Display name for a key code, for logs.
pub fn name(key: &str) -> &'static str {
    match key {
        SPACE => "Space",
        ENTER => "Enter",
        ESCAPE => "Escape",
        ARROW_DOWN => "ArrowDown",
        CONTROL => "Control",
        DELETE => "Delete",
        SELECT_ALL => "Ctrl+A",
        _ => "text",
    }
}
