use std::fmt;

/// Selector of an `if` block.
///
/// `MouseClicked` and `KeyPressed` are stand-ins that are not wired to real
/// input: the interpreter decides them at random.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Condition {
    #[default]
    Always,
    MouseClicked,
    KeyPressed,
    SpriteEdge,
}

impl Condition {
    /// Unrecognised choices read as `Always`.
    pub fn from_choice(choice: &str) -> Condition {
        match choice.trim() {
            "mouse-clicked" => Condition::MouseClicked,
            "key-pressed" => Condition::KeyPressed,
            "sprite-edge" => Condition::SpriteEdge,
            _ => Condition::Always,
        }
    }

    pub fn choice(&self) -> &'static str {
        match self {
            Condition::Always => "always",
            Condition::MouseClicked => "mouse-clicked",
            Condition::KeyPressed => "key-pressed",
            Condition::SpriteEdge => "sprite-edge",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Condition::Always => "always",
            Condition::MouseClicked => "mouse clicked",
            Condition::KeyPressed => "key pressed",
            Condition::SpriteEdge => "touching edge",
        }
    }

    /// True for selectors whose outcome is drawn at random.
    pub fn is_stub(&self) -> bool {
        matches!(self, Condition::MouseClicked | Condition::KeyPressed)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
