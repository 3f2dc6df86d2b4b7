use std::fmt;

/// The fixed menu of block kinds. Tags that don't name a known block are
/// kept verbatim so the interpreter can report them at run time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    Move,
    TurnRight,
    TurnLeft,
    Say,
    Show,
    Hide,
    Wait,
    Repeat,
    Forever,
    If,
    MoveTo,
    Glide,
    SayCustom,
    ChangeSize,
    WhenClicked,
    WhenGreenFlag,
    Unknown(String),
}

impl Opcode {
    /// Every tag the interpreter understands, in palette order.
    pub const TAGS: [&'static str; 16] = [
        "move",
        "turn-right",
        "turn-left",
        "say",
        "show",
        "hide",
        "wait",
        "repeat",
        "forever",
        "if",
        "move-to",
        "glide",
        "say-custom",
        "change-size",
        "when-clicked",
        "when-green-flag",
    ];

    pub fn from_tag(tag: &str) -> Opcode {
        match tag.trim() {
            "move" => Opcode::Move,
            "turn-right" => Opcode::TurnRight,
            "turn-left" => Opcode::TurnLeft,
            "say" => Opcode::Say,
            "show" => Opcode::Show,
            "hide" => Opcode::Hide,
            "wait" => Opcode::Wait,
            "repeat" => Opcode::Repeat,
            "forever" => Opcode::Forever,
            "if" => Opcode::If,
            "move-to" => Opcode::MoveTo,
            "glide" => Opcode::Glide,
            "say-custom" => Opcode::SayCustom,
            "change-size" => Opcode::ChangeSize,
            "when-clicked" => Opcode::WhenClicked,
            "when-green-flag" => Opcode::WhenGreenFlag,
            other => Opcode::Unknown(other.to_string()),
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            Opcode::Move => "move",
            Opcode::TurnRight => "turn-right",
            Opcode::TurnLeft => "turn-left",
            Opcode::Say => "say",
            Opcode::Show => "show",
            Opcode::Hide => "hide",
            Opcode::Wait => "wait",
            Opcode::Repeat => "repeat",
            Opcode::Forever => "forever",
            Opcode::If => "if",
            Opcode::MoveTo => "move-to",
            Opcode::Glide => "glide",
            Opcode::SayCustom => "say-custom",
            Opcode::ChangeSize => "change-size",
            Opcode::WhenClicked => "when-clicked",
            Opcode::WhenGreenFlag => "when-green-flag",
            Opcode::Unknown(tag) => tag,
        }
    }

    /// Containers own a nested child sequence run under their own rule.
    pub fn is_container(&self) -> bool {
        matches!(self, Opcode::Repeat | Opcode::Forever | Opcode::If)
    }

    /// Event hats mark the start of a script and do nothing when run.
    pub fn is_hat(&self) -> bool {
        matches!(self, Opcode::WhenClicked | Opcode::WhenGreenFlag)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Opcode::Unknown(_))
    }

    /// Human-readable label used in runtime log messages.
    pub fn description(&self) -> &'static str {
        match self {
            Opcode::Move => "move block",
            Opcode::TurnRight => "turn right block",
            Opcode::TurnLeft => "turn left block",
            Opcode::Say => "say block",
            Opcode::Show => "show block",
            Opcode::Hide => "hide block",
            Opcode::Wait => "wait block",
            Opcode::Repeat => "repeat block",
            Opcode::Forever => "forever block",
            Opcode::If => "if block",
            Opcode::MoveTo => "move to block",
            Opcode::Glide => "glide block",
            Opcode::SayCustom => "say for block",
            Opcode::ChangeSize => "change size block",
            Opcode::WhenClicked => "when clicked block",
            Opcode::WhenGreenFlag => "when green flag block",
            Opcode::Unknown(_) => "unknown block",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tag_round_trips() {
        for tag in Opcode::TAGS {
            let opcode = Opcode::from_tag(tag);
            assert!(opcode.is_known(), "{tag} should be known");
            assert_eq!(opcode.tag(), tag);
        }
    }

    #[test]
    fn unknown_tags_are_preserved() {
        let opcode = Opcode::from_tag("xyz");
        assert_eq!(opcode, Opcode::Unknown("xyz".to_string()));
        assert_eq!(opcode.to_string(), "xyz");
        assert!(!opcode.is_container());
    }

    #[test]
    fn only_loops_and_if_are_containers() {
        let containers: Vec<&str> = Opcode::TAGS
            .iter()
            .copied()
            .filter(|tag| Opcode::from_tag(tag).is_container())
            .collect();
        assert_eq!(containers, vec!["repeat", "forever", "if"]);
    }
}
