use serde::Serialize;

/// Animation the avatar plays for a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Motion {
    pub group: &'static str,
    pub index: u32,
}

impl Motion {
    const fn new(group: &'static str, index: u32) -> Self {
        Self { group, index }
    }
}

pub const IDLE: Motion = Motion::new("Idle", 0);

/// Maps a tag (with or without its angle brackets) to a motion. Unknown tags
/// fall back to idle.
pub fn motion_strategy(emotion: &str) -> Motion {
    let key = emotion
        .trim()
        .trim_matches(|c| c == '<' || c == '>')
        .trim()
        .to_lowercase();

    match key.as_str() {
        "joy" | "happy" => Motion::new("Flick", 0),
        "sad" | "sorry" => Motion::new("FlickDown", 0),
        "wave" | "hello" => Motion::new("Tap", 0),
        "think" | "idea" => Motion::new("Tap", 1),
        "shy" | "modest" => Motion::new("Tap@Body", 0),
        "shock" | "surprise" => Motion::new("Flick@Body", 0),
        _ => IDLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags_map_to_motions() {
        assert_eq!(motion_strategy("joy"), Motion::new("Flick", 0));
        assert_eq!(motion_strategy("Sorry"), Motion::new("FlickDown", 0));
        assert_eq!(motion_strategy("idea"), Motion::new("Tap", 1));
        assert_eq!(motion_strategy("modest"), Motion::new("Tap@Body", 0));
        assert_eq!(motion_strategy("SURPRISE"), Motion::new("Flick@Body", 0));
    }

    #[test]
    fn brackets_are_ignored() {
        assert_eq!(motion_strategy("<<wave>>"), Motion::new("Tap", 0));
    }

    #[test]
    fn unknown_tags_idle() {
        assert_eq!(motion_strategy("angry"), IDLE);
        assert_eq!(motion_strategy(""), IDLE);
    }
}
