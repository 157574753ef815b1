use std::fmt;

/// Whether a prompt point marks the inside (positive) or outside (negative) of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Label {
    #[default]
    Positive,
    Negative,
}

impl Label {
    pub fn toggled(self) -> Self {
        match self {
            Label::Positive => Label::Negative,
            Label::Negative => Label::Positive,
        }
    }

    /// Wire value used in prompt files: 1 for positive, 0 for negative.
    pub fn as_flag(self) -> u8 {
        match self {
            Label::Positive => 1,
            Label::Negative => 0,
        }
    }

    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            1 => Some(Label::Positive),
            0 => Some(Label::Negative),
            _ => None,
        }
    }

    pub fn short_name(self) -> &'static str {
        match self {
            Label::Positive => "pos",
            Label::Negative => "neg",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Positive => write!(f, "Pos"),
            Label::Negative => write!(f, "Neg"),
        }
    }
}

/// A labeled point in original (unscaled) image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub label: Label,
}

impl Point {
    pub fn new(x: i32, y: i32, label: Label) -> Self {
        Self { x, y, label }
    }

    pub fn distance_to(&self, x: i32, y: i32) -> f64 {
        let dx = f64::from(self.x - x);
        let dy = f64::from(self.y - y);
        (dx * dx + dy * dy).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_twice_restores_label() {
        assert_eq!(Label::Positive.toggled(), Label::Negative);
        assert_eq!(Label::Positive.toggled().toggled(), Label::Positive);
    }

    #[test]
    fn flags_match_prompt_encoding() {
        assert_eq!(Label::Positive.as_flag(), 1);
        assert_eq!(Label::Negative.as_flag(), 0);
        assert_eq!(Label::from_flag(1), Some(Label::Positive));
        assert_eq!(Label::from_flag(0), Some(Label::Negative));
        assert_eq!(Label::from_flag(2), None);
    }

    #[test]
    fn distance_is_euclidean() {
        let point = Point::new(0, 0, Label::Positive);
        assert_eq!(point.distance_to(3, 4), 5.0);
    }
}
