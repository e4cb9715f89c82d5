use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

/// A board intersection `(x, y)`, `0 <= x, y < size`. Textual form is two
/// lowercase letters, `'a' == 0`, per spec.md's SGF-style coordinate
/// convention. There is no packed "tt" pass sentinel — a pass is the
/// *absence* of a `Coord` (`Option<Coord>` at call sites), matching
/// `original_source`'s `nil`-coord convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Coord {
    pub x: u16,
    pub y: u16,
}

impl Coord {
    pub fn new(x: u16, y: u16) -> Self {
        Coord { x, y }
    }

    /// Two-letter SGF form, e.g. `(3, 3) -> "dd"`.
    pub fn to_letters(self) -> String {
        let encode = |v: u16| -> char { (b'a' + v as u8) as char };
        format!("{}{}", encode(self.x), encode(self.y))
    }

    /// Parses a two-letter SGF coordinate. Letters beyond `size` are left
    /// for the caller to range-check; this only validates the character
    /// class.
    pub fn from_letters(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let a = chars.next().context("coordinate too short")?;
        let b = chars.next().context("coordinate too short")?;
        if chars.next().is_some() {
            bail!("coordinate {s:?} too long");
        }
        let decode = |c: char| -> Result<u16> {
            if c.is_ascii_lowercase() {
                Ok(c as u16 - 'a' as u16)
            } else {
                bail!("invalid coordinate character {c:?}")
            }
        };
        Ok(Coord::new(decode(a)?, decode(b)?))
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_letters())
    }
}

impl FromStr for Coord {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Coord::from_letters(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_round_trip() {
        let c = Coord::new(3, 15);
        assert_eq!(c.to_letters(), "dp");
        assert_eq!(Coord::from_letters("dp").unwrap(), c);
    }

    #[test]
    fn a_is_zero() {
        assert_eq!(Coord::from_letters("aa").unwrap(), Coord::new(0, 0));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(Coord::from_letters("a").is_err());
        assert!(Coord::from_letters("abc").is_err());
    }
}
