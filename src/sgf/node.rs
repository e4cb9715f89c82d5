//! SGF property types.
//!
//! Generalizes `sgf::node` (which modeled `AP B CA DT FF GM KM W SZ AB AW
//! PB PW RE C`) to the property set spec.md names: `GM FF CA SZ PB PW RU
//! KM GN B W AB AW AE TR SQ LB C` plus the internal `IX` (node index) and
//! `PX` (pen stroke) properties, with an `Unknown` catch-all for anything
//! else. The small typed wrappers (`Charset`, `FileFormat`, `GameType`,
//! `Komi`) are kept for the properties that benefit from them; freeform
//! text properties stay `String`.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use crate::board::Coord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Charset {
    #[default]
    Utf8,
    Latin1,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameType {
    Go,
    Other(u8),
}

impl Default for GameType {
    fn default() -> Self {
        GameType::Go
    }
}

/// Komi stored in half-points to keep it exact (`6.5` -> `13`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Komi(pub i32);

impl Default for Komi {
    fn default() -> Self {
        Komi(13)
    }
}

impl FromStr for Komi {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let n: f64 = s.parse().context("komi must be a number")?;
        Ok(Komi((n * 2.0).round() as i32))
    }
}

impl Display for Komi {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.0 % 2 == 0 {
            write!(f, "{}", self.0 / 2)
        } else {
            write!(f, "{}.5", self.0 / 2)
        }
    }
}

impl FromStr for Charset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "UTF-8" | "utf-8" => Charset::Utf8,
            "Latin-1" | "ISO-8859-1" => Charset::Latin1,
            other => Charset::Other(other.to_string()),
        })
    }
}

impl Display for Charset {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "Latin-1",
            Charset::Other(other) => other,
        };
        write!(f, "{s}")
    }
}

impl FromStr for GameType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let n: u8 = s.parse().context("GM must be a number")?;
        Ok(match n {
            1 => GameType::Go,
            n => GameType::Other(n),
        })
    }
}

impl Display for GameType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let n = match self {
            GameType::Go => 1,
            GameType::Other(other) => *other,
        };
        write!(f, "{n}")
    }
}

/// One label annotation: a board coordinate and its text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Label {
    pub coord: Coord,
    pub text: String,
}

/// A pen stroke: `x0:y0:x1:y1:color`, four floats (in board-fraction
/// units) and a color name, per spec.md §4.5's `draw` event.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PenStroke {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub color: String,
}

impl Display for PenStroke {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}:{}", self.x0, self.y0, self.x1, self.y1, self.color)
    }
}

impl FromStr for PenStroke {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 5 {
            bail!("PX field must have 5 colon-separated parts, got {}", parts.len());
        }
        Ok(PenStroke {
            x0: parts[0].parse().context("PX x0")?,
            y0: parts[1].parse().context("PX y0")?,
            x1: parts[2].parse().context("PX x1")?,
            y1: parts[3].parse().context("PX y1")?,
            color: parts[4].to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SGFProperty {
    /// Move: `None` coord encodes a pass (`B[]`/`W[]`).
    B(Option<Coord>),
    W(Option<Coord>),

    /// Setup stones.
    AB(Vec<Coord>),
    AW(Vec<Coord>),
    AE(Vec<Coord>),

    /// Marks.
    TR(Vec<Coord>),
    SQ(Vec<Coord>),
    LB(Vec<Label>),

    /// Pen strokes (one `PX` value per stroke).
    PX(Vec<PenStroke>),

    /// Internal node-index property, round-tripped only when requested.
    IX(i64),

    C(String),
    GM(GameType),
    FF(u8),
    CA(Charset),
    SZ(u8),
    PB(String),
    PW(String),
    RU(String),
    KM(Komi),
    GN(String),

    /// Any other key, preserved verbatim.
    Unknown(String, Vec<String>),
}

impl SGFProperty {
    pub fn key(&self) -> &str {
        match self {
            SGFProperty::B(_) => "B",
            SGFProperty::W(_) => "W",
            SGFProperty::AB(_) => "AB",
            SGFProperty::AW(_) => "AW",
            SGFProperty::AE(_) => "AE",
            SGFProperty::TR(_) => "TR",
            SGFProperty::SQ(_) => "SQ",
            SGFProperty::LB(_) => "LB",
            SGFProperty::PX(_) => "PX",
            SGFProperty::IX(_) => "IX",
            SGFProperty::C(_) => "C",
            SGFProperty::GM(_) => "GM",
            SGFProperty::FF(_) => "FF",
            SGFProperty::CA(_) => "CA",
            SGFProperty::SZ(_) => "SZ",
            SGFProperty::PB(_) => "PB",
            SGFProperty::PW(_) => "PW",
            SGFProperty::RU(_) => "RU",
            SGFProperty::KM(_) => "KM",
            SGFProperty::GN(_) => "GN",
            SGFProperty::Unknown(key, _) => key,
        }
    }

    /// The property's bracketed values, without the key — used to
    /// round-trip a non-structural property (anything but `B`/`W`/`AB`/
    /// `AW`/`AE`/`IX`) into a `TreeNode::fields` entry.
    pub fn values(&self) -> Vec<String> {
        match self {
            SGFProperty::B(_) | SGFProperty::W(_) | SGFProperty::AB(_) | SGFProperty::AW(_) | SGFProperty::AE(_) => {
                Vec::new()
            }
            SGFProperty::TR(cs) | SGFProperty::SQ(cs) => cs.iter().map(|c| c.to_string()).collect(),
            SGFProperty::LB(labels) => labels.iter().map(|l| format!("{}:{}", l.coord, l.text)).collect(),
            SGFProperty::PX(strokes) => strokes.iter().map(|s| s.to_string()).collect(),
            SGFProperty::IX(n) => vec![n.to_string()],
            SGFProperty::C(s) | SGFProperty::PB(s) | SGFProperty::PW(s) | SGFProperty::RU(s) | SGFProperty::GN(s) => {
                vec![s.clone()]
            }
            SGFProperty::GM(gt) => vec![gt.to_string()],
            SGFProperty::FF(n) => vec![n.to_string()],
            SGFProperty::CA(cs) => vec![cs.to_string()],
            SGFProperty::SZ(n) => vec![n.to_string()],
            SGFProperty::KM(km) => vec![km.to_string()],
            SGFProperty::Unknown(_, values) => values.clone(),
        }
    }
}

fn fmt_coord_list(key: &str, coords: &[Coord], f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "{key}")?;
    for c in coords {
        write!(f, "[{c}]")?;
    }
    Ok(())
}

impl Display for SGFProperty {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SGFProperty::B(Some(c)) => write!(f, "B[{c}]"),
            SGFProperty::B(None) => write!(f, "B[]"),
            SGFProperty::W(Some(c)) => write!(f, "W[{c}]"),
            SGFProperty::W(None) => write!(f, "W[]"),
            SGFProperty::AB(cs) => fmt_coord_list("AB", cs, f),
            SGFProperty::AW(cs) => fmt_coord_list("AW", cs, f),
            SGFProperty::AE(cs) => fmt_coord_list("AE", cs, f),
            SGFProperty::TR(cs) => fmt_coord_list("TR", cs, f),
            SGFProperty::SQ(cs) => fmt_coord_list("SQ", cs, f),
            SGFProperty::LB(labels) => {
                write!(f, "LB")?;
                for l in labels {
                    write!(f, "[{}:{}]", l.coord, escape(&l.text))?;
                }
                Ok(())
            }
            SGFProperty::PX(strokes) => {
                write!(f, "PX")?;
                for s in strokes {
                    write!(f, "[{}]", escape(&s.to_string()))?;
                }
                Ok(())
            }
            SGFProperty::IX(n) => write!(f, "IX[{n}]"),
            SGFProperty::C(s) => write!(f, "C[{}]", escape(s)),
            SGFProperty::GM(gt) => write!(f, "GM[{gt}]"),
            SGFProperty::FF(n) => write!(f, "FF[{n}]"),
            SGFProperty::CA(cs) => write!(f, "CA[{cs}]"),
            SGFProperty::SZ(n) => write!(f, "SZ[{n}]"),
            SGFProperty::PB(s) => write!(f, "PB[{}]", escape(s)),
            SGFProperty::PW(s) => write!(f, "PW[{}]", escape(s)),
            SGFProperty::RU(s) => write!(f, "RU[{}]", escape(s)),
            SGFProperty::KM(km) => write!(f, "KM[{km}]"),
            SGFProperty::GN(s) => write!(f, "GN[{}]", escape(s)),
            SGFProperty::Unknown(key, values) => {
                write!(f, "{key}")?;
                for v in values {
                    write!(f, "[{}]", escape(v))?;
                }
                Ok(())
            }
        }
    }
}

/// Escapes a literal `]` as `\]` for serialization.
pub fn escape(s: &str) -> String {
    s.replace(']', "\\]")
}

/// Unescapes `\]` back to a literal `]`, the parser's inverse of `escape`.
pub fn unescape(s: &str) -> String {
    s.replace("\\]", "]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_displays_as_empty_brackets() {
        assert_eq!(SGFProperty::B(None).to_string(), "B[]");
    }

    #[test]
    fn move_displays_with_coord() {
        assert_eq!(SGFProperty::W(Some(Coord::new(3, 3))).to_string(), "W[dd]");
    }

    #[test]
    fn escape_and_unescape_round_trip() {
        let raw = "a]b]c";
        let escaped = escape(raw);
        assert_eq!(escaped, "a\\]b\\]c");
        assert_eq!(unescape(&escaped), raw);
    }

    #[test]
    fn komi_half_point_display() {
        assert_eq!(Komi::from_str("6.5").unwrap().to_string(), "6.5");
        assert_eq!(Komi::from_str("0").unwrap().to_string(), "0");
    }
}
