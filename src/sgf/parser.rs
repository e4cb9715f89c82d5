//! Linear SGF parser producing a generic parse tree (`ParsedObject`), left
//! for the tree layer (`crate::tree::State::from_sgf`) to map into
//! `TreeNode`s with move/pass/setup semantics — mirroring the split in
//! `original_source/backend/parser.go` (`SGFNode`, dumb about game
//! semantics) vs. `state.go`'s `FromSGF` (which interprets `B`/`W`/`AB`
//! etc.), and the same `parser.rs`/`tree.rs` split.

use anyhow::Result;
use pest_consume::{Parser, match_nodes};

use crate::board::Coord;
use crate::sgf::node::{Charset, GameType, Komi, Label, PenStroke, SGFProperty, unescape};

type PestNode<'i> = pest_consume::Node<'i, Rule, ()>;
type ParseResult<T> = std::result::Result<T, pest_consume::Error<Rule>>;

/// One parsed `;`-node's properties, in source order.
pub type ParsedNode = Vec<SGFProperty>;

/// Recursive intermediate representation mirroring the SGF grammar.
/// Private to the crate — callers drive `crate::tree::State::from_sgf`
/// instead.
pub(crate) struct ParsedObject {
    pub nodes: Vec<ParsedNode>,
    pub children: Vec<ParsedObject>,
}

#[derive(Parser)]
#[grammar = "sgf/grammar.pest"]
struct SGFParser;

fn parse_coord_list(
    values: &[String],
    err: &impl Fn(&dyn std::fmt::Display) -> pest_consume::Error<Rule>,
) -> ParseResult<Vec<Coord>> {
    values.iter().map(|v| v.parse::<Coord>().map_err(|e| err(&e))).collect()
}

fn to_parse_err(e: impl std::fmt::Display, span: pest::Span) -> pest_consume::Error<Rule> {
    pest_consume::Error::new_from_span(
        pest::error::ErrorVariant::CustomError { message: e.to_string() },
        span,
    )
}

#[pest_consume::parser]
impl SGFParser {
    fn EOI(_input: PestNode) -> ParseResult<()> {
        Ok(())
    }

    fn node_value(input: PestNode) -> ParseResult<String> {
        Ok(unescape(input.as_str()))
    }

    fn prop_ident(input: PestNode) -> ParseResult<String> {
        Ok(input.as_str().to_string())
    }

    fn property(input: PestNode) -> ParseResult<SGFProperty> {
        let span = input.as_span();
        let err = |e: &dyn std::fmt::Display| to_parse_err(e, span.clone());
        let mut children = input.into_children();

        let ident_node = children.next().expect("property must have prop_ident");
        let ident = Self::prop_ident(ident_node)?;

        let values: Vec<String> =
            children.map(Self::node_value).collect::<ParseResult<Vec<_>>>()?;
        let first = values.first().cloned().unwrap_or_default();

        Ok(match ident.as_str() {
            "B" => SGFProperty::B(if first.is_empty() { None } else { Some(first.parse().map_err(|e: anyhow::Error| err(&e))?) }),
            "W" => SGFProperty::W(if first.is_empty() { None } else { Some(first.parse().map_err(|e: anyhow::Error| err(&e))?) }),
            "AB" => SGFProperty::AB(parse_coord_list(&values, &err)?),
            "AW" => SGFProperty::AW(parse_coord_list(&values, &err)?),
            "AE" => SGFProperty::AE(parse_coord_list(&values, &err)?),
            "TR" => SGFProperty::TR(parse_coord_list(&values, &err)?),
            "SQ" => SGFProperty::SQ(parse_coord_list(&values, &err)?),
            "LB" => {
                let labels = values
                    .iter()
                    .map(|v| {
                        let (coord, text) = v.split_once(':').ok_or_else(|| err(&"LB value missing ':'"))?;
                        let coord = coord.parse::<Coord>().map_err(|e| err(&e))?;
                        Ok(Label { coord, text: text.to_string() })
                    })
                    .collect::<ParseResult<Vec<_>>>()?;
                SGFProperty::LB(labels)
            }
            "PX" => {
                let strokes = values
                    .iter()
                    .map(|v| v.parse::<PenStroke>().map_err(|e| err(&e)))
                    .collect::<ParseResult<Vec<_>>>()?;
                SGFProperty::PX(strokes)
            }
            "IX" => SGFProperty::IX(first.parse().map_err(|_| err(&"IX must be an integer"))?),
            "C" => SGFProperty::C(first),
            "GM" => SGFProperty::GM(first.parse::<GameType>().map_err(|e| err(&e))?),
            "FF" => SGFProperty::FF(first.parse().map_err(|_| err(&"FF must be a number"))?),
            "CA" => SGFProperty::CA(first.parse::<Charset>().map_err(|e| err(&e))?),
            "SZ" => {
                if values.len() > 1 {
                    return Err(err(&"SZ cannot be a multifield"));
                }
                SGFProperty::SZ(first.parse().map_err(|_| err(&"SZ must be a number"))?)
            }
            "PB" => SGFProperty::PB(first),
            "PW" => SGFProperty::PW(first),
            "RU" => SGFProperty::RU(first),
            "KM" => SGFProperty::KM(first.parse::<Komi>().map_err(|e| err(&e))?),
            "GN" => SGFProperty::GN(first),
            _ => SGFProperty::Unknown(ident, values),
        })
    }

    fn node(input: PestNode) -> ParseResult<ParsedNode> {
        match_nodes!(input.into_children();
            [property(props)..] => Ok(props.collect())
        )
    }

    fn object(input: PestNode) -> ParseResult<ParsedObject> {
        let mut nodes = Vec::new();
        let mut children = Vec::new();
        for child in input.into_children() {
            match child.as_rule() {
                Rule::node => nodes.push(Self::node(child)?),
                Rule::object => children.push(Self::object(child)?),
                _ => {}
            }
        }
        Ok(ParsedObject { nodes, children })
    }

    fn file(input: PestNode) -> ParseResult<ParsedObject> {
        match_nodes!(input.into_children();
            [object(tree), EOI(_)] => Ok(tree)
        )
    }
}

/// Parses SGF text into a single game-record parse tree. Rejects malformed
/// syntax; does not check game semantics (suicide, `SZ` validity) — that
/// happens in the tree layer.
pub(crate) fn parse(input: &str) -> Result<ParsedObject> {
    let inputs = SGFParser::parse(Rule::file, input)?;
    let input = inputs.single()?;
    Ok(SGFParser::file(input)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flat_game() {
        let tree = parse("(;GM[1]FF[4]SZ[19];B[pd];W[dd])").unwrap();
        assert_eq!(tree.nodes.len(), 3);
        assert!(tree.children.is_empty());
    }

    #[test]
    fn parses_branching_game() {
        let tree = parse("(;SZ[19](;B[pd];W[dd])(;B[dd];W[ee]))").unwrap();
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.children.len(), 2);
    }

    #[test]
    fn parses_pass_as_empty_value() {
        let tree = parse("(;B[])").unwrap();
        match &tree.nodes[0][0] {
            SGFProperty::B(None) => {}
            other => panic!("expected pass, got {other:?}"),
        }
    }

    #[test]
    fn unescapes_bracket_in_comment() {
        let tree = parse(r"(;C[a\]b])").unwrap();
        match &tree.nodes[0][0] {
            SGFProperty::C(s) => assert_eq!(s, "a]b"),
            other => panic!("expected comment, got {other:?}"),
        }
    }

    #[test]
    fn rejects_multivalue_sz() {
        assert!(parse("(;SZ[19][9])").is_err());
    }

    #[test]
    fn rejects_unterminated_branch() {
        assert!(parse("(;B[pd]").is_err());
    }
}
