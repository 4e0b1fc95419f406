//! Lexing and parsing of raw pattern tokens.
//!
//! Grammar, informally: an expression is `;`-separated segments; a segment
//! is a run of literal fragments, `<...>` groups and `*` wildcards. A group
//! body is an enumeration (`a|b|c`), an inclusive numeric range (`msb:lsb`),
//! or a named-pattern reference (`@name`), optionally prefixed with an
//! `axis=` tag.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("unclosed '<' at offset {0}")]
    UnclosedGroup(usize),
    #[error("'>' without a matching '<' at offset {0}")]
    StrayClose(usize),
    #[error("'<' inside a pattern group at offset {0}")]
    NestedGroup(usize),
    #[error("empty pattern group at offset {0}")]
    EmptyGroup(usize),
    #[error("pattern group mixes '|' and ':' at offset {0}")]
    MixedGroup(usize),
    #[error("empty enumeration label at offset {0}")]
    EmptyLabel(usize),
    #[error("invalid enumeration label {1:?} at offset {0}")]
    BadLabel(usize, String),
    #[error("invalid range bound {1:?} at offset {0}")]
    BadRangeBound(usize, String),
    #[error("invalid named-pattern reference {1:?} at offset {0}")]
    BadNamedRef(usize, String),
    #[error("invalid axis tag {1:?} at offset {0}")]
    BadTag(usize, String),
}

/// One lexed token of a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Group(Group),
    /// The reserved `*`, legal only on the instance side of an endpoint.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Explicit `tag=` axis tag, if authored.
    pub tag: Option<String>,
    pub body: GroupBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupBody {
    Enumeration(Vec<String>),
    Range { msb: i64, lsb: i64 },
    NamedRef(String),
}

impl Group {
    /// The axis identity this group contributes: the explicit tag, else the
    /// referenced pattern name, else anonymous.
    pub fn axis_id(&self) -> Option<&str> {
        match (&self.tag, &self.body) {
            (Some(tag), _) => Some(tag),
            (None, GroupBody::NamedRef(name)) => Some(name),
            _ => None,
        }
    }
}

/// A fully parsed expression: segments joined by the splice operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternExpr {
    pub raw: String,
    pub segments: Vec<Vec<Token>>,
}

impl PatternExpr {
    /// An expression with no pattern syntax at all: one literal atom.
    pub fn trivial(raw: &str) -> Self {
        PatternExpr {
            raw: raw.to_string(),
            segments: vec![vec![Token::Literal(raw.to_string())]],
        }
    }

    pub fn is_trivial(&self) -> bool {
        matches!(
            self.segments.as_slice(),
            [segment] if matches!(segment.as_slice(), [] | [Token::Literal(_)])
        )
    }

    pub fn has_groups(&self) -> bool {
        self.tokens().any(|t| matches!(t, Token::Group(_)))
    }

    pub fn has_wildcard(&self) -> bool {
        self.tokens().any(|t| matches!(t, Token::Wildcard))
    }

    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.segments.iter().flatten()
    }

    /// All groups across all segments, in appearance order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.tokens().filter_map(|t| match t {
            Token::Group(g) => Some(g),
            _ => None,
        })
    }
}

fn is_label(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse `raw` into segments and tokens.
pub fn parse_pattern(raw: &str) -> Result<PatternExpr, PatternError> {
    let mut segments: Vec<Vec<Token>> = Vec::new();
    let mut tokens: Vec<Token> = Vec::new();
    let mut literal = String::new();
    let mut chars = raw.char_indices().peekable();

    while let Some((at, c)) = chars.next() {
        match c {
            '<' => {
                flush_literal(&mut literal, &mut tokens);
                let mut body = String::new();
                let mut closed = false;
                for (inner_at, inner) in chars.by_ref() {
                    match inner {
                        '>' => {
                            closed = true;
                            break;
                        }
                        '<' => return Err(PatternError::NestedGroup(inner_at)),
                        _ => body.push(inner),
                    }
                }
                if !closed {
                    return Err(PatternError::UnclosedGroup(at));
                }
                tokens.push(Token::Group(parse_group(at, &body)?));
            }
            '>' => return Err(PatternError::StrayClose(at)),
            ';' => {
                flush_literal(&mut literal, &mut tokens);
                segments.push(std::mem::take(&mut tokens));
            }
            '*' => {
                flush_literal(&mut literal, &mut tokens);
                tokens.push(Token::Wildcard);
            }
            _ => literal.push(c),
        }
    }
    flush_literal(&mut literal, &mut tokens);
    segments.push(tokens);

    Ok(PatternExpr {
        raw: raw.to_string(),
        segments,
    })
}

fn flush_literal(literal: &mut String, tokens: &mut Vec<Token>) {
    if !literal.is_empty() {
        tokens.push(Token::Literal(std::mem::take(literal)));
    }
}

fn parse_group(at: usize, body: &str) -> Result<Group, PatternError> {
    if body.is_empty() {
        return Err(PatternError::EmptyGroup(at));
    }

    // Strip an optional `tag=` prefix before classifying the body.
    let (tag, body) = match body.split_once('=') {
        Some((tag, rest)) => {
            if !is_ident(tag) {
                return Err(PatternError::BadTag(at, tag.to_string()));
            }
            (Some(tag.to_string()), rest)
        }
        None => (None, body),
    };
    if body.is_empty() {
        return Err(PatternError::EmptyGroup(at));
    }

    if let Some(name) = body.strip_prefix('@') {
        if !is_ident(name) {
            return Err(PatternError::BadNamedRef(at, name.to_string()));
        }
        return Ok(Group {
            tag,
            body: GroupBody::NamedRef(name.to_string()),
        });
    }

    let has_pipe = body.contains('|');
    let has_colon = body.contains(':');
    match (has_pipe, has_colon) {
        (true, true) => Err(PatternError::MixedGroup(at)),
        (true, false) => {
            let mut labels = Vec::new();
            for label in body.split('|') {
                if label.is_empty() {
                    return Err(PatternError::EmptyLabel(at));
                }
                if !is_label(label) {
                    return Err(PatternError::BadLabel(at, label.to_string()));
                }
                labels.push(label.to_string());
            }
            Ok(Group {
                tag,
                body: GroupBody::Enumeration(labels),
            })
        }
        (false, true) => {
            let (msb, lsb) = body.split_once(':').expect("checked for ':'");
            let parse_bound = |s: &str| -> Result<i64, PatternError> {
                s.parse()
                    .map_err(|_| PatternError::BadRangeBound(at, s.to_string()))
            };
            Ok(Group {
                tag,
                body: GroupBody::Range {
                    msb: parse_bound(msb)?,
                    lsb: parse_bound(lsb)?,
                },
            })
        }
        (false, false) => {
            if !is_label(body) {
                return Err(PatternError::BadLabel(at, body.to_string()));
            }
            Ok(Group {
                tag,
                body: GroupBody::Enumeration(vec![body.to_string()]),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups_of(raw: &str) -> Vec<Group> {
        parse_pattern(raw).unwrap().groups().cloned().collect()
    }

    #[test]
    fn plain_literal() {
        let expr = parse_pattern("MTAIL").unwrap();
        assert!(expr.is_trivial());
        assert_eq!(expr.segments.len(), 1);
    }

    #[test]
    fn enumeration_group() {
        let groups = groups_of("MN<p|n>");
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].axis_id(), None);
        assert_eq!(
            groups[0].body,
            GroupBody::Enumeration(vec!["p".into(), "n".into()])
        );
    }

    #[test]
    fn tagged_enumeration() {
        let groups = groups_of("d<diffpair=p|n>");
        assert_eq!(groups[0].axis_id(), Some("diffpair"));
    }

    #[test]
    fn range_directions_parse() {
        assert_eq!(
            groups_of("bus<7:0>")[0].body,
            GroupBody::Range { msb: 7, lsb: 0 }
        );
        assert_eq!(
            groups_of("bus<0:3>")[0].body,
            GroupBody::Range { msb: 0, lsb: 3 }
        );
    }

    #[test]
    fn named_reference() {
        let groups = groups_of("x<@diffpair>");
        assert_eq!(groups[0].body, GroupBody::NamedRef("diffpair".into()));
        assert_eq!(groups[0].axis_id(), Some("diffpair"));
    }

    #[test]
    fn single_label_enumeration() {
        assert_eq!(
            groups_of("a<x>")[0].body,
            GroupBody::Enumeration(vec!["x".into()])
        );
    }

    #[test]
    fn splice_separates_segments() {
        let expr = parse_pattern("a<1:2>;b").unwrap();
        assert_eq!(expr.segments.len(), 2);
        assert_eq!(expr.segments[1], vec![Token::Literal("b".into())]);
    }

    #[test]
    fn wildcard_is_its_own_token() {
        let expr = parse_pattern("M*.d").unwrap();
        assert_eq!(
            expr.segments[0],
            vec![
                Token::Literal("M".into()),
                Token::Wildcard,
                Token::Literal(".d".into()),
            ]
        );
    }

    #[test]
    fn empty_groups_are_rejected() {
        assert_eq!(parse_pattern("a<>"), Err(PatternError::EmptyGroup(1)));
        assert!(matches!(
            parse_pattern("a<:>"),
            Err(PatternError::BadRangeBound(..))
        ));
    }

    #[test]
    fn mixed_and_broken_groups_are_rejected() {
        assert!(matches!(
            parse_pattern("a<1|2:3>"),
            Err(PatternError::MixedGroup(..))
        ));
        assert!(matches!(
            parse_pattern("a<b"),
            Err(PatternError::UnclosedGroup(..))
        ));
        assert!(matches!(
            parse_pattern("ab>"),
            Err(PatternError::StrayClose(..))
        ));
        assert!(matches!(
            parse_pattern("a<b<c>>"),
            Err(PatternError::NestedGroup(..))
        ));
    }

    #[test]
    fn empty_enumeration_label_is_rejected() {
        assert!(matches!(
            parse_pattern("a<p||n>"),
            Err(PatternError::EmptyLabel(..))
        ));
    }
}
