//! Axis resolution and expansion of parsed expressions into atoms.
//!
//! Expansion length is computed from group sizes before any atom is
//! materialized, so the `ExpansionTooLarge` bound fires without building the
//! oversized list.

use indexmap::IndexMap;
use thiserror::Error;

use super::parse::{GroupBody, PatternExpr, Token};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    #[error("unknown named pattern '@{0}'")]
    UnknownNamedPattern(String),
    #[error("axis '{0}' appears more than once in one expression")]
    DuplicateAxisId(String),
    #[error("expansion produces {len} atoms, more than the maximum of {max}")]
    TooLarge { len: usize, max: usize },
}

/// Whether an axis came from an enumeration or a numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisKind {
    Enumeration,
    Range,
}

/// A named axis gathered from the module's tagged groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisDef {
    pub id: String,
    pub kind: AxisKind,
    pub labels: Vec<String>,
    /// The authored group spelling, kept for conflict messages.
    pub raw: String,
}

impl AxisDef {
    pub fn size(&self) -> usize {
        self.labels.len()
    }
}

/// Module-local table of named pattern axes, keyed by `axis_id`.
#[derive(Debug, Clone, Default)]
pub struct AxisTable {
    axes: IndexMap<String, AxisDef>,
}

/// Outcome of inserting a tagged group into the table.
pub enum AxisInsert {
    New,
    Same,
    /// Same `axis_id`, different labels: the conflicting prior definition.
    Conflict(AxisDef),
}

impl AxisTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&AxisDef> {
        self.axes.get(id)
    }

    /// Insert a definition, detecting conflicting spellings of one axis.
    pub fn insert(&mut self, def: AxisDef) -> AxisInsert {
        match self.axes.get(&def.id) {
            None => {
                self.axes.insert(def.id.clone(), def);
                AxisInsert::New
            }
            Some(existing) if existing.labels == def.labels => AxisInsert::Same,
            Some(existing) => AxisInsert::Conflict(existing.clone()),
        }
    }
}

/// The labels of a numeric range, honoring direction: increasing when
/// `msb < lsb`, decreasing otherwise.
pub fn range_labels(msb: i64, lsb: i64) -> Vec<String> {
    if msb <= lsb {
        (msb..=lsb).map(|n| n.to_string()).collect()
    } else {
        (lsb..=msb).rev().map(|n| n.to_string()).collect()
    }
}

/// Resolve one group to its ordered labels and kind.
fn group_labels(
    body: &GroupBody,
    table: &AxisTable,
) -> Result<(Vec<String>, AxisKind), ExpandError> {
    match body {
        GroupBody::Enumeration(labels) => Ok((labels.clone(), AxisKind::Enumeration)),
        GroupBody::Range { msb, lsb } => Ok((range_labels(*msb, *lsb), AxisKind::Range)),
        GroupBody::NamedRef(name) => {
            let def = table
                .get(name)
                .ok_or_else(|| ExpandError::UnknownNamedPattern(name.clone()))?;
            Ok((def.labels.clone(), def.kind))
        }
    }
}

/// One axis position inside an expression's shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeAxis {
    pub id: Option<String>,
    pub size: usize,
}

/// The shape of an expression: total expansion length, segment count, and
/// the groups' axes in appearance order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprShape {
    pub len: usize,
    pub segments: usize,
    pub axes: Vec<ShapeAxis>,
}

impl ExprShape {
    pub fn is_scalar(&self) -> bool {
        self.len == 1
    }
}

/// Compute the shape of `expr` without materializing atoms. Also enforces
/// the per-expression axis discipline: a non-anonymous `axis_id` may appear
/// at most once.
pub fn shape(expr: &PatternExpr, table: &AxisTable) -> Result<ExprShape, ExpandError> {
    let mut axes: Vec<ShapeAxis> = Vec::new();
    let mut len: usize = 0;

    for segment in &expr.segments {
        let mut seg_len: usize = 1;
        for token in segment {
            if let Token::Group(group) = token {
                let (labels, _) = group_labels(&group.body, table)?;
                let id = group.axis_id().map(str::to_string);
                if let Some(id) = &id {
                    if axes.iter().any(|a| a.id.as_deref() == Some(id)) {
                        return Err(ExpandError::DuplicateAxisId(id.clone()));
                    }
                }
                seg_len = seg_len.saturating_mul(labels.len().max(1));
                axes.push(ShapeAxis {
                    id,
                    size: labels.len(),
                });
            }
        }
        len = len.saturating_add(seg_len);
    }

    Ok(ExprShape {
        len,
        segments: expr.segments.len(),
        axes,
    })
}

/// Expand `expr` into its atoms, honoring `max` as a hard bound.
///
/// Within a segment the rightmost group varies fastest. A group joins its
/// label to the accumulated atom with `_` unless the atom is still empty;
/// the wildcard token contributes a literal `*` for the glob stage.
pub fn expand(
    expr: &PatternExpr,
    table: &AxisTable,
    max: usize,
) -> Result<Vec<String>, ExpandError> {
    let shape = shape(expr, table)?;
    if shape.len > max {
        return Err(ExpandError::TooLarge {
            len: shape.len,
            max,
        });
    }

    let mut atoms = Vec::with_capacity(shape.len);
    for segment in &expr.segments {
        let mut partial = vec![String::new()];
        for token in segment {
            match token {
                Token::Literal(text) => {
                    for atom in &mut partial {
                        atom.push_str(text);
                    }
                }
                Token::Wildcard => {
                    for atom in &mut partial {
                        atom.push('*');
                    }
                }
                Token::Group(group) => {
                    let (labels, _) = group_labels(&group.body, table)?;
                    let mut next = Vec::with_capacity(partial.len() * labels.len());
                    for atom in &partial {
                        for label in &labels {
                            let mut joined =
                                String::with_capacity(atom.len() + label.len() + 1);
                            joined.push_str(atom);
                            if !atom.is_empty() {
                                joined.push('_');
                            }
                            joined.push_str(label);
                            next.push(joined);
                        }
                    }
                    partial = next;
                }
            }
        }
        atoms.extend(partial);
    }
    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse::parse_pattern;

    fn expand_str(raw: &str) -> Vec<String> {
        expand(&parse_pattern(raw).unwrap(), &AxisTable::new(), 10_000).unwrap()
    }

    #[test]
    fn enumeration_expands_in_order() {
        assert_eq!(expand_str("MN<p|n>"), vec!["MN_p", "MN_n"]);
    }

    #[test]
    fn range_direction_is_honored() {
        assert_eq!(expand_str("b<0:3>"), vec!["b_0", "b_1", "b_2", "b_3"]);
        assert_eq!(expand_str("b<3:0>"), vec!["b_3", "b_2", "b_1", "b_0"]);
    }

    #[test]
    fn single_label_enumeration_is_one_atom() {
        assert_eq!(expand_str("a<x>"), vec!["a_x"]);
    }

    #[test]
    fn rightmost_group_varies_fastest() {
        assert_eq!(
            expand_str("r<1:2>c<a|b>"),
            vec!["r_1c_a", "r_1c_b", "r_2c_a", "r_2c_b"]
        );
    }

    #[test]
    fn splice_concatenates_segments() {
        assert_eq!(expand_str("a<1:2>;z"), vec!["a_1", "a_2", "z"]);
    }

    #[test]
    fn leading_group_has_no_separator() {
        assert_eq!(expand_str("<p|n>x"), vec!["px", "nx"]);
    }

    #[test]
    fn length_matches_atom_count() {
        for raw in ["a<1:8>", "a<p|n>b<0:2>", "x;y<1:3>;z"] {
            let expr = parse_pattern(raw).unwrap();
            let table = AxisTable::new();
            let shape = shape(&expr, &table).unwrap();
            let atoms = expand(&expr, &table, 10_000).unwrap();
            assert_eq!(shape.len, atoms.len(), "length identity for {raw}");
        }
    }

    #[test]
    fn expansion_bound_is_hard() {
        let err = expand(
            &parse_pattern("a<0:10000>").unwrap(),
            &AxisTable::new(),
            10_000,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ExpandError::TooLarge {
                len: 10_001,
                max: 10_000
            }
        );
    }

    #[test]
    fn named_reference_uses_the_table() {
        let mut table = AxisTable::new();
        table.insert(AxisDef {
            id: "diffpair".into(),
            kind: AxisKind::Enumeration,
            labels: vec!["p".into(), "n".into()],
            raw: "<diffpair=p|n>".into(),
        });
        let expr = parse_pattern("d<@diffpair>").unwrap();
        assert_eq!(expand(&expr, &table, 100).unwrap(), vec!["d_p", "d_n"]);

        let missing = parse_pattern("d<@nope>").unwrap();
        assert_eq!(
            expand(&missing, &table, 100).unwrap_err(),
            ExpandError::UnknownNamedPattern("nope".into())
        );
    }

    #[test]
    fn duplicate_axis_in_one_expression() {
        let expr = parse_pattern("a<x=1|2>b<x=3|4>").unwrap();
        assert_eq!(
            shape(&expr, &AxisTable::new()).unwrap_err(),
            ExpandError::DuplicateAxisId("x".into())
        );
    }

    // A tiny LCG so the generated-expression sweep stays deterministic.
    fn lcg(state: &mut u64, bound: u64) -> u64 {
        *state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (*state >> 33) % bound
    }

    #[test]
    fn length_identity_over_generated_expressions() {
        let mut state = 0x5eed_1234_u64;
        for _ in 0..250 {
            let segments = 1 + lcg(&mut state, 3);
            let mut raw = String::new();
            for s in 0..segments {
                if s > 0 {
                    raw.push(';');
                }
                raw.push_str(&format!("s{s}"));
                for g in 0..lcg(&mut state, 4) {
                    if lcg(&mut state, 2) == 0 {
                        let labels: Vec<String> = (0..1 + lcg(&mut state, 4))
                            .map(|l| format!("l{g}{l}"))
                            .collect();
                        raw.push_str(&format!("<{}>", labels.join("|")));
                    } else {
                        let a = lcg(&mut state, 8) as i64;
                        let b = lcg(&mut state, 8) as i64;
                        raw.push_str(&format!("<{a}:{b}>"));
                    }
                }
            }
            let expr = parse_pattern(&raw).unwrap();
            let table = AxisTable::new();
            let shape = shape(&expr, &table).unwrap();
            let atoms = expand(&expr, &table, 1_000_000).unwrap();
            assert_eq!(shape.len, atoms.len(), "length identity for {raw}");
        }
    }

    #[test]
    fn axis_table_conflicts() {
        let mut table = AxisTable::new();
        let def = |labels: &[&str]| AxisDef {
            id: "d".into(),
            kind: AxisKind::Enumeration,
            labels: labels.iter().map(|s| s.to_string()).collect(),
            raw: String::new(),
        };
        assert!(matches!(table.insert(def(&["p", "n"])), AxisInsert::New));
        assert!(matches!(table.insert(def(&["p", "n"])), AxisInsert::Same));
        assert!(matches!(
            table.insert(def(&["a", "b"])),
            AxisInsert::Conflict(_)
        ));
    }
}
