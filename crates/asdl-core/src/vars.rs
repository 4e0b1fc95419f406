//! Module-local variable substitution into instance parameter values.

use indexmap::IndexMap;

use crate::ast::VarValue;

/// Canonical text rendering of an authored scalar: booleans as `1`/`0`,
/// numbers in plain decimal, strings verbatim.
pub fn canonical_value(value: &VarValue) -> String {
    match value {
        VarValue::Bool(true) => "1".to_string(),
        VarValue::Bool(false) => "0".to_string(),
        VarValue::Int(n) => n.to_string(),
        VarValue::Float(f) => f.to_string(),
        VarValue::Str(s) => s.clone(),
    }
}

/// Result of substituting variables into one parameter value.
pub struct Substitution {
    pub value: String,
    /// Identifier tokens that named no variable.
    pub undefined: Vec<String>,
}

/// Replace whole identifier tokens naming module variables with their
/// canonical values.
///
/// A token is a maximal `[A-Za-z0-9_]+` run; only runs starting with a
/// letter or `_` are identifiers, so numeric-with-unit literals like `0.5u`
/// or `10k` pass through untouched. Identifier tokens naming no variable
/// are collected as undefined references.
pub fn substitute(raw: &str, variables: &IndexMap<String, String>) -> Substitution {
    let mut out = String::with_capacity(raw.len());
    let mut undefined = Vec::new();
    let bytes = raw.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_ascii_alphanumeric() || c == '_' {
            let start = i;
            while i < bytes.len() && {
                let c = bytes[i] as char;
                c.is_ascii_alphanumeric() || c == '_'
            } {
                i += 1;
            }
            let token = &raw[start..i];
            let first = token.chars().next().expect("nonempty run");
            if first.is_ascii_alphabetic() || first == '_' {
                match variables.get(token) {
                    Some(value) => out.push_str(value),
                    None => {
                        undefined.push(token.to_string());
                        out.push_str(token);
                    }
                }
            } else {
                out.push_str(token);
            }
        } else {
            out.push(c);
            i += c.len_utf8();
        }
    }

    Substitution {
        value: out,
        undefined,
    }
}
