//! The authoring AST, deserialized straight from the YAML dialect.
//!
//! Authored order is semantic everywhere (imports, modules, instances, nets,
//! parameters), and duplicate keys must surface as `DuplicateName`
//! diagnostics rather than silently collapsing, so the outer mappings
//! deserialize into [`Entries`] — an order- and duplicate-preserving list of
//! key/value pairs. Lookup tables are built during lowering, where the
//! duplicates are reported.

use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

/// An authored mapping kept as a flat pair list: order preserved, duplicate
/// keys preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Entries<V>(pub Vec<(String, V)>);

impl<V> Default for Entries<V> {
    fn default() -> Self {
        Entries(Vec::new())
    }
}

impl<V> Entries<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for Entries<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PairVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for PairVisitor<V> {
            type Value = Entries<V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    pairs.push((key, value));
                }
                Ok(Entries(pairs))
            }
        }

        deserializer.deserialize_map(PairVisitor(PhantomData))
    }
}

/// A whole authoring document (one `.asdl` file).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Document {
    /// Entry module name, looked up in this document's modules.
    #[serde(default)]
    pub top: Option<String>,
    /// Local alias -> logical import path, in authored order.
    #[serde(default)]
    pub imports: Entries<String>,
    #[serde(default)]
    pub modules: Entries<ModuleDef>,
    #[serde(default)]
    pub devices: Entries<DeviceDef>,
}

/// A hierarchical cell: instances plus the nets connecting them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleDef {
    /// Instance-name token -> raw instance expression (`type k=v ...`).
    #[serde(default)]
    pub instances: Entries<String>,
    /// Net-name token -> endpoint tokens, flat or grouped.
    #[serde(default)]
    pub nets: Entries<NetValue>,
    /// Module-local immutable defaults, substituted into parameter values.
    #[serde(default)]
    pub variables: IndexMap<String, VarValue>,
}

/// Endpoint lists come in two authored shapes; the grouped one additionally
/// carries schematic hints. Lowering flattens both.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NetValue {
    Flat(Vec<String>),
    Grouped(Vec<Vec<String>>),
}

impl NetValue {
    /// Flatten to the endpoint token list, plus the `(start, count)` group
    /// slices when the authored value was grouped.
    pub fn flatten(&self) -> (Vec<&str>, Option<Vec<(usize, usize)>>) {
        match self {
            NetValue::Flat(tokens) => (tokens.iter().map(String::as_str).collect(), None),
            NetValue::Grouped(groups) => {
                let mut flat = Vec::new();
                let mut slices = Vec::with_capacity(groups.len());
                for group in groups {
                    slices.push((flat.len(), group.len()));
                    flat.extend(group.iter().map(String::as_str));
                }
                (flat, Some(slices))
            }
        }
    }
}

/// A leaf cell with declared ports and per-backend templates; never
/// elaborated into a subcircuit.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceDef {
    #[serde(default)]
    pub ports: Vec<String>,
    /// Default parameters, lowest-precedence layer of the emission merge.
    #[serde(default)]
    pub params: IndexMap<String, VarValue>,
    /// Device-scoped immutable defaults.
    #[serde(default)]
    pub variables: IndexMap<String, VarValue>,
    /// Backend name -> emission entry.
    #[serde(default)]
    pub backends: IndexMap<String, DeviceBackend>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceBackend {
    pub template: String,
    /// Backend-specific parameter overrides, middle layer of the merge.
    #[serde(default)]
    pub params: IndexMap<String, VarValue>,
    /// Free-form backend properties, carried but not interpreted here.
    #[serde(flatten)]
    pub properties: IndexMap<String, serde_yaml::Value>,
}

/// A scalar authored value: variables and parameter defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Parse one document from YAML text. Loader failures come back as an error
/// string for the resolver to wrap into `ImportParseFailed`.
pub fn parse_document(source: &str) -> Result<Document, String> {
    serde_yaml::from_str(source).map_err(|err| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inverter_document() {
        let doc = parse_document(
            r#"
top: inv
modules:
  inv:
    instances:
      MN: nfet m=1
      MP: pfet m=1
    nets:
      $in:  [MN.g, MP.g]
      $out: [MN.d, MP.d]
devices:
  nfet:
    ports: [d, g, s]
    backends: { sim.ngspice: { template: "M{name} {ports} nmos m={m}" } }
"#,
        )
        .unwrap();

        assert_eq!(doc.top.as_deref(), Some("inv"));
        assert_eq!(doc.modules.len(), 1);
        let (name, module) = doc.modules.iter().next().unwrap();
        assert_eq!(name, "inv");
        assert_eq!(module.instances.len(), 2);
        let net_names: Vec<_> = module.nets.iter().map(|(k, _)| k).collect();
        assert_eq!(net_names, vec!["$in", "$out"]);

        let (_, device) = doc.devices.iter().next().unwrap();
        assert_eq!(device.ports, vec!["d", "g", "s"]);
        assert!(device.backends.contains_key("sim.ngspice"));
    }

    #[test]
    fn duplicate_keys_are_preserved_for_lowering() {
        let doc = parse_document(
            r#"
modules:
  amp:
    instances:
      M1: nfet
      M1: pfet
"#,
        )
        .unwrap();
        let (_, module) = doc.modules.iter().next().unwrap();
        let names: Vec<_> = module.instances.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["M1", "M1"]);
    }

    #[test]
    fn grouped_nets_flatten_with_slices() {
        let doc = parse_document(
            r#"
modules:
  m:
    nets:
      mid: [[A.d, B.d], [C.g]]
"#,
        )
        .unwrap();
        let (_, module) = doc.modules.iter().next().unwrap();
        let (_, value) = module.nets.iter().next().unwrap();
        let (flat, slices) = value.flatten();
        assert_eq!(flat, vec!["A.d", "B.d", "C.g"]);
        assert_eq!(slices.unwrap(), vec![(0, 2), (2, 1)]);
    }

    #[test]
    fn pattern_heavy_keys_survive_yaml() {
        let doc = parse_document(
            r#"
modules:
  m:
    nets:
      $bus<7:0>: [BUF<7:0>.y]
      d<diffpair=p|n>: [MN_IN<diffpair=p|n>.d]
"#,
        )
        .unwrap();
        let (_, module) = doc.modules.iter().next().unwrap();
        let names: Vec<_> = module.nets.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["$bus<7:0>", "d<diffpair=p|n>"]);
    }

    #[test]
    fn var_values_deserialize_by_shape() {
        let doc = parse_document(
            r#"
modules:
  m:
    variables: { w: 0.5, fingers: 4, fast: true, corner: tt }
"#,
        )
        .unwrap();
        let (_, module) = doc.modules.iter().next().unwrap();
        assert_eq!(module.variables["w"], VarValue::Float(0.5));
        assert_eq!(module.variables["fingers"], VarValue::Int(4));
        assert_eq!(module.variables["fast"], VarValue::Bool(true));
        assert_eq!(module.variables["corner"], VarValue::Str("tt".into()));
    }
}
