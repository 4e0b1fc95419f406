//! The patterned graph: the canonical semantic core produced by lowering.
//!
//! Instance-first and net-first views coexist: nets own ordered endpoint
//! lists, endpoints point back at their net and carry the port expression.
//! All cross-references are numeric IDs into the per-module maps.

use indexmap::IndexMap;

use crate::ast::VarValue;
use crate::ids::{DeviceId, EndpointId, ExprId, InstId, ModuleId, NetId};
use crate::pattern::{AxisTable, BindingPlan, ExprRegistry};
use crate::span::FileId;

/// Tagged reference to a resolved symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolRef {
    Module(ModuleId),
    Device(DeviceId),
}

/// Lookup table from `(file, name)` to the defining symbol. Module and
/// device names share one namespace per file.
#[derive(Debug, Default)]
pub struct SymbolTable {
    by_name: IndexMap<(FileId, String), SymbolRef>,
}

impl SymbolTable {
    pub fn insert(&mut self, file: FileId, name: &str, sym: SymbolRef) -> Option<SymbolRef> {
        let key = (file, name.to_string());
        if let Some(existing) = self.by_name.get(&key) {
            return Some(*existing);
        }
        self.by_name.insert(key, sym);
        None
    }

    pub fn lookup(&self, file: &FileId, name: &str) -> Option<SymbolRef> {
        self.by_name.get(&(file.clone(), name.to_string())).copied()
    }
}

/// A device definition, shared by the patterned and atomized views.
#[derive(Debug)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub file: FileId,
    pub ports: Vec<String>,
    /// Default parameters in authored order, canonically rendered.
    pub params: IndexMap<String, String>,
    /// Device-scoped immutable defaults.
    pub variables: IndexMap<String, VarValue>,
    /// Backend name -> (template, canonically rendered param overrides).
    pub backends: IndexMap<String, DeviceBackendInfo>,
}

#[derive(Debug, Clone)]
pub struct DeviceBackendInfo {
    pub template: String,
    pub params: IndexMap<String, String>,
}

/// A net bundle: its name expression and the endpoints it owns.
#[derive(Debug)]
pub struct NetBundle {
    pub id: NetId,
    pub name_expr: ExprId,
    /// Authored name with the `$` marker stripped.
    pub name_raw: String,
    pub exported: bool,
    pub endpoints: Vec<EndpointId>,
}

/// An instance bundle: name expression, resolved reference, parameters.
#[derive(Debug)]
pub struct InstanceBundle {
    pub id: InstId,
    pub name_expr: ExprId,
    pub name_raw: String,
    /// `None` when the type token did not resolve; downstream stages skip
    /// such instances (the diagnostic is already on the bus).
    pub sym: Option<SymbolRef>,
    /// The unresolved type token as authored.
    pub ref_raw: String,
    /// Parameter name -> value expression, authored order.
    pub params: Vec<(String, ExprId)>,
}

/// One endpoint bundle: the binding between a net's atoms and the atoms of
/// one endpoint expression, resolved at lowering time.
#[derive(Debug)]
pub struct EndpointBundle {
    pub id: EndpointId,
    pub net: NetId,
    pub port_expr: ExprId,
    /// Expanded `(instance, pin)` atoms, wildcards already resolved.
    pub atoms: Vec<EndpointAtom>,
    /// For atom `i`, the index of the net atom it binds to.
    pub net_map: Vec<u32>,
    pub plan: BindingPlan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointAtom {
    pub inst: String,
    pub pin: String,
}

/// Schematic hints for one net: authored group slices over the flattened
/// endpoint token list, plus the designated hub group.
#[derive(Debug, Clone, Default)]
pub struct NetHints {
    pub slices: Vec<HintSlice>,
    pub hub: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintSlice {
    pub start: usize,
    pub count: usize,
    pub label: Option<String>,
}

/// One lowered module.
#[derive(Debug)]
pub struct ModuleGraph {
    pub id: ModuleId,
    pub name: String,
    pub file: FileId,
    /// Name expressions of `$`-exported nets, in authored order.
    pub port_order: Vec<ExprId>,
    pub nets: IndexMap<NetId, NetBundle>,
    pub instances: IndexMap<InstId, InstanceBundle>,
    pub endpoints: IndexMap<EndpointId, EndpointBundle>,
    /// Per-module pattern expression registry.
    pub exprs: ExprRegistry,
    /// Named pattern axes collected from tagged groups.
    pub axes: AxisTable,
    /// Module variables, canonically rendered.
    pub variables: IndexMap<String, String>,
    /// Schematic hints keyed by net.
    pub hints: IndexMap<NetId, NetHints>,
}

/// The lowered program: every module and device of the database.
#[derive(Debug, Default)]
pub struct ProgramGraph {
    pub modules: IndexMap<ModuleId, ModuleGraph>,
    pub devices: IndexMap<DeviceId, DeviceInfo>,
    pub symbols: SymbolTable,
}

impl ProgramGraph {
    pub fn module(&self, id: ModuleId) -> &ModuleGraph {
        &self.modules[&id]
    }

    pub fn device(&self, id: DeviceId) -> &DeviceInfo {
        &self.devices[&id]
    }
}
