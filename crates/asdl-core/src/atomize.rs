//! Pattern atomization: materialize a pattern-free graph from the patterned
//! one.
//!
//! Atomized names contain no pattern delimiters; endpoints carry explicit
//! instance and port fields; every atom keeps a back-link to the patterned
//! entity it came from. Name uniqueness is enforced here, across pattern
//! origins.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink};
use crate::graph::{HintSlice, ModuleGraph, NetHints, ProgramGraph, SymbolRef};
use crate::ids::{EndpointId, IdAllocator, InstId, ModuleId, NetId};
use crate::pattern::{expand, ExpandError};
use crate::span::FileId;
use crate::vars::substitute;

/// A pattern-free instance.
#[derive(Debug)]
pub struct AtomInstance {
    pub id: InstId,
    pub name: String,
    pub sym: Option<SymbolRef>,
    pub ref_raw: String,
    /// Parameter values for this atom, variables substituted.
    pub params: Vec<(String, String)>,
    /// Patterned bundle this atom came from.
    pub from: InstId,
}

/// A pattern-free net.
#[derive(Debug)]
pub struct AtomNet {
    pub id: NetId,
    pub name: String,
    pub exported: bool,
    pub endpoints: Vec<EndpointId>,
    pub from: NetId,
}

/// A pattern-free endpoint: one net atom connected to one `(instance, port)`.
#[derive(Debug)]
pub struct AtomEndpoint {
    pub id: EndpointId,
    pub net: NetId,
    pub inst: InstId,
    pub port: String,
    pub from: EndpointId,
}

/// One atomized module.
#[derive(Debug)]
pub struct AtomizedModule {
    pub id: ModuleId,
    pub name: String,
    pub file: FileId,
    /// Expanded port names in declaration order.
    pub ports: Vec<String>,
    pub instances: IndexMap<InstId, AtomInstance>,
    pub nets: IndexMap<NetId, AtomNet>,
    pub endpoints: IndexMap<EndpointId, AtomEndpoint>,
    /// Schematic hints translated through expansion.
    pub hints: IndexMap<NetId, NetHints>,
}

impl AtomizedModule {
    pub fn instance_by_name(&self, name: &str) -> Option<&AtomInstance> {
        self.instances.values().find(|inst| inst.name == name)
    }

    pub fn net_by_name(&self, name: &str) -> Option<&AtomNet> {
        self.nets.values().find(|net| net.name == name)
    }
}

/// The atomized program, keyed by the patterned module IDs.
#[derive(Debug, Default)]
pub struct AtomizedProgram {
    pub modules: IndexMap<ModuleId, AtomizedModule>,
}

impl AtomizedProgram {
    pub fn module(&self, id: ModuleId) -> &AtomizedModule {
        &self.modules[&id]
    }
}

/// Atomize every module of the program. Modules are independent; one failing
/// module does not stop its siblings.
pub fn atomize_program(
    graph: &ProgramGraph,
    alloc: &mut IdAllocator,
    max_expansion: usize,
    sink: &mut DiagnosticSink,
) -> AtomizedProgram {
    let mut out = AtomizedProgram::default();
    for (id, module) in &graph.modules {
        let atomized = atomize_module(module, alloc, max_expansion, sink);
        out.modules.insert(*id, atomized);
    }
    out
}

fn atomize_module(
    module: &ModuleGraph,
    alloc: &mut IdAllocator,
    max_expansion: usize,
    sink: &mut DiagnosticSink,
) -> AtomizedModule {
    let file = &module.file;

    // -- Instances -------------------------------------------------------
    let mut instances: IndexMap<InstId, AtomInstance> = IndexMap::new();
    let mut inst_by_name: HashMap<String, InstId> = HashMap::new();
    for bundle in module.instances.values() {
        let expr = &module.exprs.get(bundle.name_expr).expr;
        let atoms = match expand(expr, &module.axes, max_expansion) {
            Ok(atoms) => atoms,
            // Already diagnosed at lowering; skip quietly.
            Err(_) => continue,
        };

        let params = atom_params(module, bundle, atoms.len(), max_expansion, sink);

        for (i, atom) in atoms.iter().enumerate() {
            if inst_by_name.contains_key(atom) {
                sink.push(
                    Diagnostic::new(
                        DiagCode::AtomNameCollision,
                        format!(
                            "instance name '{atom}' is produced more than once in \
                             module '{}'",
                            module.name
                        ),
                    )
                    .with_file(file.clone()),
                );
                continue;
            }
            let id = alloc.instances.next();
            inst_by_name.insert(atom.clone(), id);
            instances.insert(
                id,
                AtomInstance {
                    id,
                    name: atom.clone(),
                    sym: bundle.sym,
                    ref_raw: bundle.ref_raw.clone(),
                    params: params
                        .iter()
                        .map(|(key, values)| (key.clone(), values[i.min(values.len() - 1)].clone()))
                        .collect(),
                    from: bundle.id,
                },
            );
        }
    }

    // -- Nets ------------------------------------------------------------
    let mut nets: IndexMap<NetId, AtomNet> = IndexMap::new();
    let mut hints: IndexMap<NetId, NetHints> = IndexMap::new();
    // Patterned net -> its atom IDs, in expansion order.
    let mut net_atoms: HashMap<NetId, Vec<NetId>> = HashMap::new();
    let mut net_by_name: HashMap<String, NetId> = HashMap::new();
    for bundle in module.nets.values() {
        let expr = &module.exprs.get(bundle.name_expr).expr;
        let atoms = match expand(expr, &module.axes, max_expansion) {
            Ok(atoms) => atoms,
            Err(_) => continue,
        };
        let mut ids = Vec::with_capacity(atoms.len());
        for atom in &atoms {
            if net_by_name.contains_key(atom) {
                sink.push(
                    Diagnostic::new(
                        DiagCode::AtomNameCollision,
                        format!(
                            "net name '{atom}' is produced more than once in module '{}'",
                            module.name
                        ),
                    )
                    .with_file(file.clone()),
                );
                continue;
            }
            let id = alloc.nets.next();
            net_by_name.insert(atom.clone(), id);
            ids.push(id);
            nets.insert(
                id,
                AtomNet {
                    id,
                    name: atom.clone(),
                    exported: bundle.exported,
                    endpoints: Vec::new(),
                    from: bundle.id,
                },
            );
        }
        // Translate authored group slices from endpoint-token indices to
        // endpoint-atom indices via per-token atom counts.
        if let Some(net_hints) = module.hints.get(&bundle.id) {
            let counts: Vec<usize> = bundle
                .endpoints
                .iter()
                .map(|eid| module.endpoints[eid].atoms.len())
                .collect();
            let mut prefix = vec![0usize; counts.len() + 1];
            for (i, count) in counts.iter().enumerate() {
                prefix[i + 1] = prefix[i] + count;
            }
            let translated = NetHints {
                slices: net_hints
                    .slices
                    .iter()
                    .filter(|slice| slice.start + slice.count <= counts.len())
                    .map(|slice| HintSlice {
                        start: prefix[slice.start],
                        count: prefix[slice.start + slice.count] - prefix[slice.start],
                        label: slice.label.clone(),
                    })
                    .collect(),
                hub: net_hints.hub,
            };
            for id in &ids {
                hints.insert(*id, translated.clone());
            }
        }
        net_atoms.insert(bundle.id, ids);
    }

    // -- Endpoints -------------------------------------------------------
    let mut endpoints: IndexMap<EndpointId, AtomEndpoint> = IndexMap::new();
    // (instance, port) -> first binding, for module-wide uniqueness.
    let mut bound_pins: HashMap<(InstId, String), NetId> = HashMap::new();
    for bundle in module.endpoints.values() {
        let Some(targets) = net_atoms.get(&bundle.net) else {
            continue;
        };
        for (i, atom) in bundle.atoms.iter().enumerate() {
            let net_idx = bundle.net_map[i] as usize;
            let Some(&net_id) = targets.get(net_idx) else {
                continue;
            };
            let Some(&inst_id) = inst_by_name.get(&atom.inst) else {
                sink.push(
                    Diagnostic::new(
                        DiagCode::UnresolvedReference,
                        format!(
                            "endpoint '{}.{}' references no instance in module '{}'",
                            atom.inst, atom.pin, module.name
                        ),
                    )
                    .with_file(file.clone()),
                );
                continue;
            };
            let pin_key = (inst_id, atom.pin.clone());
            if let Some(prior) = bound_pins.get(&pin_key) {
                let prior_name = &nets[prior].name;
                sink.push(
                    Diagnostic::new(
                        DiagCode::DuplicateEndpointBinding,
                        format!(
                            "pin '{}.{}' is already connected to net '{prior_name}' \
                             in module '{}'",
                            atom.inst, atom.pin, module.name
                        ),
                    )
                    .with_file(file.clone()),
                );
                continue;
            }
            bound_pins.insert(pin_key, net_id);
            let id = alloc.endpoints.next();
            endpoints.insert(
                id,
                AtomEndpoint {
                    id,
                    net: net_id,
                    inst: inst_id,
                    port: atom.pin.clone(),
                    from: bundle.id,
                },
            );
            nets.get_mut(&net_id)
                .expect("net atom allocated above")
                .endpoints
                .push(id);
        }
    }

    // -- Ports -----------------------------------------------------------
    let mut ports: Vec<String> = Vec::new();
    for expr_id in &module.port_order {
        let expr = &module.exprs.get(*expr_id).expr;
        match expand(expr, &module.axes, max_expansion) {
            Ok(atoms) => {
                for atom in atoms {
                    if ports.contains(&atom) {
                        sink.push(
                            Diagnostic::new(
                                DiagCode::DuplicateName,
                                format!(
                                    "port '{atom}' appears more than once on module '{}'",
                                    module.name
                                ),
                            )
                            .with_file(file.clone()),
                        );
                        continue;
                    }
                    ports.push(atom);
                }
            }
            Err(_) => continue,
        }
    }

    AtomizedModule {
        id: module.id,
        name: module.name.clone(),
        file: module.file.clone(),
        ports,
        instances,
        nets,
        endpoints,
        hints,
    }
}

/// Expand and substitute one instance bundle's parameter values.
///
/// A value expanding to one atom broadcasts to every instance atom; a value
/// expanding to exactly the instance atom count distributes per atom; any
/// other length is a binding error.
fn atom_params(
    module: &ModuleGraph,
    bundle: &crate::graph::InstanceBundle,
    atom_count: usize,
    max_expansion: usize,
    sink: &mut DiagnosticSink,
) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::with_capacity(bundle.params.len());
    for (key, expr_id) in &bundle.params {
        let expr = &module.exprs.get(*expr_id).expr;
        let values = match expand(expr, &module.axes, max_expansion) {
            Ok(atoms) => atoms,
            Err(err) => {
                let code = match err {
                    ExpandError::UnknownNamedPattern(_) => DiagCode::UnresolvedReference,
                    ExpandError::DuplicateAxisId(_) => DiagCode::DuplicateAxisId,
                    ExpandError::TooLarge { .. } => DiagCode::ExpansionTooLarge,
                };
                sink.push(
                    Diagnostic::new(
                        code,
                        format!("parameter '{key}' of instance '{}': {err}", bundle.name_raw),
                    )
                    .with_file(module.file.clone()),
                );
                continue;
            }
        };
        if values.len() != 1 && values.len() != atom_count {
            sink.push(
                Diagnostic::new(
                    DiagCode::BindingLengthMismatch,
                    format!(
                        "parameter '{key}' of instance '{}' expands to {} values for \
                         {atom_count} instance atoms",
                        bundle.name_raw,
                        values.len()
                    ),
                )
                .with_file(module.file.clone()),
            );
            continue;
        }

        let mut substituted = Vec::with_capacity(values.len());
        for value in &values {
            let sub = substitute(value, &module.variables);
            for token in &sub.undefined {
                sink.push(
                    Diagnostic::new(
                        DiagCode::UndefinedVariable,
                        format!(
                            "parameter '{key}' of instance '{}' references undefined \
                             variable '{token}'",
                            bundle.name_raw
                        ),
                    )
                    .with_file(module.file.clone()),
                );
            }
            substituted.push(sub.value);
        }
        out.push((key.clone(), substituted));
    }
    out
}
