//! Non-mutating verification passes over the atomized program.

use std::collections::{HashMap, HashSet};

use crate::atomize::{AtomizedModule, AtomizedProgram};
use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink, Severity};
use crate::graph::{ProgramGraph, SymbolRef};
use crate::ids::ModuleId;
use crate::resolve::ProgramDatabase;

/// Knobs for the configurable checks.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Warn when a device instance leaves declared device ports unconnected.
    /// Devices connect a subset of their ports by default, so this is off.
    pub warn_missing_device_ports: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        VerifyOptions {
            warn_missing_device_ports: false,
        }
    }
}

/// Run every verification pass.
pub fn verify_program(
    graph: &ProgramGraph,
    atomized: &AtomizedProgram,
    opts: &VerifyOptions,
    sink: &mut DiagnosticSink,
) {
    for module in atomized.modules.values() {
        verify_structure(module, sink);
        verify_references(graph, atomized, module, opts, sink);
    }
}

/// Structural uniqueness invariants: names free of pattern delimiters and
/// pairwise distinct, endpoints well-formed.
fn verify_structure(module: &AtomizedModule, sink: &mut DiagnosticSink) {
    let mut push = |code, message: String| {
        sink.push(Diagnostic::new(code, message).with_file(module.file.clone()));
    };

    let mut inst_names: HashSet<&str> = HashSet::new();
    for inst in module.instances.values() {
        if inst.name.contains(['<', '>', ';']) {
            push(
                DiagCode::AtomNameCollision,
                format!(
                    "instance '{}' in module '{}' still carries pattern delimiters",
                    inst.name, module.name
                ),
            );
        }
        if !inst_names.insert(&inst.name) {
            push(
                DiagCode::AtomNameCollision,
                format!(
                    "instance name '{}' is not unique in module '{}'",
                    inst.name, module.name
                ),
            );
        }
    }

    let mut net_names: HashSet<&str> = HashSet::new();
    for net in module.nets.values() {
        if net.name.contains(['<', '>', ';']) {
            push(
                DiagCode::AtomNameCollision,
                format!(
                    "net '{}' in module '{}' still carries pattern delimiters",
                    net.name, module.name
                ),
            );
        }
        if !net_names.insert(&net.name) {
            push(
                DiagCode::AtomNameCollision,
                format!(
                    "net name '{}' is not unique in module '{}'",
                    net.name, module.name
                ),
            );
        }
    }

    let mut seen_pins: HashSet<(crate::ids::InstId, &str)> = HashSet::new();
    for endpoint in module.endpoints.values() {
        if !module.instances.contains_key(&endpoint.inst) {
            push(
                DiagCode::UnresolvedReference,
                format!(
                    "endpoint in module '{}' references a missing instance atom",
                    module.name
                ),
            );
        }
        if !seen_pins.insert((endpoint.inst, endpoint.port.as_str())) {
            push(
                DiagCode::DuplicateEndpointBinding,
                format!(
                    "pin '{}' is bound more than once in module '{}'",
                    endpoint.port, module.name
                ),
            );
        }
    }
}

/// Reference closure and pin validity: every instance resolves, connected
/// ports close over the referenced definition's port set.
fn verify_references(
    graph: &ProgramGraph,
    atomized: &AtomizedProgram,
    module: &AtomizedModule,
    opts: &VerifyOptions,
    sink: &mut DiagnosticSink,
) {
    // Connected port sets per instance, in endpoint order.
    let mut connected: HashMap<crate::ids::InstId, Vec<&str>> = HashMap::new();
    for endpoint in module.endpoints.values() {
        connected
            .entry(endpoint.inst)
            .or_default()
            .push(&endpoint.port);
    }

    for inst in module.instances.values() {
        // Unresolved references were diagnosed at lowering.
        let Some(sym) = inst.sym else { continue };

        let empty: Vec<&str> = Vec::new();
        let pins = connected.get(&inst.id).unwrap_or(&empty);
        match sym {
            SymbolRef::Module(target) => {
                let target = &atomized.modules[&target];
                for pin in pins {
                    if !target.ports.iter().any(|p| p == pin) {
                        sink.push(
                            Diagnostic::new(
                                DiagCode::UnknownPort,
                                format!(
                                    "instance '{}' connects port '{pin}', which module \
                                     '{}' does not declare",
                                    inst.name, target.name
                                ),
                            )
                            .with_file(module.file.clone()),
                        );
                    }
                }
                for port in &target.ports {
                    if !pins.iter().any(|p| p == port) {
                        sink.push(
                            Diagnostic::new(
                                DiagCode::MissingPort,
                                format!(
                                    "instance '{}' leaves port '{port}' of module '{}' \
                                     unconnected",
                                    inst.name, target.name
                                ),
                            )
                            .with_file(module.file.clone()),
                        );
                    }
                }
            }
            SymbolRef::Device(target) => {
                let device = graph.device(target);
                for pin in pins {
                    if !device.ports.iter().any(|p| p == pin) {
                        sink.push(
                            Diagnostic::new(
                                DiagCode::UnknownPort,
                                format!(
                                    "instance '{}' connects port '{pin}', which device \
                                     '{}' does not declare",
                                    inst.name, device.name
                                ),
                            )
                            .with_file(module.file.clone()),
                        );
                    }
                }
                if opts.warn_missing_device_ports {
                    for port in &device.ports {
                        if !pins.iter().any(|p| p == port) {
                            let mut diag = Diagnostic::new(
                                DiagCode::MissingPort,
                                format!(
                                    "instance '{}' leaves port '{port}' of device '{}' \
                                     unconnected",
                                    inst.name, device.name
                                ),
                            );
                            diag.severity = Severity::Warning;
                            sink.push(diag.with_file(module.file.clone()));
                        }
                    }
                }
            }
        }
    }
}

/// Select the module to emit: the declared `top` of the entry document, or
/// the single module of the program when no `top` is declared.
pub fn resolve_top(
    db: &ProgramDatabase,
    graph: &ProgramGraph,
    sink: &mut DiagnosticSink,
) -> Option<ModuleId> {
    let entry = db.entry.clone()?;
    let declared = db.entry_doc().and_then(|doc| doc.top.clone());

    match declared {
        Some(name) => match graph.symbols.lookup(&entry, &name) {
            Some(SymbolRef::Module(id)) => Some(id),
            Some(SymbolRef::Device(_)) => {
                sink.push(
                    Diagnostic::new(
                        DiagCode::TopNotFound,
                        format!("top '{name}' names a device, not a module"),
                    )
                    .with_file(entry),
                );
                None
            }
            None => {
                sink.push(
                    Diagnostic::new(
                        DiagCode::TopNotFound,
                        format!("top module '{name}' is not defined in the entry file"),
                    )
                    .with_file(entry),
                );
                None
            }
        },
        None => {
            let mut modules = graph.modules.keys();
            match (modules.next(), modules.next()) {
                (Some(only), None) => Some(*only),
                (None, _) => {
                    sink.push(
                        Diagnostic::new(
                            DiagCode::TopNotFound,
                            "no top declared and the program has no modules".to_string(),
                        )
                        .with_file(entry),
                    );
                    None
                }
                (Some(_), Some(_)) => {
                    sink.push(
                        Diagnostic::new(
                            DiagCode::AmbiguousTop,
                            "no top declared and more than one module exists".to_string(),
                        )
                        .with_file(entry),
                    );
                    None
                }
            }
        }
    }
}
