//! Netlist emission from the atomized program.
//!
//! Subcircuits are emitted children before parents with the top last;
//! devices appear inline through backend templates. Everything iterates in
//! authored order, so identical inputs produce byte-identical output.

pub mod backend;
pub mod schematic;

pub use backend::{BackendConfig, BackendFlags, BackendRegistry, DEFAULT_BACKEND};
pub use schematic::{dump_schematic, SchematicDump};

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

use indexmap::IndexMap;

use asdl_core::atomize::{AtomInstance, AtomizedModule, AtomizedProgram};
use asdl_core::graph::{DeviceBackendInfo, DeviceInfo, ProgramGraph, SymbolRef};
use asdl_core::vars::canonical_value;
use asdl_core::{DiagCode, Diagnostic, DiagnosticSink, InstId, ModuleId};

/// Caller-side emission knobs.
#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// Override the backend's `top_as_subckt` flag. `None` keeps the flag.
    pub top_as_subckt: Option<bool>,
}

/// Emit the netlist for `top` against the named backend.
///
/// Returns `None` when emission itself produced error diagnostics; the
/// caller is expected to have gated on upstream errors already.
pub fn emit_netlist(
    graph: &ProgramGraph,
    atomized: &AtomizedProgram,
    top: ModuleId,
    backend_name: &str,
    registry: &BackendRegistry,
    opts: &EmitOptions,
    sink: &mut DiagnosticSink,
) -> Option<String> {
    let Some(config) = registry.get(backend_name) else {
        sink.push(Diagnostic::new(
            DiagCode::UnknownModel,
            format!("backend '{backend_name}' is not configured"),
        ));
        return None;
    };

    let errors_before = sink.error_count();
    let order = emission_order(atomized, top, sink)?;
    let names = subckt_names(&order, atomized);
    let top_as_subckt = opts.top_as_subckt.unwrap_or(config.flags.top_as_subckt);
    let top_name = names[&top].clone();

    log::debug!(
        "emitting {} subcircuit(s) for backend '{backend_name}'",
        order.len()
    );

    let mut blocks = Vec::with_capacity(order.len());
    for id in &order {
        let module = atomized.module(*id);
        let block = emit_module(
            graph,
            atomized,
            module,
            &names,
            &top_name,
            backend_name,
            config,
            *id == top && !top_as_subckt,
            sink,
        );
        blocks.push(block);
    }

    if sink.error_count() > errors_before {
        return None;
    }
    Some(blocks.join("\n"))
}

/// Dependency post-order from the top: children before parents, top last.
fn emission_order(
    atomized: &AtomizedProgram,
    top: ModuleId,
    sink: &mut DiagnosticSink,
) -> Option<Vec<ModuleId>> {
    fn visit(
        id: ModuleId,
        atomized: &AtomizedProgram,
        visited: &mut HashSet<ModuleId>,
        on_stack: &mut Vec<ModuleId>,
        order: &mut Vec<ModuleId>,
        sink: &mut DiagnosticSink,
    ) -> bool {
        on_stack.push(id);
        for inst in atomized.module(id).instances.values() {
            if let Some(SymbolRef::Module(child)) = inst.sym {
                if on_stack.contains(&child) {
                    let module = atomized.module(id);
                    sink.push(
                        Diagnostic::new(
                            DiagCode::RecursiveInstantiation,
                            format!(
                                "module '{}' instantiates itself through '{}'",
                                atomized.module(child).name,
                                module.name
                            ),
                        )
                        .with_file(module.file.clone()),
                    );
                    on_stack.pop();
                    return false;
                }
                if visited.insert(child)
                    && !visit(child, atomized, visited, on_stack, order, sink)
                {
                    on_stack.pop();
                    return false;
                }
            }
        }
        on_stack.pop();
        order.push(id);
        true
    }

    let mut visited = HashSet::from([top]);
    let mut order = Vec::new();
    let mut on_stack = Vec::new();
    visit(top, atomized, &mut visited, &mut on_stack, &mut order, sink).then_some(order)
}

/// Assign emitted subckt names, disambiguating cross-file collisions by
/// appending the sanitized file stem (then a counter) of the defining file.
fn subckt_names(order: &[ModuleId], atomized: &AtomizedProgram) -> HashMap<ModuleId, String> {
    let mut taken: HashSet<String> = HashSet::new();
    let mut names = HashMap::with_capacity(order.len());
    for id in order {
        let module = atomized.module(*id);
        let mut name = module.name.clone();
        if taken.contains(&name) {
            let stem: String = module
                .file
                .stem()
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            name = format!("{}_{stem}", module.name);
            let mut counter = 2;
            while taken.contains(&name) {
                name = format!("{}_{stem}{counter}", module.name);
                counter += 1;
            }
        }
        taken.insert(name.clone());
        names.insert(*id, name);
    }
    names
}

#[allow(clippy::too_many_arguments)]
fn emit_module(
    graph: &ProgramGraph,
    atomized: &AtomizedProgram,
    module: &AtomizedModule,
    names: &HashMap<ModuleId, String>,
    top_name: &str,
    backend_name: &str,
    config: &BackendConfig,
    comment_wrapper: bool,
    sink: &mut DiagnosticSink,
) -> String {
    let mut out = String::new();
    let wrapper_prefix = if comment_wrapper {
        format!("{} ", config.comment)
    } else {
        String::new()
    };

    write!(out, "{wrapper_prefix}.subckt {}", names[&module.id]).unwrap();
    for port in &module.ports {
        write!(out, " {port}").unwrap();
    }
    out.push('\n');

    // Pin -> net name, per instance, in endpoint order.
    let mut pin_nets: HashMap<InstId, IndexMap<String, String>> = HashMap::new();
    for endpoint in module.endpoints.values() {
        let net = &module.nets[&endpoint.net];
        pin_nets
            .entry(endpoint.inst)
            .or_default()
            .insert(endpoint.port.clone(), net.name.clone());
    }

    let empty = IndexMap::new();
    for inst in module.instances.values() {
        let pins = pin_nets.get(&inst.id).unwrap_or(&empty);
        let line = match inst.sym {
            Some(SymbolRef::Device(device)) => emit_device_instance(
                graph.device(device),
                inst,
                pins,
                &module.name,
                backend_name,
                config,
                top_name,
                sink,
            ),
            Some(SymbolRef::Module(child)) => emit_module_instance(
                atomized.module(child),
                inst,
                pins,
                &module.name,
                names,
                config,
                top_name,
                sink,
            ),
            // Unresolved instances never reach a clean emission run.
            None => None,
        };
        if let Some(line) = line {
            out.push_str(&line);
            out.push('\n');
        }
    }

    writeln!(out, "{wrapper_prefix}.ends").unwrap();
    out
}

#[allow(clippy::too_many_arguments)]
fn emit_device_instance(
    device: &DeviceInfo,
    inst: &AtomInstance,
    pins: &IndexMap<String, String>,
    in_module: &str,
    backend_name: &str,
    config: &BackendConfig,
    top_name: &str,
    sink: &mut DiagnosticSink,
) -> Option<String> {
    let backend_entry = device.backends.get(backend_name);
    let template = backend_entry
        .map(|entry| entry.template.as_str())
        .or_else(|| config.device_template(&device.name));
    let Some(template) = template else {
        sink.push(Diagnostic::new(
            DiagCode::UnknownModel,
            format!(
                "device '{}' has no template for backend '{backend_name}'",
                device.name
            ),
        ));
        return None;
    };

    let ports = joined_ports(&device.ports, pins, &inst.name, in_module, sink)?;
    let template_keys = placeholder_keys(template);
    let merged = merge_device_params(device, backend_entry, inst, &template_keys, sink);

    let resolve = |key: &str| -> Option<String> {
        match key {
            "name" => Some(inst.name.clone()),
            "ports" => Some(ports.clone()),
            "sym_name" => Some(device.name.clone()),
            "file_id" => Some(device.file.to_string()),
            "top_sym_name" => Some(top_name.to_string()),
            _ => merged
                .get(key)
                .cloned()
                .or_else(|| device.variables.get(key).map(canonical_value)),
        }
    };
    let mut line = render_template(template, &inst.name, &resolve, sink)?;

    // Merged parameters the template did not consume follow as key=value
    // tokens, in merge order.
    for (key, value) in &merged {
        if !template_keys.contains(key) {
            write!(line, " {key}={value}").unwrap();
        }
    }
    Some(tidy_line(&line))
}

#[allow(clippy::too_many_arguments)]
fn emit_module_instance(
    child: &AtomizedModule,
    inst: &AtomInstance,
    pins: &IndexMap<String, String>,
    in_module: &str,
    names: &HashMap<ModuleId, String>,
    config: &BackendConfig,
    top_name: &str,
    sink: &mut DiagnosticSink,
) -> Option<String> {
    // Module instantiations carry no parameters.
    for (key, _) in &inst.params {
        sink.push(Diagnostic::new(
            DiagCode::UnknownParam,
            format!(
                "parameter '{key}' on module instance '{}' is not supported and was \
                 dropped",
                inst.name
            ),
        ));
    }

    let ports = joined_ports(&child.ports, pins, &inst.name, in_module, sink)?;
    let resolve = |key: &str| -> Option<String> {
        match key {
            "name" => Some(inst.name.clone()),
            "ports" => Some(ports.clone()),
            "sym_name" => Some(names[&child.id].clone()),
            "file_id" => Some(child.file.to_string()),
            "top_sym_name" => Some(top_name.to_string()),
            _ => None,
        }
    };
    render_template(config.subckt_template(), &inst.name, &resolve, sink)
        .map(|line| tidy_line(&line))
}

/// Collapse the space runs an empty `{ports}` substitution leaves behind.
fn tidy_line(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Connected nets in the referenced definition's port order.
fn joined_ports(
    ports: &[String],
    pins: &IndexMap<String, String>,
    inst_name: &str,
    in_module: &str,
    sink: &mut DiagnosticSink,
) -> Option<String> {
    let mut nets = Vec::with_capacity(ports.len());
    for port in ports {
        match pins.get(port) {
            Some(net) => nets.push(net.as_str()),
            None => {
                sink.push(Diagnostic::new(
                    DiagCode::UnconnectedPort,
                    format!(
                        "port '{port}' of instance '{inst_name}' in module '{in_module}' \
                         is unconnected"
                    ),
                ));
                return None;
            }
        }
    }
    Some(nets.join(" "))
}

/// Merge parameters: device defaults, then backend overrides, then instance
/// values. Overrides keep their original position; new keys append. An
/// instance key unknown to every lower layer and to the template is warned
/// and dropped.
fn merge_device_params(
    device: &DeviceInfo,
    backend_entry: Option<&DeviceBackendInfo>,
    inst: &AtomInstance,
    template_keys: &HashSet<String>,
    sink: &mut DiagnosticSink,
) -> IndexMap<String, String> {
    let mut merged = device.params.clone();
    if let Some(entry) = backend_entry {
        for (key, value) in &entry.params {
            merged.insert(key.clone(), value.clone());
        }
    }
    for (key, value) in &inst.params {
        if merged.contains_key(key) || template_keys.contains(key) {
            merged.insert(key.clone(), value.clone());
        } else {
            sink.push(Diagnostic::new(
                DiagCode::UnknownParam,
                format!(
                    "unknown parameter '{key}' on instance '{}' of device '{}' was \
                     dropped",
                    inst.name, device.name
                ),
            ));
        }
    }
    merged
}

/// The `{...}` placeholder names of a template.
fn placeholder_keys(template: &str) -> HashSet<String> {
    let mut keys = HashSet::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else { break };
        keys.insert(rest[open + 1..open + close].to_string());
        rest = &rest[open + close + 1..];
    }
    keys
}

/// Substitute every `{key}` in `template`. An unresolvable key is an
/// `UnresolvedPlaceholder` error and yields no line.
fn render_template(
    template: &str,
    inst_name: &str,
    resolve: &dyn Fn(&str) -> Option<String>,
    sink: &mut DiagnosticSink,
) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find('}') else {
            out.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let key = &rest[open + 1..open + close];
        match resolve(key) {
            Some(value) => out.push_str(&value),
            None => {
                sink.push(Diagnostic::new(
                    DiagCode::UnresolvedPlaceholder,
                    format!("template placeholder '{{{key}}}' for instance '{inst_name}' cannot be resolved"),
                ));
                return None;
            }
        }
        rest = &rest[open + close + 1..];
    }
    out.push_str(rest);
    Some(out)
}
