//! AST -> PatternedGraph lowering.
//!
//! Per file: symbol collection (modules and devices share a namespace).
//! Per module: instances first, then the named-axis table, then nets with
//! their endpoint bindings. Lowering recovers per entity: one broken
//! instance or net skips that entity, not the module; one broken module
//! never aborts its siblings.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::{DeviceDef, Document, ModuleDef};
use crate::diagnostics::{DiagCode, Diagnostic, DiagnosticSink};
use crate::graph::{
    DeviceBackendInfo, DeviceInfo, EndpointAtom, EndpointBundle, HintSlice, InstanceBundle,
    ModuleGraph, NetBundle, NetHints, ProgramGraph, SymbolRef,
};
use crate::ids::{ExprId, IdAllocator, NetId};
use crate::pattern::{
    bind, expand, shape, AxisDef, AxisInsert, AxisKind, AxisTable, BindError, BindingPlan,
    ExpandError, ExprContext, ExprRegistry, GroupBody, PatternError,
};
use crate::resolve::{NameEnvMap, ProgramDatabase};
use crate::span::{FileId, SourceText};
use crate::vars::canonical_value;

static IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));
static PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)=(\S+)$").expect("param regex"));

/// Lower every document in the database into one [`ProgramGraph`].
pub fn lower_program(
    db: &ProgramDatabase,
    envs: &NameEnvMap,
    alloc: &mut IdAllocator,
    max_expansion: usize,
    sink: &mut DiagnosticSink,
) -> ProgramGraph {
    let mut graph = ProgramGraph::default();
    let mut used_aliases: HashMap<FileId, HashSet<String>> = HashMap::new();

    // Pass 1: the symbol table. Module and device names share a namespace
    // within their file.
    let mut pending_modules: Vec<(crate::ids::ModuleId, FileId, String)> = Vec::new();
    for (file, source) in &db.files {
        collect_symbols(
            file,
            &source.doc,
            &source.text,
            &mut graph,
            alloc,
            &mut pending_modules,
            sink,
        );
    }

    // Pass 2: lower each module body.
    for (module_id, file, name) in pending_modules {
        let source = &db.files[&file];
        let def = source
            .doc
            .modules
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, def)| def)
            .expect("symbol collected from this document");
        let module = lower_module(
            module_id,
            &file,
            &name,
            def,
            &source.text,
            &graph,
            envs,
            alloc,
            max_expansion,
            &mut used_aliases,
            sink,
        );
        graph.modules.insert(module_id, module);
    }

    // Unused-import lint, once every type token has been seen.
    for (file, source) in &db.files {
        let Some(env) = envs.env(file) else { continue };
        let used = used_aliases.get(file);
        for alias in env.keys() {
            if used.map_or(true, |set| !set.contains(alias)) {
                sink.push(
                    Diagnostic::new(
                        DiagCode::UnusedImport,
                        format!("import alias '{alias}' is never used"),
                    )
                    .with_file(file.clone())
                    .with_span(source.text.locate(alias)),
                );
            }
        }
    }

    graph
}

fn collect_symbols(
    file: &FileId,
    doc: &Document,
    text: &SourceText,
    graph: &mut ProgramGraph,
    alloc: &mut IdAllocator,
    pending_modules: &mut Vec<(crate::ids::ModuleId, FileId, String)>,
    sink: &mut DiagnosticSink,
) {
    for (name, _) in doc.modules.iter() {
        let id = alloc.modules.next();
        if graph
            .symbols
            .insert(file.clone(), name, SymbolRef::Module(id))
            .is_some()
        {
            push_duplicate_symbol(sink, file, text, name, "module");
            continue;
        }
        pending_modules.push((id, file.clone(), name.to_string()));
    }

    for (name, def) in doc.devices.iter() {
        let id = alloc.devices.next();
        if graph
            .symbols
            .insert(file.clone(), name, SymbolRef::Device(id))
            .is_some()
        {
            push_duplicate_symbol(sink, file, text, name, "device");
            continue;
        }
        graph
            .devices
            .insert(id, lower_device(id, file, name, def, text, sink));
    }
}

fn push_duplicate_symbol(
    sink: &mut DiagnosticSink,
    file: &FileId,
    text: &SourceText,
    name: &str,
    kind: &str,
) {
    sink.push(
        Diagnostic::new(
            DiagCode::DuplicateName,
            format!("{kind} '{name}' is already defined in this file"),
        )
        .with_file(file.clone())
        .with_span(text.locate(name)),
    );
}

fn lower_device(
    id: crate::ids::DeviceId,
    file: &FileId,
    name: &str,
    def: &DeviceDef,
    text: &SourceText,
    sink: &mut DiagnosticSink,
) -> DeviceInfo {
    let mut ports = Vec::with_capacity(def.ports.len());
    for port in &def.ports {
        if !IDENT_RE.is_match(port) {
            sink.push(
                Diagnostic::new(
                    DiagCode::InvalidPatternSyntax,
                    format!("device port '{port}' is not a plain identifier"),
                )
                .with_file(file.clone())
                .with_span(text.locate(name)),
            );
            continue;
        }
        if ports.contains(port) {
            sink.push(
                Diagnostic::new(
                    DiagCode::DuplicateName,
                    format!("device '{name}' declares port '{port}' twice"),
                )
                .with_file(file.clone())
                .with_span(text.locate(port)),
            );
            continue;
        }
        ports.push(port.clone());
    }

    let params: IndexMap<String, String> = def
        .params
        .iter()
        .map(|(k, v)| (k.clone(), canonical_value(v)))
        .collect();
    let backends: IndexMap<String, DeviceBackendInfo> = def
        .backends
        .iter()
        .map(|(backend, entry)| {
            (
                backend.clone(),
                DeviceBackendInfo {
                    template: entry.template.clone(),
                    params: entry
                        .params
                        .iter()
                        .map(|(k, v)| (k.clone(), canonical_value(v)))
                        .collect(),
                },
            )
        })
        .collect();

    DeviceInfo {
        id,
        name: name.to_string(),
        file: file.clone(),
        ports,
        params,
        variables: def.variables.clone(),
        backends,
    }
}

/// Net state between pre-registration and binding.
struct NetPre {
    name_raw: String,
    exported: bool,
    name_expr: ExprId,
    endpoints: Vec<(String, ExprId)>,
    slices: Option<Vec<(usize, usize)>>,
}

#[allow(clippy::too_many_arguments)]
fn lower_module(
    id: crate::ids::ModuleId,
    file: &FileId,
    name: &str,
    def: &ModuleDef,
    text: &SourceText,
    graph: &ProgramGraph,
    envs: &NameEnvMap,
    alloc: &mut IdAllocator,
    max_expansion: usize,
    used_aliases: &mut HashMap<FileId, HashSet<String>>,
    sink: &mut DiagnosticSink,
) -> ModuleGraph {
    let mut exprs = ExprRegistry::new();
    let mut instances = IndexMap::new();
    let mut seen_instances: HashSet<String> = HashSet::new();

    // -- Instances -------------------------------------------------------
    for (inst_name, inst_expr) in def.instances.iter() {
        if !seen_instances.insert(inst_name.to_string()) {
            sink.push(
                Diagnostic::new(
                    DiagCode::DuplicateName,
                    format!("instance '{inst_name}' is already defined in module '{name}'"),
                )
                .with_file(file.clone())
                .with_span(text.locate(inst_name)),
            );
            continue;
        }

        let name_expr = match exprs.register(inst_name, ExprContext::Name) {
            Ok(id) => id,
            Err(err) => {
                push_pattern_error(sink, file, text, inst_name, &err);
                continue;
            }
        };

        let Some((ref_raw, params_raw)) =
            parse_instance_expr(inst_name, inst_expr, file, text, sink)
        else {
            continue;
        };

        let sym = resolve_type_token(&ref_raw, file, graph, envs, used_aliases, text, sink);

        let mut params = Vec::with_capacity(params_raw.len());
        for (key, value) in params_raw {
            match exprs.register(&value, ExprContext::Param) {
                Ok(expr) => params.push((key, expr)),
                Err(err) => push_pattern_error(sink, file, text, &value, &err),
            }
        }

        let inst_id = alloc.instances.next();
        instances.insert(
            inst_id,
            InstanceBundle {
                id: inst_id,
                name_expr,
                name_raw: inst_name.to_string(),
                sym,
                ref_raw,
                params,
            },
        );
    }

    // -- Pre-register net and endpoint expressions -----------------------
    let mut pre_nets: Vec<NetPre> = Vec::new();
    let mut seen_nets: HashSet<String> = HashSet::new();
    for (net_token, value) in def.nets.iter() {
        let (name_raw, exported) = match net_token.strip_prefix('$') {
            Some(stripped) => (stripped.to_string(), true),
            None => (net_token.to_string(), false),
        };
        if !seen_nets.insert(name_raw.clone()) {
            sink.push(
                Diagnostic::new(
                    DiagCode::DuplicateName,
                    format!("net '{name_raw}' is already defined in module '{name}'"),
                )
                .with_file(file.clone())
                .with_span(text.locate(net_token)),
            );
            continue;
        }
        let name_expr = match exprs.register(&name_raw, ExprContext::Name) {
            Ok(id) => id,
            Err(err) => {
                push_pattern_error(sink, file, text, net_token, &err);
                continue;
            }
        };
        let (tokens, slices) = value.flatten();
        let mut endpoints = Vec::with_capacity(tokens.len());
        for token in tokens {
            match exprs.register(token, ExprContext::Endpoint) {
                Ok(expr) => endpoints.push((token.to_string(), expr)),
                Err(err) => {
                    sink.push(
                        Diagnostic::new(
                            DiagCode::InvalidEndpointExpression,
                            format!("invalid endpoint '{token}': {err}"),
                        )
                        .with_file(file.clone())
                        .with_span(text.locate(token)),
                    );
                }
            }
        }
        pre_nets.push(NetPre {
            name_raw,
            exported,
            name_expr,
            endpoints,
            slices,
        });
    }

    // -- Named axis table ------------------------------------------------
    let axes = collect_axis_table(&exprs, file, text, sink);

    // -- Instance atom table for wildcard endpoints ----------------------
    let mut instance_atoms: Vec<String> = Vec::new();
    for bundle in instances.values() {
        let expr = &exprs.get(bundle.name_expr).expr;
        match expand(expr, &axes, max_expansion) {
            Ok(atoms) => {
                for atom in &atoms {
                    if !IDENT_RE.is_match(atom) {
                        sink.push(
                            Diagnostic::new(
                                DiagCode::InvalidPatternSyntax,
                                format!(
                                    "instance '{}' expands to '{atom}', which is not a \
                                     valid identifier",
                                    bundle.name_raw
                                ),
                            )
                            .with_file(file.clone())
                            .with_span(text.locate(&bundle.name_raw)),
                        );
                    }
                }
                instance_atoms.extend(atoms);
            }
            Err(err) => {
                push_expand_error(sink, file, text, &bundle.name_raw, &err);
            }
        }
    }

    // -- Nets and endpoint binding ---------------------------------------
    let mut nets = IndexMap::new();
    let mut endpoints = IndexMap::new();
    let mut port_order = Vec::new();
    let mut hints: IndexMap<NetId, NetHints> = IndexMap::new();

    for pre in pre_nets {
        let net_expr = &exprs.get(pre.name_expr).expr;
        let net_shape = match shape(net_expr, &axes) {
            Ok(shape) => shape,
            Err(err) => {
                push_expand_error(sink, file, text, &pre.name_raw, &err);
                continue;
            }
        };
        match expand(net_expr, &axes, max_expansion) {
            Ok(atoms) => {
                for atom in &atoms {
                    if !IDENT_RE.is_match(atom) {
                        sink.push(
                            Diagnostic::new(
                                DiagCode::InvalidPatternSyntax,
                                format!(
                                    "net '{}' expands to '{atom}', which is not a valid \
                                     identifier",
                                    pre.name_raw
                                ),
                            )
                            .with_file(file.clone())
                            .with_span(text.locate(&pre.name_raw)),
                        );
                    }
                }
            }
            Err(err) => {
                push_expand_error(sink, file, text, &pre.name_raw, &err);
                continue;
            }
        }

        let net_id = alloc.nets.next();
        if pre.exported {
            port_order.push(pre.name_expr);
        }
        if let Some(slices) = &pre.slices {
            hints.insert(
                net_id,
                NetHints {
                    slices: slices
                        .iter()
                        .map(|&(start, count)| HintSlice {
                            start,
                            count,
                            label: None,
                        })
                        .collect(),
                    hub: Some(0),
                },
            );
        }

        let mut endpoint_ids = Vec::with_capacity(pre.endpoints.len());
        let net_pattern_free = !net_expr.has_groups() && net_shape.is_scalar();
        for (token, port_expr) in &pre.endpoints {
            let bundle = lower_endpoint(
                *port_expr,
                token,
                net_id,
                &net_shape,
                net_pattern_free,
                &pre.name_raw,
                &exprs,
                &axes,
                &instance_atoms,
                max_expansion,
                file,
                text,
                alloc,
                sink,
            );
            if let Some(bundle) = bundle {
                endpoint_ids.push(bundle.id);
                endpoints.insert(bundle.id, bundle);
            }
        }

        nets.insert(
            net_id,
            NetBundle {
                id: net_id,
                name_expr: pre.name_expr,
                name_raw: pre.name_raw,
                exported: pre.exported,
                endpoints: endpoint_ids,
            },
        );
    }

    // -- Variables -------------------------------------------------------
    let variables: IndexMap<String, String> = def
        .variables
        .iter()
        .map(|(k, v)| (k.clone(), canonical_value(v)))
        .collect();
    for var in variables.keys() {
        let shadows = instances
            .values()
            .any(|inst| inst.params.iter().any(|(key, _)| key == var));
        if shadows {
            sink.push(
                Diagnostic::new(
                    DiagCode::VariableShadowsParameter,
                    format!("module variable '{var}' shadows an instance parameter name"),
                )
                .with_file(file.clone())
                .with_span(text.locate(var)),
            );
        }
    }

    ModuleGraph {
        id,
        name: name.to_string(),
        file: file.clone(),
        port_order,
        nets,
        instances,
        endpoints,
        exprs,
        axes,
        variables,
        hints,
    }
}

/// Split an instance expression into the type token and its `key=value`
/// parameters.
fn parse_instance_expr(
    inst_name: &str,
    raw: &str,
    file: &FileId,
    text: &SourceText,
    sink: &mut DiagnosticSink,
) -> Option<(String, Vec<(String, String)>)> {
    let mut invalid = |why: String| {
        sink.push(
            Diagnostic::new(
                DiagCode::InvalidInstanceExpression,
                format!("instance '{inst_name}': {why}"),
            )
            .with_file(file.clone())
            .with_span(text.locate(inst_name)),
        );
    };

    let mut tokens = raw.split_whitespace();
    let Some(type_token) = tokens.next() else {
        invalid("expression is empty".to_string());
        return None;
    };

    let mut params = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for token in tokens {
        let Some(caps) = PARAM_RE.captures(token) else {
            invalid(format!(
                "'{token}' is not a 'key=value' parameter (no spaces around '=')"
            ));
            return None;
        };
        let key = caps[1].to_string();
        if !seen.insert(key.clone()) {
            invalid(format!("parameter '{key}' is given twice"));
            return None;
        }
        params.push((key, caps[2].to_string()));
    }
    Some((type_token.to_string(), params))
}

/// Resolve a type token against the file's name environment and the symbol
/// table.
fn resolve_type_token(
    token: &str,
    file: &FileId,
    graph: &ProgramGraph,
    envs: &NameEnvMap,
    used_aliases: &mut HashMap<FileId, HashSet<String>>,
    text: &SourceText,
    sink: &mut DiagnosticSink,
) -> Option<SymbolRef> {
    if let Some((alias, sym_name)) = token.split_once('.') {
        let Some(target) = envs.env(file).and_then(|env| env.get(alias)) else {
            sink.push(
                Diagnostic::new(
                    DiagCode::UnknownImportAlias,
                    format!("unknown import alias '{alias}' in type '{token}'"),
                )
                .with_file(file.clone())
                .with_span(text.locate(token)),
            );
            return None;
        };
        used_aliases
            .entry(file.clone())
            .or_default()
            .insert(alias.to_string());
        let sym = graph.symbols.lookup(target, sym_name);
        if sym.is_none() {
            sink.push(
                Diagnostic::new(
                    DiagCode::UnresolvedReference,
                    format!("'{sym_name}' is not defined in '{target}'"),
                )
                .with_file(file.clone())
                .with_span(text.locate(token)),
            );
        }
        sym
    } else {
        let sym = graph.symbols.lookup(file, token);
        if sym.is_none() {
            sink.push(
                Diagnostic::new(
                    DiagCode::UnresolvedReference,
                    format!("'{token}' does not name a module or device in this file"),
                )
                .with_file(file.clone())
                .with_span(text.locate(token)),
            );
        }
        sym
    }
}

/// Gather every tagged group of the module into the axis table.
fn collect_axis_table(
    exprs: &ExprRegistry,
    file: &FileId,
    text: &SourceText,
    sink: &mut DiagnosticSink,
) -> AxisTable {
    let mut table = AxisTable::new();
    for registered in exprs.iter() {
        for group in registered.expr.groups() {
            let Some(tag) = &group.tag else { continue };
            let (labels, kind) = match &group.body {
                GroupBody::Enumeration(labels) => (labels.clone(), AxisKind::Enumeration),
                GroupBody::Range { msb, lsb } => {
                    (crate::pattern::range_labels(*msb, *lsb), AxisKind::Range)
                }
                // A tagged named-reference aliases an axis; it defines none.
                GroupBody::NamedRef(_) => continue,
            };
            let def = AxisDef {
                id: tag.clone(),
                kind,
                labels,
                raw: registered.raw().to_string(),
            };
            if let AxisInsert::Conflict(existing) = table.insert(def) {
                sink.push(
                    Diagnostic::new(
                        DiagCode::AxisSizeMismatch,
                        format!(
                            "axis '{tag}' is defined with different labels in \
                             '{}' and '{}'",
                            existing.raw,
                            registered.raw()
                        ),
                    )
                    .with_file(file.clone())
                    .with_span(text.locate(registered.raw())),
                );
            }
        }
    }
    table
}

#[allow(clippy::too_many_arguments)]
fn lower_endpoint(
    port_expr: ExprId,
    token: &str,
    net_id: NetId,
    net_shape: &crate::pattern::ExprShape,
    net_pattern_free: bool,
    net_name: &str,
    exprs: &ExprRegistry,
    axes: &AxisTable,
    instance_atoms: &[String],
    max_expansion: usize,
    file: &FileId,
    text: &SourceText,
    alloc: &mut IdAllocator,
    sink: &mut DiagnosticSink,
) -> Option<EndpointBundle> {
    let expr = &exprs.get(port_expr).expr;

    if expr.has_wildcard() {
        return lower_wildcard_endpoint(
            port_expr,
            token,
            net_id,
            net_pattern_free,
            net_name,
            expr,
            instance_atoms,
            file,
            text,
            alloc,
            sink,
        );
    }

    let ep_shape = match shape(expr, axes) {
        Ok(shape) => shape,
        Err(err) => {
            push_expand_error(sink, file, text, token, &err);
            return None;
        }
    };
    let raw_atoms = match expand(expr, axes, max_expansion) {
        Ok(atoms) => atoms,
        Err(err) => {
            push_expand_error(sink, file, text, token, &err);
            return None;
        }
    };

    let mut atoms = Vec::with_capacity(raw_atoms.len());
    for atom in &raw_atoms {
        let Some((inst, pin)) = split_endpoint_atom(atom) else {
            sink.push(
                Diagnostic::new(
                    DiagCode::EndpointMissingDot,
                    format!(
                        "endpoint '{token}' expands to '{atom}', which must contain \
                         exactly one '.'"
                    ),
                )
                .with_file(file.clone())
                .with_span(text.locate(token)),
            );
            return None;
        };
        if !IDENT_RE.is_match(inst) || !IDENT_RE.is_match(pin) {
            sink.push(
                Diagnostic::new(
                    DiagCode::InvalidEndpointExpression,
                    format!("endpoint '{token}' expands to invalid atom '{atom}'"),
                )
                .with_file(file.clone())
                .with_span(text.locate(token)),
            );
            return None;
        }
        atoms.push(EndpointAtom {
            inst: inst.to_string(),
            pin: pin.to_string(),
        });
    }

    let plan = match bind(net_shape, &ep_shape) {
        Ok(plan) => plan,
        Err(err) => {
            let code = match err {
                BindError::AxisSize { .. } => DiagCode::AxisSizeMismatch,
                _ => DiagCode::BindingLengthMismatch,
            };
            sink.push(
                Diagnostic::new(
                    code,
                    format!("cannot bind endpoint '{token}' to net '{net_name}': {err}"),
                )
                .with_file(file.clone())
                .with_span(text.locate(token)),
            );
            return None;
        }
    };

    let id = alloc.endpoints.next();
    Some(EndpointBundle {
        id,
        net: net_id,
        port_expr,
        atoms,
        net_map: plan.net_map.clone(),
        plan,
    })
}

#[allow(clippy::too_many_arguments)]
fn lower_wildcard_endpoint(
    port_expr: ExprId,
    token: &str,
    net_id: NetId,
    net_pattern_free: bool,
    net_name: &str,
    expr: &crate::pattern::PatternExpr,
    instance_atoms: &[String],
    file: &FileId,
    text: &SourceText,
    alloc: &mut IdAllocator,
    sink: &mut DiagnosticSink,
) -> Option<EndpointBundle> {
    fn not_allowed(
        sink: &mut DiagnosticSink,
        file: &FileId,
        text: &SourceText,
        token: &str,
        why: &str,
    ) {
        sink.push(
            Diagnostic::new(
                DiagCode::WildcardNotAllowed,
                format!("wildcard endpoint '{token}': {why}"),
            )
            .with_file(file.clone())
            .with_span(text.locate(token)),
        );
    }

    if !net_pattern_free {
        not_allowed(
            sink,
            file,
            text,
            token,
            &format!("net '{net_name}' carries a pattern"),
        );
        return None;
    }
    if expr.has_groups() || expr.segments.len() != 1 {
        not_allowed(
            sink,
            file,
            text,
            token,
            "wildcard endpoints cannot carry pattern groups or splices",
        );
        return None;
    }

    // A wildcard expression expands to exactly one template atom.
    let template: String = expr
        .segments[0]
        .iter()
        .map(|tok| match tok {
            crate::pattern::Token::Literal(s) => s.as_str(),
            crate::pattern::Token::Wildcard => "*",
            crate::pattern::Token::Group(_) => unreachable!("checked has_groups"),
        })
        .collect();
    let Some((inst_glob, pin)) = split_endpoint_atom(&template) else {
        sink.push(
            Diagnostic::new(
                DiagCode::EndpointMissingDot,
                format!("endpoint '{token}' must contain exactly one '.'"),
            )
            .with_file(file.clone())
            .with_span(text.locate(token)),
        );
        return None;
    };
    if pin.contains('*') {
        not_allowed(
            sink,
            file,
            text,
            token,
            "'*' is only valid in the instance-name position",
        );
        return None;
    }
    if !IDENT_RE.is_match(pin) {
        not_allowed(
            sink,
            file,
            text,
            token,
            &format!("pin '{pin}' is not a valid identifier"),
        );
        return None;
    }

    let atoms: Vec<EndpointAtom> = instance_atoms
        .iter()
        .filter(|name| glob_match(inst_glob, name))
        .map(|name| EndpointAtom {
            inst: name.clone(),
            pin: pin.to_string(),
        })
        .collect();

    let plan = BindingPlan {
        net_len: 1,
        endpoint_len: atoms.len(),
        net_map: vec![0; atoms.len()],
        shared_axes: Vec::new(),
        broadcast_axes: Vec::new(),
    };
    let id = alloc.endpoints.next();
    Some(EndpointBundle {
        id,
        net: net_id,
        port_expr,
        atoms,
        net_map: plan.net_map.clone(),
        plan,
    })
}

/// Split an endpoint atom at its single `.`.
fn split_endpoint_atom(atom: &str) -> Option<(&str, &str)> {
    let mut parts = atom.split('.');
    let inst = parts.next()?;
    let pin = parts.next()?;
    if parts.next().is_some() || inst.is_empty() || pin.is_empty() {
        return None;
    }
    Some((inst, pin))
}

/// Minimal glob: `*` matches any run of characters.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn inner(p: &[u8], n: &[u8]) -> bool {
        match p.first() {
            None => n.is_empty(),
            Some(b'*') => (0..=n.len()).any(|skip| inner(&p[1..], &n[skip..])),
            Some(&c) => n.first() == Some(&c) && inner(&p[1..], &n[1..]),
        }
    }
    inner(pattern.as_bytes(), name.as_bytes())
}

fn push_pattern_error(
    sink: &mut DiagnosticSink,
    file: &FileId,
    text: &SourceText,
    token: &str,
    err: &PatternError,
) {
    sink.push(
        Diagnostic::new(
            DiagCode::InvalidPatternSyntax,
            format!("invalid pattern '{token}': {err}"),
        )
        .with_file(file.clone())
        .with_span(text.locate(token)),
    );
}

fn push_expand_error(
    sink: &mut DiagnosticSink,
    file: &FileId,
    text: &SourceText,
    token: &str,
    err: &ExpandError,
) {
    let code = match err {
        ExpandError::UnknownNamedPattern(_) => DiagCode::UnresolvedReference,
        ExpandError::DuplicateAxisId(_) => DiagCode::DuplicateAxisId,
        ExpandError::TooLarge { .. } => DiagCode::ExpansionTooLarge,
    };
    sink.push(
        Diagnostic::new(code, format!("in '{token}': {err}"))
            .with_file(file.clone())
            .with_span(text.locate(token)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryFileProvider;
    use crate::resolve::{resolve_program, SearchRoots};
    use std::path::Path;

    fn lower(source: &str) -> (ProgramGraph, Vec<Diagnostic>) {
        let mut fp = InMemoryFileProvider::new();
        fp.add_file("/proj/top.asdl", source);
        let mut sink = DiagnosticSink::new();
        let (db, envs) =
            resolve_program(Path::new("/proj/top.asdl"), &SearchRoots::default(), &fp, &mut sink);
        let mut alloc = IdAllocator::default();
        let graph = lower_program(&db, &envs, &mut alloc, 10_000, &mut sink);
        (graph, sink.into_sorted())
    }

    fn first_module(graph: &ProgramGraph) -> &ModuleGraph {
        graph.modules.values().next().expect("one module")
    }

    #[test]
    fn lowers_instances_and_nets() {
        let (graph, diags) = lower(
            r#"
modules:
  inv:
    instances:
      MN: nfet m=1
      MP: pfet m=1
    nets:
      $in:  [MN.g, MP.g]
      $out: [MN.d, MP.d]
devices:
  nfet: { ports: [d, g, s] }
  pfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags.iter().all(|d| !d.is_error()), "{diags:?}");
        let module = first_module(&graph);
        assert_eq!(module.instances.len(), 2);
        assert_eq!(module.nets.len(), 2);
        assert_eq!(module.port_order.len(), 2);
        let mn = module.instances.values().next().unwrap();
        assert_eq!(mn.ref_raw, "nfet");
        assert!(matches!(mn.sym, Some(SymbolRef::Device(_))));
        assert_eq!(mn.params.len(), 1);
    }

    #[test]
    fn qualified_references_use_the_environment() {
        let mut fp = InMemoryFileProvider::new();
        fp.add_file(
            "/proj/top.asdl",
            "imports: { lib: ./lib }\nmodules:\n  m:\n    instances:\n      R1: lib.res\n",
        );
        fp.add_file("/proj/lib.asdl", "devices: { res: { ports: [p, n] } }");
        let mut sink = DiagnosticSink::new();
        let (db, envs) =
            resolve_program(Path::new("/proj/top.asdl"), &SearchRoots::default(), &fp, &mut sink);
        let mut alloc = IdAllocator::default();
        let graph = lower_program(&db, &envs, &mut alloc, 10_000, &mut sink);
        let diags = sink.into_sorted();
        assert!(diags.iter().all(|d| !d.is_error()), "{diags:?}");
        let module = first_module(&graph);
        let inst = module.instances.values().next().unwrap();
        assert!(matches!(inst.sym, Some(SymbolRef::Device(_))));
    }

    #[test]
    fn unknown_alias_and_unresolved_reference() {
        let (_, diags) = lower(
            r#"
modules:
  m:
    instances:
      A: nosuch.res
      B: missing
"#,
        );
        assert!(diags.iter().any(|d| d.code == DiagCode::UnknownImportAlias));
        assert!(diags.iter().any(|d| d.code == DiagCode::UnresolvedReference));
    }

    #[test]
    fn bad_instance_expression() {
        let (_, diags) = lower(
            r#"
modules:
  m:
    instances:
      A: nfet m = 1
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::InvalidInstanceExpression));
    }

    #[test]
    fn endpoint_needs_exactly_one_dot() {
        let (_, diags) = lower(
            r#"
modules:
  m:
    instances: { A: nfet }
    nets:
      n: [A]
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags.iter().any(|d| d.code == DiagCode::EndpointMissingDot));
    }

    #[test]
    fn wildcard_collects_matching_instances() {
        let (graph, diags) = lower(
            r#"
modules:
  m:
    instances:
      M1: nfet
      M2: nfet
      XOTHER: nfet
    nets:
      n: [M*.d]
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags.iter().all(|d| !d.is_error()), "{diags:?}");
        let module = first_module(&graph);
        let bundle = module.endpoints.values().next().unwrap();
        let insts: Vec<_> = bundle.atoms.iter().map(|a| a.inst.as_str()).collect();
        assert_eq!(insts, vec!["M1", "M2"]);
    }

    #[test]
    fn wildcard_with_no_matches_binds_nothing() {
        let (graph, diags) = lower(
            r#"
modules:
  m:
    instances:
      M1: nfet
    nets:
      n: [Q*.d]
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags.iter().all(|d| !d.is_error()), "{diags:?}");
        let module = first_module(&graph);
        let bundle = module.endpoints.values().next().unwrap();
        assert!(bundle.atoms.is_empty());
    }

    #[test]
    fn wildcard_rejected_on_patterned_net() {
        let (_, diags) = lower(
            r#"
modules:
  m:
    instances:
      M<p|n>: nfet
    nets:
      n<p|n>: [M*.d]
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags.iter().any(|d| d.code == DiagCode::WildcardNotAllowed));
    }

    #[test]
    fn binding_length_mismatch_is_reported() {
        let (_, diags) = lower(
            r#"
modules:
  m:
    instances:
      M<1:4>: nfet
    nets:
      n<1:3>: [M<1:4>.d]
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::BindingLengthMismatch));
    }

    #[test]
    fn axis_conflicts_across_expressions() {
        let (_, diags) = lower(
            r#"
modules:
  m:
    instances:
      A<d=p|n>: nfet
      B<d=x|y|z>: nfet
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags.iter().any(|d| d.code == DiagCode::AxisSizeMismatch));
    }

    #[test]
    fn unused_import_lint() {
        let mut fp = InMemoryFileProvider::new();
        fp.add_file("/proj/top.asdl", "imports: { lib: ./lib }\nmodules: { m: {} }");
        fp.add_file("/proj/lib.asdl", "devices: { res: { ports: [p, n] } }");
        let mut sink = DiagnosticSink::new();
        let (db, envs) =
            resolve_program(Path::new("/proj/top.asdl"), &SearchRoots::default(), &fp, &mut sink);
        let mut alloc = IdAllocator::default();
        lower_program(&db, &envs, &mut alloc, 10_000, &mut sink);
        let diags = sink.into_sorted();
        assert!(diags.iter().any(|d| d.code == DiagCode::UnusedImport));
    }

    #[test]
    fn shadowing_variable_lint() {
        let (_, diags) = lower(
            r#"
modules:
  m:
    variables: { m: 2 }
    instances:
      A: nfet m=1
devices:
  nfet: { ports: [d, g, s] }
"#,
        );
        assert!(diags
            .iter()
            .any(|d| d.code == DiagCode::VariableShadowsParameter));
    }

    #[test]
    fn glob_match_semantics() {
        assert!(glob_match("M*", "M1"));
        assert!(glob_match("M*", "M"));
        assert!(glob_match("*", "anything"));
        assert!(!glob_match("M*", "XM"));
        assert!(glob_match("M*D", "M_a_D"));
    }
}
