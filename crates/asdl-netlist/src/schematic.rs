//! A serializable, read-only view of the atomized program.
//!
//! Downstream tooling (schematic viewers, analysis scripts) consumes this
//! as JSON; it carries the schematic hints that netlist emission ignores.

use indexmap::IndexMap;
use serde::Serialize;

use asdl_core::atomize::{AtomizedModule, AtomizedProgram};
use asdl_core::graph::{ProgramGraph, SymbolRef};
use asdl_core::ModuleId;

#[derive(Debug, Clone, Serialize)]
pub struct SchematicDump {
    /// Name of the module selected for emission, when one resolved.
    pub top: Option<String>,
    pub modules: Vec<ModuleDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleDump {
    pub name: String,
    pub file: String,
    pub ports: Vec<String>,
    pub instances: Vec<InstanceDump>,
    pub nets: Vec<NetDump>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKindDump {
    Module,
    Device,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstanceDump {
    pub name: String,
    pub kind: RefKindDump,
    /// Name of the referenced module or device.
    pub target: String,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub params: IndexMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NetDump {
    pub name: String,
    pub exported: bool,
    pub endpoints: Vec<EndpointDump>,
    /// Authored group slices over `endpoints`, with the hub group index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<GroupsDump>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointDump {
    pub instance: String,
    pub port: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupsDump {
    pub slices: Vec<(usize, usize)>,
    pub hub: Option<usize>,
}

impl SchematicDump {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Build the dump for every atomized module.
pub fn dump_schematic(
    graph: &ProgramGraph,
    atomized: &AtomizedProgram,
    top: Option<ModuleId>,
) -> SchematicDump {
    let top_name = top.map(|id| atomized.module(id).name.clone());
    let modules = atomized
        .modules
        .values()
        .map(|module| dump_module(graph, atomized, module))
        .collect();
    SchematicDump {
        top: top_name,
        modules,
    }
}

fn dump_module(
    graph: &ProgramGraph,
    atomized: &AtomizedProgram,
    module: &AtomizedModule,
) -> ModuleDump {
    let instances = module
        .instances
        .values()
        .filter_map(|inst| {
            let (kind, target) = match inst.sym? {
                SymbolRef::Module(id) => (RefKindDump::Module, atomized.module(id).name.clone()),
                SymbolRef::Device(id) => (RefKindDump::Device, graph.device(id).name.clone()),
            };
            Some(InstanceDump {
                name: inst.name.clone(),
                kind,
                target,
                params: inst.params.iter().cloned().collect(),
            })
        })
        .collect();

    let nets = module
        .nets
        .values()
        .map(|net| {
            let endpoints = net
                .endpoints
                .iter()
                .map(|id| {
                    let endpoint = &module.endpoints[id];
                    EndpointDump {
                        instance: module.instances[&endpoint.inst].name.clone(),
                        port: endpoint.port.clone(),
                    }
                })
                .collect();
            let groups = module.hints.get(&net.id).map(|hints| GroupsDump {
                slices: hints
                    .slices
                    .iter()
                    .map(|slice| (slice.start, slice.count))
                    .collect(),
                hub: hints.hub,
            });
            NetDump {
                name: net.name.clone(),
                exported: net.exported,
                endpoints,
                groups,
            }
        })
        .collect();

    ModuleDump {
        name: module.name.clone(),
        file: module.file.to_string(),
        ports: module.ports.clone(),
        instances,
        nets,
    }
}
