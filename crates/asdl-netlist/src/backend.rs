//! Backend configuration: a registry of named targets, each carrying device
//! templates and formatting flags.
//!
//! The registry file is YAML-shaped; a built-in registry covers the default
//! `sim.ngspice` backend so the compiler works without one. A loaded file
//! merges over the built-ins, overriding backends by name.

use indexmap::IndexMap;
use serde::Deserialize;

/// The backend selected when the caller names none.
pub const DEFAULT_BACKEND: &str = "sim.ngspice";

/// Template key used for generic module (subcircuit) instantiation.
pub const SUBCKT_TEMPLATE_KEY: &str = "subckt";

const DEFAULT_SUBCKT_TEMPLATE: &str = "X{name} {ports} {sym_name}";

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Output file extension, dot included.
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Comment prefix at column one.
    #[serde(default = "default_comment")]
    pub comment: String,
    /// Device kind -> instance line template.
    #[serde(default)]
    pub device_templates: IndexMap<String, String>,
    #[serde(default)]
    pub flags: BackendFlags,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendFlags {
    #[serde(default = "default_true")]
    pub top_as_subckt: bool,
}

impl Default for BackendFlags {
    fn default() -> Self {
        BackendFlags {
            top_as_subckt: true,
        }
    }
}

impl BackendConfig {
    /// The template for a device, by its name, falling back to nothing: the
    /// device's own backend entry wins before this is consulted.
    pub fn device_template(&self, device_kind: &str) -> Option<&str> {
        self.device_templates.get(device_kind).map(String::as_str)
    }

    /// The module instantiation template.
    pub fn subckt_template(&self) -> &str {
        self.device_templates
            .get(SUBCKT_TEMPLATE_KEY)
            .map(String::as_str)
            .unwrap_or(DEFAULT_SUBCKT_TEMPLATE)
    }
}

fn default_extension() -> String {
    ".cir".to_string()
}

fn default_comment() -> String {
    "*".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct BackendFile {
    backends: IndexMap<String, BackendConfig>,
}

/// Named backends available to the emitter.
#[derive(Debug, Clone)]
pub struct BackendRegistry {
    backends: IndexMap<String, BackendConfig>,
}

impl BackendRegistry {
    /// The built-in registry: SPICE-flavored `sim.ngspice`.
    pub fn builtin() -> Self {
        let mut device_templates = IndexMap::new();
        device_templates.insert("resistor".to_string(), "R{name} {ports} {value}".to_string());
        device_templates.insert(
            "capacitor".to_string(),
            "C{name} {ports} {value}".to_string(),
        );
        device_templates.insert(
            SUBCKT_TEMPLATE_KEY.to_string(),
            DEFAULT_SUBCKT_TEMPLATE.to_string(),
        );

        let mut backends = IndexMap::new();
        backends.insert(
            DEFAULT_BACKEND.to_string(),
            BackendConfig {
                extension: default_extension(),
                comment: default_comment(),
                device_templates,
                flags: BackendFlags::default(),
            },
        );
        BackendRegistry { backends }
    }

    /// Parse a registry file and merge it over the built-ins.
    pub fn from_yaml(text: &str) -> Result<Self, String> {
        let file: BackendFile = serde_yaml::from_str(text).map_err(|e| e.to_string())?;
        let mut registry = Self::builtin();
        for (name, config) in file.backends {
            registry.backends.insert(name, config);
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.get(name)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
