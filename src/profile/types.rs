//! Profile description layer.
//!
//! These types describe a profile as handed over by the editor/persistence
//! side: plain names instead of resolved handles, durations in
//! milliseconds. They carry serde derives so a description can come from
//! TOML or JSON, and they double as the builder API the tests use. The
//! on-disk format itself is not a stability contract of this crate.
//!
//! # Example TOML
//!
//! ```toml
//! [[modes]]
//! name = "default"
//!
//! [[virtual_devices]]
//! id = 0
//! buttons = 8
//!
//! [[bindings]]
//! mode = "default"
//! input = { device = 0, input = { button = 0 } }
//! nodes = [{ type = "remap_button", target = { device = 0, button = 1 } }]
//! ```

use crate::action::MergeOperation;
use crate::condition::LogicalCombinator;
use crate::event::{HatDirection, PhysicalInput};
use crate::macro_player::RepeatMode;
use crate::output::{AxisTarget, ButtonTarget, HatTarget, VirtualDeviceId};
use crate::tree::TempoActivation;
use crate::virtual_button::EntryDirection;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A whole profile as described by the external configuration side.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDef {
    /// Mode active at engine start; defaults to the first declared mode.
    #[serde(default)]
    pub default_mode: Option<String>,
    pub modes: Vec<ModeDef>,
    #[serde(default)]
    pub virtual_devices: Vec<VirtualDeviceDef>,
    #[serde(default)]
    pub macros: Vec<MacroDef>,
    #[serde(default)]
    pub bindings: Vec<BindingDef>,
}

impl ProfileDef {
    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("parse profile TOML")
    }

    /// Parse from a JSON string.
    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        serde_json::from_str(content).context("parse profile JSON")
    }

    /// Load from a file, dispatching on the `.json` extension and falling
    /// back to TOML otherwise.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }
}

/// One mode declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeDef {
    pub name: String,
    /// Single-parent inheritance; bindings missing in this mode fall back
    /// to the parent chain.
    #[serde(default)]
    pub parent: Option<String>,
}

/// Declared shape of one virtual output device. Output targets are
/// bounds-checked against these sizes at compile time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualDeviceDef {
    pub id: VirtualDeviceId,
    #[serde(default)]
    pub axes: u16,
    #[serde(default)]
    pub buttons: u16,
    #[serde(default)]
    pub hats: u16,
}

/// A named macro sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroDef {
    pub name: String,
    /// Cancel any in-flight instance of this macro before starting anew.
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub repeat: RepeatMode,
    pub steps: Vec<MacroStepDef>,
}

/// One macro step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum MacroStepDef {
    Press { target: ButtonTarget },
    Release { target: ButtonTarget },
    Axis { target: AxisTarget, value: f64 },
    Hat { target: HatTarget, direction: HatDirection },
    Pause { ms: u64 },
}

/// Association of one physical input, within a mode, with a node tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingDef {
    pub mode: String,
    pub input: PhysicalInput,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

/// Virtual-button gate attached to a container on an axis or hat input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "on", rename_all = "snake_case")]
pub enum GateDef {
    AxisRange {
        lower: f64,
        upper: f64,
        #[serde(default)]
        entry: EntryDirection,
    },
    HatDirections { directions: Vec<HatDirection> },
}

/// Leaf predicate in a condition node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum ComparatorDef {
    Pressed {
        input: PhysicalInput,
        #[serde(default = "default_true")]
        pressed: bool,
    },
    InputRange {
        input: PhysicalInput,
        lower: f64,
        upper: f64,
    },
    HatDirection {
        input: PhysicalInput,
        directions: Vec<HatDirection>,
    },
    InputState { inputs: Vec<PhysicalInput> },
}

fn default_true() -> bool {
    true
}

/// Axis remap conversion as described.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisModeDef {
    #[default]
    Absolute,
    Relative { scaling: f64 },
}

/// One node of a binding's tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeDef {
    Condition {
        #[serde(default)]
        combinator: LogicalCombinator,
        comparators: Vec<ComparatorDef>,
        #[serde(default)]
        if_true: Vec<NodeDef>,
        #[serde(default)]
        if_false: Vec<NodeDef>,
    },
    Basic {
        #[serde(default)]
        gate: Option<GateDef>,
        #[serde(default)]
        children: Vec<NodeDef>,
    },
    Chain {
        #[serde(default)]
        gate: Option<GateDef>,
        groups: Vec<Vec<NodeDef>>,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    Tempo {
        #[serde(default)]
        gate: Option<GateDef>,
        threshold_ms: u64,
        #[serde(default)]
        activate_on: TempoActivation,
        #[serde(default)]
        short: Vec<NodeDef>,
        #[serde(default)]
        long: Vec<NodeDef>,
    },
    RemapButton {
        target: ButtonTarget,
    },
    RemapAxis {
        target: AxisTarget,
        #[serde(default)]
        mode: AxisModeDef,
    },
    RemapHat {
        target: HatTarget,
    },
    Macro {
        name: String,
    },
    ModeSwitch {
        mode: String,
    },
    ModePrevious,
    ModeUnwind,
    ModeTemporary {
        mode: String,
    },
    ModeCycle {
        modes: Vec<String>,
    },
    AxisMerge {
        first: PhysicalInput,
        second: PhysicalInput,
        #[serde(default)]
        operation: MergeOperation,
        output: AxisTarget,
    },
    Pause,
    Resume,
    TogglePause,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DeviceId, InputSelector};

    #[test]
    fn toml_roundtrip_of_a_small_profile() {
        let toml_src = r#"
[[modes]]
name = "default"

[[modes]]
name = "combat"
parent = "default"

[[virtual_devices]]
id = 0
buttons = 16
axes = 4

[[macros]]
name = "burst"
exclusive = true
steps = [
    { step = "press", target = { device = 0, button = 2 } },
    { step = "pause", ms = 50 },
    { step = "release", target = { device = 0, button = 2 } },
]

[[bindings]]
mode = "default"
input = { device = 1, input = { button = 0 } }
nodes = [{ type = "remap_button", target = { device = 0, button = 0 } }]
"#;
        let def = ProfileDef::from_toml(toml_src).unwrap();
        assert_eq!(def.modes.len(), 2);
        assert_eq!(def.modes[1].parent.as_deref(), Some("default"));
        assert_eq!(def.macros[0].steps.len(), 3);
        assert_eq!(
            def.bindings[0].input,
            PhysicalInput {
                device: DeviceId(1),
                input: InputSelector::Button(0)
            }
        );
    }

    #[test]
    fn json_parses_node_variants() {
        let json_src = r#"{
            "modes": [{ "name": "default" }],
            "virtual_devices": [{ "id": 0, "axes": 2 }],
            "bindings": [{
                "mode": "default",
                "input": { "device": 0, "input": { "axis": 1 } },
                "nodes": [{
                    "type": "basic",
                    "gate": { "on": "axis_range", "lower": 0.5, "upper": 1.0 },
                    "children": [{ "type": "mode_previous" }]
                }]
            }]
        }"#;
        let def = ProfileDef::from_json(json_src).unwrap();
        assert_eq!(def.bindings.len(), 1);
        assert!(matches!(
            def.bindings[0].nodes[0],
            NodeDef::Basic {
                gate: Some(GateDef::AxisRange { .. }),
                ..
            }
        ));
    }

    #[test]
    fn tempo_defaults_to_release_activation() {
        let json_src = r#"{
            "modes": [{ "name": "default" }],
            "bindings": [{
                "mode": "default",
                "input": { "device": 0, "input": { "button": 0 } },
                "nodes": [{ "type": "tempo", "threshold_ms": 500 }]
            }]
        }"#;
        let def = ProfileDef::from_json(json_src).unwrap();
        match &def.bindings[0].nodes[0] {
            NodeDef::Tempo { activate_on, .. } => {
                assert_eq!(*activate_on, TempoActivation::Release);
            }
            other => panic!("expected tempo, got {other:?}"),
        }
    }
}
