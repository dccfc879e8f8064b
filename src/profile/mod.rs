//! Profile snapshots: the description layer, the compiler, and the
//! immutable runtime form.
//!
//! A profile reaches the engine as an already-parsed [`ProfileDef`],
//! compiled once by [`compile`] into a [`Profile`]. The compiled snapshot
//! is read-only for its whole lifetime; reload means compiling a new
//! snapshot and swapping it in wholesale.

mod compile;
mod types;

pub use compile::compile;
pub use types::{
    AxisModeDef, BindingDef, ComparatorDef, GateDef, MacroDef, MacroStepDef, ModeDef, NodeDef,
    ProfileDef, VirtualDeviceDef,
};

use crate::event::PhysicalInput;
use crate::macro_player::CompiledMacro;
use crate::mode_stack::ModeId;
use crate::tree::{TempoSpec, TreeNode};
use crate::virtual_button::{VirtualButtonId, VirtualButtonRule};
use std::collections::HashMap;
use std::sync::Arc;

/// One mode after name resolution.
#[derive(Debug)]
pub(crate) struct Mode {
    pub name: String,
    pub parent: Option<ModeId>,
}

/// One compiled binding: the tree evaluated when its input fires while its
/// mode is active (directly or through inheritance).
#[derive(Debug)]
pub(crate) struct Binding {
    pub mode: ModeId,
    pub input: PhysicalInput,
    /// Virtual-button rules used inside this tree; their states are
    /// refreshed from the raw sample before evaluation.
    pub gates: Vec<VirtualButtonId>,
    pub nodes: Vec<TreeNode>,
    /// Compile-time flag: the tree can unpause the engine, so the pause
    /// gate must not silence it.
    pub bypasses_pause: bool,
}

/// Immutable, validated runtime form of a profile.
///
/// All names are resolved to dense ids, mode inheritance is flattened into
/// per-mode lookup tables, and every output target is bounds-checked — at
/// dispatch time there are no name-not-found failures left.
#[derive(Debug)]
pub struct Profile {
    pub(crate) modes: Vec<Mode>,
    pub(crate) default_mode: ModeId,
    pub(crate) bindings: Vec<Binding>,
    /// Per-mode input → binding index, inherited bindings included
    /// (nearest ancestor wins).
    pub(crate) lookup: Vec<HashMap<PhysicalInput, usize>>,
    pub(crate) vb_rules: Vec<VirtualButtonRule>,
    /// Mode lists per cycle action instance.
    pub(crate) cycles: Vec<Vec<ModeId>>,
    pub(crate) macros: Vec<CompiledMacro>,
    pub(crate) tempos: Vec<Arc<TempoSpec>>,
    pub(crate) chain_count: usize,
    pub(crate) relative_count: usize,
}

impl Profile {
    pub fn default_mode(&self) -> ModeId {
        self.default_mode
    }

    pub fn mode_id(&self, name: &str) -> Option<ModeId> {
        self.modes
            .iter()
            .position(|m| m.name == name)
            .map(ModeId)
    }

    pub fn mode_name(&self, mode: ModeId) -> &str {
        &self.modes[mode.0].name
    }

    pub fn mode_names(&self) -> impl Iterator<Item = &str> {
        self.modes.iter().map(|m| m.name.as_str())
    }

    /// Binding for `input` in `mode`, walking the parent chain via the
    /// flattened lookup table. `None` means the input has no effect in
    /// this context.
    pub(crate) fn resolve_binding(&self, mode: ModeId, input: PhysicalInput) -> Option<&Binding> {
        self.lookup[mode.0]
            .get(&input)
            .map(|&index| &self.bindings[index])
    }
}
