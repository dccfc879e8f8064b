//! Profile compiler.
//!
//! Lowers a [`ProfileDef`] into the immutable runtime [`Profile`]:
//! resolves mode and macro names to dense ids, assigns state slots for
//! chains, tempos, virtual buttons and relative axes, flattens mode
//! inheritance into per-mode lookup tables, and validates everything that
//! must never fail at dispatch time. Compilation is all-or-nothing.

use super::types::{
    AxisModeDef, ComparatorDef, GateDef, MacroStepDef, NodeDef, ProfileDef, VirtualDeviceDef,
};
use super::{Binding, Mode, Profile};
use crate::action::{Action, AxisMerge, AxisMode, ModeChange, RelativeSlot, Remap};
use crate::condition::Comparator;
use crate::error::CompileError;
use crate::event::{InputSelector, PhysicalInput};
use crate::macro_player::{CompiledMacro, MacroId, MacroStep};
use crate::mode_stack::{CycleId, ModeId};
use crate::output::{AxisTarget, ButtonTarget, HatTarget};
use crate::tree::{
    ChainId, Container, ConditionNode, TempoActivation, TempoId, TempoSpec, TreeNode,
};
use crate::virtual_button::{VirtualButtonId, VirtualButtonRule};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Kind of activation value flowing into a node position. Starts as the
/// binding's input kind; a virtual-button gate turns it into `Button`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueKind {
    Button,
    Axis,
    Hat,
}

impl From<InputSelector> for ValueKind {
    fn from(selector: InputSelector) -> Self {
        match selector {
            InputSelector::Button(_) => ValueKind::Button,
            InputSelector::Axis(_) => ValueKind::Axis,
            InputSelector::Hat(_) => ValueKind::Hat,
        }
    }
}

/// Compile a profile description into a runtime snapshot.
pub fn compile(def: &ProfileDef) -> Result<Profile, CompileError> {
    Compiler::new(def).run()
}

struct Compiler<'a> {
    def: &'a ProfileDef,
    modes: Vec<Mode>,
    mode_ids: HashMap<&'a str, ModeId>,
    devices: HashMap<u16, &'a VirtualDeviceDef>,
    macro_ids: HashMap<&'a str, MacroId>,
    macros: Vec<CompiledMacro>,
    vb_rules: Vec<VirtualButtonRule>,
    cycles: Vec<Vec<ModeId>>,
    tempos: Vec<Arc<TempoSpec>>,
    chain_count: usize,
    relative_count: usize,
}

impl<'a> Compiler<'a> {
    fn new(def: &'a ProfileDef) -> Self {
        Self {
            def,
            modes: Vec::new(),
            mode_ids: HashMap::new(),
            devices: HashMap::new(),
            macro_ids: HashMap::new(),
            macros: Vec::new(),
            vb_rules: Vec::new(),
            cycles: Vec::new(),
            tempos: Vec::new(),
            chain_count: 0,
            relative_count: 0,
        }
    }

    fn run(mut self) -> Result<Profile, CompileError> {
        self.compile_modes()?;
        self.compile_devices()?;
        self.compile_macros()?;

        let default_mode = match &self.def.default_mode {
            Some(name) => self.resolve_mode(name)?,
            None => ModeId(0),
        };

        let bindings = self.compile_bindings()?;
        let lookup = self.build_lookup(&bindings);

        Ok(Profile {
            modes: self.modes,
            default_mode,
            bindings,
            lookup,
            vb_rules: self.vb_rules,
            cycles: self.cycles,
            macros: self.macros,
            tempos: self.tempos,
            chain_count: self.chain_count,
            relative_count: self.relative_count,
        })
    }

    // ── Modes ────────────────────────────────────────────────────────

    fn compile_modes(&mut self) -> Result<(), CompileError> {
        if self.def.modes.is_empty() {
            return Err(CompileError::NoModes);
        }
        for (index, mode) in self.def.modes.iter().enumerate() {
            if self
                .mode_ids
                .insert(mode.name.as_str(), ModeId(index))
                .is_some()
            {
                return Err(CompileError::DuplicateMode(mode.name.clone()));
            }
        }
        for mode in &self.def.modes {
            let parent = match &mode.parent {
                Some(name) => Some(
                    self.mode_ids
                        .get(name.as_str())
                        .copied()
                        .ok_or_else(|| CompileError::UnknownMode(name.clone()))?,
                ),
                None => None,
            };
            self.modes.push(Mode {
                name: mode.name.clone(),
                parent,
            });
        }
        self.reject_parent_cycles()
    }

    /// The parent relation must form a forest; a profile where any mode is
    /// its own ancestor is rejected whole.
    fn reject_parent_cycles(&self) -> Result<(), CompileError> {
        let mut terminates = vec![false; self.modes.len()];
        for start in 0..self.modes.len() {
            let mut path = Vec::new();
            let mut current = Some(ModeId(start));
            while let Some(mode) = current {
                if terminates[mode.0] {
                    break;
                }
                if path.contains(&mode.0) {
                    return Err(CompileError::ModeCycle(self.modes[mode.0].name.clone()));
                }
                path.push(mode.0);
                current = self.modes[mode.0].parent;
            }
            for visited in path {
                terminates[visited] = true;
            }
        }
        Ok(())
    }

    fn resolve_mode(&self, name: &str) -> Result<ModeId, CompileError> {
        self.mode_ids
            .get(name)
            .copied()
            .ok_or_else(|| CompileError::UnknownMode(name.to_string()))
    }

    // ── Virtual devices ──────────────────────────────────────────────

    fn compile_devices(&mut self) -> Result<(), CompileError> {
        for device in &self.def.virtual_devices {
            if self.devices.insert(device.id.0, device).is_some() {
                return Err(CompileError::DuplicateVirtualDevice(device.id.0));
            }
        }
        Ok(())
    }

    fn check_button(&self, target: ButtonTarget) -> Result<(), CompileError> {
        let device = self
            .devices
            .get(&target.device.0)
            .ok_or(CompileError::UnknownVirtualDevice(target.device.0))?;
        if target.button >= device.buttons {
            return Err(CompileError::OutputOutOfRange {
                device: target.device.0,
                kind: "button",
                index: target.button,
            });
        }
        Ok(())
    }

    fn check_axis(&self, target: AxisTarget) -> Result<(), CompileError> {
        let device = self
            .devices
            .get(&target.device.0)
            .ok_or(CompileError::UnknownVirtualDevice(target.device.0))?;
        if target.axis >= device.axes {
            return Err(CompileError::OutputOutOfRange {
                device: target.device.0,
                kind: "axis",
                index: target.axis,
            });
        }
        Ok(())
    }

    fn check_hat(&self, target: HatTarget) -> Result<(), CompileError> {
        let device = self
            .devices
            .get(&target.device.0)
            .ok_or(CompileError::UnknownVirtualDevice(target.device.0))?;
        if target.hat >= device.hats {
            return Err(CompileError::OutputOutOfRange {
                device: target.device.0,
                kind: "hat",
                index: target.hat,
            });
        }
        Ok(())
    }

    // ── Macros ───────────────────────────────────────────────────────

    fn compile_macros(&mut self) -> Result<(), CompileError> {
        for def in &self.def.macros {
            if self.macro_ids.contains_key(def.name.as_str()) {
                return Err(CompileError::DuplicateMacro(def.name.clone()));
            }
            if def.steps.is_empty() {
                return Err(CompileError::EmptyMacro(def.name.clone()));
            }
            let steps = def
                .steps
                .iter()
                .map(|step| self.compile_step(step))
                .collect::<Result<Vec<_>, _>>()?;
            let id = MacroId(self.macros.len());
            self.macros.push(CompiledMacro {
                name: def.name.clone(),
                steps,
                exclusive: def.exclusive,
                repeat: def.repeat,
            });
            self.macro_ids.insert(def.name.as_str(), id);
        }
        Ok(())
    }

    fn compile_step(&self, def: &MacroStepDef) -> Result<MacroStep, CompileError> {
        match def {
            MacroStepDef::Press { target } => {
                self.check_button(*target)?;
                Ok(MacroStep::Press(*target))
            }
            MacroStepDef::Release { target } => {
                self.check_button(*target)?;
                Ok(MacroStep::Release(*target))
            }
            MacroStepDef::Axis { target, value } => {
                self.check_axis(*target)?;
                Ok(MacroStep::Axis {
                    target: *target,
                    value: *value,
                })
            }
            MacroStepDef::Hat { target, direction } => {
                self.check_hat(*target)?;
                Ok(MacroStep::Hat {
                    target: *target,
                    direction: *direction,
                })
            }
            MacroStepDef::Pause { ms } => Ok(MacroStep::Pause(Duration::from_millis(*ms))),
        }
    }

    // ── Bindings ─────────────────────────────────────────────────────

    fn compile_bindings(&mut self) -> Result<Vec<Binding>, CompileError> {
        let mut bindings = Vec::new();
        let mut seen: HashSet<(usize, PhysicalInput)> = HashSet::new();
        for def in &self.def.bindings {
            let mode = self.resolve_mode(&def.mode)?;
            if !seen.insert((mode.0, def.input)) {
                return Err(CompileError::DuplicateBinding {
                    mode: def.mode.clone(),
                    input: def.input,
                });
            }
            let kind = ValueKind::from(def.input.input);
            let mut gates = Vec::new();
            let nodes = self.compile_nodes(&def.nodes, kind, def.input, &mut gates)?;
            let bypasses_pause = def.nodes.iter().any(contains_resume);
            bindings.push(Binding {
                mode,
                input: def.input,
                gates,
                nodes,
                bypasses_pause,
            });
        }
        Ok(bindings)
    }

    /// Per-mode input → binding index tables, flattened over the parent
    /// chain once at compile time so dispatch never walks parents.
    fn build_lookup(&self, bindings: &[Binding]) -> Vec<HashMap<PhysicalInput, usize>> {
        let mut own: Vec<HashMap<PhysicalInput, usize>> = vec![HashMap::new(); self.modes.len()];
        for (index, binding) in bindings.iter().enumerate() {
            own[binding.mode.0].insert(binding.input, index);
        }
        let mut lookup = Vec::with_capacity(self.modes.len());
        for start in 0..self.modes.len() {
            let mut table = HashMap::new();
            let mut current = Some(ModeId(start));
            while let Some(mode) = current {
                for (&input, &index) in &own[mode.0] {
                    table.entry(input).or_insert(index);
                }
                current = self.modes[mode.0].parent;
            }
            lookup.push(table);
        }
        lookup
    }

    // ── Node trees ───────────────────────────────────────────────────

    fn compile_nodes(
        &mut self,
        defs: &[NodeDef],
        kind: ValueKind,
        input: PhysicalInput,
        gates: &mut Vec<VirtualButtonId>,
    ) -> Result<Vec<TreeNode>, CompileError> {
        defs.iter()
            .map(|def| self.compile_node(def, kind, input, gates))
            .collect()
    }

    fn compile_node(
        &mut self,
        def: &NodeDef,
        kind: ValueKind,
        input: PhysicalInput,
        gates: &mut Vec<VirtualButtonId>,
    ) -> Result<TreeNode, CompileError> {
        match def {
            NodeDef::Condition {
                combinator,
                comparators,
                if_true,
                if_false,
            } => {
                let comparators = comparators
                    .iter()
                    .map(|c| self.compile_comparator(c))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TreeNode::Condition(ConditionNode {
                    combinator: *combinator,
                    comparators,
                    if_true: self.compile_nodes(if_true, kind, input, gates)?,
                    if_false: self.compile_nodes(if_false, kind, input, gates)?,
                }))
            }
            NodeDef::Basic { gate, children } => {
                let (gate, kind) = self.compile_gate(gate.as_ref(), kind, input, gates)?;
                Ok(TreeNode::Container(Container::Basic {
                    gate,
                    children: self.compile_nodes(children, kind, input, gates)?,
                }))
            }
            NodeDef::Chain {
                gate,
                groups,
                timeout_ms,
            } => {
                let (gate, kind) = self.compile_gate(gate.as_ref(), kind, input, gates)?;
                require_button(kind, input)?;
                if groups.is_empty() {
                    return Err(CompileError::EmptyChain);
                }
                let groups = groups
                    .iter()
                    .map(|group| self.compile_nodes(group, kind, input, gates))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = ChainId(self.chain_count);
                self.chain_count += 1;
                Ok(TreeNode::Container(Container::Chain {
                    id,
                    gate,
                    groups,
                    timeout: timeout_ms.map(Duration::from_millis),
                }))
            }
            NodeDef::Tempo {
                gate,
                threshold_ms,
                activate_on,
                short,
                long,
            } => {
                let (gate, kind) = self.compile_gate(gate.as_ref(), kind, input, gates)?;
                require_button(kind, input)?;
                if *threshold_ms == 0 {
                    return Err(CompileError::ZeroThreshold);
                }
                if *activate_on == TempoActivation::Press && !long.is_empty() {
                    return Err(CompileError::TempoLongWithPressActivation);
                }
                let spec = Arc::new(TempoSpec {
                    gate,
                    threshold: Duration::from_millis(*threshold_ms),
                    activate_on: *activate_on,
                    short: self.compile_nodes(short, ValueKind::Button, input, gates)?,
                    long: self.compile_nodes(long, ValueKind::Button, input, gates)?,
                });
                let id = TempoId(self.tempos.len());
                self.tempos.push(spec.clone());
                Ok(TreeNode::Container(Container::Tempo { id, spec }))
            }
            NodeDef::RemapButton { target } => {
                require_button(kind, input)?;
                self.check_button(*target)?;
                Ok(TreeNode::Action(Action::Remap(Remap::Button {
                    target: *target,
                })))
            }
            NodeDef::RemapAxis { target, mode } => {
                if kind != ValueKind::Axis {
                    return Err(CompileError::WrongInputKind {
                        node: "axis remap",
                        input,
                    });
                }
                self.check_axis(*target)?;
                let mode = match mode {
                    AxisModeDef::Absolute => AxisMode::Absolute,
                    AxisModeDef::Relative { scaling } => {
                        let slot = RelativeSlot(self.relative_count);
                        self.relative_count += 1;
                        AxisMode::Relative {
                            scaling: *scaling,
                            slot,
                        }
                    }
                };
                Ok(TreeNode::Action(Action::Remap(Remap::Axis {
                    target: *target,
                    mode,
                })))
            }
            NodeDef::RemapHat { target } => {
                if kind != ValueKind::Hat {
                    return Err(CompileError::WrongInputKind {
                        node: "hat remap",
                        input,
                    });
                }
                self.check_hat(*target)?;
                Ok(TreeNode::Action(Action::Remap(Remap::Hat {
                    target: *target,
                })))
            }
            NodeDef::Macro { name } => {
                require_button(kind, input)?;
                let id = self
                    .macro_ids
                    .get(name.as_str())
                    .copied()
                    .ok_or_else(|| CompileError::UnknownMacro(name.clone()))?;
                Ok(TreeNode::Action(Action::Macro(id)))
            }
            NodeDef::ModeSwitch { mode } => {
                require_button(kind, input)?;
                let mode = self.resolve_mode(mode)?;
                Ok(TreeNode::Action(Action::ModeChange(ModeChange::Switch(
                    mode,
                ))))
            }
            NodeDef::ModePrevious => {
                require_button(kind, input)?;
                Ok(TreeNode::Action(Action::ModeChange(ModeChange::Previous)))
            }
            NodeDef::ModeUnwind => {
                require_button(kind, input)?;
                Ok(TreeNode::Action(Action::ModeChange(ModeChange::UnwindOne)))
            }
            NodeDef::ModeTemporary { mode } => {
                require_button(kind, input)?;
                let mode = self.resolve_mode(mode)?;
                Ok(TreeNode::Action(Action::ModeChange(ModeChange::Temporary(
                    mode,
                ))))
            }
            NodeDef::ModeCycle { modes } => {
                require_button(kind, input)?;
                if modes.is_empty() {
                    return Err(CompileError::EmptyCycle);
                }
                let list = modes
                    .iter()
                    .map(|name| self.resolve_mode(name))
                    .collect::<Result<Vec<_>, _>>()?;
                let id = CycleId(self.cycles.len());
                self.cycles.push(list);
                Ok(TreeNode::Action(Action::ModeChange(ModeChange::Cycle(id))))
            }
            NodeDef::AxisMerge {
                first,
                second,
                operation,
                output,
            } => {
                for source in [first, second] {
                    if !matches!(source.input, InputSelector::Axis(_)) {
                        return Err(CompileError::MergeSourceNotAxis(*source));
                    }
                }
                self.check_axis(*output)?;
                Ok(TreeNode::Action(Action::AxisMerge(AxisMerge {
                    first: *first,
                    second: *second,
                    operation: *operation,
                    output: *output,
                })))
            }
            NodeDef::Pause => {
                require_button(kind, input)?;
                Ok(TreeNode::Action(Action::Pause))
            }
            NodeDef::Resume => {
                require_button(kind, input)?;
                Ok(TreeNode::Action(Action::Resume))
            }
            NodeDef::TogglePause => {
                require_button(kind, input)?;
                Ok(TreeNode::Action(Action::TogglePause))
            }
        }
    }

    fn compile_gate(
        &mut self,
        gate: Option<&GateDef>,
        kind: ValueKind,
        input: PhysicalInput,
        gates: &mut Vec<VirtualButtonId>,
    ) -> Result<(Option<VirtualButtonId>, ValueKind), CompileError> {
        let Some(gate) = gate else {
            return Ok((None, kind));
        };
        if kind == ValueKind::Button {
            return Err(CompileError::GateOnButtonInput(input));
        }
        let rule = match gate {
            GateDef::AxisRange { lower, upper, entry } => {
                if kind != ValueKind::Axis {
                    return Err(CompileError::GateKindMismatch(input));
                }
                if lower > upper {
                    return Err(CompileError::InvalidRange {
                        lower: *lower,
                        upper: *upper,
                    });
                }
                VirtualButtonRule::AxisRange {
                    lower: *lower,
                    upper: *upper,
                    entry: *entry,
                }
            }
            GateDef::HatDirections { directions } => {
                if kind != ValueKind::Hat {
                    return Err(CompileError::GateKindMismatch(input));
                }
                VirtualButtonRule::HatDirections {
                    directions: directions.clone(),
                }
            }
        };
        let id = VirtualButtonId(self.vb_rules.len());
        self.vb_rules.push(rule);
        gates.push(id);
        Ok((Some(id), ValueKind::Button))
    }

    fn compile_comparator(&self, def: &ComparatorDef) -> Result<Comparator, CompileError> {
        match def {
            ComparatorDef::Pressed { input, pressed } => Ok(Comparator::Pressed {
                input: *input,
                pressed: *pressed,
            }),
            ComparatorDef::InputRange { input, lower, upper } => {
                if !matches!(input.input, InputSelector::Axis(_)) {
                    return Err(CompileError::WrongInputKind {
                        node: "input_range comparator",
                        input: *input,
                    });
                }
                if lower > upper {
                    return Err(CompileError::InvalidRange {
                        lower: *lower,
                        upper: *upper,
                    });
                }
                Ok(Comparator::InputRange {
                    input: *input,
                    lower: *lower,
                    upper: *upper,
                })
            }
            ComparatorDef::HatDirection { input, directions } => {
                if !matches!(input.input, InputSelector::Hat(_)) {
                    return Err(CompileError::WrongInputKind {
                        node: "hat_direction comparator",
                        input: *input,
                    });
                }
                Ok(Comparator::HatDirection {
                    input: *input,
                    directions: directions.clone(),
                })
            }
            ComparatorDef::InputState { inputs } => Ok(Comparator::InputState {
                inputs: inputs.clone(),
            }),
        }
    }
}

fn require_button(kind: ValueKind, input: PhysicalInput) -> Result<(), CompileError> {
    if kind == ValueKind::Button {
        Ok(())
    } else {
        Err(CompileError::MissingActivation { input })
    }
}

/// Does the subtree contain an action that can lift the pause gate?
fn contains_resume(node: &NodeDef) -> bool {
    match node {
        NodeDef::Resume | NodeDef::TogglePause => true,
        NodeDef::Condition {
            if_true, if_false, ..
        } => if_true.iter().chain(if_false).any(contains_resume),
        NodeDef::Basic { children, .. } => children.iter().any(contains_resume),
        NodeDef::Chain { groups, .. } => groups.iter().flatten().any(contains_resume),
        NodeDef::Tempo { short, long, .. } => short.iter().chain(long).any(contains_resume),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::DeviceId;
    use crate::output::VirtualDeviceId;
    use crate::profile::types::{BindingDef, MacroDef, ModeDef, VirtualDeviceDef};

    fn mode(name: &str, parent: Option<&str>) -> ModeDef {
        ModeDef {
            name: name.into(),
            parent: parent.map(Into::into),
        }
    }

    fn vdev(id: u16, buttons: u16, axes: u16, hats: u16) -> VirtualDeviceDef {
        VirtualDeviceDef {
            id: VirtualDeviceId(id),
            axes,
            buttons,
            hats,
        }
    }

    fn button_remap(button: u16) -> NodeDef {
        NodeDef::RemapButton {
            target: ButtonTarget {
                device: VirtualDeviceId(0),
                button,
            },
        }
    }

    fn base_def() -> ProfileDef {
        ProfileDef {
            default_mode: None,
            modes: vec![mode("default", None)],
            virtual_devices: vec![vdev(0, 8, 4, 1)],
            macros: Vec::new(),
            bindings: Vec::new(),
        }
    }

    #[test]
    fn minimal_profile_compiles() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![button_remap(0)],
        });
        let profile = compile(&def).unwrap();
        assert_eq!(profile.default_mode(), ModeId(0));
        assert_eq!(profile.mode_name(ModeId(0)), "default");
        assert!(profile
            .resolve_binding(ModeId(0), PhysicalInput::button(DeviceId(0), 0))
            .is_some());
    }

    #[test]
    fn no_modes_is_rejected() {
        let def = ProfileDef::default();
        assert_eq!(compile(&def).err(), Some(CompileError::NoModes));
    }

    #[test]
    fn duplicate_mode_is_rejected() {
        let mut def = base_def();
        def.modes.push(mode("default", None));
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::DuplicateMode("default".into()))
        );
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut def = base_def();
        def.modes.push(mode("child", Some("missing")));
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::UnknownMode("missing".into()))
        );
    }

    #[test]
    fn parent_cycle_is_rejected() {
        let mut def = base_def();
        def.modes = vec![mode("a", Some("b")), mode("b", Some("a"))];
        assert!(matches!(compile(&def).err(), Some(CompileError::ModeCycle(_))));
    }

    #[test]
    fn self_parent_is_rejected() {
        let mut def = base_def();
        def.modes = vec![mode("a", Some("a"))];
        assert_eq!(compile(&def).err(), Some(CompileError::ModeCycle("a".into())));
    }

    #[test]
    fn duplicate_binding_is_rejected() {
        let mut def = base_def();
        let input = PhysicalInput::button(DeviceId(0), 0);
        for _ in 0..2 {
            def.bindings.push(BindingDef {
                mode: "default".into(),
                input,
                nodes: vec![button_remap(0)],
            });
        }
        assert!(matches!(
            compile(&def).err(),
            Some(CompileError::DuplicateBinding { .. })
        ));
    }

    #[test]
    fn inherited_binding_resolves_through_parent_chain() {
        let mut def = base_def();
        def.modes.push(mode("child", Some("default")));
        def.modes.push(mode("grandchild", Some("child")));
        let input = PhysicalInput::button(DeviceId(0), 0);
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input,
            nodes: vec![button_remap(0)],
        });
        // The child overrides, the grandchild inherits the override.
        def.bindings.push(BindingDef {
            mode: "child".into(),
            input,
            nodes: vec![button_remap(1)],
        });

        let profile = compile(&def).unwrap();
        let grandchild = profile.mode_id("grandchild").unwrap();
        let binding = profile.resolve_binding(grandchild, input).unwrap();
        assert_eq!(
            binding.nodes,
            vec![TreeNode::Action(Action::Remap(Remap::Button {
                target: ButtonTarget {
                    device: VirtualDeviceId(0),
                    button: 1
                }
            }))]
        );
    }

    #[test]
    fn unknown_macro_reference_is_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::Macro {
                name: "missing".into(),
            }],
        });
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::UnknownMacro("missing".into()))
        );
    }

    #[test]
    fn empty_macro_is_rejected() {
        let mut def = base_def();
        def.macros.push(MacroDef {
            name: "nothing".into(),
            exclusive: false,
            repeat: Default::default(),
            steps: Vec::new(),
        });
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::EmptyMacro("nothing".into()))
        );
    }

    #[test]
    fn out_of_range_output_is_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![button_remap(8)],
        });
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::OutputOutOfRange {
                device: 0,
                kind: "button",
                index: 8
            })
        );
    }

    #[test]
    fn unknown_virtual_device_is_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::RemapButton {
                target: ButtonTarget {
                    device: VirtualDeviceId(7),
                    button: 0,
                },
            }],
        });
        assert_eq!(compile(&def).err(), Some(CompileError::UnknownVirtualDevice(7)));
    }

    #[test]
    fn button_node_on_bare_axis_needs_a_gate() {
        let mut def = base_def();
        let input = PhysicalInput::axis(DeviceId(0), 0);
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input,
            nodes: vec![button_remap(0)],
        });
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::MissingActivation { input })
        );
    }

    #[test]
    fn gated_axis_drives_button_nodes() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::axis(DeviceId(0), 0),
            nodes: vec![NodeDef::Basic {
                gate: Some(GateDef::AxisRange {
                    lower: 0.5,
                    upper: 1.0,
                    entry: Default::default(),
                }),
                children: vec![button_remap(0)],
            }],
        });
        let profile = compile(&def).unwrap();
        assert_eq!(profile.vb_rules.len(), 1);
        assert_eq!(profile.bindings[0].gates, vec![VirtualButtonId(0)]);
    }

    #[test]
    fn gate_on_button_input_is_rejected() {
        let mut def = base_def();
        let input = PhysicalInput::button(DeviceId(0), 0);
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input,
            nodes: vec![NodeDef::Basic {
                gate: Some(GateDef::AxisRange {
                    lower: 0.0,
                    upper: 1.0,
                    entry: Default::default(),
                }),
                children: vec![button_remap(0)],
            }],
        });
        assert_eq!(compile(&def).err(), Some(CompileError::GateOnButtonInput(input)));
    }

    #[test]
    fn inverted_gate_band_is_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::axis(DeviceId(0), 0),
            nodes: vec![NodeDef::Basic {
                gate: Some(GateDef::AxisRange {
                    lower: 0.5,
                    upper: -0.5,
                    entry: Default::default(),
                }),
                children: Vec::new(),
            }],
        });
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::InvalidRange {
                lower: 0.5,
                upper: -0.5
            })
        );
    }

    #[test]
    fn zero_tempo_threshold_is_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::Tempo {
                gate: None,
                threshold_ms: 0,
                activate_on: Default::default(),
                short: Vec::new(),
                long: Vec::new(),
            }],
        });
        assert_eq!(compile(&def).err(), Some(CompileError::ZeroThreshold));
    }

    #[test]
    fn press_tempo_with_long_branch_is_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::Tempo {
                gate: None,
                threshold_ms: 500,
                activate_on: TempoActivation::Press,
                short: Vec::new(),
                long: vec![button_remap(0)],
            }],
        });
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::TempoLongWithPressActivation)
        );
    }

    #[test]
    fn empty_chain_and_cycle_are_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::Chain {
                gate: None,
                groups: Vec::new(),
                timeout_ms: None,
            }],
        });
        assert_eq!(compile(&def).err(), Some(CompileError::EmptyChain));

        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::ModeCycle { modes: Vec::new() }],
        });
        assert_eq!(compile(&def).err(), Some(CompileError::EmptyCycle));
    }

    #[test]
    fn inverted_comparator_range_is_rejected() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::Condition {
                combinator: Default::default(),
                comparators: vec![ComparatorDef::InputRange {
                    input: PhysicalInput::axis(DeviceId(0), 0),
                    lower: 1.0,
                    upper: -1.0,
                }],
                if_true: Vec::new(),
                if_false: Vec::new(),
            }],
        });
        assert_eq!(
            compile(&def).err(),
            Some(CompileError::InvalidRange {
                lower: 1.0,
                upper: -1.0
            })
        );
    }

    #[test]
    fn resume_subtree_marks_binding_as_pause_exempt() {
        let mut def = base_def();
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 0),
            nodes: vec![NodeDef::TogglePause],
        });
        def.bindings.push(BindingDef {
            mode: "default".into(),
            input: PhysicalInput::button(DeviceId(0), 1),
            nodes: vec![button_remap(0)],
        });
        let profile = compile(&def).unwrap();
        assert!(profile.bindings[0].bypasses_pause);
        assert!(!profile.bindings[1].bypasses_pause);
    }
}
