//! Action leaves: the effects a matched tree produces.
//!
//! Every output target was resolved and bounds-checked during profile
//! compilation; at dispatch time the only failures left are value-kind
//! mismatches, which the dispatcher logs at its per-event boundary.

use crate::dispatch::Runtime;
use crate::error::DispatchError;
use crate::event::{InputValue, PhysicalInput};
use crate::macro_player::MacroId;
use crate::mode_stack::{CycleId, ModeId};
use crate::output::{AxisTarget, ButtonTarget, HatTarget};
use crate::tree::EvalContext;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Handle of one relative-axis accumulator slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelativeSlot(pub(crate) usize);

/// Accumulated position of a relative axis remap.
#[derive(Debug, Clone, Default)]
pub(crate) struct RelativeState {
    value: f64,
    last_update: Option<Instant>,
}

/// How an axis remap converts input position to output position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AxisMode {
    /// Direct passthrough.
    Absolute,
    /// Accumulate `value * scaling * dt` onto the output, clamped to
    /// [-1, 1]; `dt` spans successive events of the source axis.
    Relative { scaling: f64, slot: RelativeSlot },
}

/// Direct write of the activation value to a virtual output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Remap {
    Button { target: ButtonTarget },
    Axis { target: AxisTarget, mode: AxisMode },
    Hat { target: HatTarget },
}

/// One requested mode-stack operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeChange {
    Switch(ModeId),
    Previous,
    UnwindOne,
    /// Pushed while held, released when the activation releases.
    Temporary(ModeId),
    Cycle(CycleId),
}

/// Binary operation combining two physical axes into one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOperation {
    /// `(a - b) / 2` — merges two unipolar pedal-style axes into one
    /// bipolar output.
    #[default]
    Average,
    Minimum,
    Maximum,
    Sum,
}

impl MergeOperation {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            MergeOperation::Average => (a - b) / 2.0,
            MergeOperation::Minimum => a.min(b),
            MergeOperation::Maximum => a.max(b),
            MergeOperation::Sum => a + b,
        }
    }
}

/// Combine two independently tracked axes into one virtual axis. Each
/// source update recomputes from the most recent cached value of the other
/// side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisMerge {
    pub first: PhysicalInput,
    pub second: PhysicalInput,
    pub operation: MergeOperation,
    pub output: AxisTarget,
}

/// An action leaf.
#[derive(Debug, PartialEq)]
pub enum Action {
    Remap(Remap),
    Macro(MacroId),
    ModeChange(ModeChange),
    AxisMerge(AxisMerge),
    /// Suspend processing of new input events.
    Pause,
    /// Resume processing.
    Resume,
    /// Flip the pause gate.
    TogglePause,
}

fn expect_button(value: InputValue) -> Result<bool, DispatchError> {
    match value {
        InputValue::Button(pressed) => Ok(pressed),
        other => Err(DispatchError::ValueKindMismatch {
            expected: "button",
            got: other.kind(),
        }),
    }
}

pub(crate) fn execute(
    action: &Action,
    ctx: EvalContext,
    rt: &mut Runtime<'_>,
) -> Result<(), DispatchError> {
    match action {
        Action::Remap(remap) => execute_remap(remap, ctx, rt),
        Action::Macro(id) => {
            if expect_button(ctx.value)? {
                let def = rt
                    .profile
                    .macros
                    .get(id.0)
                    .ok_or(DispatchError::MacroOutOfRange(id.0))?;
                rt.macros
                    .trigger(*id, def, rt.scheduler, &mut *rt.sink, rt.now);
            }
            Ok(())
        }
        Action::ModeChange(change) => {
            let pressed = expect_button(ctx.value)?;
            match change {
                ModeChange::Switch(mode) => {
                    if pressed {
                        rt.mode_stack.switch_to(*mode);
                    }
                }
                ModeChange::Previous => {
                    if pressed {
                        rt.mode_stack.to_previous();
                    }
                }
                ModeChange::UnwindOne => {
                    if pressed {
                        rt.mode_stack.unwind_one();
                    }
                }
                ModeChange::Temporary(mode) => {
                    if pressed {
                        rt.mode_stack.push_temporary(*mode);
                    } else {
                        rt.mode_stack.release_temporary(*mode);
                    }
                }
                ModeChange::Cycle(cycle) => {
                    if pressed {
                        rt.mode_stack.cycle(*cycle, &rt.profile.cycles[cycle.0]);
                    }
                }
            }
            Ok(())
        }
        Action::AxisMerge(merge) => {
            let a = rt.device_state.axis_value(merge.first);
            let b = rt.device_state.axis_value(merge.second);
            let value = merge.operation.apply(a, b).clamp(-1.0, 1.0);
            rt.sink
                .write_axis(merge.output.device, merge.output.axis, value);
            Ok(())
        }
        Action::Pause => {
            if expect_button(ctx.value)? {
                *rt.paused = true;
                info!("event processing paused");
            }
            Ok(())
        }
        Action::Resume => {
            if expect_button(ctx.value)? {
                *rt.paused = false;
                info!("event processing resumed");
            }
            Ok(())
        }
        Action::TogglePause => {
            if expect_button(ctx.value)? {
                *rt.paused = !*rt.paused;
                info!(paused = *rt.paused, "event processing gate toggled");
            }
            Ok(())
        }
    }
}

fn execute_remap(
    remap: &Remap,
    ctx: EvalContext,
    rt: &mut Runtime<'_>,
) -> Result<(), DispatchError> {
    match (remap, ctx.value) {
        (Remap::Button { target }, InputValue::Button(pressed)) => {
            rt.sink.write_button(target.device, target.button, pressed);
            Ok(())
        }
        (Remap::Hat { target }, InputValue::Hat(direction)) => {
            rt.sink.write_hat(target.device, target.hat, direction);
            Ok(())
        }
        (Remap::Axis { target, mode }, InputValue::Axis(value)) => {
            let out = match *mode {
                AxisMode::Absolute => value.clamp(-1.0, 1.0),
                AxisMode::Relative { scaling, slot } => {
                    let state = &mut rt.relative_states[slot.0];
                    let dt = state.last_update.map(|last| rt.now.duration_since(last));
                    state.last_update = Some(rt.now);
                    if let Some(dt) = dt {
                        state.value =
                            (state.value + value * scaling * dt.as_secs_f64()).clamp(-1.0, 1.0);
                    }
                    state.value
                }
            };
            rt.sink.write_axis(target.device, target.axis, out);
            Ok(())
        }
        (remap, value) => {
            let expected = match remap {
                Remap::Button { .. } => "button",
                Remap::Axis { .. } => "axis",
                Remap::Hat { .. } => "hat",
            };
            Err(DispatchError::ValueKindMismatch {
                expected,
                got: value.kind(),
            })
        }
    }
}
