//! Compiled execution trees and their evaluation.
//!
//! A tree is immutable after profile compilation and owned by the
//! dispatcher for the lifetime of the snapshot. Traversal is strictly
//! top-down; per-instance mutable state (chain position, tempo timers)
//! lives in dispatcher-owned slots keyed by compile-assigned ids and is
//! threaded through evaluation explicitly.

use crate::action::{self, Action};
use crate::condition::{evaluate_all, Comparator, LogicalCombinator};
use crate::dispatch::Runtime;
use crate::error::DispatchError;
use crate::event::{InputValue, PhysicalInput};
use crate::scheduler::{TimerPayload, TimerToken};
use crate::virtual_button::VirtualButtonId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Handle of one chain container instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub(crate) usize);

/// Handle of one tempo container instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempoId(pub(crate) usize);

/// When the short branch of a tempo receives its activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoActivation {
    /// Short fires as a full tap once the input is released before the
    /// threshold; the long branch fires when the threshold elapses first.
    #[default]
    Release,
    /// Short begins at physical press. The compiler rejects a long branch
    /// in this configuration, since it could no longer be kept exclusive
    /// with the short one.
    Press,
}

/// Immutable description of a tempo container, shared between its tree
/// node and the timer path that fires the long branch.
#[derive(Debug, PartialEq)]
pub struct TempoSpec {
    pub gate: Option<VirtualButtonId>,
    pub threshold: Duration,
    pub activate_on: TempoActivation,
    pub short: Vec<TreeNode>,
    pub long: Vec<TreeNode>,
}

/// Boolean combinator gating two subtrees.
#[derive(Debug, PartialEq)]
pub struct ConditionNode {
    pub combinator: LogicalCombinator,
    pub comparators: Vec<Comparator>,
    pub if_true: Vec<TreeNode>,
    pub if_false: Vec<TreeNode>,
}

/// Structural container nodes.
#[derive(Debug, PartialEq)]
pub enum Container {
    /// Pass-through, optionally gated by a virtual button.
    Basic {
        gate: Option<VirtualButtonId>,
        children: Vec<TreeNode>,
    },
    /// Ordered action sets; each press activates the current set and the
    /// release advances to the next, wrapping. Going `timeout` without an
    /// activation resets to the first set.
    Chain {
        id: ChainId,
        gate: Option<VirtualButtonId>,
        groups: Vec<Vec<TreeNode>>,
        timeout: Option<Duration>,
    },
    /// Short/long press discrimination by hold duration.
    Tempo { id: TempoId, spec: Arc<TempoSpec> },
}

/// One node of an execution tree.
#[derive(Debug, PartialEq)]
pub enum TreeNode {
    Condition(ConditionNode),
    Container(Container),
    Action(Action),
}

/// Per-chain mutable state.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChainState {
    /// Set activated by the next press.
    index: usize,
    /// Set the current press activated, so its release pairs up even if
    /// the index advances in between.
    active: Option<usize>,
    last_press: Option<Instant>,
}

/// Per-tempo mutable state.
#[derive(Debug, Clone, Default)]
pub(crate) struct TempoState {
    pending: Option<TimerToken>,
    /// Input that started the in-flight press, for the timer-fired long
    /// activation's context.
    origin: Option<PhysicalInput>,
    long_active: bool,
    short_active: bool,
}

/// The value flowing into a node: the triggering input plus the activation
/// value after any gate translation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EvalContext {
    pub input: PhysicalInput,
    pub value: InputValue,
}

impl EvalContext {
    fn with_button(self, pressed: bool) -> Self {
        Self {
            input: self.input,
            value: InputValue::Button(pressed),
        }
    }
}

/// Translate a context through an optional virtual-button gate. `None`
/// means the gate produced no edge for this event and the subtree stays
/// quiet.
fn gated(
    gate: Option<VirtualButtonId>,
    ctx: EvalContext,
    rt: &Runtime<'_>,
) -> Option<EvalContext> {
    match gate {
        None => Some(ctx),
        Some(id) => rt.vb_edges[id.0].map(|edge| ctx.with_button(edge.is_pressed())),
    }
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

/// Evaluate a node list against the current runtime state.
pub(crate) fn evaluate(
    nodes: &[TreeNode],
    ctx: EvalContext,
    rt: &mut Runtime<'_>,
) -> Result<(), DispatchError> {
    for node in nodes {
        match node {
            TreeNode::Condition(cond) => {
                let holds = evaluate_all(cond.combinator, &cond.comparators, rt.device_state);
                let branch = if holds { &cond.if_true } else { &cond.if_false };
                evaluate(branch, ctx, rt)?;
            }
            TreeNode::Container(container) => evaluate_container(container, ctx, rt)?,
            TreeNode::Action(act) => action::execute(act, ctx, rt)?,
        }
    }
    Ok(())
}

fn evaluate_container(
    container: &Container,
    ctx: EvalContext,
    rt: &mut Runtime<'_>,
) -> Result<(), DispatchError> {
    match container {
        Container::Basic { gate, children } => {
            if let Some(ctx) = gated(*gate, ctx, rt) {
                evaluate(children, ctx, rt)?;
            }
            Ok(())
        }
        Container::Chain {
            id,
            gate,
            groups,
            timeout,
        } => {
            let Some(ctx) = gated(*gate, ctx, rt) else {
                return Ok(());
            };
            let pressed = expect_button(ctx.value)?;
            if pressed {
                let index = {
                    let state = &mut rt.chain_states[id.0];
                    if let (Some(last), Some(timeout)) = (state.last_press, *timeout) {
                        if rt.now.duration_since(last) > timeout {
                            state.index = 0;
                        }
                    }
                    state.last_press = Some(rt.now);
                    state.active = Some(state.index);
                    state.index
                };
                evaluate(&groups[index], ctx, rt)?;
            } else if let Some(index) = rt.chain_states[id.0].active.take() {
                evaluate(&groups[index], ctx, rt)?;
                rt.chain_states[id.0].index = (index + 1) % groups.len();
            }
            Ok(())
        }
        Container::Tempo { id, spec } => evaluate_tempo(*id, spec, ctx, rt),
    }
}

fn evaluate_tempo(
    id: TempoId,
    spec: &TempoSpec,
    ctx: EvalContext,
    rt: &mut Runtime<'_>,
) -> Result<(), DispatchError> {
    let Some(ctx) = gated(spec.gate, ctx, rt) else {
        return Ok(());
    };
    let pressed = expect_button(ctx.value)?;

    if pressed {
        if let Some(stale) = rt.tempo_states[id.0].pending.take() {
            rt.scheduler.cancel(stale);
        }
        {
            let state = &mut rt.tempo_states[id.0];
            state.origin = Some(ctx.input);
            state.long_active = false;
            state.short_active = false;
        }
        match spec.activate_on {
            TempoActivation::Release => {
                let token = rt
                    .scheduler
                    .schedule(rt.now + spec.threshold, TimerPayload::TempoElapsed { tempo: id });
                rt.tempo_states[id.0].pending = Some(token);
            }
            TempoActivation::Press => {
                rt.tempo_states[id.0].short_active = true;
                evaluate(&spec.short, ctx.with_button(true), rt)?;
            }
        }
        return Ok(());
    }

    // Release: resolve the press/release cycle to exactly one branch.
    if let Some(token) = rt.tempo_states[id.0].pending.take() {
        // Threshold not reached — short fires as a full tap.
        rt.scheduler.cancel(token);
        evaluate(&spec.short, ctx.with_button(true), rt)?;
        evaluate(&spec.short, ctx.with_button(false), rt)?;
    } else if rt.tempo_states[id.0].long_active {
        rt.tempo_states[id.0].long_active = false;
        evaluate(&spec.long, ctx.with_button(false), rt)?;
    } else if rt.tempo_states[id.0].short_active {
        rt.tempo_states[id.0].short_active = false;
        evaluate(&spec.short, ctx.with_button(false), rt)?;
    }
    Ok(())
}

/// Deliver a tempo's long-press activation after its threshold timer fired.
///
/// Stale wakeups (the press released and re-pressed before the poll) carry
/// a token that no longer matches and are ignored.
pub(crate) fn fire_tempo_long(
    id: TempoId,
    token: TimerToken,
    rt: &mut Runtime<'_>,
) -> Result<(), DispatchError> {
    let spec = rt.profile.tempos[id.0].clone();
    let origin = {
        let state = &mut rt.tempo_states[id.0];
        if state.pending != Some(token) {
            return Ok(());
        }
        state.pending = None;
        state.long_active = true;
        state.origin
    };
    let Some(input) = origin else {
        return Ok(());
    };
    let ctx = EvalContext {
        input,
        value: InputValue::Button(true),
    };
    evaluate(&spec.long, ctx, rt)
}
