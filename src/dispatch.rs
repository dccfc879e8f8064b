//! The dispatcher: the engine's top-level per-event loop.
//!
//! Each raw event is processed to completion — active-mode resolution,
//! virtual-button synthesis, tree evaluation, action effects — before the
//! next one is looked at. Timers fire on the same serialized path when the
//! host polls, never mid-evaluation, so mode-stack and synthesis state can
//! never be observed half-mutated.
//!
//! The explicitly-timestamped entry points exist so tests (and replay
//! tooling) can drive a virtual clock; the convenience wrappers read
//! `Instant::now()`.

use crate::action::RelativeState;
use crate::event::{DeviceState, InputEvent};
use crate::macro_player::MacroPlayer;
use crate::mode_stack::{ModeId, ModeStack};
use crate::output::OutputSink;
use crate::profile::Profile;
use crate::scheduler::{Scheduler, TimerPayload};
use crate::tree::{self, ChainState, EvalContext, TempoState};
use crate::virtual_button::{ButtonEdge, VirtualButtonState};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, trace};

/// Dispatcher-owned mutable state threaded through node evaluation.
///
/// Splitting the engine's fields into this view keeps the compiled trees
/// (borrowed from the snapshot) and the mutable state they act on apart,
/// and keeps node evaluation free of any ambient globals.
pub(crate) struct Runtime<'a> {
    pub profile: &'a Profile,
    pub mode_stack: &'a mut ModeStack,
    pub device_state: &'a DeviceState,
    pub vb_edges: &'a [Option<ButtonEdge>],
    pub chain_states: &'a mut [ChainState],
    pub tempo_states: &'a mut [TempoState],
    pub relative_states: &'a mut [RelativeState],
    pub scheduler: &'a mut Scheduler,
    pub macros: &'a mut MacroPlayer,
    pub paused: &'a mut bool,
    pub sink: &'a mut dyn OutputSink,
    pub now: Instant,
}

/// The runtime input-dispatch engine.
pub struct Engine {
    profile: Arc<Profile>,
    mode_stack: ModeStack,
    device_state: DeviceState,
    vb_states: Vec<VirtualButtonState>,
    /// Per-event scratch: the edge each gate produced for the current
    /// event, indexed by virtual button id.
    vb_edges: Vec<Option<ButtonEdge>>,
    chain_states: Vec<ChainState>,
    tempo_states: Vec<TempoState>,
    relative_states: Vec<RelativeState>,
    scheduler: Scheduler,
    macros: MacroPlayer,
    paused: bool,
    sink: Box<dyn OutputSink>,
}

impl Engine {
    /// Start an engine on a compiled profile snapshot.
    pub fn new(profile: Profile, sink: Box<dyn OutputSink>) -> Self {
        let profile = Arc::new(profile);
        let engine = Self {
            mode_stack: ModeStack::new(profile.default_mode()),
            device_state: DeviceState::new(),
            vb_states: vec![VirtualButtonState::default(); profile.vb_rules.len()],
            vb_edges: vec![None; profile.vb_rules.len()],
            chain_states: vec![ChainState::default(); profile.chain_count],
            tempo_states: vec![TempoState::default(); profile.tempos.len()],
            relative_states: vec![RelativeState::default(); profile.relative_count],
            scheduler: Scheduler::new(),
            macros: MacroPlayer::new(),
            paused: false,
            profile,
            sink,
        };
        info!(
            modes = engine.profile.mode_names().count(),
            "profile installed"
        );
        engine
    }

    /// Swap in a new snapshot: fresh mode stack, synthesis and container
    /// state, no pending timers or macros, pause gate lifted. The old
    /// snapshot is dropped wholesale.
    pub fn install(&mut self, profile: Profile) {
        let profile = Arc::new(profile);
        self.mode_stack = ModeStack::new(profile.default_mode());
        self.device_state.clear();
        self.vb_states = vec![VirtualButtonState::default(); profile.vb_rules.len()];
        self.vb_edges = vec![None; profile.vb_rules.len()];
        self.chain_states = vec![ChainState::default(); profile.chain_count];
        self.tempo_states = vec![TempoState::default(); profile.tempos.len()];
        self.relative_states = vec![RelativeState::default(); profile.relative_count];
        self.scheduler.clear();
        self.macros.reset();
        self.paused = false;
        self.profile = profile;
        info!(
            modes = self.profile.mode_names().count(),
            "profile installed"
        );
    }

    /// Process one raw input event at the current wall clock.
    pub fn process(&mut self, event: InputEvent) {
        self.process_at(event, Instant::now());
    }

    /// Process one raw input event at an explicit instant.
    pub fn process_at(&mut self, event: InputEvent, now: Instant) {
        let event = clamp_event(event);
        self.device_state.apply(&event);

        let profile = Arc::clone(&self.profile);
        let input = event.input();
        let mode = self.mode_stack.active_mode();
        let Some(binding) = profile.resolve_binding(mode, input) else {
            trace!(?input, "no binding in active mode");
            return;
        };
        if self.paused && !binding.bypasses_pause {
            trace!(?input, "event dropped by pause gate");
            return;
        }

        for &gate in &binding.gates {
            self.vb_edges[gate.0] =
                self.vb_states[gate.0].update(&profile.vb_rules[gate.0], event.value());
        }

        let ctx = EvalContext {
            input,
            value: event.value(),
        };
        let mut rt = Runtime {
            profile: profile.as_ref(),
            mode_stack: &mut self.mode_stack,
            device_state: &self.device_state,
            vb_edges: &self.vb_edges,
            chain_states: &mut self.chain_states,
            tempo_states: &mut self.tempo_states,
            relative_states: &mut self.relative_states,
            scheduler: &mut self.scheduler,
            macros: &mut self.macros,
            paused: &mut self.paused,
            sink: self.sink.as_mut(),
            now,
        };
        if let Err(err) = tree::evaluate(&binding.nodes, ctx, &mut rt) {
            // One malformed action must never stop the pipeline.
            error!(%err, ?input, "action execution failed; continuing");
        }
    }

    /// Run every timer due at the current wall clock.
    pub fn poll_timers(&mut self) -> Option<Instant> {
        self.poll_timers_at(Instant::now())
    }

    /// Run every timer due at `now`; returns the next deadline for the
    /// host's wait loop.
    ///
    /// The due set is collected up front, so continuations a callback
    /// schedules for the same instant run on the next poll rather than
    /// spinning here.
    pub fn poll_timers_at(&mut self, now: Instant) -> Option<Instant> {
        let profile = Arc::clone(&self.profile);
        let mut due = Vec::new();
        while let Some(fired) = self.scheduler.pop_due(now) {
            due.push(fired);
        }
        for (token, payload) in due {
            match payload {
                TimerPayload::TempoElapsed { tempo } => {
                    let mut rt = Runtime {
                        profile: profile.as_ref(),
                        mode_stack: &mut self.mode_stack,
                        device_state: &self.device_state,
                        vb_edges: &self.vb_edges,
                        chain_states: &mut self.chain_states,
                        tempo_states: &mut self.tempo_states,
                        relative_states: &mut self.relative_states,
                        scheduler: &mut self.scheduler,
                        macros: &mut self.macros,
                        paused: &mut self.paused,
                        sink: self.sink.as_mut(),
                        now,
                    };
                    if let Err(err) = tree::fire_tempo_long(tempo, token, &mut rt) {
                        error!(%err, "tempo long activation failed; continuing");
                    }
                }
                TimerPayload::MacroStep { invocation } => {
                    self.macros.continue_playback(
                        invocation,
                        &profile.macros,
                        &mut self.scheduler,
                        self.sink.as_mut(),
                        now,
                    );
                }
            }
        }
        self.scheduler.next_deadline()
    }

    // ── Query surface for external UIs ───────────────────────────────

    pub fn active_mode(&self) -> ModeId {
        self.mode_stack.active_mode()
    }

    pub fn active_mode_name(&self) -> &str {
        self.profile.mode_name(self.mode_stack.active_mode())
    }

    pub fn mode_stack(&self) -> &ModeStack {
        &self.mode_stack
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            self.paused = paused;
            info!(paused, "event processing gate set");
        }
    }

    pub fn toggle_paused(&mut self) {
        self.set_paused(!self.paused);
    }
}

/// Out-of-range axis samples are clamped on entry rather than rejected.
fn clamp_event(event: InputEvent) -> InputEvent {
    match event {
        InputEvent::Axis {
            device,
            axis,
            value,
        } => InputEvent::Axis {
            device,
            axis,
            value: value.clamp(-1.0, 1.0),
        },
        other => other,
    }
}
