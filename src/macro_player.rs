//! Timed macro playback.
//!
//! A compiled macro is an ordered list of press/release/axis/hat writes
//! separated by pauses. Playback executes steps inline until it hits a
//! pause, then parks itself on the scheduler; the continuation runs on the
//! same serialized path as device events, so macro output never interleaves
//! mid-event.
//!
//! Exclusive macros cancel any in-flight instance of themselves before the
//! new instance's first step, releasing whatever buttons the cancelled
//! instance still held so no key is left stuck down.

use crate::event::HatDirection;
use crate::output::{AxisTarget, ButtonTarget, HatTarget, OutputSink};
use crate::scheduler::{Scheduler, TimerPayload, TimerToken};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Handle of a compiled macro, assigned by the profile compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroId(pub(crate) usize);

/// Handle of one in-flight playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct InvocationId(u64);

/// One step of a macro sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MacroStep {
    /// Press a virtual button and keep holding it.
    Press(ButtonTarget),
    /// Release a previously pressed virtual button.
    Release(ButtonTarget),
    /// Set a virtual axis.
    Axis { target: AxisTarget, value: f64 },
    /// Set a virtual hat.
    Hat {
        target: HatTarget,
        direction: HatDirection,
    },
    /// Wait before the next step.
    Pause(Duration),
}

/// How playback repeats after a completed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// Play once.
    #[default]
    None,
    /// Play a fixed number of passes.
    Count(u32),
    /// Repeat until the next activation stops it.
    Toggle,
}

/// A macro after compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledMacro {
    pub name: String,
    pub steps: Vec<MacroStep>,
    pub exclusive: bool,
    pub repeat: RepeatMode,
}

#[derive(Debug)]
struct Playback {
    macro_id: MacroId,
    /// Index of the next step to execute.
    step: usize,
    /// Remaining passes; `None` repeats until toggled off.
    passes_left: Option<u32>,
    /// Buttons pressed but not yet released by this invocation.
    held: Vec<ButtonTarget>,
    timer: Option<TimerToken>,
}

/// Owner of all in-flight macro playback state.
#[derive(Debug, Default)]
pub(crate) struct MacroPlayer {
    invocations: HashMap<InvocationId, Playback>,
    next_invocation: u64,
}

impl MacroPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all in-flight playback without emitting releases. Used when a
    /// new profile snapshot replaces the macro table (the scheduler is
    /// cleared alongside).
    pub fn reset(&mut self) {
        self.invocations.clear();
        self.next_invocation = 0;
    }

    pub fn is_running(&self, id: MacroId) -> bool {
        self.invocations.values().any(|p| p.macro_id == id)
    }

    /// Begin a new activation of `id`.
    pub fn trigger(
        &mut self,
        id: MacroId,
        def: &CompiledMacro,
        scheduler: &mut Scheduler,
        sink: &mut dyn OutputSink,
        now: Instant,
    ) {
        if matches!(def.repeat, RepeatMode::Toggle) && self.is_running(id) {
            debug!(name = %def.name, "toggle macro stopped");
            self.cancel_instances_of(id, scheduler, sink);
            return;
        }
        if def.exclusive {
            self.cancel_instances_of(id, scheduler, sink);
        }

        let invocation = InvocationId(self.next_invocation);
        self.next_invocation += 1;
        let passes_left = match def.repeat {
            RepeatMode::None => Some(1),
            RepeatMode::Count(n) => Some(n.max(1)),
            RepeatMode::Toggle => None,
        };
        self.invocations.insert(
            invocation,
            Playback {
                macro_id: id,
                step: 0,
                passes_left,
                held: Vec::new(),
                timer: None,
            },
        );
        debug!(name = %def.name, "macro started");
        self.run(invocation, def, scheduler, sink, now);
    }

    /// Resume a playback whose pause timer fired. Invocations cancelled in
    /// the meantime are simply gone and the stale wakeup is ignored.
    pub fn continue_playback(
        &mut self,
        invocation: InvocationId,
        macros: &[CompiledMacro],
        scheduler: &mut Scheduler,
        sink: &mut dyn OutputSink,
        now: Instant,
    ) {
        let Some(playback) = self.invocations.get(&invocation) else {
            return;
        };
        let Some(def) = macros.get(playback.macro_id.0) else {
            self.invocations.remove(&invocation);
            return;
        };
        self.run(invocation, def, scheduler, sink, now);
    }

    /// Cancel every in-flight instance of `id`: pending timers are
    /// cancelled and still-held buttons released, most recent first.
    fn cancel_instances_of(
        &mut self,
        id: MacroId,
        scheduler: &mut Scheduler,
        sink: &mut dyn OutputSink,
    ) {
        let targets: Vec<InvocationId> = self
            .invocations
            .iter()
            .filter(|(_, p)| p.macro_id == id)
            .map(|(&key, _)| key)
            .collect();
        for key in targets {
            if let Some(playback) = self.invocations.remove(&key) {
                if let Some(token) = playback.timer {
                    scheduler.cancel(token);
                }
                for target in playback.held.iter().rev() {
                    sink.write_button(target.device, target.button, false);
                }
            }
        }
    }

    fn run(
        &mut self,
        invocation: InvocationId,
        def: &CompiledMacro,
        scheduler: &mut Scheduler,
        sink: &mut dyn OutputSink,
        now: Instant,
    ) {
        let Some(playback) = self.invocations.get_mut(&invocation) else {
            return;
        };
        playback.timer = None;

        while let Some(step) = def.steps.get(playback.step) {
            playback.step += 1;
            match *step {
                MacroStep::Press(target) => {
                    sink.write_button(target.device, target.button, true);
                    playback.held.push(target);
                }
                MacroStep::Release(target) => {
                    sink.write_button(target.device, target.button, false);
                    if let Some(pos) = playback.held.iter().rposition(|h| *h == target) {
                        playback.held.remove(pos);
                    }
                }
                MacroStep::Axis { target, value } => {
                    sink.write_axis(target.device, target.axis, value);
                }
                MacroStep::Hat { target, direction } => {
                    sink.write_hat(target.device, target.hat, direction);
                }
                MacroStep::Pause(delay) => {
                    playback.timer = Some(
                        scheduler.schedule(now + delay, TimerPayload::MacroStep { invocation }),
                    );
                    return;
                }
            }
        }

        // Pass complete.
        let done = match playback.passes_left.as_mut() {
            Some(n) if *n <= 1 => true,
            Some(n) => {
                *n -= 1;
                false
            }
            None => false,
        };
        if done {
            self.invocations.remove(&invocation);
        } else {
            // Queue the next pass instead of looping inline so a repeating
            // macro is paced by the scheduler like any other continuation.
            playback.step = 0;
            playback.timer =
                Some(scheduler.schedule(now, TimerPayload::MacroStep { invocation }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{OutputRecord, RecordingSink, VirtualDeviceId};

    const DEV: VirtualDeviceId = VirtualDeviceId(0);

    fn btn(button: u16) -> ButtonTarget {
        ButtonTarget { device: DEV, button }
    }

    fn tap_macro(repeat: RepeatMode, exclusive: bool) -> CompiledMacro {
        CompiledMacro {
            name: "tap".into(),
            steps: vec![
                MacroStep::Press(btn(0)),
                MacroStep::Pause(Duration::from_millis(20)),
                MacroStep::Release(btn(0)),
            ],
            exclusive,
            repeat,
        }
    }

    /// Drain and execute everything due at `now`, like the dispatcher does.
    fn drive(
        player: &mut MacroPlayer,
        macros: &[CompiledMacro],
        scheduler: &mut Scheduler,
        sink: &mut RecordingSink,
        now: Instant,
    ) {
        let mut due = Vec::new();
        while let Some(fired) = scheduler.pop_due(now) {
            due.push(fired);
        }
        for (_, payload) in due {
            if let TimerPayload::MacroStep { invocation } = payload {
                player.continue_playback(invocation, macros, scheduler, sink, now);
            }
        }
    }

    #[test]
    fn plays_steps_across_pauses() {
        let mut player = MacroPlayer::new();
        let mut scheduler = Scheduler::new();
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        let macros = vec![tap_macro(RepeatMode::None, false)];
        let t0 = Instant::now();

        player.trigger(MacroId(0), &macros[0], &mut scheduler, &mut writer, t0);
        assert_eq!(
            sink.records(),
            vec![OutputRecord::Button { device: DEV, button: 0, pressed: true }]
        );

        drive(&mut player, &macros, &mut scheduler, &mut writer, t0 + Duration::from_millis(20));
        assert_eq!(sink.records().len(), 2);
        assert!(!player.is_running(MacroId(0)));
    }

    #[test]
    fn exclusive_retrigger_releases_held_buttons_first() {
        let mut player = MacroPlayer::new();
        let mut scheduler = Scheduler::new();
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        let macros = vec![tap_macro(RepeatMode::None, true)];
        let t0 = Instant::now();

        player.trigger(MacroId(0), &macros[0], &mut scheduler, &mut writer, t0);
        // Re-trigger mid-pause: the held press must be released before the
        // new invocation's first step.
        player.trigger(
            MacroId(0),
            &macros[0],
            &mut scheduler,
            &mut writer,
            t0 + Duration::from_millis(5),
        );

        assert_eq!(
            sink.records(),
            vec![
                OutputRecord::Button { device: DEV, button: 0, pressed: true },
                OutputRecord::Button { device: DEV, button: 0, pressed: false },
                OutputRecord::Button { device: DEV, button: 0, pressed: true },
            ]
        );

        // The first invocation's release never fires.
        drive(&mut player, &macros, &mut scheduler, &mut writer, t0 + Duration::from_millis(60));
        assert_eq!(sink.records().len(), 4);
        assert!(!player.is_running(MacroId(0)));
    }

    #[test]
    fn count_repeat_plays_fixed_passes() {
        let mut player = MacroPlayer::new();
        let mut scheduler = Scheduler::new();
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        let macros = vec![tap_macro(RepeatMode::Count(3), false)];
        let t0 = Instant::now();

        player.trigger(MacroId(0), &macros[0], &mut scheduler, &mut writer, t0);
        let mut now = t0;
        for _ in 0..12 {
            now += Duration::from_millis(20);
            drive(&mut player, &macros, &mut scheduler, &mut writer, now);
        }
        // 3 passes × press+release.
        assert_eq!(sink.records().len(), 6);
        assert!(!player.is_running(MacroId(0)));
    }

    #[test]
    fn toggle_stops_on_second_activation() {
        let mut player = MacroPlayer::new();
        let mut scheduler = Scheduler::new();
        let sink = RecordingSink::new();
        let mut writer = sink.clone();
        let macros = vec![tap_macro(RepeatMode::Toggle, false)];
        let t0 = Instant::now();

        player.trigger(MacroId(0), &macros[0], &mut scheduler, &mut writer, t0);
        assert!(player.is_running(MacroId(0)));

        let mut now = t0;
        for _ in 0..4 {
            now += Duration::from_millis(20);
            drive(&mut player, &macros, &mut scheduler, &mut writer, now);
        }
        assert!(player.is_running(MacroId(0)));

        player.trigger(MacroId(0), &macros[0], &mut scheduler, &mut writer, now);
        assert!(!player.is_running(MacroId(0)));

        // Nothing more fires after the stop.
        let settled = sink.records().len();
        drive(&mut player, &macros, &mut scheduler, &mut writer, now + Duration::from_secs(1));
        assert_eq!(sink.records().len(), settled);
    }
}
