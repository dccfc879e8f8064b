//! Engine error types.

use crate::event::PhysicalInput;
use thiserror::Error;

/// Errors raised while compiling a profile definition into a runtime
/// snapshot.
///
/// Compilation is all-or-nothing: any of these leaves a previously
/// installed snapshot untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Profile defines no modes at all.
    #[error("profile defines no modes")]
    NoModes,

    /// Two modes share a name.
    #[error("duplicate mode \"{0}\"")]
    DuplicateMode(String),

    /// A parent, binding, or mode-change action names a mode that does not
    /// exist.
    #[error("unknown mode \"{0}\"")]
    UnknownMode(String),

    /// The parent relation loops back on itself.
    #[error("mode \"{0}\" is its own ancestor")]
    ModeCycle(String),

    /// Two bindings target the same input in the same mode.
    #[error("duplicate binding for {input:?} in mode \"{mode}\"")]
    DuplicateBinding { mode: String, input: PhysicalInput },

    /// Two macros share a name.
    #[error("duplicate macro \"{0}\"")]
    DuplicateMacro(String),

    /// An action references a macro that does not exist.
    #[error("unknown macro \"{0}\"")]
    UnknownMacro(String),

    /// A macro has no steps.
    #[error("macro \"{0}\" has no steps")]
    EmptyMacro(String),

    /// Two virtual devices share an id.
    #[error("duplicate virtual device {0}")]
    DuplicateVirtualDevice(u16),

    /// An output target names a virtual device that was never declared.
    #[error("unknown virtual device {0}")]
    UnknownVirtualDevice(u16),

    /// An output target indexes past the declared size of a virtual device.
    #[error("virtual device {device} has no {kind} {index}")]
    OutputOutOfRange {
        device: u16,
        kind: &'static str,
        index: u16,
    },

    /// A comparator or virtual-button band has `lower > upper`.
    #[error("range [{lower}, {upper}] is inverted")]
    InvalidRange { lower: f64, upper: f64 },

    /// A chain container has no action sets.
    #[error("chain container has no action sets")]
    EmptyChain,

    /// A tempo threshold of zero can never discriminate short from long.
    #[error("tempo threshold must be greater than zero")]
    ZeroThreshold,

    /// A press-activated tempo would fire both branches on a long hold.
    #[error("press-activated tempo cannot have a long branch")]
    TempoLongWithPressActivation,

    /// A mode cycle lists no modes.
    #[error("mode cycle list is empty")]
    EmptyCycle,

    /// A button-like node (remap-to-button, macro, mode change, pause) sits
    /// on an axis or hat input with no virtual-button gate to supply
    /// press/release edges.
    #[error("button-like node on {input:?} requires a virtual button gate")]
    MissingActivation { input: PhysicalInput },

    /// A node expects a different raw value kind than the input delivers.
    #[error("{node} cannot be driven by {input:?}")]
    WrongInputKind {
        node: &'static str,
        input: PhysicalInput,
    },

    /// An axis-merge source is not an axis input.
    #[error("axis merge source {0:?} is not an axis")]
    MergeSourceNotAxis(PhysicalInput),

    /// A virtual-button gate only makes sense on a continuous input.
    #[error("gate on {0:?} requires an axis or hat input")]
    GateOnButtonInput(PhysicalInput),

    /// An axis rule was attached to a hat input or vice versa.
    #[error("gate rule does not match the kind of {0:?}")]
    GateKindMismatch(PhysicalInput),
}

/// Internal dispatch-time failures.
///
/// These indicate states compilation should have prevented. The dispatcher
/// catches them at its per-event boundary, logs them, and keeps processing
/// the queue.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// An action received a value kind it cannot act on.
    #[error("action expected a {expected} value but received {got}")]
    ValueKindMismatch {
        expected: &'static str,
        got: &'static str,
    },

    /// A macro id fell outside the compiled macro table.
    #[error("macro id {0} out of range")]
    MacroOutOfRange(usize),
}
