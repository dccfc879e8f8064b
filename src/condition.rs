//! Leaf predicates and their boolean combination.
//!
//! Comparators read the last-known device state, never the hardware, so
//! evaluation is pure and happens exactly once per incoming event that
//! reaches the owning tree — CPU cost tracks event rate, not wall-clock
//! time.

use crate::event::{DeviceState, HatDirection, PhysicalInput};
use serde::{Deserialize, Serialize};

/// How a condition combines its comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalCombinator {
    /// Every comparator must hold.
    #[default]
    All,
    /// At least one comparator must hold.
    Any,
}

/// A single predicate over current device state.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparator {
    /// The named input is currently pressed (or released).
    Pressed {
        input: PhysicalInput,
        pressed: bool,
    },
    /// The named axis currently sits inside `[lower, upper]`.
    InputRange {
        input: PhysicalInput,
        lower: f64,
        upper: f64,
    },
    /// The named hat currently points in one of the listed directions.
    HatDirection {
        input: PhysicalInput,
        directions: Vec<HatDirection>,
    },
    /// Every listed input is currently pressed.
    InputState { inputs: Vec<PhysicalInput> },
}

impl Comparator {
    pub fn evaluate(&self, state: &DeviceState) -> bool {
        match self {
            Comparator::Pressed { input, pressed } => state.is_pressed(*input) == *pressed,
            Comparator::InputRange { input, lower, upper } => {
                let value = state.axis_value(*input);
                value >= *lower && value <= *upper
            }
            Comparator::HatDirection { input, directions } => {
                directions.contains(&state.hat_direction(*input))
            }
            Comparator::InputState { inputs } => {
                inputs.iter().all(|input| state.is_pressed(*input))
            }
        }
    }
}

/// Evaluate a comparator set under a combinator.
///
/// An empty set holds under `All` (nothing to violate) and fails under
/// `Any` (nothing to satisfy).
pub fn evaluate_all(
    combinator: LogicalCombinator,
    comparators: &[Comparator],
    state: &DeviceState,
) -> bool {
    match combinator {
        LogicalCombinator::All => comparators.iter().all(|c| c.evaluate(state)),
        LogicalCombinator::Any => comparators.iter().any(|c| c.evaluate(state)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DeviceId, InputEvent};

    fn state_with(events: &[InputEvent]) -> DeviceState {
        let mut state = DeviceState::new();
        for event in events {
            state.apply(event);
        }
        state
    }

    #[test]
    fn pressed_comparator_matches_both_polarities() {
        let trigger = PhysicalInput::button(DeviceId(0), 1);
        let state = state_with(&[InputEvent::Button {
            device: DeviceId(0),
            button: 1,
            pressed: true,
        }]);

        let held = Comparator::Pressed { input: trigger, pressed: true };
        let released = Comparator::Pressed { input: trigger, pressed: false };
        assert!(held.evaluate(&state));
        assert!(!released.evaluate(&state));
    }

    #[test]
    fn range_comparator_is_inclusive() {
        let axis = PhysicalInput::axis(DeviceId(0), 0);
        let state = state_with(&[InputEvent::Axis {
            device: DeviceId(0),
            axis: 0,
            value: 0.5,
        }]);
        let on_edge = Comparator::InputRange { input: axis, lower: 0.5, upper: 1.0 };
        let outside = Comparator::InputRange { input: axis, lower: 0.6, upper: 1.0 };
        assert!(on_edge.evaluate(&state));
        assert!(!outside.evaluate(&state));
    }

    #[test]
    fn hat_comparator_checks_membership() {
        let hat = PhysicalInput::hat(DeviceId(0), 0);
        let state = state_with(&[InputEvent::Hat {
            device: DeviceId(0),
            hat: 0,
            direction: HatDirection::West,
        }]);
        let west_or_east = Comparator::HatDirection {
            input: hat,
            directions: vec![HatDirection::West, HatDirection::East],
        };
        let north_only = Comparator::HatDirection {
            input: hat,
            directions: vec![HatDirection::North],
        };
        assert!(west_or_east.evaluate(&state));
        assert!(!north_only.evaluate(&state));
    }

    #[test]
    fn input_state_requires_every_input_held() {
        let a = PhysicalInput::button(DeviceId(0), 0);
        let b = PhysicalInput::button(DeviceId(0), 1);
        let state = state_with(&[InputEvent::Button {
            device: DeviceId(0),
            button: 0,
            pressed: true,
        }]);

        let both = Comparator::InputState { inputs: vec![a, b] };
        let just_a = Comparator::InputState { inputs: vec![a] };
        assert!(!both.evaluate(&state));
        assert!(just_a.evaluate(&state));
    }

    #[test]
    fn combinators_over_mixed_results() {
        let a = PhysicalInput::button(DeviceId(0), 0);
        let state = state_with(&[InputEvent::Button {
            device: DeviceId(0),
            button: 0,
            pressed: true,
        }]);
        let yes = Comparator::Pressed { input: a, pressed: true };
        let no = Comparator::Pressed { input: a, pressed: false };

        let set = vec![yes, no];
        assert!(!evaluate_all(LogicalCombinator::All, &set, &state));
        assert!(evaluate_all(LogicalCombinator::Any, &set, &state));
        assert!(evaluate_all(LogicalCombinator::All, &[], &state));
        assert!(!evaluate_all(LogicalCombinator::Any, &[], &state));
    }
}
