//! Typed input events and the last-known device state cache.
//!
//! The input collector delivers events already serialized into a single
//! ordered stream, one at a time. The engine only ever sees the typed forms
//! defined here; device enumeration and driver binding live outside the
//! crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier of a physical input device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DeviceId(pub u16);

/// One of the nine discrete hat positions, including center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HatDirection {
    Center,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl HatDirection {
    pub const ALL: &'static [HatDirection] = &[
        HatDirection::Center,
        HatDirection::North,
        HatDirection::NorthEast,
        HatDirection::East,
        HatDirection::SouthEast,
        HatDirection::South,
        HatDirection::SouthWest,
        HatDirection::West,
        HatDirection::NorthWest,
    ];

    pub fn is_center(self) -> bool {
        matches!(self, HatDirection::Center)
    }
}

/// Which input of a device, with the input kind folded into the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSelector {
    Button(u16),
    Axis(u16),
    Hat(u16),
}

/// Identity of one physical input across the whole device set.
///
/// This is the key type used in binding lookups and comparators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhysicalInput {
    pub device: DeviceId,
    pub input: InputSelector,
}

impl PhysicalInput {
    pub fn button(device: DeviceId, index: u16) -> Self {
        Self {
            device,
            input: InputSelector::Button(index),
        }
    }

    pub fn axis(device: DeviceId, index: u16) -> Self {
        Self {
            device,
            input: InputSelector::Axis(index),
        }
    }

    pub fn hat(device: DeviceId, index: u16) -> Self {
        Self {
            device,
            input: InputSelector::Hat(index),
        }
    }
}

/// A raw device event as delivered by the input collector.
///
/// Axis values are normalized to `[-1.0, 1.0]`; the dispatcher clamps
/// out-of-range samples on entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    Axis {
        device: DeviceId,
        axis: u16,
        value: f64,
    },
    Button {
        device: DeviceId,
        button: u16,
        pressed: bool,
    },
    Hat {
        device: DeviceId,
        hat: u16,
        direction: HatDirection,
    },
}

impl InputEvent {
    /// The physical input this event belongs to.
    pub fn input(&self) -> PhysicalInput {
        match *self {
            InputEvent::Axis { device, axis, .. } => PhysicalInput::axis(device, axis),
            InputEvent::Button { device, button, .. } => PhysicalInput::button(device, button),
            InputEvent::Hat { device, hat, .. } => PhysicalInput::hat(device, hat),
        }
    }

    /// The carried value, detached from the input identity.
    pub fn value(&self) -> InputValue {
        match *self {
            InputEvent::Axis { value, .. } => InputValue::Axis(value),
            InputEvent::Button { pressed, .. } => InputValue::Button(pressed),
            InputEvent::Hat { direction, .. } => InputValue::Hat(direction),
        }
    }
}

/// Current value of a physical input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputValue {
    Button(bool),
    Axis(f64),
    Hat(HatDirection),
}

impl InputValue {
    /// Whether the input counts as pressed: a held button or a deflected
    /// hat. Axes are never "pressed" — band detection goes through virtual
    /// buttons instead.
    pub fn is_pressed(self) -> bool {
        match self {
            InputValue::Button(pressed) => pressed,
            InputValue::Hat(direction) => !direction.is_center(),
            InputValue::Axis(_) => false,
        }
    }

    pub fn as_axis(self) -> Option<f64> {
        match self {
            InputValue::Axis(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_hat(self) -> Option<HatDirection> {
        match self {
            InputValue::Hat(direction) => Some(direction),
            _ => None,
        }
    }

    /// Short kind name for diagnostics.
    pub fn kind(self) -> &'static str {
        match self {
            InputValue::Button(_) => "button",
            InputValue::Axis(_) => "axis",
            InputValue::Hat(_) => "hat",
        }
    }
}

/// Last-known value of every physical input seen so far.
///
/// Updated before tree evaluation, so comparators that reference *other*
/// inputs read a snapshot consistent with the triggering event.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    values: HashMap<PhysicalInput, InputValue>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the event's value as the input's current state.
    pub fn apply(&mut self, event: &InputEvent) {
        self.values.insert(event.input(), event.value());
    }

    pub fn get(&self, input: PhysicalInput) -> Option<InputValue> {
        self.values.get(&input).copied()
    }

    /// Whether the input is currently pressed. Inputs never seen are
    /// released.
    pub fn is_pressed(&self, input: PhysicalInput) -> bool {
        self.get(input).is_some_and(InputValue::is_pressed)
    }

    /// Current axis position, defaulting to center for inputs never seen.
    pub fn axis_value(&self, input: PhysicalInput) -> f64 {
        self.get(input).and_then(InputValue::as_axis).unwrap_or(0.0)
    }

    /// Current hat direction, defaulting to center for inputs never seen.
    pub fn hat_direction(&self, input: PhysicalInput) -> HatDirection {
        self.get(input)
            .and_then(InputValue::as_hat)
            .unwrap_or(HatDirection::Center)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_identity_and_value() {
        let ev = InputEvent::Axis {
            device: DeviceId(2),
            axis: 1,
            value: 0.5,
        };
        assert_eq!(ev.input(), PhysicalInput::axis(DeviceId(2), 1));
        assert_eq!(ev.value(), InputValue::Axis(0.5));
    }

    #[test]
    fn state_tracks_latest_value() {
        let mut state = DeviceState::new();
        let input = PhysicalInput::button(DeviceId(0), 3);
        assert!(!state.is_pressed(input));

        state.apply(&InputEvent::Button {
            device: DeviceId(0),
            button: 3,
            pressed: true,
        });
        assert!(state.is_pressed(input));

        state.apply(&InputEvent::Button {
            device: DeviceId(0),
            button: 3,
            pressed: false,
        });
        assert!(!state.is_pressed(input));
    }

    #[test]
    fn deflected_hat_counts_as_pressed() {
        let mut state = DeviceState::new();
        let input = PhysicalInput::hat(DeviceId(1), 0);
        state.apply(&InputEvent::Hat {
            device: DeviceId(1),
            hat: 0,
            direction: HatDirection::NorthEast,
        });
        assert!(state.is_pressed(input));
        assert_eq!(state.hat_direction(input), HatDirection::NorthEast);
    }

    #[test]
    fn unknown_inputs_default_to_rest_position() {
        let state = DeviceState::new();
        assert_eq!(state.axis_value(PhysicalInput::axis(DeviceId(9), 0)), 0.0);
        assert_eq!(
            state.hat_direction(PhysicalInput::hat(DeviceId(9), 0)),
            HatDirection::Center
        );
    }
}
