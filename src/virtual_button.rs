//! Virtual button synthesis from continuous axes and discrete hats.
//!
//! A rule describes which raw samples count as "pressed"; the per-rule
//! state tracks the previous sample so axis rules can require a specific
//! crossing direction. Output is strictly edge-triggered: an edge is
//! reported only on a press/release transition, never on steady state.

use crate::event::{HatDirection, InputValue};
use serde::{Deserialize, Serialize};

/// Handle of one virtual button rule instance, assigned by the profile
/// compiler. Every rule tracks its own state, so a hat mapped to several
/// logical buttons releases exactly the ones no longer satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VirtualButtonId(pub(crate) usize);

/// Which side the axis value must enter the active band from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryDirection {
    /// Any crossing into the band presses the button.
    #[default]
    Anywhere,
    /// Press only when the previous sample sat above the band.
    FromAbove,
    /// Press only when the previous sample sat below the band.
    FromBelow,
}

/// Which raw samples count as pressed.
#[derive(Debug, Clone, PartialEq)]
pub enum VirtualButtonRule {
    /// Pressed while the axis value sits inside `[lower, upper]`, subject
    /// to the entry direction at crossing time.
    AxisRange {
        lower: f64,
        upper: f64,
        entry: EntryDirection,
    },
    /// Pressed while the hat points in one of the listed directions.
    HatDirections { directions: Vec<HatDirection> },
}

/// A press or release transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

impl ButtonEdge {
    pub fn is_pressed(self) -> bool {
        matches!(self, ButtonEdge::Pressed)
    }
}

/// Mutable tracking state for one rule instance.
#[derive(Debug, Clone, Default)]
pub struct VirtualButtonState {
    pressed: bool,
    last_sample: Option<f64>,
}

impl VirtualButtonState {
    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Feed one raw sample; returns an edge only on a transition.
    ///
    /// Samples of the wrong kind (a hat value into an axis rule) are
    /// ignored — the compiler pairs rules with matching inputs, so this is
    /// purely defensive.
    pub fn update(&mut self, rule: &VirtualButtonRule, value: InputValue) -> Option<ButtonEdge> {
        match (rule, value) {
            (
                VirtualButtonRule::AxisRange { lower, upper, entry },
                InputValue::Axis(sample),
            ) => self.update_axis(*lower, *upper, *entry, sample),
            (VirtualButtonRule::HatDirections { directions }, InputValue::Hat(direction)) => {
                self.set_pressed(directions.contains(&direction))
            }
            _ => None,
        }
    }

    fn update_axis(
        &mut self,
        lower: f64,
        upper: f64,
        entry: EntryDirection,
        sample: f64,
    ) -> Option<ButtonEdge> {
        let previous = self.last_sample.replace(sample);
        let inside = sample >= lower && sample <= upper;

        if inside && !self.pressed {
            // Entry direction is judged at crossing time only. A first-ever
            // sample has no known direction, so directional rules stay
            // released until a real crossing is observed.
            let entered = match entry {
                EntryDirection::Anywhere => true,
                EntryDirection::FromAbove => previous.is_some_and(|p| p > upper),
                EntryDirection::FromBelow => previous.is_some_and(|p| p < lower),
            };
            if entered {
                self.pressed = true;
                return Some(ButtonEdge::Pressed);
            }
            None
        } else if !inside && self.pressed {
            self.pressed = false;
            Some(ButtonEdge::Released)
        } else {
            None
        }
    }

    fn set_pressed(&mut self, pressed: bool) -> Option<ButtonEdge> {
        if pressed == self.pressed {
            return None;
        }
        self.pressed = pressed;
        Some(if pressed {
            ButtonEdge::Pressed
        } else {
            ButtonEdge::Released
        })
    }
}
