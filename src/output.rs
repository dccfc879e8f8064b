//! Virtual-output sink contract and the recording test double.
//!
//! Writes are fire-and-forget: the sink fronts a virtual-device driver that
//! is assumed to accept every write. Implementations that can fail must
//! handle the failure themselves.

use crate::event::HatDirection;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

/// Identifier of a virtual output device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VirtualDeviceId(pub u16);

/// Target of a virtual button write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ButtonTarget {
    pub device: VirtualDeviceId,
    pub button: u16,
}

/// Target of a virtual axis write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AxisTarget {
    pub device: VirtualDeviceId,
    pub axis: u16,
}

/// Target of a virtual hat write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HatTarget {
    pub device: VirtualDeviceId,
    pub hat: u16,
}

/// Receiver for everything the engine emits.
pub trait OutputSink {
    fn write_axis(&mut self, device: VirtualDeviceId, axis: u16, value: f64);
    fn write_button(&mut self, device: VirtualDeviceId, button: u16, pressed: bool);
    fn write_hat(&mut self, device: VirtualDeviceId, hat: u16, direction: HatDirection);
}

/// A single recorded write.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputRecord {
    Axis {
        device: VirtualDeviceId,
        axis: u16,
        value: f64,
    },
    Button {
        device: VirtualDeviceId,
        button: u16,
        pressed: bool,
    },
    Hat {
        device: VirtualDeviceId,
        hat: u16,
        direction: HatDirection,
    },
}

/// Sink that records every write in order.
///
/// Cloning shares the underlying log, so a handle kept outside the engine
/// stays readable after the sink itself moves in.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    log: Rc<RefCell<Vec<OutputRecord>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far.
    pub fn records(&self) -> Vec<OutputRecord> {
        self.log.borrow().clone()
    }

    /// Drain the log, returning everything written since the last take.
    pub fn take(&self) -> Vec<OutputRecord> {
        std::mem::take(&mut *self.log.borrow_mut())
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }
}

impl OutputSink for RecordingSink {
    fn write_axis(&mut self, device: VirtualDeviceId, axis: u16, value: f64) {
        self.log
            .borrow_mut()
            .push(OutputRecord::Axis { device, axis, value });
    }

    fn write_button(&mut self, device: VirtualDeviceId, button: u16, pressed: bool) {
        self.log.borrow_mut().push(OutputRecord::Button {
            device,
            button,
            pressed,
        });
    }

    fn write_hat(&mut self, device: VirtualDeviceId, hat: u16, direction: HatDirection) {
        self.log.borrow_mut().push(OutputRecord::Hat {
            device,
            hat,
            direction,
        });
    }
}
