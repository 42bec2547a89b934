//! Fault shutdown latch.
//!
//! The trip path is split in two, mirroring the hardware: forcing the
//! outputs into their safe state is done autonomously by the unit's trip
//! comparator within one switching period of the fault edge, while this
//! module keeps the *sticky* software latch that blocks setpoint changes
//! until the application explicitly acknowledges the fault.
//!
//! The latch flag is the only state shared with the interrupt path, and the
//! interrupt path only ever stores to it (see [`FaultLatch::note_trip`]), so
//! no lock is needed between a configuration call and a concurrent trip.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::unit::{ActiveLevel, Pin, PwmUnit};

/// Sticky fault latch over the unit's trip comparator.
pub struct FaultLatch {
    latched: AtomicBool,
    input: Option<(Pin, ActiveLevel)>,
}

impl FaultLatch {
    pub(crate) fn new() -> Self {
        FaultLatch {
            latched: AtomicBool::new(false),
            input: None,
        }
    }

    /// Arm the trip comparator. Any later qualifying transition on `pin`
    /// trips the hardware shutdown and latches here.
    pub(crate) fn arm<U: PwmUnit>(&mut self, unit: &mut U, pin: Pin, level: ActiveLevel) {
        unit.arm_fault_input(pin, level);
        self.input = Some((pin, level));
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.input.is_some()
    }

    /// Observe the trip comparator and latch if it has fired. Returns the
    /// latched state.
    ///
    /// Called from the control thread before every setpoint write, so a
    /// fault arriving concurrently with a configuration call wins for that
    /// and all following cycles.
    pub(crate) fn poll<U: PwmUnit>(&self, unit: &U) -> bool {
        if self.is_armed() && unit.fault_tripped() {
            self.latched.store(true, Ordering::Release);
        }
        self.is_latched()
    }

    /// Interrupt-path hook: record the trip. Writes nothing but the sticky
    /// flag; frequency and phase state belong to the control thread alone.
    pub fn note_trip(&self) {
        self.latched.store(true, Ordering::Release);
    }

    /// Whether a fault has been latched and not yet cleared.
    pub fn is_latched(&self) -> bool {
        self.latched.load(Ordering::Acquire)
    }

    /// Acknowledge the fault: clear the trip comparator latch and the
    /// sticky flag. Never called automatically.
    pub(crate) fn clear<U: PwmUnit>(&mut self, unit: &mut U) {
        unit.clear_fault_trip();
        self.latched.store(false, Ordering::Release);
    }
}
