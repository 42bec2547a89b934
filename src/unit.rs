//! Hardware boundary of the driver.
//!
//! The driver is written against [`PwmUnit`], an opaque capability describing
//! one motor-control PWM unit: two symmetric up/down counters with shadowed
//! period and compare registers, a per-leg dead-time generator, a software
//! sync chain and a trip comparator input. Chip support crates implement the
//! trait on top of their register blocks; the driver never touches a concrete
//! register set.

use core::cell::Cell;

use critical_section::Mutex;
use fugit::HertzU32;

use crate::{operator::DeadTimeCfg, Error};

/// One leg (half bridge) of the power stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Leg {
    /// Timing reference leg. Its counter phase is always zero.
    Lead,
    /// Shifted leg. Its counter phase carries the phase-shift setpoint.
    Lag,
}

/// Identifier of a digital pin, as understood by the [`PwmUnit`]
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pin(pub u8);

/// The four gate-drive output pins of one full bridge.
///
/// Naming follows the usual PS-PWM convention: `PWM0A`/`PWM0B` are the lead
/// leg low/high side, `PWM1A`/`PWM1B` the lag leg low/high side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinAssignment {
    /// Lead leg, low side gate.
    pub lead_low: Pin,
    /// Lead leg, high side gate.
    pub lead_high: Pin,
    /// Lag leg, low side gate.
    pub lag_low: Pin,
    /// Lag leg, high side gate.
    pub lag_high: Pin,
}

/// Level applied to a leg's outputs while it is disabled or tripped.
///
/// Both outputs of a leg get the same kind of action; the two legs may be
/// configured differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DisableAction {
    /// Drive both outputs low.
    ForceLow,
    /// Drive both outputs high.
    ForceHigh,
    /// Release the drivers, outputs go high-impedance.
    HighImpedance,
}

/// Active level of the fault shutdown input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveLevel {
    /// A low level trips the fault shutdown.
    Low,
    /// A high level trips the fault shutdown.
    High,
}

/// A motor-control PWM unit, one per driven full bridge.
///
/// Register-style writes (`write_*`) go to shadow registers: the hardware
/// applies them at the next counter rollover (or, for `write_phase`, at the
/// next sync event), never mid-cycle, so a reconfiguration can not truncate a
/// pulse.
///
/// Once a trip input is armed via [`arm_fault_input`](Self::arm_fault_input),
/// an asserted fault must force every connected output to the action given to
/// [`write_trip_action`](Self::write_trip_action) autonomously, within one
/// switching period, without software involvement.
pub trait PwmUnit {
    /// Identity of this unit, used to detect double binding.
    fn id(&self) -> usize;

    /// Input clock of the unit's timers, before the per-timer prescaler.
    fn clock(&self) -> HertzU32;

    /// Route a leg's two gate outputs to the given pins.
    fn connect_outputs(&mut self, leg: Leg, low: Pin, high: Pin);

    /// Configure a leg's counter: symmetric up/down counting over
    /// `0..=period` ticks of `clock / (prescaler + 1)`.
    fn write_timer(&mut self, leg: Leg, prescaler: u8, period: u16);

    /// Place a leg's logical switching edge within the count.
    fn write_compare(&mut self, leg: Leg, ticks: u16);

    /// Program a leg's dead-time generator.
    fn write_dead_time(&mut self, leg: Leg, cfg: DeadTimeCfg);

    /// Counter value a leg's timer is preloaded with on a sync event.
    fn write_phase(&mut self, leg: Leg, ticks: u16);

    /// Software-sync both counters from their phase preloads. This is the
    /// clean rollover boundary both legs restart from together.
    fn trigger_sync(&mut self);

    /// Action the hardware applies to a leg's outputs on a fault trip.
    fn write_trip_action(&mut self, leg: Leg, action: DisableAction);

    /// Immediately override a leg's outputs with the given action.
    fn force_outputs(&mut self, leg: Leg, action: DisableAction);

    /// Remove a previous [`force_outputs`](Self::force_outputs) override.
    fn release_outputs(&mut self, leg: Leg);

    /// Arm the trip comparator on the given input pin and polarity.
    fn arm_fault_input(&mut self, pin: Pin, level: ActiveLevel);

    /// Latched status of the trip comparator. Stays asserted while the armed
    /// input is at its active level, even after
    /// [`clear_fault_trip`](Self::clear_fault_trip).
    fn fault_tripped(&self) -> bool;

    /// Clear the trip comparator latch. Has no lasting effect while the
    /// fault input is still at its active level.
    fn clear_fault_trip(&mut self);
}

const MAX_UNITS: usize = 16;

static CLAIMED: Mutex<Cell<u16>> = Mutex::new(Cell::new(0));

/// Records ownership of one PWM unit for the lifetime of a driver instance.
///
/// Binding a unit is a one-time ownership transfer; a second claim of the
/// same unit id fails with [`Error::PeripheralUnavailable`].
pub(crate) struct UnitGuard {
    id: usize,
}

impl UnitGuard {
    pub(crate) fn claim(id: usize) -> Result<Self, Error> {
        if id >= MAX_UNITS {
            return Err(Error::PeripheralUnavailable);
        }
        critical_section::with(|cs| {
            let claimed = CLAIMED.borrow(cs);
            let bit = 1u16 << id;
            if claimed.get() & bit != 0 {
                Err(Error::PeripheralUnavailable)
            } else {
                claimed.set(claimed.get() | bit);
                Ok(UnitGuard { id })
            }
        })
    }
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        critical_section::with(|cs| {
            let claimed = CLAIMED.borrow(cs);
            claimed.set(claimed.get() & !(1u16 << self.id));
        });
    }
}
