//! Phase-shift PWM (PS-PWM) generator with hardware fault shutdown, for
//! power-electronics bridge converters such as ZVS full-bridge,
//! dual-active-bridge and LLC topologies.
//!
//! ## Overview
//!
//! The driver runs two complementary timer pairs, the *lead leg* and the
//! *lag leg*, producing four gate-drive signals with independently
//! configurable dead time. The controllable phase offset between the legs
//! sets the effective duty cycle of the power stage:
//!
//! ```text
//! lead low:  --____--------____--------____----
//! lead high: ____----________----________----__
//! lag low:       --____--------____--------____
//! lag high:  --______----________----________--
//!                <-->  phase shift = ps * T/2
//! ```
//!
//! Hardware access goes through the [`unit::PwmUnit`] capability trait; the
//! driver never touches a concrete register set. A chip support crate binds
//! the trait to a motor-control PWM peripheral with two symmetric up/down
//! counters, shadowed compare/period registers, per-leg dead-time generators
//! and a trip comparator input.
//!
//! ## Fault handling
//!
//! An armed fault input trips the hardware shutdown autonomously within one
//! switching period and latches in software. Recovery is a deliberate
//! two-step interlock: [`PsPwm::clear_fault_latch`] acknowledges the fault
//! (outputs stay in their safe state), and only a following
//! [`PsPwm::resync_and_enable_outputs`] re-arms waveform generation, from a
//! clean rollover boundary. No internal retry or timer ever clears a latched
//! fault.
//!
//! ## Feature Flags
#![doc = document_features::document_features!()]
#![cfg_attr(not(test), no_std)]

use fugit::{HertzU32, NanosDurationU32};

mod fmt;

pub mod coordinator;
pub mod fault;
pub mod operator;
pub mod timer;
pub mod unit;

use self::{coordinator::PhaseShiftCoordinator, fault::FaultLatch, unit::UnitGuard};
pub use self::{
    operator::{DeadTimeCfg, DeadTimeInserter},
    timer::TimerClockConfig,
    unit::{ActiveLevel, DisableAction, Leg, Pin, PinAssignment, PwmUnit},
};

/// PS-PWM driver errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The requested switching frequency is outside the range achievable
    /// with the unit's clock and counter resolution.
    InvalidFrequency,
    /// A dead time reaches half the switching period.
    InvalidDeadTime,
    /// A phase-shift setpoint outside the valid `[0.0, 1.0]` range.
    InvalidPhaseShift,
    /// The operation is not permitted in the current state, e.g. a setpoint
    /// change while a fault is latched.
    InvalidState,
    /// The requested PWM unit is already bound or does not exist.
    PeripheralUnavailable,
}

/// Operating state of the controller.
///
/// The missing `Uninitialized` state is the absence of the [`PsPwm`] value;
/// [`PsPwm::new`] is the one-shot initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// Configured, outputs held at their disable actions.
    Configured,
    /// Outputs actively switching.
    Running,
    /// A fault is latched; outputs forced, setpoints blocked.
    FaultLatched,
}

/// Initial controller configuration.
///
/// The defaults reproduce a 100 kHz ZVS full bridge with 125 ns dead times
/// on both legs and outputs enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Switching frequency of both legs.
    pub frequency: HertzU32,
    /// Phase shift between the legs as a fraction of the half period,
    /// `0.0..=1.0`.
    pub phase_shift: f32,
    /// Lead leg dead time, both edges.
    pub lead_dead_time: NanosDurationU32,
    /// Lag leg dead time, both edges.
    pub lag_dead_time: NanosDurationU32,
    /// Whether outputs start switching right after initialization.
    pub output_enabled: bool,
    /// Lead leg output level while disabled or tripped.
    pub lead_disable_action: DisableAction,
    /// Lag leg output level while disabled or tripped.
    pub lag_disable_action: DisableAction,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            frequency: HertzU32::kHz(100),
            phase_shift: 0.45,
            lead_dead_time: NanosDurationU32::nanos(125),
            lag_dead_time: NanosDurationU32::nanos(125),
            output_enabled: true,
            lead_disable_action: DisableAction::ForceLow,
            lag_disable_action: DisableAction::ForceLow,
        }
    }
}

/// Phase-shift PWM controller for one PWM unit and one full bridge.
///
/// Created once per unit; a second binding of the same unit id fails with
/// [`Error::PeripheralUnavailable`]. All operations are non-blocking
/// register/state writes that take effect at the next timing boundary.
pub struct PsPwm<U: PwmUnit> {
    unit: U,
    coordinator: PhaseShiftCoordinator,
    fault: FaultLatch,
    state: State,
    _guard: UnitGuard,
}

impl<U: PwmUnit> PsPwm<U> {
    /// Bind `unit` and the four gate pins, apply the initial configuration
    /// and, if `config.output_enabled`, start switching.
    pub fn new(mut unit: U, pins: PinAssignment, config: Config) -> Result<Self, Error> {
        let guard = UnitGuard::claim(unit.id())?;

        unit.connect_outputs(Leg::Lead, pins.lead_low, pins.lead_high);
        unit.connect_outputs(Leg::Lag, pins.lag_low, pins.lag_high);

        let coordinator = PhaseShiftCoordinator::new(&mut unit, &config)?;
        coordinator.write_trip_actions(&mut unit);

        let mut pwm = PsPwm {
            unit,
            coordinator,
            fault: FaultLatch::new(),
            state: State::Configured,
            _guard: guard,
        };

        // outputs stay safe until the first sync boundary
        pwm.coordinator.disable_all(&mut pwm.unit);
        if config.output_enabled {
            pwm.resync_and_enable_outputs()?;
        }

        info!(
            "PS-PWM unit {} configured at {} Hz",
            pwm.unit.id(),
            pwm.coordinator.frequency().raw()
        );
        Ok(pwm)
    }

    /// Latch a pending hardware trip before acting on any setpoint. A fault
    /// arriving concurrently with a configuration call therefore wins for
    /// that and all subsequent cycles.
    fn observe_fault(&mut self) -> bool {
        if self.state == State::FaultLatched {
            return true;
        }
        if self.fault.poll(&self.unit) {
            // the hardware has already forced the outputs; mirror it so the
            // software override survives a later trip-comparator clear
            self.coordinator.disable_all(&mut self.unit);
            self.state = State::FaultLatched;
            warn!("PS-PWM unit {} fault latched", self.unit.id());
            return true;
        }
        false
    }

    /// Change the switching frequency of both legs, keeping the phase-shift
    /// fraction. Returns the actually achieved frequency.
    ///
    /// Both legs are reconfigured with the identical period and latch it at
    /// the same rollover boundary. Rejected with [`Error::InvalidState`]
    /// while a fault is latched, [`Error::InvalidFrequency`] outside the
    /// achievable range and [`Error::InvalidDeadTime`] if a configured dead
    /// time would reach the new half period.
    pub fn set_frequency(&mut self, frequency: HertzU32) -> Result<HertzU32, Error> {
        if self.observe_fault() {
            return Err(Error::InvalidState);
        }
        let achieved = self.coordinator.set_frequency(&mut self.unit, frequency)?;
        debug!("frequency set to {} Hz", achieved.raw());
        Ok(achieved)
    }

    /// Change the phase-shift setpoint, `0.0..=1.0` of the half period.
    ///
    /// Rejected with [`Error::InvalidState`] while a fault is latched and
    /// [`Error::InvalidPhaseShift`] outside the valid range; the previous
    /// setpoint then stays in effect.
    pub fn set_phase_shift(&mut self, phase_shift: f32) -> Result<(), Error> {
        if self.observe_fault() {
            return Err(Error::InvalidState);
        }
        self.coordinator.set_phase_shift(&mut self.unit, phase_shift)?;
        debug!("phase shift set to {}", phase_shift);
        Ok(())
    }

    /// Change both legs' (symmetric) dead times at runtime.
    pub fn set_dead_times(
        &mut self,
        lead: NanosDurationU32,
        lag: NanosDurationU32,
    ) -> Result<(), Error> {
        if self.observe_fault() {
            return Err(Error::InvalidState);
        }
        self.coordinator.set_dead_times(
            &mut self.unit,
            DeadTimeInserter::symmetric(lead),
            DeadTimeInserter::symmetric(lag),
        )
    }

    /// Change the level each leg's outputs take while disabled or tripped.
    /// The hardware trip action follows, and outputs currently held in
    /// their safe state move to the new action immediately.
    pub fn set_disable_actions(
        &mut self,
        lead: DisableAction,
        lag: DisableAction,
    ) -> Result<(), Error> {
        if self.observe_fault() {
            return Err(Error::InvalidState);
        }
        self.coordinator.set_disable_actions(&mut self.unit, lead, lag);
        if self.state == State::Configured {
            self.coordinator.disable_all(&mut self.unit);
        }
        Ok(())
    }

    /// Arm the fault shutdown input. Any later qualifying transition on
    /// `pin` forces the outputs within one switching period and latches,
    /// regardless of what the application is doing.
    pub fn enable_fault_input(&mut self, pin: Pin, active_level: ActiveLevel) -> Result<(), Error> {
        if self.observe_fault() {
            return Err(Error::InvalidState);
        }
        self.fault.arm(&mut self.unit, pin, active_level);
        info!("fault input armed on pin {}", pin.0);
        Ok(())
    }

    /// Acknowledge a latched fault. Outputs stay at their disable actions;
    /// a following [`resync_and_enable_outputs`](Self::resync_and_enable_outputs)
    /// resumes switching. Rejected when no fault is latched.
    pub fn clear_fault_latch(&mut self) -> Result<(), Error> {
        self.observe_fault();
        if self.state != State::FaultLatched {
            return Err(Error::InvalidState);
        }
        self.fault.clear(&mut self.unit);
        self.state = State::Configured;
        info!("fault latch cleared, outputs stay disabled");
        Ok(())
    }

    /// Re-arm waveform generation from a clean rollover boundary and release
    /// the output override.
    ///
    /// Rejected with [`Error::InvalidState`] while a fault is latched — also
    /// when the fault input is *still* at its active level after a
    /// [`clear_fault_latch`](Self::clear_fault_latch), so the power stage is
    /// never re-energized into a standing fault.
    pub fn resync_and_enable_outputs(&mut self) -> Result<(), Error> {
        if self.observe_fault() {
            return Err(Error::InvalidState);
        }
        self.coordinator.resync(&mut self.unit);
        self.coordinator.enable_all(&mut self.unit);
        self.state = State::Running;
        info!("outputs enabled from sync boundary");
        Ok(())
    }

    /// Force the outputs to their disable actions without a fault. Setpoint
    /// changes remain permitted; resume via
    /// [`resync_and_enable_outputs`](Self::resync_and_enable_outputs).
    pub fn disable_outputs(&mut self) -> Result<(), Error> {
        if self.observe_fault() {
            return Err(Error::InvalidState);
        }
        self.coordinator.disable_all(&mut self.unit);
        self.state = State::Configured;
        Ok(())
    }

    /// Whether a fault has occurred and has not been cleared yet. Also
    /// observes a trip that has not been seen by any other call.
    pub fn fault_latched(&self) -> bool {
        self.fault.poll(&self.unit)
    }

    /// Current state, with a pending hardware trip taken into account.
    pub fn state(&self) -> State {
        if self.state != State::FaultLatched && self.fault.poll(&self.unit) {
            State::FaultLatched
        } else {
            self.state
        }
    }

    /// The actually achieved switching frequency.
    pub fn frequency(&self) -> HertzU32 {
        self.coordinator.frequency()
    }

    /// The current phase-shift setpoint.
    pub fn phase_shift(&self) -> f32 {
        self.coordinator.phase_shift()
    }

    /// Handle to the sticky latch, e.g. for a fault interrupt handler
    /// calling [`FaultLatch::note_trip`].
    pub fn fault_latch(&self) -> &FaultLatch {
        &self.fault
    }
}
