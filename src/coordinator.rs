//! Phase coordination between the two legs.
//!
//! The lead leg is always the timing reference: its counter phase preload is
//! fixed at zero. The lag leg's preload carries the phase-shift setpoint,
//! mapped linearly in duty:
//!
//! `lag_phase_ticks = round(ps * period)`
//!
//! With symmetric up/down counting, `period` register ticks are exactly half
//! the switching period, so `ps = 1.0` shifts the lag leg by 180 degrees.
//! Both legs' compare points stay at mid-count (each leg is a 50 % square
//! wave); power transfer is controlled purely by the offset.

use fugit::HertzU32;

use crate::{
    operator::{DeadTimeInserter, LegController},
    timer::TimerClockConfig,
    unit::{DisableAction, Leg, PwmUnit},
    Config, Error,
};

pub(crate) fn lag_offset_ticks(phase_shift: f32, period: u16) -> u16 {
    (phase_shift * period as f32 + 0.5) as u16
}

/// Keeps the two legs on one common counting reference and owns the
/// phase-shift setpoint.
pub struct PhaseShiftCoordinator {
    lead: LegController,
    lag: LegController,
    phase_shift: f32,
}

impl PhaseShiftCoordinator {
    pub(crate) fn new<U: PwmUnit>(unit: &mut U, config: &Config) -> Result<Self, Error> {
        let clock = TimerClockConfig::with_frequency(unit.clock(), config.frequency)?;
        if !(0.0..=1.0).contains(&config.phase_shift) {
            return Err(Error::InvalidPhaseShift);
        }

        let lead = LegController::new(
            Leg::Lead,
            clock,
            DeadTimeInserter::symmetric(config.lead_dead_time),
            config.lead_disable_action,
        );
        let lag = LegController::new(
            Leg::Lag,
            clock,
            DeadTimeInserter::symmetric(config.lag_dead_time),
            config.lag_disable_action,
        );

        let mut coordinator = PhaseShiftCoordinator {
            lead,
            lag,
            phase_shift: config.phase_shift,
        };
        coordinator.apply_clock(unit, clock)?;
        Ok(coordinator)
    }

    /// Reconfigure both legs for a new switching frequency.
    ///
    /// All validation (frequency range, both legs' dead times against the
    /// new half period) happens before the first register write; both legs
    /// then receive the identical period so they latch it on the same
    /// rollover boundary, avoiding a transient beat between the legs.
    pub(crate) fn set_frequency<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        target: HertzU32,
    ) -> Result<HertzU32, Error> {
        let clock = TimerClockConfig::with_frequency(unit.clock(), target)?;
        self.apply_clock(unit, clock)?;
        Ok(clock.frequency())
    }

    fn apply_clock<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        clock: TimerClockConfig,
    ) -> Result<(), Error> {
        let lead_ticks = self.lead.validate_clock(&clock)?;
        let lag_ticks = self.lag.validate_clock(&clock)?;

        self.lead.apply_clock(unit, clock, lead_ticks);
        self.lag.apply_clock(unit, clock, lag_ticks);

        // logical edges stay at mid-count; the lag offset rescales so the
        // phase-shift fraction is preserved across the frequency change
        let mid = clock.period() / 2;
        self.lead.set_edge_reference(unit, mid);
        self.lag.set_edge_reference(unit, mid);
        self.write_phases(unit);
        Ok(())
    }

    /// Update the phase-shift setpoint.
    ///
    /// Values outside `[0.0, 1.0]` (including NaN) are rejected and the
    /// previous setpoint stays in effect; nothing is clamped.
    pub(crate) fn set_phase_shift<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        phase_shift: f32,
    ) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&phase_shift) {
            return Err(Error::InvalidPhaseShift);
        }
        self.phase_shift = phase_shift;
        self.write_phases(unit);
        Ok(())
    }

    /// Reprogram both dead-time generators, validated against the current
    /// half period before either leg is written.
    pub(crate) fn set_dead_times<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        lead: DeadTimeInserter,
        lag: DeadTimeInserter,
    ) -> Result<(), Error> {
        lead.ticks(self.lead.config())?;
        lag.ticks(self.lag.config())?;
        self.lead.set_dead_time(unit, lead)?;
        self.lag.set_dead_time(unit, lag)?;
        Ok(())
    }

    /// Restart both counters together from their phase preloads.
    pub(crate) fn resync<U: PwmUnit>(&mut self, unit: &mut U) {
        self.write_phases(unit);
        unit.trigger_sync();
    }

    fn write_phases<U: PwmUnit>(&mut self, unit: &mut U) {
        let offset = lag_offset_ticks(self.phase_shift, self.lead.config().period());
        self.lead.set_phase(unit, 0);
        self.lag.set_phase(unit, offset);
    }

    /// Change both legs' disable actions, trip actions included.
    pub(crate) fn set_disable_actions<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        lead: DisableAction,
        lag: DisableAction,
    ) {
        self.lead.set_disable_action(unit, lead);
        self.lag.set_disable_action(unit, lag);
    }

    pub(crate) fn disable_all<U: PwmUnit>(&mut self, unit: &mut U) {
        self.lead.disable(unit);
        self.lag.disable(unit);
    }

    pub(crate) fn enable_all<U: PwmUnit>(&mut self, unit: &mut U) {
        self.lead.enable(unit);
        self.lag.enable(unit);
    }

    pub(crate) fn write_trip_actions<U: PwmUnit>(&self, unit: &mut U) {
        unit.write_trip_action(Leg::Lead, self.lead.disable_action());
        unit.write_trip_action(Leg::Lag, self.lag.disable_action());
    }

    /// The actually achieved switching frequency.
    pub(crate) fn frequency(&self) -> HertzU32 {
        self.lead.config().frequency()
    }

    /// The current phase-shift setpoint.
    pub(crate) fn phase_shift(&self) -> f32 {
        self.phase_shift
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lag_offset_is_monotonic_in_the_setpoint() {
        let period = 800;
        let mut previous = 0;
        for step in 0..=100 {
            let ps = step as f32 / 100.0;
            let offset = lag_offset_ticks(ps, period);
            assert!(offset >= previous, "offset decreased at ps = {ps}");
            previous = offset;
        }
        assert_eq!(lag_offset_ticks(0.0, period), 0);
        assert_eq!(lag_offset_ticks(1.0, period), period);
    }

    #[test]
    fn lag_offset_scales_with_the_period() {
        // halving the period halves the tick offset, preserving the fraction
        assert_eq!(lag_offset_ticks(0.45, 800), 360);
        assert_eq!(lag_offset_ticks(0.45, 400), 180);
    }
}
