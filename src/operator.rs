//! Per-leg signal generation: dead-time insertion and output control.
//!
//! Each leg produces a complementary gate pair from one logical switching
//! edge. With the compare point at mid-count the logical signal is a 50 %
//! square wave; the dead-time generator then delays each turn-on so the two
//! gates can never conduct simultaneously ("break before make"):
//!
//! ```text
//! counter:   /\      /\      /\
//!           /  \    /  \    /  \
//!          /    \  /    \  /    \
//! logical: __----__ __----__ __--
//! high:    ___---__ ___---__ ___-      turn-on delayed by `rising`
//! low:     --____--- -____--- -__      turn-on delayed by `falling`
//! ```

use fugit::{HertzU32, NanosDurationU32};

use crate::{
    timer::{TimerClockConfig, TimerPairDriver},
    unit::{DisableAction, Leg, PwmUnit},
    Error,
};

/// Dead-time generator delays for one leg, in ticks of that leg's timer
/// clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeadTimeCfg {
    /// Delay of the high side turn-on after the low side turn-off.
    pub rising: u16,
    /// Delay of the low side turn-on after the high side turn-off.
    pub falling: u16,
}

/// Gate edge positions inside one up/down count, in timer ticks. The
/// hardware derives these from the compare point and the dead-time
/// registers on its own; this model only backs the non-overlap tests.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GateEdges {
    /// Low side turns off when the counter passes this tick counting up.
    pub low_off_up: u16,
    /// High side turns on when the counter passes this tick counting up.
    pub high_on_up: u16,
    /// High side turns off when the counter passes this tick counting down.
    pub high_off_down: u16,
    /// Low side turns on when the counter passes this tick counting down.
    pub low_on_down: u16,
}

impl DeadTimeCfg {
    /// Derive the two gate edges from the logical edge at `compare`.
    ///
    /// The logical rising edge splits into low-side turn-off at `compare`
    /// (up count) and high-side turn-on `rising` ticks later; the logical
    /// falling edge splits into high-side turn-off at `compare` (down count)
    /// and low-side turn-on `falling` ticks later. Edges saturate at the
    /// count boundaries.
    #[cfg(test)]
    pub(crate) fn apply(&self, compare: u16, period: u16) -> GateEdges {
        GateEdges {
            low_off_up: compare,
            high_on_up: compare.saturating_add(self.rising).min(period),
            high_off_down: compare,
            low_on_down: compare.saturating_sub(self.falling),
        }
    }
}

/// Converts requested dead times into counter ticks and guards the
/// dead-time invariant.
///
/// Lead and lag delays are independent; a leg configured with
/// [`symmetric`](Self::symmetric) uses the same value for both edges, which
/// is the common case for ZVS full bridges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeadTimeInserter {
    falling: NanosDurationU32,
    rising: NanosDurationU32,
}

impl DeadTimeInserter {
    /// Equal delay on both transitions.
    pub fn symmetric(dead_time: NanosDurationU32) -> Self {
        DeadTimeInserter {
            falling: dead_time,
            rising: dead_time,
        }
    }

    /// Independent delays for the falling and rising transition.
    pub fn configure(&mut self, falling: NanosDurationU32, rising: NanosDurationU32) {
        self.falling = falling;
        self.rising = rising;
    }

    /// Tick values for the given counter configuration.
    ///
    /// Rejected with [`Error::InvalidDeadTime`] when either delay reaches
    /// half the switching period (`period` register ticks), which would make
    /// the leg permanently non-conducting.
    pub fn ticks(&self, config: &TimerClockConfig) -> Result<DeadTimeCfg, Error> {
        let rising = to_ticks(self.rising, config.tick_rate());
        let falling = to_ticks(self.falling, config.tick_rate());
        let limit = config.period() as u64;
        if rising >= limit || falling >= limit {
            return Err(Error::InvalidDeadTime);
        }
        Ok(DeadTimeCfg {
            rising: rising as u16,
            falling: falling as u16,
        })
    }
}

fn to_ticks(duration: NanosDurationU32, tick_rate: HertzU32) -> u64 {
    // round to nearest tick; 64-bit keeps 160 MHz * u32 ns exact
    let ns = duration.ticks() as u64;
    (ns * tick_rate.raw() as u64 + 500_000_000) / 1_000_000_000
}

/// One converter leg: a counter, a dead-time generator and the safe-state
/// override for its two gate outputs.
pub struct LegController {
    leg: Leg,
    timer: TimerPairDriver,
    dead_time: DeadTimeInserter,
    disable_action: DisableAction,
}

impl LegController {
    pub(crate) fn new(
        leg: Leg,
        config: TimerClockConfig,
        dead_time: DeadTimeInserter,
        disable_action: DisableAction,
    ) -> Self {
        LegController {
            leg,
            timer: TimerPairDriver::new(leg, config),
            dead_time,
            disable_action,
        }
    }

    /// Check the configured dead times against a new counter configuration
    /// without writing anything.
    pub(crate) fn validate_clock(&self, config: &TimerClockConfig) -> Result<DeadTimeCfg, Error> {
        self.dead_time.ticks(config)
    }

    /// Apply a pre-validated counter configuration together with the
    /// matching dead-time ticks.
    pub(crate) fn apply_clock<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        config: TimerClockConfig,
        dead_time: DeadTimeCfg,
    ) {
        self.timer.apply_clock(unit, config);
        unit.write_dead_time(self.leg, dead_time);
    }

    /// Position this leg's logical edge relative to the shared counting
    /// reference.
    pub(crate) fn set_edge_reference<U: PwmUnit>(&self, unit: &mut U, ticks: u16) {
        self.timer.set_compare(unit, ticks);
    }

    /// Counter preload applied on the next sync event.
    pub(crate) fn set_phase<U: PwmUnit>(&self, unit: &mut U, ticks: u16) {
        self.timer.set_phase(unit, ticks);
    }

    /// Reprogram the dead-time generator for the current counter
    /// configuration.
    pub(crate) fn set_dead_time<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        dead_time: DeadTimeInserter,
    ) -> Result<(), Error> {
        let ticks = dead_time.ticks(self.timer.config())?;
        self.dead_time = dead_time;
        unit.write_dead_time(self.leg, ticks);
        Ok(())
    }

    /// Change the level applied while this leg is disabled or tripped. The
    /// hardware trip action follows so an autonomous shutdown and a software
    /// disable leave the gates at the same level.
    pub(crate) fn set_disable_action<U: PwmUnit>(
        &mut self,
        unit: &mut U,
        action: DisableAction,
    ) {
        self.disable_action = action;
        unit.write_trip_action(self.leg, action);
    }

    /// Force the outputs to this leg's disable action. Takes effect
    /// immediately, overriding the next computed edges.
    pub(crate) fn disable<U: PwmUnit>(&mut self, unit: &mut U) {
        unit.force_outputs(self.leg, self.disable_action);
    }

    /// Release the safe-state override.
    pub(crate) fn enable<U: PwmUnit>(&mut self, unit: &mut U) {
        unit.release_outputs(self.leg);
    }

    pub(crate) fn disable_action(&self) -> DisableAction {
        self.disable_action
    }

    pub(crate) fn config(&self) -> &TimerClockConfig {
        self.timer.config()
    }
}

#[cfg(test)]
mod tests {
    use fugit::{ExtU32, RateExtU32};

    use super::*;

    fn clock_100khz() -> TimerClockConfig {
        TimerClockConfig::with_frequency(160u32.MHz(), 100u32.kHz()).unwrap()
    }

    #[test]
    fn nanoseconds_convert_to_ticks() {
        let cfg = clock_100khz();
        let dt = DeadTimeInserter::symmetric(125u32.nanos());
        // 125 ns at 160 MHz = 20 ticks
        assert_eq!(
            dt.ticks(&cfg).unwrap(),
            DeadTimeCfg {
                rising: 20,
                falling: 20
            }
        );
    }

    #[test]
    fn dead_time_reaching_half_period_is_rejected() {
        let cfg = clock_100khz();
        // half the switching period is 800 ticks = 5000 ns
        let dt = DeadTimeInserter::symmetric(5_000u32.nanos());
        assert_eq!(dt.ticks(&cfg).err(), Some(Error::InvalidDeadTime));

        // one tick below the limit passes
        let mut dt = DeadTimeInserter::symmetric(0u32.nanos());
        dt.configure(4993u32.nanos(), 125u32.nanos());
        assert!(dt.ticks(&cfg).is_ok());
    }

    #[test]
    fn gate_edges_never_overlap() {
        let cfg = clock_100khz();
        let mid = cfg.period() / 2;
        for (falling, rising) in [(0u32, 0u32), (125, 125), (125, 250), (4000, 10)] {
            let mut dt = DeadTimeInserter::symmetric(0u32.nanos());
            dt.configure(falling.nanos(), rising.nanos());
            let edges = dt.ticks(&cfg).unwrap().apply(mid, cfg.period());
            // break-before-make on the up count...
            assert!(edges.high_on_up >= edges.low_off_up);
            // ...and on the down count (down counting runs toward zero)
            assert!(edges.low_on_down <= edges.high_off_down);
        }
    }

    #[test]
    fn zero_dead_time_keeps_complementary_edges_aligned() {
        let cfg = clock_100khz();
        let dt = DeadTimeInserter::symmetric(0u32.nanos());
        let edges = dt.ticks(&cfg).unwrap().apply(400, cfg.period());
        assert_eq!(edges.high_on_up, edges.low_off_up);
        assert_eq!(edges.low_on_down, edges.high_off_down);
    }
}
