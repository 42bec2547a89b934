//! Per-leg counter configuration.
//!
//! Each leg owns one symmetric up/down counter. The counter runs over
//! `0..=period` and back, so one switching period is `2 * period` ticks of
//! the prescaled clock:
//!
//! `f_switch = clock / ((prescaler + 1) * 2 * period)`

use fugit::HertzU32;

use crate::{
    unit::{Leg, PwmUnit},
    Error,
};

/// Smallest accepted period register value. Below this there is no room to
/// place a compare edge between zero and the turning point.
pub(crate) const MIN_PERIOD: u16 = 4;

/// Derived counter configuration for one switching frequency.
///
/// Both legs share one `TimerClockConfig` so their periods stay equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerClockConfig {
    prescaler: u8,
    period: u16,
    tick_rate: HertzU32,
    frequency: HertzU32,
}

impl TimerClockConfig {
    /// Derive prescaler and period for the given target frequency.
    ///
    /// The smallest prescaler that lets the period fit the 16-bit register is
    /// chosen, maximizing edge resolution. Returns [`Error::InvalidFrequency`]
    /// if the target is zero, too high to resolve a compare edge
    /// (`period < MIN_PERIOD` even unprescaled) or too low for the counter
    /// width at the largest prescaler.
    pub fn with_frequency(clock: HertzU32, target: HertzU32) -> Result<Self, Error> {
        if target.raw() == 0 {
            return Err(Error::InvalidFrequency);
        }

        let clock_hz = clock.raw() as u64;
        let ticks_per_cycle = 2 * target.raw() as u64;

        // Smallest divider that brings the period into 16 bits.
        let div = clock_hz.div_ceil(ticks_per_cycle * u16::MAX as u64).max(1);
        if div > 256 {
            return Err(Error::InvalidFrequency);
        }

        let period = clock_hz / (ticks_per_cycle * div);
        if period < MIN_PERIOD as u64 {
            return Err(Error::InvalidFrequency);
        }

        let tick_rate = HertzU32::from_raw((clock_hz / div) as u32);
        let frequency = HertzU32::from_raw((clock_hz / (div * 2 * period)) as u32);

        Ok(TimerClockConfig {
            prescaler: (div - 1) as u8,
            period: period as u16,
            tick_rate,
            frequency,
        })
    }

    /// Period register value; equals half the switching period in ticks.
    pub fn period(&self) -> u16 {
        self.period
    }

    /// Rate the counter ticks at, after the prescaler.
    pub fn tick_rate(&self) -> HertzU32 {
        self.tick_rate
    }

    /// The actually achieved switching frequency, after integer
    /// quantization of prescaler and period.
    pub fn frequency(&self) -> HertzU32 {
        self.frequency
    }
}

/// Driver for one leg's up/down counter.
pub struct TimerPairDriver {
    leg: Leg,
    config: TimerClockConfig,
}

impl TimerPairDriver {
    pub(crate) fn new(leg: Leg, config: TimerClockConfig) -> Self {
        TimerPairDriver { leg, config }
    }

    /// Write prescaler and period. Shadow-registered, the hardware applies
    /// it at the next rollover.
    pub(crate) fn apply_clock<U: PwmUnit>(&mut self, unit: &mut U, config: TimerClockConfig) {
        self.config = config;
        unit.write_timer(self.leg, config.prescaler, config.period);
    }

    /// Place the logical switching edge within the count.
    pub(crate) fn set_compare<U: PwmUnit>(&self, unit: &mut U, ticks: u16) {
        debug_assert!(ticks <= self.config.period);
        unit.write_compare(self.leg, ticks);
    }

    /// Counter preload applied on the next sync event.
    pub(crate) fn set_phase<U: PwmUnit>(&self, unit: &mut U, ticks: u16) {
        debug_assert!(ticks <= self.config.period);
        unit.write_phase(self.leg, ticks);
    }

    pub(crate) fn config(&self) -> &TimerClockConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use fugit::RateExtU32;

    use super::*;

    const CLOCK: HertzU32 = HertzU32::from_raw(160_000_000);

    #[test]
    fn period_math_matches_up_down_counting() {
        let cfg = TimerClockConfig::with_frequency(CLOCK, 100u32.kHz()).unwrap();
        // 160 MHz / (2 * 100 kHz) = 800 ticks, no prescaling needed
        assert_eq!(cfg.period(), 800);
        assert_eq!(cfg.tick_rate(), CLOCK);
        assert_eq!(cfg.frequency(), HertzU32::kHz(100));
    }

    #[test]
    fn doubling_frequency_halves_period() {
        let slow = TimerClockConfig::with_frequency(CLOCK, 100u32.kHz()).unwrap();
        let fast = TimerClockConfig::with_frequency(CLOCK, 200u32.kHz()).unwrap();
        assert_eq!(fast.period(), slow.period() / 2);
    }

    #[test]
    fn config_is_deterministic() {
        let a = TimerClockConfig::with_frequency(CLOCK, 123_456u32.Hz()).unwrap();
        let b = TimerClockConfig::with_frequency(CLOCK, 123_456u32.Hz()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn low_frequencies_use_the_prescaler() {
        // 160 MHz / (2 * 100 Hz) = 800_000 ticks, needs a divider of 13
        let cfg = TimerClockConfig::with_frequency(CLOCK, 100u32.Hz()).unwrap();
        assert_eq!(cfg.prescaler, 12);
        assert!(cfg.period() <= u16::MAX);
        // achieved frequency within prescaler quantization of the target
        let achieved = cfg.frequency().raw();
        assert!((99..=101).contains(&achieved), "achieved {achieved} Hz");
    }

    #[test]
    fn out_of_range_frequencies_are_rejected() {
        // too low: counter width overflow even at the largest prescaler
        assert_eq!(
            TimerClockConfig::with_frequency(CLOCK, 4u32.Hz()).err(),
            Some(Error::InvalidFrequency)
        );
        // too high: period too short to resolve a compare edge
        assert_eq!(
            TimerClockConfig::with_frequency(CLOCK, 30u32.MHz()).err(),
            Some(Error::InvalidFrequency)
        );
        assert_eq!(
            TimerClockConfig::with_frequency(CLOCK, 0u32.Hz()).err(),
            Some(Error::InvalidFrequency)
        );
    }

    #[test]
    fn boundary_frequencies_are_accepted() {
        // period exactly MIN_PERIOD
        let cfg = TimerClockConfig::with_frequency(CLOCK, 20u32.MHz()).unwrap();
        assert_eq!(cfg.period(), MIN_PERIOD);
        // slowest accepted target, needs a divider of 245
        let cfg = TimerClockConfig::with_frequency(CLOCK, 5u32.Hz()).unwrap();
        assert_eq!(cfg.prescaler, 244);
        assert!(cfg.period() <= u16::MAX);
    }
}
