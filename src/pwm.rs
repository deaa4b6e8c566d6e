//! implements the PWM timer block of Nexell (and older Samsung S5P) SoCs
// =====
// The block holds five 32-bit down-counting timers:
//  - timers 0..=3 have a reload buffer (TCNTBn), a compare buffer (TCMPBn) and an output pin
//  - timer 4 has a reload buffer only and is internal
//
// All timers share the prescalers in TCFG0 (timers 0-1 and 2-4 each share an 8-bit prescaler),
// the per-timer 4-bit mux in TCFG1 (power-of-two pre-divider) and the control register TCON.
//
// A new reload/compare pair is latched into the counter by the per-timer manual update bit in
// TCON. That bit has to be set and then cleared again; while it stays set the timer is held
// armed and does not free-run.
//
// Counters count down, so the output toggles when the counter reaches the compare value on its
// way from the reload value to zero. A compare value of `reload - duty_ticks` yields `duty_ticks`
// of active output per period.

use crate::clocks::{CachedClock, ClockError, ClockName, ClockSource, Hertz};
use crate::mmio::Registers;

const NS_IN_SEC: u32 = 1_000_000_000;

/// Number of timers in the block.
pub const MAX_CHANNELS: u8 = 5;

/// Input dividers tried, in order, by [`TinPolicy::Search`].
const SEARCH_DIVIDERS: [u32; 4] = [2, 4, 8, 16];

/// Name of the parent clock of the timer block.
pub const DEFAULT_PARENT_CLOCK: &str = "pclk";

mod regs {
    pub const TCFG0: usize = 0x00;
    pub const TCFG1: usize = 0x04;
    pub const TCON: usize = 0x08;
    pub const TCNTB0: usize = 0x0C;
    pub const TCMPB0: usize = 0x10;

    /// TCNTBn, TCMPBn and TCNTOn per timer
    pub const CHANNEL_STRIDE: usize = 3 * 4;

    /// timer 4 shares one auto-reload bit position with no inverter next to it
    pub const TCON4_AUTO_RELOAD: u32 = 1 << 22;

    const fn tcon_bit(ch: u8, pos: u32) -> u32 {
        if ch == 0 {
            1 << pos
        } else {
            1 << (ch as u32 * 4 + 4 + pos)
        }
    }

    pub const fn tcon_start(ch: u8) -> u32 {
        tcon_bit(ch, 0)
    }

    pub const fn tcon_update(ch: u8) -> u32 {
        tcon_bit(ch, 1)
    }

    pub const fn tcon_auto_reload(ch: u8) -> u32 {
        if ch < 4 {
            tcon_bit(ch, 3)
        } else {
            TCON4_AUTO_RELOAD
        }
    }

    pub const fn mux_div_shift(ch: u8) -> u32 {
        ch as u32 * 4
    }

    pub const fn tcntb(ch: u8) -> usize {
        TCNTB0 + ch as usize * CHANNEL_STRIDE
    }

    pub const fn tcmpb(ch: u8) -> usize {
        TCMPB0 + ch as usize * CHANNEL_STRIDE
    }
}

/// PWM error
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// Period or duty outside what the timer can represent.
    Range,
    /// Duty longer than the period.
    Invalid,
    /// The parent clock could not be resolved or is not running.
    ClockResolution,
    /// Channel index beyond the instance's channel count.
    UnsupportedChannel,
}

impl From<ClockError> for Error {
    fn from(_: ClockError) -> Self {
        Error::ClockResolution
    }
}

impl embedded_hal_1::pwm::Error for Error {
    fn kind(&self) -> embedded_hal_1::pwm::ErrorKind {
        match *self {
            Self::Range | Self::Invalid | Self::ClockResolution | Self::UnsupportedChannel => {
                embedded_hal_1::pwm::ErrorKind::Other
            }
        }
    }
}

/// How the timer input clock (tin) is derived from the parent clock.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TinPolicy {
    /// Read the prescaler and mux dividers back from TCFG0/TCFG1.
    ///
    /// Each register is written with 0 right before it is read, so what is read back is the
    /// value the hardware reports after that write, not necessarily the divider in use before.
    Readback,

    /// Take the first divider out of /2, /4, /8, /16 for which a full 16-bit count at the
    /// divided rate is slower than the requested frequency, else /16.
    ///
    /// Coarse and best-effort: it does not minimise the period error.
    Search,
}

/// Relation between the tick count of one period and the reload value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterMode {
    /// The counter includes zero: reload = ticks - 1 (Nexell).
    FromZero,
    /// reload = ticks (Samsung S5P).
    Inclusive,
}

cfg_if::cfg_if! {
    if #[cfg(feature = "nexell")] {
        const DEFAULT_TIN_POLICY: TinPolicy = TinPolicy::Readback;
        const DEFAULT_COUNTER_MODE: CounterMode = CounterMode::FromZero;
    } else if #[cfg(feature = "s5p")] {
        const DEFAULT_TIN_POLICY: TinPolicy = TinPolicy::Search;
        const DEFAULT_COUNTER_MODE: CounterMode = CounterMode::Inclusive;
    } else {
        const DEFAULT_TIN_POLICY: TinPolicy = TinPolicy::Readback;
        const DEFAULT_COUNTER_MODE: CounterMode = CounterMode::FromZero;
    }
}

/// PWM configuration
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Timer input clock derivation.
    pub tin_policy: TinPolicy,
    /// Reload value semantics.
    pub counter_mode: CounterMode,
    /// Number of timers wired up on this instance, at most [`MAX_CHANNELS`].
    pub channels: u8,
    /// Name of the parent clock.
    pub parent_clock: &'static str,
}

impl Default for Config {
    /// Family defaults selected by the `nexell` / `s5p` features, all five timers.
    fn default() -> Self {
        Self {
            tin_policy: DEFAULT_TIN_POLICY,
            counter_mode: DEFAULT_COUNTER_MODE,
            channels: MAX_CHANNELS,
            parent_clock: DEFAULT_PARENT_CLOCK,
        }
    }
}

/// Timer input clock chosen for a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TinRate {
    /// Rate fed into the counter.
    pub rate: Hertz,
    /// Divider selection: TCFG1 mux field for [`TinPolicy::Readback`], position in the
    /// /2, /4, /8, /16 sequence for [`TinPolicy::Search`].
    pub divider_index: u32,
}

/// Register values derived for one channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingResult {
    /// Value for TCNTBn.
    pub counter_reload: u32,
    /// Value for TCMPBn, already inverted for the down-counter.
    pub compare_value: u32,
    /// Divider selection the input clock came from.
    pub divider_index: u32,
}

/// Reject periods and duties the 32-bit nanosecond arithmetic cannot handle.
///
/// Anything up to one second fits, which keeps the whole derivation in 32 bits.
pub fn validate(period_ns: u32, duty_ns: u32) -> Result<(), Error> {
    if period_ns == 0 || period_ns > NS_IN_SEC || duty_ns > NS_IN_SEC {
        return Err(Error::Range);
    }

    if duty_ns > period_ns {
        return Err(Error::Invalid);
    }

    Ok(())
}

/// [`TinPolicy::Search`] for a parent clock and a requested output frequency.
pub fn search_tin(parent: Hertz, freq: u32) -> TinRate {
    for (index, &div) in SEARCH_DIVIDERS.iter().enumerate() {
        if parent.0 / (div << 16) < freq {
            return TinRate {
                rate: parent.div(div),
                divider_index: index as u32,
            };
        }
    }

    TinRate {
        rate: parent.div(16),
        divider_index: (SEARCH_DIVIDERS.len() - 1) as u32,
    }
}

/// Derive reload and compare values for `period_ns`/`duty_ns` at input clock `tin`.
pub fn compute_timing(period_ns: u32, duty_ns: u32, tin: TinRate, mode: CounterMode) -> Result<TimingResult, Error> {
    validate(period_ns, duty_ns)?;

    if tin.rate.0 == 0 {
        return Err(Error::ClockResolution);
    }

    let tin_ns = NS_IN_SEC / tin.rate.0;
    if tin_ns == 0 {
        // input clock above 1 GHz
        return Err(Error::Range);
    }

    let ticks = period_ns / tin_ns;
    let counter_reload = match mode {
        CounterMode::FromZero => ticks.checked_sub(1).ok_or(Error::Range)?,
        CounterMode::Inclusive => ticks,
    };

    // counters count down
    let compare_raw = duty_ns / tin_ns;
    let compare_value = counter_reload - compare_raw.min(counter_reload);

    Ok(TimingResult {
        counter_reload,
        compare_value,
        divider_index: tin.divider_index,
    })
}

/// PWM timer block driver.
pub struct Pwm<R: Registers, C: ClockSource> {
    regs: R,
    clocks: C,
    pclk: CachedClock<C::Handle>,
    config: Config,
}

impl<R: Registers, C: ClockSource> Pwm<R, C> {
    /// Take ownership of the timer block registers and the clock tree.
    ///
    /// Fails with [`Error::ClockResolution`] if the parent clock name cannot be held.
    pub fn new(regs: R, clocks: C, mut config: Config) -> Result<Self, Error> {
        config.channels = config.channels.min(MAX_CHANNELS);

        Ok(Self {
            regs,
            clocks,
            pclk: CachedClock::new(ClockName::new(config.parent_clock)?),
            config,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Release the registers and the clock tree.
    pub fn free(self) -> (R, C) {
        (self.regs, self.clocks)
    }

    fn check_channel(&self, channel: u8) -> Result<(), Error> {
        if channel < self.config.channels {
            Ok(())
        } else {
            Err(Error::UnsupportedChannel)
        }
    }

    fn parent_rate(&mut self) -> Result<Hertz, Error> {
        let pclk = self.pclk.get(&mut self.clocks)?;
        Ok(self.clocks.rate(pclk))
    }

    /// Pick the timer input clock for generating `freq` on `channel`.
    pub fn derive_tin_rate(&mut self, channel: u8, freq: u32) -> Result<TinRate, Error> {
        self.check_channel(channel)?;
        let parent = self.parent_rate()?;

        let tin = match self.config.tin_policy {
            TinPolicy::Readback => {
                self.regs.write(regs::TCFG0, 0);
                let val = self.regs.read(regs::TCFG0);
                let prescaler = if channel < 2 { val & 0xff } else { (val >> 8) & 0xff };
                let div = prescaler + 1;

                self.regs.write(regs::TCFG1, 0);
                let val = self.regs.read(regs::TCFG1);
                let mux = (val >> regs::mux_div_shift(channel)) & 0xf;
                let pre_div = 1u32 << mux;

                TinRate {
                    rate: parent.div(div).div(pre_div),
                    divider_index: mux,
                }
            }
            TinPolicy::Search => search_tin(parent, freq),
        };

        trace!(
            "pwm{}: parent {} Hz, tin {} Hz (divider index {})",
            channel,
            parent.0,
            tin.rate.0,
            tin.divider_index
        );

        Ok(tin)
    }

    /// Program `channel` for a period of `period_ns` with `duty_ns` of it active.
    ///
    /// The new values take effect through the update handshake before this returns.
    pub fn set_config(&mut self, channel: u8, period_ns: u32, duty_ns: u32) -> Result<TimingResult, Error> {
        self.check_channel(channel)?;
        validate(period_ns, duty_ns)?;

        let frequency = NS_IN_SEC / period_ns;
        let tin = self.derive_tin_rate(channel, frequency)?;
        let timing = compute_timing(period_ns, duty_ns, tin, self.config.counter_mode)?;

        debug!(
            "pwm{}: period {} ns duty {} ns -> reload {} compare {}",
            channel,
            period_ns,
            duty_ns,
            timing.counter_reload,
            timing.compare_value
        );

        self.regs.write(regs::tcntb(channel), timing.counter_reload);
        // timer 4 has no compare buffer, its TCMPB slot is TCNTO4
        if channel < 4 {
            self.regs.write(regs::tcmpb(channel), timing.compare_value);
        }
        self.commit(channel);

        Ok(timing)
    }

    /// Latch the buffered reload/compare values of `channel` into its counter.
    fn commit(&self, channel: u8) {
        let update = regs::tcon_update(channel);
        let auto_reload = regs::tcon_auto_reload(channel);

        critical_section::with(|_| {
            let tcon = self.regs.read(regs::TCON) | update | auto_reload;
            self.regs.write(regs::TCON, tcon);
            self.regs.write(regs::TCON, tcon & !update);
        });
    }

    /// Start or stop the counter of `channel`.
    pub fn set_enable(&mut self, channel: u8, enable: bool) -> Result<(), Error> {
        self.check_channel(channel)?;

        let start = regs::tcon_start(channel);
        critical_section::with(|_| {
            self.regs.modify(regs::TCON, |tcon| if enable { tcon | start } else { tcon & !start });
        });

        Ok(())
    }

    /// Borrow `channel` as an `embedded-hal` duty-cycle output with a fixed period.
    pub fn channel(&mut self, channel: u8, period_ns: u32) -> Result<PwmChannel<'_, R, C>, Error> {
        self.check_channel(channel)?;
        validate(period_ns, 0)?;

        Ok(PwmChannel {
            pwm: self,
            channel,
            period_ns,
        })
    }
}

/// One timer of a [`Pwm`] block running at a fixed period.
pub struct PwmChannel<'a, R: Registers, C: ClockSource> {
    pwm: &'a mut Pwm<R, C>,
    channel: u8,
    period_ns: u32,
}

impl<R: Registers, C: ClockSource> PwmChannel<'_, R, C> {
    /// Period this channel was opened with.
    pub fn period_ns(&self) -> u32 {
        self.period_ns
    }

    /// Start or stop the timer.
    pub fn set_enable(&mut self, enable: bool) -> Result<(), Error> {
        self.pwm.set_enable(self.channel, enable)
    }
}

impl<R: Registers, C: ClockSource> embedded_hal_1::pwm::ErrorType for PwmChannel<'_, R, C> {
    type Error = Error;
}

impl<R: Registers, C: ClockSource> embedded_hal_1::pwm::SetDutyCycle for PwmChannel<'_, R, C> {
    fn max_duty_cycle(&self) -> u16 {
        u16::MAX
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let duty_ns = (u64::from(self.period_ns) * u64::from(duty) / u64::from(u16::MAX)) as u32;
        self.pwm.set_config(self.channel, self.period_ns, duty_ns).map(|_| ())
    }
}
