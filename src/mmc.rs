//! Clock unit of the DesignWare MMC host controller on Nexell SoCs
//!
//! Only the Nexell glue around the generic DesignWare core lives here: the
//! source clock of the host, the clock-select register and the sample/drive
//! delay tuning register. Command and data transfer belong to the generic host
//! layer, which receives the clock envelope in [`HostTiming`].

use crate::clocks::{CachedClock, ClockError, ClockName, ClockSource, Hertz};
use crate::mmio::Registers;

/// Clock class of the MMC hosts; instance `n` is called `"nx-sdhc.<n>"`.
pub const DEV_NAME_SDHC: &str = "nx-sdhc";

const CLKSEL: usize = 0x09C;
const CLKCTRL: usize = 0x114;

/// Identification-mode bus clock.
const MIN_FREQUENCY: Hertz = Hertz(400_000);

/// The source clock is set to this multiple of the requested bus frequency.
const SOURCE_CLOCK_MULTIPLIER: u32 = 4;

/// Phase shift of the sample or drive clock, in quarter cycles.
pub const SHIFT_0: u32 = 0x0;
/// 90 degrees
pub const SHIFT_1: u32 = 0x1;
/// 180 degrees
pub const SHIFT_2: u32 = 0x2;
/// 270 degrees
pub const SHIFT_3: u32 = 0x3;

/// Sample/drive tuning written to CLKCTRL.
///
/// Values are taken as they come from the board description and masked to
/// their field widths when packed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DelayConfig {
    /// Drive clock delay, 8 bits.
    pub drive_delay: u32,
    /// Drive clock phase shift, 2 bits.
    pub drive_shift: u32,
    /// Sample clock delay, 8 bits.
    pub sample_delay: u32,
    /// Sample clock phase shift, 2 bits.
    pub sample_shift: u32,
}

impl DelayConfig {
    /// CLKCTRL value.
    ///
    /// | bits  | field        |
    /// |-------|--------------|
    /// | 7:0   | drive delay  |
    /// | 15:8  | sample delay |
    /// | 17:16 | drive shift  |
    /// | 25:24 | sample shift |
    ///
    /// This layout follows the vendor register macro and its call site; it has not been checked
    /// against the hardware manual.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        (self.drive_delay & 0xff)
            | ((self.drive_shift & 0x3) << 16)
            | ((self.sample_delay & 0xff) << 8)
            | ((self.sample_shift & 0x3) << 24)
    }
}

/// CLKSEL contents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClockSelect {
    /// Sample clock phase shift.
    pub sample_shift: u32,
    /// Drive clock phase shift.
    pub drive_shift: u32,
    /// Divider between the source clock and the host clock.
    pub divider_ratio: u32,
}

impl ClockSelect {
    /// Clock selection for the normal or boosted host clock.
    #[must_use]
    pub const fn for_mode(boosted: bool) -> Self {
        Self {
            sample_shift: SHIFT_0,
            drive_shift: SHIFT_0,
            divider_ratio: if boosted { 1 } else { 3 },
        }
    }

    /// CLKSEL value.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.sample_shift | (self.drive_shift << 16) | (self.divider_ratio << 24)
    }
}

/// CLKSEL value for the normal or boosted host clock.
#[must_use]
pub const fn select_clock_mode(boosted: bool) -> u32 {
    ClockSelect::for_mode(boosted).bits()
}

/// MMC host configuration
#[derive(Copy, Clone, Debug)]
pub struct Config {
    /// Host instance number, also the clock index.
    pub index: u32,
    /// Maximum bus frequency in Hz; 0 leaves the source clock alone.
    pub frequency: u32,
    /// Data bus width in bits.
    pub bus_width: u8,
    /// Whether DDR at 52 MHz may be used.
    pub ddr: bool,
    /// Run the clock-select divider at ratio 1 instead of 3.
    pub boosted: bool,
    /// Sample/drive tuning.
    pub delay: DelayConfig,
    /// Clock class the source clock is looked up under.
    pub clock_class: &'static str,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            index: 0,
            frequency: 0,
            bus_width: 4,
            ddr: false,
            boosted: cfg!(feature = "boost-mmc"),
            delay: DelayConfig::default(),
            clock_class: DEV_NAME_SDHC,
        }
    }
}

/// Clock envelope handed to the generic host layer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostTiming {
    /// Identification-mode clock.
    pub f_min: Hertz,
    /// Highest bus clock.
    pub f_max: Hertz,
    /// Data bus width in bits.
    pub bus_width: u8,
    /// DDR at 52 MHz supported.
    pub ddr_52mhz: bool,
}

/// Nexell DesignWare MMC host clock unit.
pub struct DwMmc<R: Registers, C: ClockSource> {
    regs: R,
    clocks: C,
    clk: CachedClock<C::Handle>,
    config: Config,
}

impl<R: Registers, C: ClockSource> DwMmc<R, C> {
    /// Take ownership of the host registers and the clock tree.
    ///
    /// The source clock is looked up on first use; only its name is built here.
    pub fn new(regs: R, clocks: C, config: Config) -> Result<Self, ClockError> {
        Ok(Self {
            regs,
            clocks,
            clk: CachedClock::new(ClockName::indexed(config.clock_class, config.index)?),
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

    /// Host clock: half of the source clock.
    pub fn get_base_clock(&mut self) -> Result<Hertz, ClockError> {
        let clk = self.clk.get(&mut self.clocks)?;
        Ok(self.clocks.rate(clk).div(2))
    }

    /// Set the source clock as close to `rate` as the clock tree allows.
    ///
    /// The clock is gated while its rate changes. The achieved rate is
    /// returned as is; checking it against `rate` is up to the caller.
    pub fn set_clock(&mut self, rate: Hertz) -> Result<Hertz, ClockError> {
        let clk = self.clk.get(&mut self.clocks)?;

        self.clocks.disable(clk);
        let actual = self.clocks.set_rate(clk, rate);
        self.clocks.enable(clk);

        debug!("mmc{}: source clock {} Hz (requested {} Hz)", self.config.index, actual.0, rate.0);

        Ok(actual)
    }

    /// Write the sample/drive tuning. CLKCTRL is owned entirely by this write.
    pub fn program_delay(&self, delay: DelayConfig) {
        trace!("mmc{}: clkctrl {:#x}", self.config.index, delay.bits());
        self.regs.write(CLKCTRL, delay.bits());
    }

    /// Write CLKSEL for the mode chosen in the configuration.
    pub fn clksel(&self) {
        self.regs.write(CLKSEL, select_clock_mode(self.config.boosted));
    }

    /// Bring the clock unit up: source clock, delay tuning and clock select.
    ///
    /// Pin muxing and the controller reset are left to the platform.
    pub fn init(&mut self) -> Result<HostTiming, ClockError> {
        if self.config.frequency == 0 {
            warn!("mmc{}: no frequency configured, source clock left as is", self.config.index);
        } else {
            self.set_clock(Hertz(self.config.frequency.saturating_mul(SOURCE_CLOCK_MULTIPLIER)))?;
        }

        self.program_delay(self.config.delay);
        self.clksel();

        Ok(HostTiming {
            f_min: MIN_FREQUENCY,
            f_max: Hertz(self.config.frequency),
            bus_width: self.config.bus_width,
            ddr_52mhz: self.config.ddr,
        })
    }
}
