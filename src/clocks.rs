//! Clock sources consumed by the PWM and MMC drivers
//!
//! The clock tree itself is owned by the platform. Drivers only see it through
//! [`ClockSource`]: look a clock up by name, read its rate, ask for a new rate,
//! and gate it.

use core::fmt::Write;

/// units per second
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Hertz(pub u32);

impl Hertz {
    /// `rate / div`, or 0 Hz for a zero divider.
    #[must_use]
    pub const fn div(self, div: u32) -> Hertz {
        match self.0.checked_div(div) {
            Some(rate) => Hertz(rate),
            None => Hertz(0),
        }
    }
}

/// Clock related error
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum ClockError {
    /// No clock is registered under the requested name. The platform may
    /// register it later, so resolution can be retried.
    NotFound,
    /// The clock name does not fit the name buffer.
    NameTooLong,
}

/// Platform clock tree, as seen by a driver.
pub trait ClockSource {
    /// Reference to one clock of the tree.
    type Handle;

    /// Look up a clock by name.
    fn resolve(&mut self, name: &str) -> Result<Self::Handle, ClockError>;

    /// Current rate of `clk`.
    fn rate(&self, clk: &Self::Handle) -> Hertz;

    /// Program the settable rate closest to `rate` and return what was achieved.
    fn set_rate(&mut self, clk: &Self::Handle, rate: Hertz) -> Hertz;

    /// Ungate `clk`.
    fn enable(&mut self, clk: &Self::Handle);

    /// Gate `clk`.
    fn disable(&mut self, clk: &Self::Handle);
}

const NAME_CAPACITY: usize = 32;

/// Clock name, `"<class>"` or `"<class>.<index>"`.
///
/// At most 32 bytes; longer names are rejected with [`ClockError::NameTooLong`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClockName(heapless::String<NAME_CAPACITY>);

impl ClockName {
    /// Name of a singleton clock.
    pub fn new(class: &str) -> Result<Self, ClockError> {
        let mut name = heapless::String::new();
        name.push_str(class).map_err(|_| ClockError::NameTooLong)?;
        Ok(Self(name))
    }

    /// Name of instance `index` of a clock class.
    pub fn indexed(class: &str, index: u32) -> Result<Self, ClockError> {
        let mut name = heapless::String::new();
        write!(name, "{}.{}", class, index).map_err(|_| ClockError::NameTooLong)?;
        Ok(Self(name))
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

/// Clock handle resolved on first use and kept for the owner's lifetime.
///
/// A failed lookup caches nothing, so the next call looks the clock up again.
pub struct CachedClock<H> {
    name: ClockName,
    handle: Option<H>,
}

impl<H> CachedClock<H> {
    /// Unresolved handle for the clock called `name`.
    pub fn new(name: ClockName) -> Self {
        Self { name, handle: None }
    }

    /// Clock name used for resolution.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Whether the clock has been resolved.
    pub fn is_resolved(&self) -> bool {
        self.handle.is_some()
    }

    /// Return the cached handle, resolving it through `clocks` if needed.
    pub fn get<C>(&mut self, clocks: &mut C) -> Result<&H, ClockError>
    where
        C: ClockSource<Handle = H>,
    {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => match clocks.resolve(self.name.as_str()) {
                Ok(handle) => {
                    debug!("clock {} resolved", self.name.as_str());
                    handle
                }
                Err(e) => {
                    warn!("clock {} not found", self.name.as_str());
                    return Err(e);
                }
            },
        };

        Ok(self.handle.insert(handle))
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockClocks;
    use super::*;

    #[test]
    fn indexed_name_is_class_dot_index() {
        assert_eq!(ClockName::indexed("nx-sdhc", 2).unwrap().as_str(), "nx-sdhc.2");
        assert_eq!(ClockName::new("pclk").unwrap().as_str(), "pclk");
    }

    #[test]
    fn oversized_name_is_rejected() {
        // 30-byte class: the dot fits, the index does not
        let class = "abcdefghijklmnopqrstuvwxyz0123";
        assert_eq!(ClockName::indexed(class, 12), Err(ClockError::NameTooLong));
        assert_eq!(
            ClockName::new("a-very-long-clock-class-name-indeed"),
            Err(ClockError::NameTooLong)
        );

        let full = "abcdefghijklmnopqrstuvwxyz012345";
        assert_eq!(ClockName::new(full).unwrap().as_str(), full);
        let name = ClockName::indexed("abcdefghijklmnopqrstuvwxyz01", 123).unwrap();
        assert_eq!(name.as_str().len(), NAME_CAPACITY);
    }

    #[test]
    fn handle_is_resolved_once() {
        let mut clocks = MockClocks::new().with_clock("nx-sdhc.0", 100_000_000);
        let mut clk = CachedClock::new(ClockName::indexed("nx-sdhc", 0).unwrap());

        assert_eq!(clk.get(&mut clocks).copied(), Ok(0));
        assert_eq!(clk.get(&mut clocks).copied(), Ok(0));
        assert_eq!(clocks.resolves, 1);
    }

    #[test]
    fn failed_resolution_is_retried() {
        let mut clocks = MockClocks::new();
        let mut clk = CachedClock::new(ClockName::new("pclk").unwrap());

        assert_eq!(clk.get(&mut clocks).copied(), Err(ClockError::NotFound));
        assert!(!clk.is_resolved());

        clocks.register("pclk", 200_000_000);
        assert_eq!(clk.get(&mut clocks).copied(), Ok(0));
        assert_eq!(clocks.resolves, 2);
        assert!(clk.is_resolved());
    }

    #[test]
    fn zero_divider_yields_zero_rate() {
        assert_eq!(Hertz(24_000_000).div(0), Hertz(0));
        assert_eq!(Hertz(24_000_000).div(16), Hertz(1_500_000));
    }
}
