//! Capability interfaces for the external clock, reset, supply and
//! interrupt providers.
//!
//! The platform hands these in at probe; the controller owns them
//! exclusively and releases them in teardown.

use alloc::boxed::Box;

use crate::err::Result;

/// The controller's functional clock.
pub trait ClockControl: Send {
    fn prepare_enable(&mut self) -> Result<()>;
    fn disable_unprepare(&mut self);
}

/// One reset line. `reset` pulses the line; `rearm` returns a shared line
/// to the state where the next `reset` fires again.
pub trait ResetControl: Send {
    fn assert(&mut self) -> Result<()>;
    fn deassert(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
    fn rearm(&mut self) -> Result<()>;
}

/// Bulk supply set powering downstream devices behind the root port.
pub trait RegulatorSupplies: Send {
    fn enable(&mut self) -> Result<()>;
    fn disable(&mut self) -> Result<()>;
}

/// The platform interrupt line carrying the controller's chained MSI
/// interrupt. Must be detached before the MSI domains are destroyed.
pub trait ChainedIrq: Send + Sync {
    fn attach(&mut self) -> Result<()>;
    fn detach(&mut self);
}

/// External resource handles for one controller instance. All lines are
/// optional; chips without a given line simply leave it `None`.
#[derive(Default)]
pub struct Resources {
    pub clk: Option<Box<dyn ClockControl>>,
    /// Shared analog calibration reset.
    pub rescal: Option<Box<dyn ResetControl>>,
    pub perst: Option<Box<dyn ResetControl>>,
    pub bridge: Option<Box<dyn ResetControl>>,
    pub swinit: Option<Box<dyn ResetControl>>,
    /// Interrupt line for the built-in MSI controller.
    pub msi_irq: Option<Box<dyn ChainedIrq>>,
}
