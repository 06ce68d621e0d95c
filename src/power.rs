//! Suspend, resume and teardown sequencing.
//!
//! These paths reverse the bring-up side effects in acquisition order and
//! keep going on best-effort steps: a PHY that will not stop or a rescal
//! line that will not rearm is logged, while failures that would leave
//! hardware half-powered propagate.

use log::error;

use crate::bus::{rmw32, SocBus};
use crate::err::Result;
use crate::regs::{self, HardDebug, LinkStatus};
use crate::root::RootComplex;
use crate::variant::SocVariant;

impl<B: SocBus> RootComplex<B> {
    /// Requests the L23 low-power link state and waits up to ~36 ms for the
    /// link to settle there. Timeout is logged, not fatal: power is coming
    /// off either way.
    fn enter_l23(&self) {
        rmw32(
            self.bus.as_ref(),
            regs::MISC_PCIE_CTRL,
            regs::PCIE_CTRL_L23_REQUEST_MASK,
            1,
        );

        let in_l23 = |rc: &Self| {
            LinkStatus::from_bits_retain(rc.bus.read32(regs::MISC_PCIE_STATUS))
                .contains(LinkStatus::LINK_IN_L23)
        };

        let mut l23 = in_l23(self);
        for _ in 0..15 {
            if l23 {
                break;
            }
            self.bus.delay_us(2000, 2400);
            l23 = in_l23(self);
        }
        if !l23 {
            error!("failed to enter low-power link state");
        }
    }

    /// Quiesces the link and powers the core down.
    pub(crate) fn turn_off(&mut self) -> Result<()> {
        if self.link_up() {
            self.enter_l23();
        }

        // Assert fundamental reset.
        self.perst_set(true)?;

        // Drop the L23 request in case it was left asserted.
        rmw32(
            self.bus.as_ref(),
            regs::MISC_PCIE_CTRL,
            regs::PCIE_CTRL_L23_REQUEST_MASK,
            0,
        );

        // SerDes off.
        let hard_debug = self.variant.offsets.hard_debug;
        let mut tmp = HardDebug::from_bits_retain(self.bus.read32(hard_debug));
        tmp.insert(HardDebug::SERDES_IDDQ);
        self.bus.write32(hard_debug, tmp.bits());

        // On BCM2712 the bridge shares the rescal block with the sibling
        // controller; asserting it here would hang the chip for the other
        // RC.
        if self.variant.soc == SocVariant::Bcm2712 {
            return Ok(());
        }
        self.bridge_reset_set(true)
    }

    /// Suspend path. `ep_may_wakeup` walks the enumerated bus (an external
    /// collaborator) and reports whether any downstream device is armed as
    /// a wake-up source; the supplies stay on for those.
    pub fn suspend(&mut self, ep_may_wakeup: impl FnOnce() -> bool) -> Result<()> {
        self.turn_off()?;

        // Resume re-runs the full PHY start sequence, so a stop failure
        // here only gets logged.
        if self.phy_stop().is_err() {
            error!("could not stop phy for suspend");
        }

        if let Some(rescal) = self.resources.rescal.as_mut() {
            if let Err(e) = rescal.rearm() {
                error!("could not rearm rescal reset");
                return Err(e);
            }
        }

        if self.supplies.is_some() {
            self.ep_wakeup_capable = ep_may_wakeup();
            if !self.ep_wakeup_capable {
                if let Err(e) = self.supplies.as_mut().unwrap().disable() {
                    error!("could not turn off regulators");
                    if let Some(rescal) = self.resources.rescal.as_mut() {
                        if rescal.reset().is_err() {
                            error!("failed to reset 'rescal' controller");
                        }
                    }
                    return Err(e);
                }
            }
        }

        self.disable_clock();
        Ok(())
    }

    /// Resume path: reverse of suspend, with a full register re-program
    /// because the block does not retain state. A failure mid-way unwinds
    /// what was re-acquired before propagating the original error.
    pub fn resume(&mut self) -> Result<()> {
        if let Some(clk) = self.resources.clk.as_mut() {
            clk.prepare_enable()?;
        }

        let mut past_supplies = false;
        let err = 'seq: {
            if let Some(rescal) = self.resources.rescal.as_mut() {
                if let Err(e) = rescal.reset() {
                    break 'seq Some(e);
                }
            }

            if let Err(e) = self.phy_start() {
                break 'seq Some(e);
            }

            // Bridge out of reset so the SerDes register is reachable.
            let _ = self.bridge_reset_set(false);

            let hard_debug = self.variant.offsets.hard_debug;
            let mut tmp = HardDebug::from_bits_retain(self.bus.read32(hard_debug));
            tmp.remove(HardDebug::SERDES_IDDQ);
            self.bus.write32(hard_debug, tmp.bits());
            self.bus.delay_us(100, 200);

            if let Err(e) = self.setup() {
                break 'seq Some(e);
            }

            if self.supplies.is_some() {
                if self.ep_wakeup_capable {
                    // The supplies were never turned off for the
                    // wake-capable endpoint; enabling them again would skew
                    // their use counts.
                    self.ep_wakeup_capable = false;
                } else if let Err(e) = self.supplies.as_mut().unwrap().enable() {
                    error!("could not turn on regulators");
                    break 'seq Some(e);
                }
            }
            past_supplies = true;

            if let Err(e) = self.start_link() {
                break 'seq Some(e);
            }

            if let Some(msi) = self.msi.as_ref() {
                msi.set_regs();
            }
            None
        };

        let Some(e) = err else {
            return Ok(());
        };

        if past_supplies {
            if let Some(supplies) = self.supplies.as_mut() {
                let _ = supplies.disable();
            }
        }
        if let Some(rescal) = self.resources.rescal.as_mut() {
            if rescal.rearm().is_err() {
                error!("failed to rearm 'rescal' reset");
            }
        }
        self.disable_clock();
        Err(e)
    }

    /// Full teardown for remove and probe-failure paths. The MSI controller
    /// goes first, and it detaches its chained handler before its domains
    /// drop. Everything afterwards is best-effort and idempotent.
    pub fn teardown(&mut self) {
        if let Some(msi) = self.msi.take() {
            msi.remove();
        }
        let _ = self.turn_off();
        if self.phy_stop().is_err() {
            error!("could not stop phy");
        }
        if let Some(rescal) = self.resources.rescal.as_mut() {
            if rescal.rearm().is_err() {
                error!("could not rearm rescal reset");
            }
        }
        self.disable_clock();
    }
}
