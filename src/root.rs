//! Root-complex bring-up and link management.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;

use bit_field::BitField;
use log::{error, info};
use pci_types::{ConfigRegionAccess, PciAddress};

use crate::bus::{rmw32, SocBus};
use crate::config::{ClkReqMode, HostConfig};
use crate::err::{Error, Result};
use crate::field;
use crate::mdio;
use crate::msi::MsiController;
use crate::regs::{self, HardDebug, LinkStatus};
use crate::resource::{RegulatorSupplies, Resources};
use crate::variant::{self, HookCtx, ResetHooks, SocVariant, VariantConfig};
use crate::window::{self, OutboundWindowRegs};

/// One PCIe host controller instance.
///
/// Owns the register bus, the variant configuration, every external
/// resource handle and the optional MSI controller. Probe brings the core
/// to the registers-programmed state; [`Self::add_bus`] (or
/// [`Self::start_link`] directly) releases PERST# and trains the link.
pub struct RootComplex<B: SocBus> {
    pub(crate) bus: Arc<B>,
    pub(crate) cfg: HostConfig,
    pub(crate) variant: &'static VariantConfig,
    pub(crate) resources: Resources,
    gen: u8,
    pub(crate) msi_target_addr: u64,
    pub(crate) msi: Option<MsiController<B>>,
    hw_rev: u32,
    inbound_size: u64,
    inbound_offset: u64,
    memc_sizes: Vec<u64>,
    pub(crate) ep_wakeup_capable: bool,
    pub(crate) supplies: Option<Box<dyn RegulatorSupplies>>,
}

impl<B: SocBus> RootComplex<B> {
    /// Brings the controller from reset to the registers-programmed state
    /// and installs the MSI layer. Failures unwind whatever was acquired,
    /// in reverse order.
    pub fn probe(bus: Arc<B>, cfg: HostConfig, resources: Resources) -> Result<Self> {
        let variant = variant::find(&cfg.compatible).ok_or_else(|| {
            error!("no variant entry for compatible {:?}", cfg.compatible);
            Error::Config("unknown compatible string")
        })?;

        let gen = cfg.max_link_speed.unwrap_or(0);

        let mut rc = Self {
            bus,
            cfg,
            variant,
            resources,
            gen,
            msi_target_addr: 0,
            msi: None,
            hw_rev: 0,
            inbound_size: 0,
            inbound_offset: 0,
            memc_sizes: Vec::new(),
            ep_wakeup_capable: false,
            supplies: None,
        };

        if let Some(clk) = rc.resources.clk.as_mut() {
            clk.prepare_enable().map_err(|e| {
                error!("could not enable clock: {}", e);
                e
            })?;
        }

        let _ = rc.bridge_reset_set(false);

        if let Err(e) = rc.pulse_swinit() {
            rc.disable_clock();
            return Err(e);
        }

        if let Some(rescal) = rc.resources.rescal.as_mut() {
            if let Err(e) = rescal.reset() {
                error!("failed to deassert 'rescal': {}", e);
                rc.disable_clock();
                return Err(e);
            }
        }

        if let Err(e) = rc.phy_start() {
            if let Some(rescal) = rc.resources.rescal.as_mut() {
                let _ = rescal.rearm();
            }
            rc.disable_clock();
            return Err(e);
        }

        if let Err(e) = rc.setup() {
            rc.teardown();
            return Err(e);
        }

        rc.hw_rev = rc.bus.read32(regs::MISC_REVISION);
        if rc.variant.soc == SocVariant::Bcm4908 && rc.hw_rev >= regs::HW_REV_3_20 {
            error!("hardware revision with unsupported PERST# setup");
            rc.teardown();
            return Err(Error::Unsupported("PERST# setup on this hardware revision"));
        }

        if rc.cfg.own_msi {
            let irq = match rc.resources.msi_irq.take() {
                Some(irq) => irq,
                None => {
                    error!("cannot map MSI interrupt");
                    rc.teardown();
                    return Err(Error::ResourceUnavailable("MSI interrupt line"));
                }
            };
            match MsiController::new(
                rc.bus.clone(),
                rc.msi_target_addr,
                rc.hw_rev,
                rc.variant.offsets.intr2_cpu_base,
                irq,
            ) {
                Ok(msi) => rc.msi = Some(msi),
                Err(e) => {
                    error!("probe of internal MSI failed");
                    rc.teardown();
                    return Err(e);
                }
            }
        } else if let Some(ext) = rc.cfg.external_msi {
            // Route MSI writes through RC_BAR1 to the external controller's
            // doorbell page.
            rc.bus.write32(
                regs::RC_BAR1_CONFIG_LO,
                ext.pcie_addr as u32 | window::encode_inbound_size(0x1000),
            );
            rc.bus
                .write32(regs::RC_BAR1_CONFIG_HI, (ext.pcie_addr >> 32) as u32);
            rc.bus.write32(
                regs::UBUS_BAR1_CONFIG_REMAP,
                ext.cpu_addr as u32 | regs::UBUS_BAR_CONFIG_REMAP_ACCESS_EN,
            );
            rc.bus
                .write32(regs::UBUS_BAR1_CONFIG_REMAP_HI, (ext.cpu_addr >> 32) as u32);
        }

        Ok(rc)
    }

    fn pulse_swinit(&mut self) -> Result<()> {
        let Some(swinit) = self.resources.swinit.as_mut() else {
            return Ok(());
        };
        swinit.assert().map_err(|e| {
            error!("could not assert reset 'swinit': {}", e);
            e
        })?;
        // 1 us for reset sync and propagation.
        self.bus.delay_us(1, 2);
        swinit.deassert().map_err(|e| {
            error!("could not deassert reset 'swinit': {}", e);
            e
        })
    }

    /// Programs every register needed before PERST# release; never touches
    /// PERST# itself. Re-run on resume since the block loses its state.
    pub(crate) fn setup(&mut self) -> Result<()> {
        // Reset the bridge, settle, release.
        self.bridge_reset_set(true)?;
        self.bus.delay_us(100, 200);
        self.bridge_reset_set(false)?;

        // Wake the SerDes and wait for it to stabilize.
        let hard_debug = self.variant.offsets.hard_debug;
        let mut tmp = HardDebug::from_bits_retain(self.bus.read32(hard_debug));
        tmp.remove(HardDebug::SERDES_IDDQ);
        self.bus.write32(hard_debug, tmp.bits());
        self.bus.delay_us(100, 200);

        if self.variant.soc == SocVariant::Bcm2712 {
            // 54 MHz (xosc) refclk source, then the L1SS errata PM clock
            // period of 18.52 ns.
            mdio::munge_refclk(self.bus.as_ref());
            let tmp = self.bus.read32(regs::RC_PL_PHY_CTL_15);
            self.bus.write32(
                regs::RC_PL_PHY_CTL_15,
                field::replace(tmp, regs::RC_PL_PHY_CTL_15_PM_CLK_PERIOD_MASK, 0x12),
            );
        }

        let tmp = self.bus.read32(regs::MISC_MISC_CTRL);
        let mut tmp = field::replace(tmp, regs::MISC_CTRL_SCB_ACCESS_EN_MASK, 1);
        tmp = field::replace(tmp, regs::MISC_CTRL_CFG_READ_UR_MODE_MASK, 1);
        tmp = field::replace(tmp, regs::MISC_CTRL_MAX_BURST_SIZE_MASK, self.variant.burst);
        if self.cfg.enable_mps_rcb {
            tmp = field::replace(tmp, regs::MISC_CTRL_RCB_MPS_MODE_MASK, 1);
        }
        self.bus.write32(regs::MISC_MISC_CTRL, tmp);

        self.set_tc_qos();

        let inbound = window::compute_inbound_region(
            &self.cfg.dma_ranges,
            &self.cfg.memc_sizes,
            self.variant.first_dma_range_only,
        )?;

        let tmp = field::replace(
            inbound.pcie_offset as u32,
            regs::RC_BAR_CONFIG_LO_SIZE_MASK,
            window::encode_inbound_size(inbound.size),
        );
        self.bus.write32(regs::RC_BAR2_CONFIG_LO, tmp);
        self.bus
            .write32(regs::RC_BAR2_CONFIG_HI, (inbound.pcie_offset >> 32) as u32);

        if !self.rc_mode() {
            error!("PCIe RC controller misconfigured as Endpoint");
            return Err(Error::Unsupported("controller strapped as endpoint"));
        }

        rmw32(
            self.bus.as_ref(),
            regs::UBUS_BAR2_CONFIG_REMAP,
            regs::UBUS_BAR_CONFIG_REMAP_ACCESS_EN,
            1,
        );

        // Each memory controller is viewed through its own SCB aperture.
        let mut tmp = self.bus.read32(regs::MISC_MISC_CTRL);
        for (memc, &size) in inbound.memc_sizes.iter().enumerate() {
            let scb_size_val = match size.checked_ilog2() {
                Some(log2) if log2 >= 15 => log2 - 15,
                _ => return Err(Error::Config("memc aperture too small")),
            };
            tmp = match memc {
                0 => field::replace(tmp, regs::MISC_CTRL_SCB0_SIZE_MASK, scb_size_val),
                1 => field::replace(tmp, regs::MISC_CTRL_SCB1_SIZE_MASK, scb_size_val),
                2 => field::replace(tmp, regs::MISC_CTRL_SCB2_SIZE_MASK, scb_size_val),
                _ => return Err(Error::Config("too many memory controllers")),
            };
        }
        self.bus.write32(regs::MISC_MISC_CTRL, tmp);

        if self.variant.soc == SocVariant::Bcm2712 {
            // Suppress AXI error responses and return all-ones on read
            // failures instead.
            let tmp = self.bus.read32(regs::MISC_UBUS_CTRL);
            let tmp = field::replace(tmp, regs::UBUS_CTRL_REPLY_ERR_DIS_MASK, 1);
            self.bus.write32(
                regs::MISC_UBUS_CTRL,
                field::replace(tmp, regs::UBUS_CTRL_REPLY_DECERR_DIS_MASK, 1),
            );
            self.bus.write32(regs::MISC_AXI_READ_ERROR_DATA, 0xffff_ffff);

            // The UBUS timeout also terminates CRS completion retries, so
            // both stay large: 250 ms and ~240 ms in 750 MHz clocks.
            self.bus.write32(regs::MISC_UBUS_TIMEOUT, 0x0B2D_0000);
            self.bus.write32(regs::RC_CONFIG_RETRY_TIMEOUT, 0x0ABA_0000);
        }

        // Keep the MSI target in 32-bit space whenever the inbound viewport
        // leaves room for it; some endpoints cannot address a 64-bit
        // target.
        self.msi_target_addr = if inbound.pcie_offset >= regs::SZ_4G
            || inbound.pcie_offset + inbound.size < regs::SZ_4G
        {
            regs::MSI_TARGET_ADDR_LT_4GB
        } else {
            regs::MSI_TARGET_ADDR_GT_4GB
        };

        // The PCIe->GISB (RC_BAR1) and PCIe->SCB (RC_BAR3) windows stay
        // disabled.
        rmw32(
            self.bus.as_ref(),
            regs::RC_BAR1_CONFIG_LO,
            regs::RC_BAR_CONFIG_LO_SIZE_MASK,
            0,
        );
        rmw32(
            self.bus.as_ref(),
            regs::RC_BAR3_CONFIG_LO,
            regs::RC_BAR_CONFIG_LO_SIZE_MASK,
            0,
        );

        // Advertise L1 always, L0s unless the config opts out.
        let mut aspm_support = 0b10;
        if !self.cfg.aspm_no_l0s {
            aspm_support |= 0b01;
        }
        rmw32(
            self.bus.as_ref(),
            regs::RC_CFG_PRIV1_LINK_CAPABILITY,
            regs::RC_CFG_PRIV1_LINK_CAPABILITY_ASPM_SUPPORT_MASK,
            aspm_support,
        );

        self.setup_extra_inbound_wins();

        // Present the RC as a PCIe-PCIe bridge instead of the endpoint the
        // core defaults to.
        rmw32(
            self.bus.as_ref(),
            regs::RC_CFG_PRIV1_ID_VAL3,
            regs::RC_CFG_PRIV1_ID_VAL3_CLASS_CODE_MASK,
            regs::CLASS_CODE_PCI_PCI_BRIDGE,
        );

        if self.cfg.windows.len() > regs::NUM_OUT_WINS {
            error!("too many outbound windows");
            return Err(Error::Config(
                "more outbound windows than the hardware implements",
            ));
        }
        for (win, w) in self.cfg.windows.iter().enumerate() {
            self.set_outbound_win(win as u8, w.cpu_addr, w.pcie_addr, w.size);
        }

        // Inbound data is presented little-endian.
        rmw32(
            self.bus.as_ref(),
            regs::RC_CFG_VENDOR_SPECIFIC_REG1,
            regs::RC_CFG_VENDOR_SPECIFIC_REG1_ENDIAN_MODE_BAR2_MASK,
            regs::RC_CFG_VENDOR_SPECIFIC_REG1_LITTLE_ENDIAN,
        );

        self.inbound_size = inbound.size;
        self.inbound_offset = inbound.pcie_offset;
        self.memc_sizes = inbound.memc_sizes;
        Ok(())
    }

    /// RC_BAR4..RC_BAR10 on chips that have them, each a viewport onto one
    /// additional DMA range. Stops silently when the ranges run out; these
    /// windows are optional.
    fn setup_extra_inbound_wins(&self) {
        for win in 0..self.variant.extra_inbound_wins {
            let Some(range) = self.cfg.dma_ranges.get(1 + win as usize) else {
                break;
            };
            let tmp = field::replace(
                range.pcie_addr as u32,
                regs::RC_BAR_CONFIG_LO_SIZE_MASK,
                window::encode_inbound_size(range.size),
            );
            self.bus.write32(regs::rc_bar_extra_config_lo(win), tmp);
            self.bus.write32(
                regs::rc_bar_extra_config_lo(win) + 4,
                (range.pcie_addr >> 32) as u32,
            );

            self.bus.write32(
                regs::ubus_bar_extra_remap_hi(win),
                (range.cpu_addr >> 32) as u32 & regs::UBUS_BAR_CONFIG_REMAP_HI_MASK,
            );
            self.bus.write32(
                regs::ubus_bar_extra_remap_lo(win),
                (range.cpu_addr as u32 & regs::UBUS_BAR_CONFIG_REMAP_LO_MASK)
                    | regs::UBUS_BAR_CONFIG_REMAP_ACCESS_EN,
            );
        }
    }

    fn set_outbound_win(&self, win: u8, cpu_addr: u64, pcie_addr: u64, size: u64) {
        let w = OutboundWindowRegs::compute(cpu_addr, pcie_addr, size);

        self.bus.write32(regs::mem_win0_lo(win), w.pcie_addr_lo);
        self.bus.write32(regs::mem_win0_hi(win), w.pcie_addr_hi);

        let mask = regs::MEM_WIN0_BASE_LIMIT_BASE_MASK | regs::MEM_WIN0_BASE_LIMIT_LIMIT_MASK;
        let tmp = self.bus.read32(regs::mem_win0_base_limit(win));
        self.bus
            .write32(regs::mem_win0_base_limit(win), (tmp & !mask) | w.base_limit);

        if self.variant.no_outbound_hi {
            return;
        }
        let tmp = self.bus.read32(regs::mem_win0_base_hi(win));
        self.bus.write32(
            regs::mem_win0_base_hi(win),
            (tmp & !regs::MEM_WIN0_BASE_HI_BASE_MASK) | w.base_hi,
        );
        let tmp = self.bus.read32(regs::mem_win0_limit_hi(win));
        self.bus.write32(
            regs::mem_win0_limit_hi(win),
            (tmp & !regs::MEM_WIN0_LIMIT_HI_LIMIT_MASK) | w.limit_hi,
        );
    }

    /// BCM2712 AXI QoS programming: chicken bits first, then either the
    /// FIFO-level backpressure map or the VDM priority map from the
    /// configuration.
    fn set_tc_qos(&self) {
        use regs::AxiIntfCtrl;

        if self.variant.soc != SocVariant::Bcm2712 {
            return;
        }

        // QoS forwarding search is broken on this part; force the fixes on.
        let mut tmp = AxiIntfCtrl::from_bits_retain(self.bus.read32(regs::MISC_AXI_INTF_CTRL));
        tmp.remove(AxiIntfCtrl::REQFIFO_EN_QOS_PROPAGATION);
        tmp.insert(
            AxiIntfCtrl::EN_RCLK_QOS_ARRAY_FIX
                | AxiIntfCtrl::EN_QOS_UPDATE_TIMING_FIX
                | AxiIntfCtrl::DIS_QOS_GATING_IN_MASTER,
        );
        self.bus.write32(regs::MISC_AXI_INTF_CTRL, tmp.bits());

        // If the timing-fix bit reads back as reserved-0 this is an older
        // stepping or a single-lane RC; throttle in-flight AXI requests
        // instead.
        let tmp = self.bus.read32(regs::MISC_AXI_INTF_CTRL);
        if tmp & AxiIntfCtrl::EN_QOS_UPDATE_TIMING_FIX.bits() == 0 {
            self.bus.write32(
                regs::MISC_AXI_INTF_CTRL,
                field::replace(tmp, regs::AXI_MASTER_MAX_OUTSTANDING_MASK, 15),
            );
        }

        // VDM reception stays off unless a VDM map is configured.
        rmw32(
            self.bus.as_ref(),
            regs::MISC_CTRL_1,
            regs::MISC_CTRL_1_EN_VDM_QOS_CONTROL_MASK,
            0,
        );

        if let Some(map) = self.cfg.fifo_qos_map {
            // Backpressure mode: one QoS nibble per FIFO-level quartile,
            // the same map for every traffic class.
            let map = map & 0x0000_ffff;
            for queue in 0..8 {
                self.bus.write32(regs::tc_queue_to_qos_map(queue), map);
            }
            return;
        }

        if let Some(map) = self.cfg.vdm_qos_map {
            rmw32(
                self.bus.as_ref(),
                regs::MISC_CTRL_1,
                regs::MISC_CTRL_1_EN_VDM_QOS_CONTROL_MASK,
                1,
            );
            self.bus.write32(regs::VDM_PRIORITY_TO_QOS_MAP_LO, map);
            self.bus.write32(regs::VDM_PRIORITY_TO_QOS_MAP_HI, map);

            // Match vendor ID 0 and take VDMs regardless of tag or vendor.
            self.bus.write32(regs::RC_TL_VDM_CTL1, 0);
            let tmp = self.bus.read32(regs::RC_TL_VDM_CTL0);
            self.bus.write32(
                regs::RC_TL_VDM_CTL0,
                tmp | regs::RC_TL_VDM_CTL0_VDM_ENABLED_MASK
                    | regs::RC_TL_VDM_CTL0_VDM_IGNORETAG_MASK
                    | regs::RC_TL_VDM_CTL0_VDM_IGNOREVNDRID_MASK,
            );
        }
    }

    /// The core can serve in both RC and EP roles; reads the strap status.
    fn rc_mode(&self) -> bool {
        if self.variant.force_rc_mode {
            // The status bit reads back wrong on this chip; the variant
            // table pins it to RC mode.
            return true;
        }
        LinkStatus::from_bits_retain(self.bus.read32(regs::MISC_PCIE_STATUS))
            .contains(LinkStatus::RC_MODE)
    }

    /// Link-up means both the data link layer and the PHY report up.
    pub fn link_up(&self) -> bool {
        LinkStatus::from_bits_retain(self.bus.read32(regs::MISC_PCIE_STATUS))
            .contains(LinkStatus::DL_ACTIVE | LinkStatus::PHY_LINKUP)
    }

    /// Limits operation to a specific link generation.
    fn set_gen(&self, gen: u8) {
        info!("forcing gen {}", gen);

        let lnkcap = self
            .bus
            .read32(regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_LNKCAP);
        self.bus.write32(
            regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_LNKCAP,
            (lnkcap & !regs::PCI_EXP_LNKCAP_SLS) | gen as u32,
        );

        let lnkctl2 = self
            .bus
            .read16(regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_LNKCTL2);
        self.bus.write16(
            regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_LNKCTL2,
            (lnkctl2 & !0xf) | gen as u16,
        );
    }

    /// Releases PERST# and waits for link training. A link that stays down
    /// fails this call but not the bridge: enumeration can be retried
    /// later.
    pub fn start_link(&mut self) -> Result<()> {
        if self.gen > 0 {
            self.set_gen(self.gen);
        }

        let hard_debug = self.variant.offsets.hard_debug;
        match self.cfg.tperst_clk_ms {
            Some(ms) if ms > 0 => {
                // Lengthen Tperst_clk: keep PERST# forced low while the
                // internal reset releases, so refclk is stable well before
                // the deassertion the endpoint sees.
                let mut tmp = HardDebug::from_bits_retain(self.bus.read32(hard_debug));
                tmp.insert(HardDebug::PERST_ASSERT);
                self.bus.write32(hard_debug, tmp.bits());

                let _ = self.perst_set(false);
                self.bus.sleep_ms(ms);

                let mut tmp = HardDebug::from_bits_retain(self.bus.read32(hard_debug));
                tmp.remove(HardDebug::PERST_ASSERT);
                self.bus.write32(hard_debug, tmp.bits());
            }
            _ => self.perst_set(false)?,
        }

        // 100 ms from PERST# deassertion, per PCIe CEM r5.0 2.2.
        self.bus.sleep_ms(100);

        // Give the endpoint further time to wake, checking every 5 ms for
        // up to another 100 ms.
        let mut waited = 0;
        while waited < 100 && !self.link_up() {
            self.bus.sleep_ms(5);
            waited += 5;
        }

        if !self.link_up() {
            error!("link down");
            return Err(Error::IoTimeout("link training"));
        }

        self.config_clkreq();

        let mut ssc_good = false;
        if self.cfg.enable_ssc {
            match mdio::set_ssc(self.bus.as_ref()) {
                Ok(()) => ssc_good = true,
                Err(_) => error!("failed attempt to enter ssc mode"),
            }
        }

        let lnksta = self
            .bus
            .read16(regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_LNKSTA);
        let cls = field::get16(lnksta, regs::PCI_EXP_LNKSTA_CLS);
        let nlw = field::get16(lnksta, regs::PCI_EXP_LNKSTA_NLW);
        info!(
            "link up, gen {} x{} {}",
            cls,
            nlw,
            if ssc_good { "(SSC)" } else { "(!SSC)" }
        );

        // PERST# wipes the root control bits, taking CRS visibility with
        // them; slow endpoints need it back for enumeration.
        let rtcap = self
            .bus
            .read16(regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_RTCAP);
        if rtcap & regs::PCI_EXP_RTCAP_CRSVIS != 0 {
            let tmp = self
                .bus
                .read16(regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_RTCTL);
            self.bus.write16(
                regs::BRCM_PCIE_CAP_REGS + regs::PCI_EXP_RTCTL,
                field::replace16(tmp, regs::PCI_EXP_RTCTL_CRSSVE, 1),
            );
        }
        Ok(())
    }

    fn config_clkreq(&self) {
        let mode = ClkReqMode::from_config(self.cfg.clkreq_mode.as_deref());
        let hard_debug = self.variant.offsets.hard_debug;

        // Start from safe mode: both CLKREQ# control bits cleared.
        let mut ctl = HardDebug::from_bits_retain(self.bus.read32(hard_debug));
        ctl.remove(HardDebug::CLKREQ_DEBUG_ENABLE | HardDebug::L1SS_ENABLE);

        match mode {
            ClkReqMode::NoL1ss => {
                // Clock Power Management plus L0s/L1, but no L1 substates.
                // Un-advertise L1SS so the OS cannot drive the RC into a
                // state it will hang in.
                ctl.insert(HardDebug::CLKREQ_DEBUG_ENABLE);
                rmw32(
                    self.bus.as_ref(),
                    regs::RC_CFG_PRIV1_ROOT_CAP,
                    regs::RC_CFG_PRIV1_ROOT_CAP_L1SS_MODE_MASK,
                    2,
                );
            }
            ClkReqMode::Default => {
                // L0s/L1/L1SS without Clock Power Management.
                ctl.insert(HardDebug::L1SS_ENABLE);
                self.extend_rbus_timeout();
            }
            ClkReqMode::Safe => {}
        }
        self.bus.write32(hard_debug, ctl.bits());

        info!("clkreq-mode set to {:?}", mode);
    }

    /// Internal bus accesses can time out during L1SS sleep periods even
    /// without PCIe traffic; stretch the RGR1 timer to 4 s on parts that
    /// have it.
    fn extend_rbus_timeout(&self) {
        let Some(rgr1) = self.variant.offsets.rgr1_sw_init_1 else {
            return;
        };
        let timeout_us: u32 = 4_000_000;
        // The timer sits two registers below RGR1_SW_INIT_1 and counts in
        // 1/216,000,000 s units.
        self.bus.write32(rgr1 - 8, 216 * timeout_us);
    }

    /// Resolves a configuration-space access to an offset in the register
    /// block, or `None` when the target is unreachable: a root-bus slot
    /// other than the bridge itself, or any downstream access while the
    /// link is down (which would raise a CPU abort).
    pub fn map_config(&self, address: PciAddress, offset: u16) -> Option<u32> {
        let reg = (offset & !3) as u32;

        // Root-bus accesses go straight to the RC's own registers.
        if address.bus() == 0 {
            return if address.device() == 0 && address.function() == 0 {
                Some(reg)
            } else {
                None
            };
        }

        if !self.link_up() {
            return None;
        }

        let mut idx = 0u32;
        idx.set_bits(20..28, address.bus() as u32);
        idx.set_bits(15..20, address.device() as u32);
        idx.set_bits(12..15, address.function() as u32);
        self.bus.write32(regs::EXT_CFG_INDEX, idx);
        Some(regs::EXT_CFG_DATA + reg)
    }

    /// Reads config space; unreachable targets read as all-ones.
    pub fn cfg_read(&self, address: PciAddress, offset: u16) -> u32 {
        match self.map_config(address, offset) {
            Some(reg) => self.bus.read32(reg),
            None => 0xffff_ffff,
        }
    }

    /// Writes config space; writes to unreachable targets are dropped.
    pub fn cfg_write(&self, address: PciAddress, offset: u16, value: u32) {
        if let Some(reg) = self.map_config(address, offset) {
            self.bus.write32(reg, value);
        }
    }

    /// Root-bus attach hook: powers optional downstream supplies and starts
    /// the link. A link that stays down is reported but leaves the bridge
    /// attached; enumeration sees an empty bus until a retry.
    pub fn add_bus(&mut self, supplies: Option<Box<dyn RegulatorSupplies>>) -> Result<()> {
        if let Some(mut supplies) = supplies {
            match supplies.enable() {
                Ok(()) => self.supplies = Some(supplies),
                Err(e) => {
                    error!("can't enable regulators for downstream device: {}", e);
                }
            }
        }
        self.start_link()
    }

    /// Root-bus detach hook; releases the downstream supplies.
    pub fn remove_bus(&mut self) {
        if let Some(mut supplies) = self.supplies.take() {
            if supplies.disable().is_err() {
                error!("failed to disable regulators for downstream device");
            }
        }
    }

    /// Drives the companion PHY's PWRDN/RESET/DIG_RESET fields in order,
    /// with settle time after each step, then verifies the combined state.
    /// Stop runs the sequence in reverse.
    fn phy_cntl(&self, start: bool) -> Result<()> {
        const MASKS: [u32; 3] = [
            regs::PHY_CTRL_DAST_PWRDN_MASK,
            regs::PHY_CTRL_DAST_RESET_MASK,
            regs::PHY_CTRL_DAST_DIG_RESET_MASK,
        ];

        let mut combined_mask = 0;
        for step in 0..MASKS.len() {
            let i = if start { step } else { MASKS.len() - 1 - step };
            let tmp = self.bus.read32(regs::DVT_PMU_PCIE_PHY_CTRL);
            self.bus.write32(
                regs::DVT_PMU_PCIE_PHY_CTRL,
                field::replace(tmp, MASKS[i], start as u32),
            );
            self.bus.delay_us(50, 200);
            combined_mask |= MASKS[i];
        }

        let tmp = self.bus.read32(regs::DVT_PMU_PCIE_PHY_CTRL);
        let expected = if start { combined_mask } else { 0 };
        if tmp & combined_mask == expected {
            Ok(())
        } else {
            error!("failed to {} phy", if start { "start" } else { "stop" });
            Err(Error::IoTimeout("phy control verification"))
        }
    }

    pub(crate) fn phy_start(&self) -> Result<()> {
        if self.variant.has_phy {
            self.phy_cntl(true)
        } else {
            Ok(())
        }
    }

    pub(crate) fn phy_stop(&self) -> Result<()> {
        if self.variant.has_phy {
            self.phy_cntl(false)
        } else {
            Ok(())
        }
    }

    pub(crate) fn perst_set(&mut self, assert: bool) -> Result<()> {
        let hooks = self.variant.hooks;
        let mut ctx = HookCtx {
            io: self.bus.as_ref(),
            offsets: &self.variant.offsets,
            perst: self.resources.perst.as_mut().map(|r| &mut **r),
            bridge: self.resources.bridge.as_mut().map(|r| &mut **r),
        };
        hooks.perst_set(&mut ctx, assert)
    }

    pub(crate) fn bridge_reset_set(&mut self, assert: bool) -> Result<()> {
        let hooks = self.variant.hooks;
        let mut ctx = HookCtx {
            io: self.bus.as_ref(),
            offsets: &self.variant.offsets,
            perst: self.resources.perst.as_mut().map(|r| &mut **r),
            bridge: self.resources.bridge.as_mut().map(|r| &mut **r),
        };
        hooks.bridge_reset_set(&mut ctx, assert)
    }

    pub(crate) fn disable_clock(&mut self) {
        if let Some(clk) = self.resources.clk.as_mut() {
            clk.disable_unprepare();
        }
    }

    pub fn soc(&self) -> SocVariant {
        self.variant.soc
    }

    pub fn hw_rev(&self) -> u32 {
        self.hw_rev
    }

    /// MSI target address chosen during setup.
    pub fn msi_target_addr(&self) -> u64 {
        self.msi_target_addr
    }

    pub fn msi(&self) -> Option<&MsiController<B>> {
        self.msi.as_ref()
    }

    /// Main inbound aperture as (PCIe offset, size).
    pub fn inbound_region(&self) -> (u64, u64) {
        (self.inbound_offset, self.inbound_size)
    }

    /// Memory-controller view sizes discovered during setup.
    pub fn memc_sizes(&self) -> &[u64] {
        &self.memc_sizes
    }
}

impl<B: SocBus> core::fmt::Debug for RootComplex<B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RootComplex")
            .field("soc", &self.variant.soc)
            .field("hw_rev", &self.hw_rev)
            .field("inbound_offset", &self.inbound_offset)
            .field("inbound_size", &self.inbound_size)
            .finish_non_exhaustive()
    }
}

impl<B: SocBus> ConfigRegionAccess for RootComplex<B> {
    unsafe fn read(&self, address: PciAddress, offset: u16) -> u32 {
        self.cfg_read(address, offset)
    }

    unsafe fn write(&self, address: PciAddress, offset: u16, value: u32) {
        self.cfg_write(address, offset, value)
    }
}
