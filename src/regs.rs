//! Register map shared by the Broadcom STB PCIe family.
//!
//! Offsets that move between chip generations live in
//! [`crate::variant::RegOffsets`]; everything here is common. A number of
//! register names carry the term "BAR": a leftover from when the hard core
//! was an endpoint device. On the root complex those registers describe
//! inbound windows.

use bitflags::bitflags;

/// Offset of the mandatory PCIe capability block in RC config space.
pub(crate) const BRCM_PCIE_CAP_REGS: u32 = 0x00ac;

// Offsets and fields within the PCIe capability block.
pub(crate) const PCI_EXP_LNKCAP: u32 = 0x0c;
pub(crate) const PCI_EXP_LNKCAP_SLS: u32 = 0xf;
pub(crate) const PCI_EXP_LNKSTA: u32 = 0x12;
pub(crate) const PCI_EXP_LNKSTA_CLS: u16 = 0x000f;
pub(crate) const PCI_EXP_LNKSTA_NLW: u16 = 0x03f0;
pub(crate) const PCI_EXP_RTCTL: u32 = 0x1c;
pub(crate) const PCI_EXP_RTCTL_CRSSVE: u16 = 0x0010;
pub(crate) const PCI_EXP_RTCAP: u32 = 0x1e;
pub(crate) const PCI_EXP_RTCAP_CRSVIS: u16 = 0x0001;
pub(crate) const PCI_EXP_LNKCTL2: u32 = 0x30;

pub(crate) const RC_CFG_VENDOR_SPECIFIC_REG1: u32 = 0x0188;
pub(crate) const RC_CFG_VENDOR_SPECIFIC_REG1_ENDIAN_MODE_BAR2_MASK: u32 = 0xc;
pub(crate) const RC_CFG_VENDOR_SPECIFIC_REG1_LITTLE_ENDIAN: u32 = 0x0;

pub(crate) const RC_CFG_PRIV1_ID_VAL3: u32 = 0x043c;
pub(crate) const RC_CFG_PRIV1_ID_VAL3_CLASS_CODE_MASK: u32 = 0xff_ffff;
pub(crate) const CLASS_CODE_PCI_PCI_BRIDGE: u32 = 0x06_0400;

pub(crate) const RC_CFG_PRIV1_LINK_CAPABILITY: u32 = 0x04dc;
pub(crate) const RC_CFG_PRIV1_LINK_CAPABILITY_ASPM_SUPPORT_MASK: u32 = 0xc00;

pub(crate) const RC_CFG_PRIV1_ROOT_CAP: u32 = 0x04f8;
pub(crate) const RC_CFG_PRIV1_ROOT_CAP_L1SS_MODE_MASK: u32 = 0xf8;

pub(crate) const RC_TL_VDM_CTL0: u32 = 0x0a20;
pub(crate) const RC_TL_VDM_CTL0_VDM_ENABLED_MASK: u32 = 0x1_0000;
pub(crate) const RC_TL_VDM_CTL0_VDM_IGNORETAG_MASK: u32 = 0x2_0000;
pub(crate) const RC_TL_VDM_CTL0_VDM_IGNOREVNDRID_MASK: u32 = 0x4_0000;
pub(crate) const RC_TL_VDM_CTL1: u32 = 0x0a0c;

pub(crate) const RC_DL_MDIO_ADDR: u32 = 0x1100;
pub(crate) const RC_DL_MDIO_WR_DATA: u32 = 0x1104;
pub(crate) const RC_DL_MDIO_RD_DATA: u32 = 0x1108;

pub(crate) const RC_PL_PHY_CTL_15: u32 = 0x184c;
pub(crate) const RC_PL_PHY_CTL_15_PM_CLK_PERIOD_MASK: u32 = 0xff;

pub(crate) const MISC_MISC_CTRL: u32 = 0x4008;
pub(crate) const MISC_CTRL_RCB_MPS_MODE_MASK: u32 = 0x400;
pub(crate) const MISC_CTRL_SCB_ACCESS_EN_MASK: u32 = 0x1000;
pub(crate) const MISC_CTRL_CFG_READ_UR_MODE_MASK: u32 = 0x2000;
pub(crate) const MISC_CTRL_MAX_BURST_SIZE_MASK: u32 = 0x30_0000;
pub(crate) const MISC_CTRL_SCB0_SIZE_MASK: u32 = 0xf800_0000;
pub(crate) const MISC_CTRL_SCB1_SIZE_MASK: u32 = 0x07c0_0000;
pub(crate) const MISC_CTRL_SCB2_SIZE_MASK: u32 = 0x0000_001f;

pub(crate) const fn mem_win0_lo(win: u8) -> u32 {
    0x400c + win as u32 * 8
}
pub(crate) const fn mem_win0_hi(win: u8) -> u32 {
    0x4010 + win as u32 * 8
}

pub(crate) const RC_BAR1_CONFIG_LO: u32 = 0x402c;
pub(crate) const RC_BAR1_CONFIG_HI: u32 = 0x4030;
pub(crate) const RC_BAR2_CONFIG_LO: u32 = 0x4034;
pub(crate) const RC_BAR2_CONFIG_HI: u32 = 0x4038;
pub(crate) const RC_BAR3_CONFIG_LO: u32 = 0x403c;
pub(crate) const RC_BAR_CONFIG_LO_SIZE_MASK: u32 = 0x1f;

/// RC_BAR4..RC_BAR10 low words, one pair of registers per window.
pub(crate) const fn rc_bar_extra_config_lo(win: u8) -> u32 {
    0x40d4 + win as u32 * 8
}

pub(crate) const MSI_BAR_CONFIG_LO: u32 = 0x4044;
pub(crate) const MSI_BAR_CONFIG_HI: u32 = 0x4048;
pub(crate) const MSI_DATA_CONFIG: u32 = 0x404c;
pub(crate) const MSI_DATA_CONFIG_VAL_32: u32 = 0xffe0_6540;
pub(crate) const MSI_DATA_CONFIG_VAL_8: u32 = 0xfff8_6540;

pub(crate) const RC_CONFIG_RETRY_TIMEOUT: u32 = 0x405c;

pub(crate) const MISC_PCIE_CTRL: u32 = 0x4064;
pub(crate) const PCIE_CTRL_L23_REQUEST_MASK: u32 = 0x1;
pub(crate) const PCIE_CTRL_PERSTB_MASK: u32 = 0x4;

pub(crate) const MISC_PCIE_STATUS: u32 = 0x4068;

bitflags! {
    /// PCIE_MISC_PCIE_STATUS bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct LinkStatus: u32 {
        const PHY_LINKUP = 0x10;
        const DL_ACTIVE = 0x20;
        const LINK_IN_L23 = 0x40;
        const RC_MODE = 0x80;
    }
}

pub(crate) const MISC_REVISION: u32 = 0x406c;
pub(crate) const HW_REV_33: u32 = 0x0303;
pub(crate) const HW_REV_3_20: u32 = 0x0320;

pub(crate) const fn mem_win0_base_limit(win: u8) -> u32 {
    0x4070 + win as u32 * 4
}
pub(crate) const MEM_WIN0_BASE_LIMIT_LIMIT_MASK: u32 = 0xfff0_0000;
pub(crate) const MEM_WIN0_BASE_LIMIT_BASE_MASK: u32 = 0x0000_fff0;

pub(crate) const fn mem_win0_base_hi(win: u8) -> u32 {
    0x4080 + win as u32 * 8
}
pub(crate) const MEM_WIN0_BASE_HI_BASE_MASK: u32 = 0xff;

pub(crate) const fn mem_win0_limit_hi(win: u8) -> u32 {
    0x4084 + win as u32 * 8
}
pub(crate) const MEM_WIN0_LIMIT_HI_LIMIT_MASK: u32 = 0xff;

bitflags! {
    /// HARD_PCIE_HARD_DEBUG bits; the register offset is per-variant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct HardDebug: u32 {
        const CLKREQ_DEBUG_ENABLE = 0x2;
        const PERST_ASSERT = 0x8;
        const L1SS_ENABLE = 0x20_0000;
        const SERDES_IDDQ = 0x0800_0000;
    }
}

pub(crate) const MISC_CTRL_1: u32 = 0x40a0;
pub(crate) const MISC_CTRL_1_EN_VDM_QOS_CONTROL_MASK: u32 = 0x20;

pub(crate) const MISC_UBUS_CTRL: u32 = 0x40a4;
pub(crate) const UBUS_CTRL_REPLY_ERR_DIS_MASK: u32 = 1 << 13;
pub(crate) const UBUS_CTRL_REPLY_DECERR_DIS_MASK: u32 = 1 << 19;

pub(crate) const MISC_UBUS_TIMEOUT: u32 = 0x40a8;

pub(crate) const UBUS_BAR1_CONFIG_REMAP: u32 = 0x40ac;
pub(crate) const UBUS_BAR1_CONFIG_REMAP_HI: u32 = 0x40b0;
pub(crate) const UBUS_BAR2_CONFIG_REMAP: u32 = 0x40b4;
pub(crate) const UBUS_BAR_CONFIG_REMAP_ACCESS_EN: u32 = 0x1;
pub(crate) const UBUS_BAR_CONFIG_REMAP_LO_MASK: u32 = 0xffff_f000;
pub(crate) const UBUS_BAR_CONFIG_REMAP_HI_MASK: u32 = 0xff;

/// UBUS remap pairs matching RC_BAR4..RC_BAR10.
pub(crate) const fn ubus_bar_extra_remap_lo(win: u8) -> u32 {
    0x410c + win as u32 * 8
}
pub(crate) const fn ubus_bar_extra_remap_hi(win: u8) -> u32 {
    0x4110 + win as u32 * 8
}

/// AXI priority forwarding, one register per traffic-class queue.
pub(crate) const fn tc_queue_to_qos_map(queue: u8) -> u32 {
    0x4160 - queue as u32 * 4
}
pub(crate) const VDM_PRIORITY_TO_QOS_MAP_HI: u32 = 0x4164;
pub(crate) const VDM_PRIORITY_TO_QOS_MAP_LO: u32 = 0x4168;

pub(crate) const MISC_AXI_INTF_CTRL: u32 = 0x416c;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct AxiIntfCtrl: u32 {
        const EN_RCLK_QOS_ARRAY_FIX = 1 << 13;
        const EN_QOS_UPDATE_TIMING_FIX = 1 << 12;
        const DIS_QOS_GATING_IN_MASTER = 1 << 11;
        const REQFIFO_EN_QOS_PROPAGATION = 1 << 7;
    }
}

pub(crate) const AXI_MASTER_MAX_OUTSTANDING_MASK: u32 = 0x3f;

pub(crate) const MISC_AXI_READ_ERROR_DATA: u32 = 0x4170;

/// Interrupt block for the 64-slot MSI controller; legacy parts use the
/// variant's INTR2 CPU base instead.
pub(crate) const MSI_INTR2_BASE: u32 = 0x4500;

// Offsets from the interrupt block base.
pub(crate) const MSI_INT_STATUS: u32 = 0x0;
pub(crate) const MSI_INT_CLR: u32 = 0x8;
pub(crate) const MSI_INT_MASK_CLR: u32 = 0x14;

pub(crate) const EXT_CFG_DATA: u32 = 0x8000;
pub(crate) const EXT_CFG_INDEX: u32 = 0x9000;

// RGR1_SW_INIT_1 fields; the register offset is per-variant.
pub(crate) const RGR1_SW_INIT_1_PERST_MASK: u32 = 0x1;
pub(crate) const RGR1_SW_INIT_1_INIT_GENERIC_MASK: u32 = 0x2;
pub(crate) const RGR1_SW_INIT_1_INIT_7278_MASK: u32 = 0x1;

/// Companion PHY power/reset control block.
pub(crate) const DVT_PMU_PCIE_PHY_CTRL: u32 = 0xc700;
pub(crate) const PHY_CTRL_DAST_PWRDN_MASK: u32 = 0x1;
pub(crate) const PHY_CTRL_DAST_RESET_MASK: u32 = 0x2;
pub(crate) const PHY_CTRL_DAST_DIG_RESET_MASK: u32 = 0x4;

// MDIO sideband interface.
pub(crate) const MDIO_PORT0: u8 = 0x0;
pub(crate) const MDIO_DATA_MASK: u32 = 0x7fff_ffff;
pub(crate) const MDIO_PORT_MASK: u32 = 0xf_0000;
pub(crate) const MDIO_REGAD_MASK: u32 = 0xffff;
pub(crate) const MDIO_CMD_MASK: u32 = 0xfff0_0000;
pub(crate) const MDIO_CMD_READ: u32 = 0x1;
pub(crate) const MDIO_CMD_WRITE: u32 = 0x0;
pub(crate) const MDIO_DATA_DONE_MASK: u32 = 0x8000_0000;
pub(crate) const SSC_REGS_ADDR: u16 = 0x1100;
pub(crate) const SET_ADDR_OFFSET: u16 = 0x1f;
pub(crate) const SSC_CNTL_OFFSET: u16 = 0x2;
pub(crate) const SSC_CNTL_OVRD_EN_MASK: u32 = 0x8000;
pub(crate) const SSC_CNTL_OVRD_VAL_MASK: u32 = 0x4000;
pub(crate) const SSC_STATUS_OFFSET: u16 = 0x1;
pub(crate) const SSC_STATUS_SSC_MASK: u32 = 0x400;
pub(crate) const SSC_STATUS_PLL_LOCK_MASK: u32 = 0x800;

// Hardware limits.
pub(crate) const NUM_OUT_WINS: usize = 4;
pub(crate) const MAX_MEMC: usize = 3;

// MSI target addresses; bits [1:0] are ignored by the block.
pub(crate) const MSI_TARGET_ADDR_LT_4GB: u64 = 0x0_ffff_fffc;
pub(crate) const MSI_TARGET_ADDR_GT_4GB: u64 = 0xf_ffff_fffc;

pub(crate) const SZ_1M: u64 = 1 << 20;
pub(crate) const SZ_2G: u64 = 1 << 31;
pub(crate) const SZ_4G: u64 = 1 << 32;
