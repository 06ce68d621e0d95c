//! Per-SoC-family static configuration and reset hook dispatch.
//!
//! The PERST# and bridge software-init controls moved around between chip
//! generations; each variant carries a hook pair that knows where its bits
//! live. Everything else that differs (register offsets, burst encoding,
//! window counts, quirks) is plain data in [`VariantConfig`].

use enum_dispatch::enum_dispatch;
use log::error;

use crate::bus::SocBus;
use crate::err::{Error, Result};
use crate::field;
use crate::regs;
use crate::resource::ResetControl;

/// Chip families sharing one register layout and quirk set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocVariant {
    Generic,
    Bcm4908,
    Bcm7278,
    Bcm2712,
}

/// Register offsets that moved between chip generations.
#[derive(Debug, Clone, Copy)]
pub struct RegOffsets {
    /// RGR1_SW_INIT_1 block; absent on chips that expose the bridge reset
    /// as a dedicated reset line instead.
    pub rgr1_sw_init_1: Option<u32>,
    pub hard_debug: u32,
    /// Shared INTR2 interrupt block used by legacy-mode MSI.
    pub intr2_cpu_base: u32,
}

/// Static configuration for one supported compatible string.
pub struct VariantConfig {
    pub soc: SocVariant,
    pub offsets: RegOffsets,
    /// The chip has a companion PHY that must be sequenced up and down.
    pub has_phy: bool,
    /// Additional RC_BAR4..RC_BAR10 inbound apertures fed from extra DMA
    /// ranges.
    pub extra_inbound_wins: u8,
    /// SCB_MAX_BURST_SIZE field value; the encoding differs per generation.
    pub burst: u32,
    /// The port-role status bit reads back wrong on this chip; treat the
    /// controller as an RC unconditionally.
    pub force_rc_mode: bool,
    /// Only the first DMA range feeds the main inbound aperture.
    pub first_dma_range_only: bool,
    /// The outbound high-address registers are absent; upper CPU address
    /// bits are dropped rather than programmed.
    pub no_outbound_hi: bool,
    pub(crate) hooks: VariantHooks,
}

/// Looks up the variant entry for a firmware compatible string.
pub fn find(compatible: &str) -> Option<&'static VariantConfig> {
    COMPAT_TABLE
        .iter()
        .find(|(compat, _)| *compat == compatible)
        .map(|(_, cfg)| *cfg)
}

static COMPAT_TABLE: &[(&str, &VariantConfig)] = &[
    ("brcm,bcm7445-pcie", &GENERIC_CFG),
    ("brcm,bcm4908-pcie", &BCM4908_CFG),
    ("brcm,bcm7278-pcie", &BCM7278_CFG),
    ("brcm,bcm7216-pcie", &BCM7216_CFG),
    ("brcm,bcm2712-pcie", &BCM2712_CFG),
];

const STB_OFFSETS: RegOffsets = RegOffsets {
    rgr1_sw_init_1: Some(0x9210),
    hard_debug: 0x4204,
    intr2_cpu_base: 0x4300,
};

const BCM7278_OFFSETS: RegOffsets = RegOffsets {
    rgr1_sw_init_1: Some(0xc010),
    hard_debug: 0x4204,
    intr2_cpu_base: 0x4300,
};

const BCM2712_OFFSETS: RegOffsets = RegOffsets {
    rgr1_sw_init_1: None,
    hard_debug: 0x4304,
    intr2_cpu_base: 0x4400,
};

static GENERIC_CFG: VariantConfig = VariantConfig {
    soc: SocVariant::Generic,
    offsets: STB_OFFSETS,
    has_phy: false,
    extra_inbound_wins: 0,
    burst: 0x2, // 512 bytes
    force_rc_mode: false,
    first_dma_range_only: false,
    no_outbound_hi: false,
    hooks: VariantHooks::Generic(GenericHooks),
};

static BCM4908_CFG: VariantConfig = VariantConfig {
    soc: SocVariant::Bcm4908,
    offsets: STB_OFFSETS,
    has_phy: false,
    extra_inbound_wins: 0,
    burst: 0x2, // 512 bytes
    force_rc_mode: false,
    first_dma_range_only: false,
    no_outbound_hi: false,
    hooks: VariantHooks::Bcm4908(Bcm4908Hooks),
};

static BCM7278_CFG: VariantConfig = VariantConfig {
    soc: SocVariant::Bcm7278,
    offsets: BCM7278_OFFSETS,
    has_phy: false,
    extra_inbound_wins: 0,
    burst: 0x3, // 512 bytes, shifted encoding
    force_rc_mode: false,
    first_dma_range_only: false,
    no_outbound_hi: false,
    hooks: VariantHooks::Bcm7278(Bcm7278Hooks),
};

static BCM7216_CFG: VariantConfig = VariantConfig {
    soc: SocVariant::Bcm7278,
    offsets: BCM7278_OFFSETS,
    has_phy: true,
    extra_inbound_wins: 0,
    burst: 0x3,
    force_rc_mode: false,
    first_dma_range_only: false,
    no_outbound_hi: false,
    hooks: VariantHooks::Bcm7278(Bcm7278Hooks),
};

static BCM2712_CFG: VariantConfig = VariantConfig {
    soc: SocVariant::Bcm2712,
    offsets: BCM2712_OFFSETS,
    has_phy: false,
    extra_inbound_wins: 7,
    burst: 0x1, // 128 bytes
    force_rc_mode: true,
    first_dma_range_only: true,
    no_outbound_hi: false,
    hooks: VariantHooks::Bcm2712(Bcm2712Hooks),
};

/// Borrowed view the reset hooks operate through.
pub(crate) struct HookCtx<'a> {
    pub io: &'a dyn SocBus,
    pub offsets: &'a RegOffsets,
    pub perst: Option<&'a mut (dyn ResetControl + 'static)>,
    pub bridge: Option<&'a mut (dyn ResetControl + 'static)>,
}

#[enum_dispatch]
pub(crate) trait ResetHooks {
    /// Drives PERST#; `assert == true` holds the bus in fundamental reset.
    fn perst_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()>;

    /// Drives the bridge software-init reset.
    fn bridge_reset_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()>;
}

#[enum_dispatch(ResetHooks)]
#[derive(Clone, Copy)]
pub(crate) enum VariantHooks {
    Generic(GenericHooks),
    Bcm4908(Bcm4908Hooks),
    Bcm7278(Bcm7278Hooks),
    Bcm2712(Bcm2712Hooks),
}

#[derive(Clone, Copy)]
pub(crate) struct GenericHooks;
#[derive(Clone, Copy)]
pub(crate) struct Bcm4908Hooks;
#[derive(Clone, Copy)]
pub(crate) struct Bcm7278Hooks;
#[derive(Clone, Copy)]
pub(crate) struct Bcm2712Hooks;

fn rgr1_field_set(ctx: &mut HookCtx<'_>, mask: u32, assert: bool) -> Result<()> {
    let offset = ctx
        .offsets
        .rgr1_sw_init_1
        .ok_or(Error::Config("chip has no RGR1_SW_INIT_1 block"))?;
    let tmp = ctx.io.read32(offset);
    ctx.io.write32(offset, field::replace(tmp, mask, assert as u32));
    Ok(())
}

/// PERSTB lives in PCIE_CTRL on newer chips and the assert level is
/// inverted.
fn perstb_set(ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
    let tmp = ctx.io.read32(regs::MISC_PCIE_CTRL);
    ctx.io.write32(
        regs::MISC_PCIE_CTRL,
        field::replace(tmp, regs::PCIE_CTRL_PERSTB_MASK, !assert as u32),
    );
    Ok(())
}

fn bridge_reset_line_or_rgr1(ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
    if let Some(bridge) = ctx.bridge.as_mut() {
        let ret = if assert {
            bridge.assert()
        } else {
            bridge.deassert()
        };
        if let Err(e) = ret {
            error!(
                "failed to {} 'bridge' reset: {}",
                if assert { "assert" } else { "deassert" },
                e
            );
            return Err(e);
        }
        return Ok(());
    }
    rgr1_field_set(ctx, regs::RGR1_SW_INIT_1_INIT_GENERIC_MASK, assert)
}

impl ResetHooks for GenericHooks {
    fn perst_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        rgr1_field_set(ctx, regs::RGR1_SW_INIT_1_PERST_MASK, assert)
    }

    fn bridge_reset_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        bridge_reset_line_or_rgr1(ctx, assert)
    }
}

impl ResetHooks for Bcm4908Hooks {
    fn perst_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        let Some(perst) = ctx.perst.as_mut() else {
            error!("missing PERST# reset controller");
            return Err(Error::Config("missing PERST# reset controller"));
        };
        let ret = if assert {
            perst.assert()
        } else {
            perst.deassert()
        };
        if let Err(e) = ret {
            error!(
                "failed to {} 'perst' reset: {}",
                if assert { "assert" } else { "deassert" },
                e
            );
            return Err(e);
        }
        Ok(())
    }

    fn bridge_reset_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        bridge_reset_line_or_rgr1(ctx, assert)
    }
}

impl ResetHooks for Bcm7278Hooks {
    fn perst_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        perstb_set(ctx, assert)
    }

    fn bridge_reset_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        rgr1_field_set(ctx, regs::RGR1_SW_INIT_1_INIT_7278_MASK, assert)
    }
}

impl ResetHooks for Bcm2712Hooks {
    fn perst_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        perstb_set(ctx, assert)
    }

    fn bridge_reset_set(&self, ctx: &mut HookCtx<'_>, assert: bool) -> Result<()> {
        let Some(bridge) = ctx.bridge.as_mut() else {
            error!("missing bridge reset controller");
            return Err(Error::Config("missing bridge reset controller"));
        };
        if assert {
            bridge.assert()
        } else {
            bridge.deassert()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_compatibles_resolve() {
        assert_eq!(find("brcm,bcm7445-pcie").unwrap().soc, SocVariant::Generic);
        assert_eq!(find("brcm,bcm4908-pcie").unwrap().soc, SocVariant::Bcm4908);
        assert_eq!(find("brcm,bcm7278-pcie").unwrap().soc, SocVariant::Bcm7278);
        assert_eq!(find("brcm,bcm2712-pcie").unwrap().soc, SocVariant::Bcm2712);
    }

    #[test]
    fn bcm7216_is_a_7278_with_phy() {
        let cfg = find("brcm,bcm7216-pcie").unwrap();
        assert_eq!(cfg.soc, SocVariant::Bcm7278);
        assert!(cfg.has_phy);
    }

    #[test]
    fn unknown_compatible_is_rejected() {
        assert!(find("brcm,bcm9999-pcie").is_none());
    }

    #[test]
    fn bcm2712_has_no_rgr1_block() {
        let cfg = find("brcm,bcm2712-pcie").unwrap();
        assert!(cfg.offsets.rgr1_sw_init_1.is_none());
        assert!(cfg.force_rc_mode);
        assert_eq!(cfg.extra_inbound_wins, 7);
    }
}
