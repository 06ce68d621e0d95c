//! Probe-time configuration handed in by the platform.
//!
//! Firmware parsing (device tree or otherwise) happens outside this crate;
//! the platform fills [`HostConfig`] from whatever source it has.

use alloc::string::String;
use alloc::vec::Vec;

use log::warn;

/// Firmware-described inbound mapping between PCIe bus and CPU addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRange {
    pub pcie_addr: u64,
    pub cpu_addr: u64,
    pub size: u64,
}

/// CPU-visible MMIO resource forwarded downstream through an outbound
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemWindow {
    pub cpu_addr: u64,
    pub pcie_addr: u64,
    pub size: u64,
}

/// MSI forwarding target used when an external interrupt controller owns
/// MSI delivery instead of the root complex itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExternalMsi {
    /// PCIe address endpoints write their MSI messages to.
    pub pcie_addr: u64,
    /// CPU physical address of the doorbell the write is remapped to.
    pub cpu_addr: u64,
}

/// CLKREQ# handshake policy for the reference clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClkReqMode {
    /// No power savings; refclk is driven unconditionally.
    Safe,
    /// L0s, L1 and L1 substates, without Clock Power Management.
    #[default]
    Default,
    /// Clock Power Management without L1 substates.
    NoL1ss,
}

impl ClkReqMode {
    /// Parses the configured mode string. A missing string selects
    /// `Default`; anything unrecognized falls back to `Safe` with a
    /// warning.
    pub fn from_config(mode: Option<&str>) -> Self {
        match mode {
            None | Some("default") => ClkReqMode::Default,
            Some("safe") => ClkReqMode::Safe,
            Some("no-l1ss") => ClkReqMode::NoL1ss,
            Some(other) => {
                warn!("invalid clkreq-mode {:?}, using safe mode", other);
                ClkReqMode::Safe
            }
        }
    }
}

/// Per-instance controller configuration.
#[derive(Debug, Default)]
pub struct HostConfig {
    /// Compatible string selecting the SoC variant table entry.
    pub compatible: String,
    /// Cap link speed to this generation (1..=3), if set.
    pub max_link_speed: Option<u8>,
    /// Negotiate spread-spectrum clocking once the link is up.
    pub enable_ssc: bool,
    pub enable_l1ss: bool,
    /// Enable RCB MPS mode in MISC_CTRL.
    pub enable_mps_rcb: bool,
    /// Do not advertise ASPM L0s.
    pub aspm_no_l0s: bool,
    /// Extra Tperst_clk settle time before PERST# release, in ms.
    pub tperst_clk_ms: Option<u32>,
    /// Raw clkreq-mode string; see [`ClkReqMode::from_config`].
    pub clkreq_mode: Option<String>,
    /// Memory-controller aperture sizes. Discovered from the DMA ranges
    /// when empty.
    pub memc_sizes: Vec<u64>,
    /// FIFO-level QoS map (backpressure mode, BCM2712).
    pub fifo_qos_map: Option<u32>,
    /// VDM priority QoS map (BCM2712).
    pub vdm_qos_map: Option<u32>,
    pub dma_ranges: Vec<DmaRange>,
    /// Outbound MMIO resources, at most four.
    pub windows: Vec<MemWindow>,
    /// The controller is its own MSI parent and runs the built-in MSI
    /// block.
    pub own_msi: bool,
    pub external_msi: Option<ExternalMsi>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clkreq_mode_parsing() {
        assert_eq!(ClkReqMode::from_config(None), ClkReqMode::Default);
        assert_eq!(ClkReqMode::from_config(Some("default")), ClkReqMode::Default);
        assert_eq!(ClkReqMode::from_config(Some("safe")), ClkReqMode::Safe);
        assert_eq!(ClkReqMode::from_config(Some("no-l1ss")), ClkReqMode::NoL1ss);
    }

    #[test]
    fn invalid_clkreq_mode_falls_back_to_safe() {
        assert_eq!(ClkReqMode::from_config(Some("fast")), ClkReqMode::Safe);
        assert_eq!(ClkReqMode::from_config(Some("")), ClkReqMode::Safe);
    }
}
