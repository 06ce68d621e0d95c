//! Broadcom STB PCIe root-complex driver core.
//!
//! Bring-up, link management, MSI and power transitions for the PCIe host
//! controller found across the Broadcom STB/BCM SoC families. Platform
//! integration plugs in through the traits in [`SocBus`] and the resource
//! capabilities in [`Resources`]; bus enumeration software consumes the
//! [`pci_types::ConfigRegionAccess`] implementation on [`RootComplex`].
//!
//! The [`zboot`] module is an independent boot-image decompression stub
//! sharing nothing with the controller core.

#![no_std]

extern crate alloc;

mod bus;
mod config;
mod err;
mod field;
mod mdio;
mod msi;
mod power;
mod regs;
mod resource;
mod root;
mod variant;
mod window;
pub mod zboot;

pub use bus::{MmioBus, SocBus};
pub use config::{ClkReqMode, DmaRange, ExternalMsi, HostConfig, MemWindow};
pub use err::{Error, Result};
pub use msi::{MsiController, MsiMsg, MSI_LEGACY_SLOTS, MSI_SLOTS};
pub use resource::{ChainedIrq, ClockControl, RegulatorSupplies, ResetControl, Resources};
pub use root::RootComplex;
pub use variant::{RegOffsets, SocVariant, VariantConfig};
pub use window::{compute_inbound_region, encode_inbound_size, InboundRegion, OutboundWindowRegs};

pub use pci_types::{ConfigRegionAccess, PciAddress};
