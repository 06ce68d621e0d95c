//! End-to-end bring-up scenarios against a fake register bus.

mod common;

use std::sync::Arc;

use common::*;
use pcie_brcmstb::{
    DmaRange, Error, HostConfig, MemWindow, PciAddress, Resources, RootComplex, SocVariant,
};

const SZ_1G: u64 = 1 << 30;

fn ready_bus() -> Arc<FakeBus> {
    let bus = Arc::new(FakeBus::default());
    bus.set(STATUS_REG, STATUS_RC_MODE | STATUS_LINK_UP);
    bus.set(REVISION_REG, HW_REV_MODERN);
    bus
}

fn base_config() -> HostConfig {
    HostConfig {
        compatible: "brcm,bcm7445-pcie".into(),
        dma_ranges: vec![DmaRange {
            pcie_addr: 0,
            cpu_addr: 0,
            size: SZ_1G,
        }],
        memc_sizes: vec![SZ_1G],
        windows: vec![MemWindow {
            cpu_addr: 0x6_0000_0000,
            pcie_addr: 0x6_0000_0000,
            size: SZ_1G,
        }],
        own_msi: true,
        ..HostConfig::default()
    }
}

#[test]
fn single_memc_keeps_msi_target_below_4g() {
    let bus = ready_bus();
    let mut rc = RootComplex::probe(bus.clone(), base_config(), default_resources()).unwrap();

    assert_eq!(rc.soc(), SocVariant::Generic);
    assert_eq!(rc.inbound_region(), (0, SZ_1G));
    assert_eq!(rc.msi_target_addr(), 0x0_ffff_fffc);

    // RC_BAR2 low word carries the offset with the size encoding in the
    // bottom bits: 1 GiB encodes as 15.
    assert_eq!(bus.get(0x4034), 15);
    assert_eq!(bus.get(0x4038), 0);

    // The MSI BAR low word carries the enable bit.
    assert_eq!(bus.get(0x4044), 0xffff_fffd);
    assert_eq!(bus.get(0x4048), 0);

    rc.add_bus(None).unwrap();
    assert!(rc.link_up());
}

#[test]
fn rounded_up_aperture_moves_msi_target_above_4g() {
    let bus = ready_bus();
    let mut cfg = base_config();
    cfg.dma_ranges = vec![DmaRange {
        pcie_addr: 0,
        cpu_addr: 0,
        size: 3 * SZ_1G,
    }];
    cfg.memc_sizes = vec![2 * SZ_1G, SZ_1G];

    let rc = RootComplex::probe(bus.clone(), cfg, default_resources()).unwrap();

    // 2 GiB + 1 GiB rounds up to a 4 GiB aperture covering all of low
    // memory, so the target moves above 4 GiB.
    assert_eq!(rc.inbound_region(), (0, 4 * SZ_1G));
    assert_eq!(rc.msi_target_addr(), 0xf_ffff_fffc);
    assert_eq!(bus.get(0x4048), 0xf);

    // SCB aperture fields hold log2(size) - 15 per memory controller.
    let misc_ctrl = bus.get(0x4008);
    assert_eq!((misc_ctrl >> 27) & 0x1f, 16);
    assert_eq!((misc_ctrl >> 22) & 0x1f, 15);
}

#[test]
fn link_down_fails_bring_up_but_not_registration() {
    let bus = Arc::new(FakeBus::default());
    bus.set(STATUS_REG, STATUS_RC_MODE); // link never trains
    bus.set(REVISION_REG, HW_REV_MODERN);

    let mut rc = RootComplex::probe(bus.clone(), base_config(), default_resources()).unwrap();

    assert_eq!(rc.add_bus(None).unwrap_err(), Error::IoTimeout("link training"));
    assert!(!rc.link_up());

    // The bridge itself stays reachable; downstream config space does not.
    assert_eq!(rc.map_config(PciAddress::new(0, 0, 0, 0), 0), Some(0));
    assert!(rc.map_config(PciAddress::new(0, 1, 0, 0), 0).is_none());
    assert_eq!(rc.cfg_read(PciAddress::new(0, 1, 0, 0), 0), 0xffff_ffff);
}

#[test]
fn endpoint_strapped_controller_is_rejected() {
    let bus = Arc::new(FakeBus::default());
    bus.set(REVISION_REG, HW_REV_MODERN);

    let err = RootComplex::probe(bus, base_config(), default_resources()).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn too_many_outbound_windows_is_a_config_error() {
    let bus = ready_bus();
    let mut cfg = base_config();
    cfg.windows = (0..5)
        .map(|i| MemWindow {
            cpu_addr: 0x6_0000_0000 + i * SZ_1G,
            pcie_addr: 0x6_0000_0000 + i * SZ_1G,
            size: SZ_1G,
        })
        .collect();

    let err = RootComplex::probe(bus, cfg, default_resources()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn unknown_compatible_is_a_config_error() {
    let bus = ready_bus();
    let mut cfg = base_config();
    cfg.compatible = "brcm,bcm9999-pcie".into();

    let err = RootComplex::probe(bus, cfg, default_resources()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn downstream_config_access_goes_through_the_index_window() {
    let bus = ready_bus();
    let rc = RootComplex::probe(bus.clone(), base_config(), default_resources()).unwrap();

    let mapped = rc.map_config(PciAddress::new(0, 1, 3, 2), 0x10).unwrap();
    assert_eq!(mapped, 0x8010);
    // bus 1, device 3, function 2 packed into the index register.
    assert_eq!(bus.get(0x9000), (1 << 20) | (3 << 15) | (2 << 12));
}

#[test]
fn msi_attach_happens_at_probe_and_detach_at_teardown() {
    let bus = ready_bus();
    let irq = RecordingIrq::default();
    let events = irq.events.clone();
    let resources = Resources {
        clk: Some(Box::new(NopClock)),
        rescal: Some(Box::new(NopReset)),
        msi_irq: Some(Box::new(irq)),
        ..Default::default()
    };

    let mut rc = RootComplex::probe(bus, base_config(), resources).unwrap();
    assert_eq!(*events.lock().unwrap(), vec!["attach"]);

    rc.teardown();
    assert_eq!(*events.lock().unwrap(), vec!["attach", "detach"]);
}

#[test]
fn suspend_and_resume_round_trip() {
    let bus = ready_bus();
    let mut rc = RootComplex::probe(bus.clone(), base_config(), default_resources()).unwrap();

    let supplies = CountingSupplies::default();
    let enables = supplies.enables.clone();
    let disables = supplies.disables.clone();

    rc.add_bus(Some(Box::new(supplies))).unwrap();
    assert_eq!(enables.load(std::sync::atomic::Ordering::SeqCst), 1);

    rc.suspend(|| false).unwrap();
    assert_eq!(disables.load(std::sync::atomic::Ordering::SeqCst), 1);

    rc.resume().unwrap();
    assert_eq!(enables.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert!(rc.link_up());

    // The MSI target registers were reinstalled after the register loss.
    assert_eq!(bus.get(0x4044), 0xffff_fffd);
}

#[test]
fn wake_capable_endpoint_keeps_supplies_on() {
    let bus = ready_bus();
    let mut rc = RootComplex::probe(bus, base_config(), default_resources()).unwrap();

    let supplies = CountingSupplies::default();
    let enables = supplies.enables.clone();
    let disables = supplies.disables.clone();

    rc.add_bus(Some(Box::new(supplies))).unwrap();
    rc.suspend(|| true).unwrap();
    assert_eq!(disables.load(std::sync::atomic::Ordering::SeqCst), 0);

    rc.resume().unwrap();
    // Supplies were never turned off, so resume does not enable them
    // again.
    assert_eq!(enables.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[test]
fn tperst_clk_holds_the_perst_debug_bit() {
    let bus = ready_bus();
    let mut cfg = base_config();
    cfg.tperst_clk_ms = Some(50);

    let mut rc = RootComplex::probe(bus.clone(), cfg, default_resources()).unwrap();
    rc.start_link().unwrap();
    // The forced-PERST debug bit must be released again by the time the
    // link is up.
    assert_eq!(bus.get(0x4204) & 0x8, 0);
}
