//! MDIO sideband access to the SerDes register banks.

use log::debug;

use crate::bus::SocBus;
use crate::err::{Error, Result};
use crate::field;
use crate::regs::*;

fn form_pkt(port: u8, regad: u16, cmd: u32) -> u32 {
    let mut pkt = 0;
    pkt = field::replace(pkt, MDIO_PORT_MASK, port as u32);
    pkt = field::replace(pkt, MDIO_REGAD_MASK, regad as u32);
    pkt = field::replace(pkt, MDIO_CMD_MASK, cmd);
    pkt
}

pub(crate) fn read(bus: &dyn SocBus, port: u8, regad: u16) -> Result<u32> {
    bus.write32(RC_DL_MDIO_ADDR, form_pkt(port, regad, MDIO_CMD_READ));
    bus.read32(RC_DL_MDIO_ADDR);

    // Completion polls at 10 us intervals for up to 100 us.
    for _ in 0..10 {
        let data = bus.read32(RC_DL_MDIO_RD_DATA);
        if data & MDIO_DATA_DONE_MASK != 0 {
            return Ok(field::get(data, MDIO_DATA_MASK));
        }
        bus.delay_us(10, 10);
    }
    Err(Error::IoTimeout("MDIO read completion"))
}

pub(crate) fn write(bus: &dyn SocBus, port: u8, regad: u16, wrdata: u16) -> Result<()> {
    bus.write32(RC_DL_MDIO_ADDR, form_pkt(port, regad, MDIO_CMD_WRITE));
    bus.read32(RC_DL_MDIO_ADDR);
    bus.write32(RC_DL_MDIO_WR_DATA, MDIO_DATA_DONE_MASK | wrdata as u32);

    for _ in 0..10 {
        let data = bus.read32(RC_DL_MDIO_WR_DATA);
        if data & MDIO_DATA_DONE_MASK == 0 {
            return Ok(());
        }
        bus.delay_us(10, 10);
    }
    Err(Error::IoTimeout("MDIO write completion"))
}

/// Negotiates Spread Spectrum Clocking and verifies both the SSC state and
/// PLL lock afterwards.
pub(crate) fn set_ssc(bus: &dyn SocBus) -> Result<()> {
    write(bus, MDIO_PORT0, SET_ADDR_OFFSET, SSC_REGS_ADDR)?;

    let mut tmp = read(bus, MDIO_PORT0, SSC_CNTL_OFFSET)?;
    tmp = field::replace(tmp, SSC_CNTL_OVRD_EN_MASK, 1);
    tmp = field::replace(tmp, SSC_CNTL_OVRD_VAL_MASK, 1);
    write(bus, MDIO_PORT0, SSC_CNTL_OFFSET, tmp as u16)?;

    bus.delay_us(1000, 2000);
    let status = read(bus, MDIO_PORT0, SSC_STATUS_OFFSET)?;
    let ssc = field::get(status, SSC_STATUS_SSC_MASK);
    let pll = field::get(status, SSC_STATUS_PLL_LOCK_MASK);

    if ssc != 0 && pll != 0 {
        Ok(())
    } else {
        Err(Error::IoTimeout("SSC state and PLL lock"))
    }
}

/// Reprograms the refclk input block for a 54 MHz crystal source (BCM2712).
/// Best effort; the part comes up with marginal defaults either way.
pub(crate) fn munge_refclk(bus: &dyn SocBus) {
    const REGAD: [u16; 7] = [0x16, 0x17, 0x18, 0x19, 0x1b, 0x1c, 0x1e];
    const DATA: [u16; 7] = [0x50b9, 0xbda1, 0x0094, 0x97b4, 0x5030, 0x5030, 0x0007];

    let _ = write(bus, MDIO_PORT0, SET_ADDR_OFFSET, 0x1600);
    for (regad, data) in REGAD.iter().zip(DATA) {
        let _ = write(bus, MDIO_PORT0, *regad, data);
        if let Ok(v) = read(bus, MDIO_PORT0, *regad) {
            debug!("mdio refclk {:#04x} = {:#06x}", regad, v);
        }
    }
    bus.delay_us(100, 200);
}
