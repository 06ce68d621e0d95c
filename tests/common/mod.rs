#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use pcie_brcmstb::{
    ChainedIrq, ClockControl, RegulatorSupplies, ResetControl, Resources, Result, SocBus,
};

pub const STATUS_REG: u32 = 0x4068;
pub const REVISION_REG: u32 = 0x406c;
pub const STATUS_RC_MODE: u32 = 0x80;
pub const STATUS_LINK_UP: u32 = 0x20 | 0x10;
pub const HW_REV_MODERN: u32 = 0x0303;
pub const HW_REV_LEGACY: u32 = 0x0301;

/// Register file standing in for the controller MMIO block. Unwritten
/// registers read as zero; delays are no-ops.
#[derive(Default)]
pub struct FakeBus {
    regs: Mutex<HashMap<u32, u32>>,
}

impl FakeBus {
    pub fn get(&self, offset: u32) -> u32 {
        self.regs.lock().unwrap().get(&offset).copied().unwrap_or(0)
    }

    pub fn set(&self, offset: u32, value: u32) {
        self.regs.lock().unwrap().insert(offset, value);
    }
}

impl SocBus for FakeBus {
    fn read32(&self, offset: u32) -> u32 {
        self.get(offset)
    }

    fn write32(&self, offset: u32, value: u32) {
        self.set(offset, value);
    }

    fn read16(&self, offset: u32) -> u16 {
        let shift = (offset & 3) * 8;
        (self.get(offset & !3) >> shift) as u16
    }

    fn write16(&self, offset: u32, value: u16) {
        let word = offset & !3;
        let shift = (offset & 3) * 8;
        let cur = self.get(word);
        self.set(word, (cur & !(0xffff << shift)) | ((value as u32) << shift));
    }

    fn delay_us(&self, _min_us: u32, _max_us: u32) {}

    fn sleep_ms(&self, _ms: u32) {}
}

pub struct NopClock;

impl ClockControl for NopClock {
    fn prepare_enable(&mut self) -> Result<()> {
        Ok(())
    }

    fn disable_unprepare(&mut self) {}
}

pub struct NopReset;

impl ResetControl for NopReset {
    fn assert(&mut self) -> Result<()> {
        Ok(())
    }

    fn deassert(&mut self) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        Ok(())
    }

    fn rearm(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Chained interrupt line recording attach/detach calls.
#[derive(Default)]
pub struct RecordingIrq {
    pub events: Arc<Mutex<Vec<&'static str>>>,
}

impl ChainedIrq for RecordingIrq {
    fn attach(&mut self) -> Result<()> {
        self.events.lock().unwrap().push("attach");
        Ok(())
    }

    fn detach(&mut self) {
        self.events.lock().unwrap().push("detach");
    }
}

/// Supply set counting enables and disables.
#[derive(Default)]
pub struct CountingSupplies {
    pub enables: Arc<AtomicU32>,
    pub disables: Arc<AtomicU32>,
}

impl RegulatorSupplies for CountingSupplies {
    fn enable(&mut self) -> Result<()> {
        self.enables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn disable(&mut self) -> Result<()> {
        self.disables.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Resource set with a clock, a rescal line and an MSI interrupt.
pub fn default_resources() -> Resources {
    Resources {
        clk: Some(Box::new(NopClock)),
        rescal: Some(Box::new(NopReset)),
        msi_irq: Some(Box::new(RecordingIrq::default())),
        ..Default::default()
    }
}
