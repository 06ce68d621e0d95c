//! Bitmap-backed MSI controller with a two-level interrupt-domain split.
//!
//! The inner domain maps hardware MSI slots to platform virqs and provides
//! the per-vector acknowledge and message-composition operations. The outer
//! interface adds multi-vector allocation on top by delegating slot
//! allocation to the bitmap. The chained host interrupt line is attached on
//! construction and must be detached before the domains go away;
//! [`MsiController::remove`] enforces that order.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use spin::Mutex;

use crate::bus::SocBus;
use crate::err::{Error, Result};
use crate::regs;
use crate::resource::ChainedIrq;

/// Hardware MSI slots on modern (HW rev >= 3.3) controllers.
pub const MSI_SLOTS: usize = 64;

/// Slots available in legacy mode, which lives in the top byte of a shared
/// interrupt register.
pub const MSI_LEGACY_SLOTS: usize = 8;

const MSI_LEGACY_SHIFT: u32 = 24;
const MSI_MASK: u32 = 0xffff_ffff;
const MSI_LEGACY_MASK: u32 = 0xff00_0000;

/// Address/data pair an endpoint writes to signal one vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsiMsg {
    pub address: u64,
    pub data: u32,
}

struct Bitmap {
    used: u64,
}

impl Bitmap {
    const fn region_mask(base: u32, count: u32) -> u64 {
        (u64::MAX >> (64 - count)) << base
    }

    /// Finds and marks `1 << order` contiguous slots, aligned to the region
    /// size.
    fn find_free_region(&mut self, nr: usize, order: u32) -> Option<u32> {
        let count = 1u32 << order;
        let mut base = 0;
        while (base + count) as usize <= nr {
            let mask = Self::region_mask(base, count);
            if self.used & mask == 0 {
                self.used |= mask;
                return Some(base);
            }
            base += count;
        }
        None
    }

    fn release_region(&mut self, base: u32, order: u32) {
        self.used &= !Self::region_mask(base, 1 << order);
    }
}

/// Hardware-slot domain: slot index to virq. Lookups are lock-free so the
/// chained dispatch path can run in interrupt context.
struct InnerDomain {
    map: [AtomicU32; MSI_SLOTS],
}

impl InnerDomain {
    fn new() -> Self {
        Self {
            map: [const { AtomicU32::new(0) }; MSI_SLOTS],
        }
    }

    fn set(&self, hwirq: u32, virq: u32) {
        self.map[hwirq as usize].store(virq, Ordering::Release);
    }

    fn clear(&self, hwirq: u32) {
        self.map[hwirq as usize].store(0, Ordering::Release);
    }

    fn lookup(&self, slot: usize) -> Option<u32> {
        match self.map.get(slot)?.load(Ordering::Acquire) {
            0 => None,
            virq => Some(virq),
        }
    }
}

/// The controller's built-in MSI block.
pub struct MsiController<B: SocBus> {
    bus: Arc<B>,
    target_addr: u64,
    /// Base of the status/clear/mask register block.
    intr_base: u32,
    legacy: bool,
    /// Legacy parts report their 8 vectors in bits [31:24].
    legacy_shift: u32,
    nr: usize,
    /// Guards the alloc/free operations only.
    bitmap: Mutex<Bitmap>,
    inner: InnerDomain,
    irq: Option<Box<dyn ChainedIrq>>,
}

impl<B: SocBus> MsiController<B> {
    /// Builds the controller, attaches the chained host interrupt and
    /// programs the target registers. `hw_rev` selects legacy (8-slot) vs
    /// modern (64-slot) addressing; `intr2_cpu_base` is the variant's
    /// shared interrupt block used by legacy parts.
    pub fn new(
        bus: Arc<B>,
        target_addr: u64,
        hw_rev: u32,
        intr2_cpu_base: u32,
        mut irq: Box<dyn ChainedIrq>,
    ) -> Result<Self> {
        let legacy = hw_rev < regs::HW_REV_33;
        let (intr_base, nr, legacy_shift) = if legacy {
            (intr2_cpu_base, MSI_LEGACY_SLOTS, MSI_LEGACY_SHIFT)
        } else {
            (regs::MSI_INTR2_BASE, MSI_SLOTS, 0)
        };

        irq.attach()?;

        let msi = Self {
            bus,
            target_addr,
            intr_base,
            legacy,
            legacy_shift,
            nr,
            bitmap: Mutex::new(Bitmap { used: 0 }),
            inner: InnerDomain::new(),
            irq: Some(irq),
        };
        msi.set_regs();
        Ok(msi)
    }

    /// Detaches the chained handler, then lets the domains drop. Once the
    /// line is detached no dispatch can race the teardown.
    pub(crate) fn remove(mut self) {
        if let Some(mut irq) = self.irq.take() {
            irq.detach();
        }
    }

    /// Programs the target address, data pattern and interrupt masks.
    /// Re-run on resume; the block loses state with the rest of the core.
    pub fn set_regs(&self) {
        let val = if self.legacy {
            MSI_LEGACY_MASK
        } else {
            MSI_MASK
        };
        self.bus
            .write32(self.intr_base + regs::MSI_INT_MASK_CLR, val);
        self.bus.write32(self.intr_base + regs::MSI_INT_CLR, val);

        // Bit 0 of MSI_BAR_CONFIG_LO doubles as the MSI enable.
        self.bus
            .write32(regs::MSI_BAR_CONFIG_LO, self.target_addr as u32 | 0x1);
        self.bus
            .write32(regs::MSI_BAR_CONFIG_HI, (self.target_addr >> 32) as u32);

        let data = if self.legacy {
            regs::MSI_DATA_CONFIG_VAL_8
        } else {
            regs::MSI_DATA_CONFIG_VAL_32
        };
        self.bus.write32(regs::MSI_DATA_CONFIG, data);
    }

    /// Allocates `count` contiguous hardware slots at power-of-two
    /// alignment.
    pub fn alloc(&self, count: u32) -> Result<u32> {
        if count == 0 || count as usize > self.nr {
            return Err(Error::Exhausted);
        }
        let order = count.next_power_of_two().trailing_zeros();
        self.bitmap
            .lock()
            .find_free_region(self.nr, order)
            .ok_or(Error::Exhausted)
    }

    /// Releases a region returned by [`Self::alloc`]. Double frees are not
    /// detected; that discipline belongs to the caller.
    pub fn free(&self, base_hwirq: u32, count: u32) {
        if count == 0 {
            return;
        }
        let order = count.next_power_of_two().trailing_zeros();
        self.bitmap.lock().release_region(base_hwirq, order);
    }

    /// Outer-domain allocation: grabs hardware slots and maps them to the
    /// caller's virq range. virq 0 is reserved as the unmapped sentinel.
    pub fn domain_alloc(&self, virq: u32, count: u32) -> Result<u32> {
        debug_assert!(virq != 0);
        let hwirq = self.alloc(count)?;
        for i in 0..count {
            self.inner.set(hwirq + i, virq + i);
        }
        Ok(hwirq)
    }

    pub fn domain_free(&self, hwirq: u32, count: u32) {
        for i in 0..count {
            self.inner.clear(hwirq + i);
        }
        self.free(hwirq, count);
    }

    /// Composes the message an endpoint writes for `hwirq`.
    pub fn compose_message(&self, hwirq: u32) -> MsiMsg {
        MsiMsg {
            address: self.target_addr,
            data: (regs::MSI_DATA_CONFIG_VAL_32 & 0xffff) | (hwirq & 0x1f),
        }
    }

    /// Clears one vector's pending bit (write-1-to-clear).
    pub fn ack(&self, hwirq: u32) {
        let shift = (hwirq & 0x1f) + self.legacy_shift;
        self.bus
            .write32(self.intr_base + regs::MSI_INT_CLR, 1 << shift);
    }

    /// Chained dispatch. Runs in interrupt context: reads status and the
    /// slot mappings only, never allocates or takes the bitmap mutex.
    /// Returns the number of vectors handed to `handler`.
    pub fn dispatch(&self, mut handler: impl FnMut(u32)) -> u32 {
        let status =
            self.bus.read32(self.intr_base + regs::MSI_INT_STATUS) >> self.legacy_shift;
        let mut handled = 0;
        for bit in 0..32u32 {
            if status & (1 << bit) == 0 {
                continue;
            }
            let mut found = false;
            // 64 slots share a 32-bit status register, so a set bit can
            // belong to the slot at `bit` or at `bit + 32`.
            for slot in [bit, bit + 32] {
                if let Some(virq) = self.inner.lookup(slot as usize) {
                    found = true;
                    debug!("MSI -> {}", virq);
                    handler(virq);
                    handled += 1;
                }
            }
            if !found {
                debug!("unexpected MSI (bit {})", bit);
            }
        }
        handled
    }

    pub fn target_addr(&self) -> u64 {
        self.target_addr
    }

    pub fn is_legacy(&self) -> bool {
        self.legacy
    }

    pub fn nr_vectors(&self) -> usize {
        self.nr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_mask_edges() {
        assert_eq!(Bitmap::region_mask(0, 1), 0x1);
        assert_eq!(Bitmap::region_mask(4, 4), 0xf0);
        assert_eq!(Bitmap::region_mask(0, 64), u64::MAX);
    }

    #[test]
    fn regions_are_size_aligned() {
        let mut bm = Bitmap { used: 0 };
        assert_eq!(bm.find_free_region(64, 0), Some(0));
        // An order-2 region skips the half-used first quad.
        assert_eq!(bm.find_free_region(64, 2), Some(4));
        assert_eq!(bm.find_free_region(64, 0), Some(1));
    }

    #[test]
    fn release_restores_prior_state() {
        let mut bm = Bitmap { used: 0 };
        let base = bm.find_free_region(64, 3).unwrap();
        let snapshot = bm.used;
        let second = bm.find_free_region(64, 3).unwrap();
        bm.release_region(second, 3);
        assert_eq!(bm.used, snapshot);
        // The freed region is handed out again.
        assert_eq!(bm.find_free_region(64, 3), Some(second));
        assert_ne!(base, second);
    }

    #[test]
    fn exhaustion_reports_none() {
        let mut bm = Bitmap { used: 0 };
        assert_eq!(bm.find_free_region(64, 6), Some(0));
        assert_eq!(bm.find_free_region(64, 0), None);
    }

    #[test]
    fn legacy_capacity_is_respected() {
        let mut bm = Bitmap { used: 0 };
        assert_eq!(bm.find_free_region(8, 3), Some(0));
        assert_eq!(bm.find_free_region(8, 0), None);
    }
}
