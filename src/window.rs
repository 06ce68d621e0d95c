//! Inbound and outbound address window encodings.
//!
//! Everything here is pure computation; the register writes happen in
//! [`crate::root`].

use alloc::vec::Vec;

use log::error;

use crate::config::DmaRange;
use crate::err::{Error, Result};
use crate::field;
use crate::regs;

/// The main inbound aperture mapping system memory into PCIe space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRegion {
    /// Aperture size; always a power of two.
    pub size: u64,
    /// PCIe-space address where system memory starts.
    pub pcie_offset: u64,
    /// Per-memory-controller view sizes behind the aperture.
    pub memc_sizes: Vec<u64>,
}

/// Converts an inbound window size to the non-linear
/// RC_BAR*_CONFIG_LO.SIZE encoding.
///
/// Power-of-two sizes from 4 KiB to 32 KiB encode as `0x1c..=0x1f`, 64 KiB
/// to 64 GiB as `1..=21`. Anything else encodes as 0, which disables the
/// window; out-of-range sizes are not an error.
pub fn encode_inbound_size(size: u64) -> u32 {
    let log2 = match size.checked_ilog2() {
        Some(log2) => log2,
        None => return 0,
    };
    match log2 {
        12..=15 => (log2 - 12) + 0x1c,
        16..=36 => log2 - 15,
        _ => 0,
    }
}

/// Encoded outbound window register values. The CPU base and limit are
/// carried in 1 MiB units, split between the shared base-limit word and the
/// two high-address registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundWindowRegs {
    pub pcie_addr_lo: u32,
    pub pcie_addr_hi: u32,
    /// Low base and limit fields packed into the shared base-limit word.
    pub base_limit: u32,
    pub base_hi: u32,
    pub limit_hi: u32,
}

impl OutboundWindowRegs {
    pub fn compute(cpu_addr: u64, pcie_addr: u64, size: u64) -> Self {
        let cpu_addr_mb = cpu_addr / regs::SZ_1M;
        let limit_addr_mb = (cpu_addr + size - 1) / regs::SZ_1M;

        // MiB-value bits beyond the low field width go to the high
        // registers.
        let high_shift = regs::MEM_WIN0_BASE_LIMIT_BASE_MASK.count_ones();

        let mut base_limit = 0;
        base_limit = field::replace(
            base_limit,
            regs::MEM_WIN0_BASE_LIMIT_BASE_MASK,
            cpu_addr_mb as u32,
        );
        base_limit = field::replace(
            base_limit,
            regs::MEM_WIN0_BASE_LIMIT_LIMIT_MASK,
            limit_addr_mb as u32,
        );

        Self {
            pcie_addr_lo: pcie_addr as u32,
            pcie_addr_hi: (pcie_addr >> 32) as u32,
            base_limit,
            base_hi: field::replace(
                0,
                regs::MEM_WIN0_BASE_HI_BASE_MASK,
                (cpu_addr_mb >> high_shift) as u32,
            ),
            limit_hi: field::replace(
                0,
                regs::MEM_WIN0_LIMIT_HI_LIMIT_MASK,
                (limit_addr_mb >> high_shift) as u32,
            ),
        }
    }

    /// Recovers the CPU base address and inclusive limit. Both come back
    /// 1 MiB-granular; the limit rounds up to the end of its MiB.
    pub fn decode(&self) -> (u64, u64) {
        let high_shift = regs::MEM_WIN0_BASE_LIMIT_BASE_MASK.count_ones();
        let base_mb = field::get(self.base_limit, regs::MEM_WIN0_BASE_LIMIT_BASE_MASK) as u64
            | (field::get(self.base_hi, regs::MEM_WIN0_BASE_HI_BASE_MASK) as u64) << high_shift;
        let limit_mb = field::get(self.base_limit, regs::MEM_WIN0_BASE_LIMIT_LIMIT_MASK) as u64
            | (field::get(self.limit_hi, regs::MEM_WIN0_LIMIT_HI_LIMIT_MASK) as u64) << high_shift;
        (base_mb * regs::SZ_1M, (limit_mb + 1) * regs::SZ_1M - 1)
    }
}

/// Derives the main inbound aperture from the discovered DMA ranges and
/// memory-controller sizes.
///
/// The hardware requires the aperture to be a power of two, starting on a
/// PCIe address aligned to a multiple of its size. Offsets strictly inside
/// (2 GiB, 4 GiB) are additionally rejected: that band is where outbound
/// traffic may be mapped when the aperture has to round up past the actual
/// memory size, and the controller then routes by address range.
pub fn compute_inbound_region(
    dma_ranges: &[DmaRange],
    configured_memc: &[u64],
    first_range_only: bool,
) -> Result<InboundRegion> {
    if dma_ranges.is_empty() {
        error!("configuration has no dma-ranges");
        return Err(Error::Config("no dma-ranges"));
    }

    let considered = if first_range_only {
        &dma_ranges[..1]
    } else {
        dma_ranges
    };

    let mut total = 0u64;
    let mut lowest_pcie_addr = u64::MAX;
    for range in considered {
        total += range.size;
        lowest_pcie_addr = lowest_pcie_addr.min(range.pcie_addr);
    }

    let memc_sizes: Vec<u64> = if configured_memc.is_empty() {
        // Educated guess: one memory controller covering everything.
        let guess = if total == 0 {
            0
        } else {
            total.next_power_of_two()
        };
        alloc::vec![guess]
    } else {
        if configured_memc.len() > regs::MAX_MEMC {
            error!("too many memory controllers configured");
            return Err(Error::Config("too many memory controllers"));
        }
        configured_memc.to_vec()
    };

    // Each memc is viewed through a power-of-two port, and the sum of the
    // views must itself round up to a power of two.
    let sum: u64 = memc_sizes.iter().sum();
    let size = if sum == 0 { 0 } else { sum.next_power_of_two() };
    let pcie_offset = lowest_pcie_addr;

    if size == 0
        || pcie_offset % size != 0
        || (pcie_offset > regs::SZ_2G && pcie_offset < regs::SZ_4G)
    {
        error!(
            "invalid inbound region: size {:#x}, offset {:#x}",
            size, pcie_offset
        );
        return Err(Error::Config(
            "inbound region must be a size-aligned power of two outside 2-4 GiB",
        ));
    }

    Ok(InboundRegion {
        size,
        pcie_offset,
        memc_sizes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn inbound_size_boundaries() {
        assert_eq!(encode_inbound_size(4096), 0x1c);
        assert_eq!(encode_inbound_size(32 * 1024), 0x1f);
        assert_eq!(encode_inbound_size(64 * 1024), 1);
        assert_eq!(encode_inbound_size(1 << 36), 21);
        assert_eq!(encode_inbound_size(0), 0);
        assert_eq!(encode_inbound_size(1 << 11), 0);
        assert_eq!(encode_inbound_size(1 << 37), 0);
    }

    #[test]
    fn inbound_size_monotonic_within_each_range() {
        let mut prev = 0;
        for log2 in 12..=15 {
            let enc = encode_inbound_size(1 << log2);
            assert!(enc >= prev);
            prev = enc;
        }
        let mut prev = 0;
        for log2 in 16..=36 {
            let enc = encode_inbound_size(1 << log2);
            assert!(enc >= prev);
            prev = enc;
        }
    }

    #[test]
    fn outbound_round_trip() {
        let cases = [
            (0x0_4000_0000u64, 0x0_4000_0000u64, 0x0800_0000u64),
            (0x4_0000_0000, 0x0_8000_0000, 0x4000_0000),
            (0x17_fc00_0000, 0x17_fc00_0000, 0x0400_0000),
        ];
        for (cpu, pcie, size) in cases {
            let regs = OutboundWindowRegs::compute(cpu, pcie, size);
            let (base, limit) = regs.decode();
            assert_eq!(base, cpu);
            assert_eq!(limit, cpu + size - 1);
            assert_eq!(regs.pcie_addr_lo as u64 | (regs.pcie_addr_hi as u64) << 32, pcie);
        }
    }

    fn one_range(pcie_addr: u64, size: u64) -> Vec<DmaRange> {
        vec![DmaRange {
            pcie_addr,
            cpu_addr: 0,
            size,
        }]
    }

    #[test]
    fn misaligned_offsets_are_rejected() {
        for log2 in 12..=37u32 {
            let size = 1u64 << log2;
            let ranges = one_range(size / 2, size);
            assert!(
                compute_inbound_region(&ranges, &[size], false).is_err(),
                "offset {:#x} must not pass for size {:#x}",
                size / 2,
                size
            );
        }
    }

    #[test]
    fn reserved_band_is_rejected() {
        // 3 GiB start lands inside the outbound overlap band.
        let ranges = one_range(3 << 30, 1 << 30);
        assert!(compute_inbound_region(&ranges, &[1 << 30], false).is_err());
        // The band is open: exactly 2 GiB and exactly 4 GiB are fine.
        assert!(compute_inbound_region(&one_range(2 << 30, 1 << 30), &[1 << 30], false).is_ok());
        assert!(compute_inbound_region(&one_range(4 << 30, 1 << 32), &[1 << 32], false).is_ok());
    }

    #[test]
    fn memc_sum_rounds_up_to_power_of_two() {
        let ranges = one_range(0, 3 << 30);
        let region =
            compute_inbound_region(&ranges, &[2 << 30, 1 << 30], false).unwrap();
        assert_eq!(region.size, 4 << 30);
        assert_eq!(region.pcie_offset, 0);
        assert_eq!(region.memc_sizes, vec![2 << 30, 1 << 30]);
    }

    #[test]
    fn memc_guess_covers_dma_ranges() {
        let region = compute_inbound_region(&one_range(0, 3 << 30), &[], false).unwrap();
        assert_eq!(region.size, 4 << 30);
        assert_eq!(region.memc_sizes, vec![4u64 << 30]);
    }

    #[test]
    fn only_first_range_counts_when_asked() {
        let ranges = vec![
            DmaRange {
                pcie_addr: 0,
                cpu_addr: 0,
                size: 1 << 30,
            },
            DmaRange {
                pcie_addr: 1 << 34,
                cpu_addr: 1 << 34,
                size: 1 << 34,
            },
        ];
        let region = compute_inbound_region(&ranges, &[], true).unwrap();
        assert_eq!(region.size, 1 << 30);
        assert_eq!(region.pcie_offset, 0);
    }

    #[test]
    fn empty_dma_ranges_are_rejected() {
        assert!(compute_inbound_region(&[], &[1 << 30], false).is_err());
    }
}
