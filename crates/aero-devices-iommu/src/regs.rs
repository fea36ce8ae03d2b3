//! Triple-shadow MMIO register file (component A).
//!
//! Every register byte lives in three parallel shadow arrays: `rw` (the value software reads
//! back), `ro` (a per-bit read-only mask) and `wc` (a per-bit write-1-to-clear mask). A write of
//! `v` over the current `rw` byte becomes `(rw & ro) | (v & !ro)`, then bits named in `v & wc`
//! are cleared. This lets every register in the map share one masked-write primitive instead of
//! a per-field setter.

use crate::error::RegisterError;

/// Size of the MMIO window, covering every register up through (but not including) the MSI
/// config table.
pub const REG_SIZE: usize = 0x1000;

/// Register byte offsets (canonical RISC-V IOMMU architecture layout).
pub mod offset {
    pub const CAP: u64 = 0x0000;
    pub const FCTL: u64 = 0x0008;
    pub const DDTP: u64 = 0x0010;
    pub const CQB: u64 = 0x0018;
    pub const CQH: u64 = 0x0020;
    pub const CQT: u64 = 0x0024;
    pub const FQB: u64 = 0x0028;
    pub const FQH: u64 = 0x0030;
    pub const FQT: u64 = 0x0034;
    pub const PQB: u64 = 0x0038;
    pub const PQH: u64 = 0x0040;
    pub const PQT: u64 = 0x0044;
    pub const CQCSR: u64 = 0x0048;
    pub const FQCSR: u64 = 0x004C;
    pub const PQCSR: u64 = 0x0050;
    pub const IPSR: u64 = 0x0054;
    pub const IVEC: u64 = 0x02F8;
    /// First byte past the valid MMIO window; the MSI config table itself is out of scope
    /// (see SPEC_FULL.md §6) and reads as zero.
    pub const MSI_CONFIG: u64 = 0x0300;
}

/// `CAP` register bit layout.
pub mod cap {
    pub const VERSION_MASK: u64 = 0xFF;
    pub const PAS_SHIFT: u32 = 32;
    pub const PAS_MASK: u64 = 0x3F << PAS_SHIFT;
    pub const MSI_FLAT: u64 = 1 << 24;
    pub const MSI_MRIF: u64 = 1 << 25;
    pub const T2GPA: u64 = 1 << 28;
    pub const PD8: u64 = 1 << 40;
}

/// `FCTL` register bit layout.
pub mod fctl {
    pub const BE: u32 = 1 << 0;
    pub const WSI: u32 = 1 << 1;
}

/// `DDTP`/`PDTP`-shaped mode+PPN register bit layout (shared by both, per §4.3/§4.4).
pub mod modereg {
    pub const MODE_MASK: u64 = 0xF;
    pub const BUSY: u64 = 1 << 4;
    pub const PPN_SHIFT: u32 = 10;
    pub const PPN_MASK: u64 = 0x000F_FFFF_FFFF_FC00;
}

fn size_mask(size: usize) -> u64 {
    if size >= 8 {
        u64::MAX
    } else {
        (1u64 << (size * 8)) - 1
    }
}

/// The three parallel MMIO shadow arrays plus the masked read/write primitive that is the only
/// way callers are meant to touch guest-visible register bytes.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    rw: Vec<u8>,
    ro: Vec<u8>,
    wc: Vec<u8>,
}

impl RegisterFile {
    /// A fresh register file: every byte reserved (`ro = 0xFF`), nothing write-1-to-clear.
    /// Callers open up writable/wc windows with [`Self::clear_ro`]/[`Self::set_wc`] at realize
    /// time, mirroring how the upstream model memsets `regs_ro` to `0xff` and then punches
    /// per-register holes.
    pub fn new() -> Self {
        Self {
            rw: vec![0u8; REG_SIZE],
            ro: vec![0xFFu8; REG_SIZE],
            wc: vec![0u8; REG_SIZE],
        }
    }

    fn check_bounds(&self, offset: u64, size: usize) -> Result<(), RegisterError> {
        match size {
            1 | 2 | 4 | 8 => {}
            other => return Err(RegisterError::BadSize(other)),
        }
        if offset % size as u64 != 0 {
            return Err(RegisterError::Misaligned { offset, size });
        }
        let end = offset
            .checked_add(size as u64)
            .ok_or(RegisterError::OutOfRange { offset, size })?;
        if end > offset::MSI_CONFIG {
            return Err(RegisterError::OutOfRange { offset, size });
        }
        Ok(())
    }

    /// Reads back the current `rw` bytes at `offset..offset+size`, little-endian.
    pub fn read(&self, offset: u64, size: usize) -> Result<u64, RegisterError> {
        self.check_bounds(offset, size)?;
        let start = offset as usize;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&self.rw[start..start + size]);
        Ok(u64::from_le_bytes(buf))
    }

    /// Computes the masked update a write of `value` would produce, without committing it.
    /// Used directly by [`Self::write`], and separately by the IPSR special-case in
    /// `core_engine`, which needs the "apparent" update before the per-queue recomputation
    /// overrides it (see SPEC_FULL.md §4.1/§4.8).
    pub fn compute_masked_update(&self, offset: u64, size: usize, value: u64) -> Result<u64, RegisterError> {
        self.check_bounds(offset, size)?;
        let start = offset as usize;
        let mut out = [0u8; 8];
        let v_bytes = value.to_le_bytes();
        for i in 0..size {
            let rw = self.rw[start + i];
            let ro = self.ro[start + i];
            let wc = self.wc[start + i];
            let v = v_bytes[i];
            let updated = (rw & ro) | (v & !ro);
            out[i] = updated & !(v & wc);
        }
        Ok(u64::from_le_bytes(out) & size_mask(size))
    }

    /// Stores `value` verbatim into the `rw` shadow at `offset..offset+size`, little-endian, with
    /// no masking. Used to commit an already-computed masked update, and by the IPSR special case
    /// to commit the recomputed value directly.
    pub fn commit(&mut self, offset: u64, size: usize, value: u64) {
        let start = offset as usize;
        let bytes = value.to_le_bytes();
        self.rw[start..start + size].copy_from_slice(&bytes[..size]);
    }

    /// Applies the masked-write law and commits the result, returning the value actually stored.
    pub fn write(&mut self, offset: u64, size: usize, value: u64) -> Result<u64, RegisterError> {
        let masked = self.compute_masked_update(offset, size, value)?;
        self.commit(offset, size, masked);
        Ok(masked)
    }

    /// Raw poke used only at construction time to seed read-only fields (e.g. `CAP`), bypassing
    /// the ro/wc masks entirely.
    pub fn poke_rw(&mut self, offset: u64, size: usize, value: u64) {
        self.commit(offset, size, value);
    }

    /// Opens a writable window by clearing `mask` bits of `ro` at `offset..offset+size`.
    pub fn clear_ro(&mut self, offset: u64, size: usize, mask: u64) {
        let start = offset as usize;
        let mask_bytes = mask.to_le_bytes();
        for i in 0..size {
            self.ro[start + i] &= !mask_bytes[i];
        }
    }

    /// Re-closes a window by setting `mask` bits of `ro`, used when a queue transitions to
    /// enabled and its consumer/producer index must become guest-read-only.
    pub fn set_ro(&mut self, offset: u64, size: usize, mask: u64) {
        let start = offset as usize;
        let mask_bytes = mask.to_le_bytes();
        for i in 0..size {
            self.ro[start + i] |= mask_bytes[i];
        }
    }

    /// Marks `mask` bits at `offset..offset+size` as write-1-to-clear.
    pub fn set_wc(&mut self, offset: u64, size: usize, mask: u64) {
        let start = offset as usize;
        let mask_bytes = mask.to_le_bytes();
        for i in 0..size {
            self.wc[start + i] |= mask_bytes[i];
        }
    }

    /// The ro mask currently in effect at `offset..offset+size`, little-endian. Useful for
    /// callers (e.g. queue control processing) that need to know whether a field is currently
    /// guest-writable.
    pub fn ro_mask(&self, offset: u64, size: usize) -> u64 {
        let start = offset as usize;
        let mut buf = [0u8; 8];
        buf[..size].copy_from_slice(&self.ro[start..start + size]);
        u64::from_le_bytes(buf)
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
