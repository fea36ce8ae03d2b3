//! Command queue dispatcher (component G): decodes one 16-byte CQ entry and executes it against
//! the context cache, per SPEC_FULL.md §4.7.
//!
//! The wire layout of a command record is this model's own self-consistent encoding (see
//! DESIGN.md), not a byte-exact transcription of the architecture document: `dword0` packs an
//! opcode/func pair plus flag bits and a payload field whose meaning depends on the opcode;
//! `dword1` carries the remaining opcode-specific payload.

use crate::context::ContextCache;
use crate::interrupt::{self, InterruptSink};
use crate::queue::{self, RingGeometry, CQ_SPEC};
use crate::regs::RegisterFile;
use memory::MemoryBus;

/// `opcode` field values (`dword0` bits `[6:0]`).
pub mod opcode {
    pub const IOTINVAL: u8 = 1;
    pub const IOFENCE: u8 = 2;
    pub const IODIR: u8 = 3;
}

/// `func3` field values (`dword0` bits `[9:7]`), meaning depends on `opcode`.
pub mod func {
    pub const VMA: u8 = 0;
    pub const GVMA: u8 = 1;
    pub const C: u8 = 0;
    pub const INVAL_DDT: u8 = 0;
    pub const INVAL_PDT: u8 = 1;
}

const AV_BIT: u64 = 1 << 10;
const PSCV_BIT: u64 = 1 << 11;
const DV_BIT: u64 = 1 << 12;

/// Packs `(func, opcode)` into the dispatch key used by [`process_cq_tail`]'s match arms.
pub const fn opcode_key(func: u8, op: u8) -> u16 {
    ((func as u16) << 7) | op as u16
}

/// Runs every command between the CQ's head and tail, stopping early on an illegal command (the
/// head is left pointing at the offending entry) or once the ring is drained. A no-op if the
/// queue isn't ON or already carries a sticky error.
pub fn process_cq_tail(
    regs: &mut RegisterFile,
    mem: &mut dyn MemoryBus,
    geometry: &RingGeometry,
    cache: &mut ContextCache,
    sink: &mut dyn InterruptSink,
) {
    if !queue::is_on(regs, &CQ_SPEC) || queue::has_sticky_error(regs, &CQ_SPEC) {
        return;
    }

    loop {
        let head = queue::masked_head(regs, &CQ_SPEC, geometry);
        let tail = queue::masked_tail(regs, &CQ_SPEC, geometry);
        if head == tail {
            return;
        }

        let addr = geometry.base + head as u64 * CQ_SPEC.record_size;
        let mut buf = [0u8; 16];
        mem.read_physical(addr, &mut buf);
        let dw0 = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let dw1 = u64::from_le_bytes(buf[8..16].try_into().unwrap());

        if !execute(mem, cache, dw0, dw1, addr) {
            queue::set_csr_bits(regs, &CQ_SPEC, queue::csr_bits::CMD_ILL);
            if queue::interrupt_enabled(regs, &CQ_SPEC) {
                interrupt::notify(regs, interrupt::CQ_VECTOR, sink);
            }
            return;
        }

        let next = (head.wrapping_add(1)) & geometry.mask;
        regs.commit(CQ_SPEC.h, 4, next as u64);
    }
}

/// Decodes and runs one command. Returns `false` for an illegal encoding (unknown opcode, or a
/// combination of flag bits the opcode doesn't allow), which halts the consumer loop without
/// advancing the head.
fn execute(mem: &mut dyn MemoryBus, cache: &mut ContextCache, dw0: u64, dw1: u64, self_addr: u64) -> bool {
    let op = (dw0 & 0x7F) as u8;
    let func = ((dw0 >> 7) & 0x7) as u8;
    let av = dw0 & AV_BIT != 0;
    let pscv = dw0 & PSCV_BIT != 0;
    let dv = dw0 & DV_BIT != 0;
    let device_id = ((dw0 >> 32) & 0xFF_FFFF) as u32;

    match opcode_key(func, op) {
        k if k == opcode_key(func::C, opcode::IOFENCE) => {
            if av {
                let data = (dw1 & 0xFFFF_FFFF) as u32;
                // No dedicated ADDR field in this model's 16-byte command; the fence's
                // completion write targets the command slot's own second dword.
                mem.write_physical(self_addr + 8, &data.to_le_bytes());
            }
            true
        }
        k if k == opcode_key(func::VMA, opcode::IOTINVAL) => true,
        k if k == opcode_key(func::GVMA, opcode::IOTINVAL) => !pscv,
        k if k == opcode_key(func::INVAL_DDT, opcode::IODIR) => {
            cache.invalidate_ddt(device_id, dv);
            true
        }
        k if k == opcode_key(func::INVAL_PDT, opcode::IODIR) => {
            if !dv {
                return false;
            }
            let process_id = (dw1 & 0xF_FFFF) as u32;
            cache.invalidate_pdt(device_id, process_id);
            true
        }
        _ => false,
    }
}
