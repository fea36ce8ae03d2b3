//! Shared ring-buffer state machine for the three queues (component B): CQ (commands,
//! host→device), FQ (faults, device→host), PQ (page requests, device→host).
//!
//! All three share one enable/disable/overflow shape; what differs per queue is which register
//! offsets back it, which index the device owns (and therefore locks read-only to software),
//! the record size, and which CSR bits count as a sticky error. [`QueueSpec`] captures exactly
//! that difference; [`process_control`] and [`enqueue_record`] are the shared state machine.

use crate::interrupt::{self, InterruptSink};
use crate::regs::{self, offset, RegisterFile};
use memory::MemoryBus;

/// CSR bit positions shared by CQCSR/FQCSR/PQCSR.
pub mod csr_bits {
    pub const EN: u32 = 1 << 0;
    pub const IE: u32 = 1 << 1;
    pub const MF: u32 = 1 << 8;
    pub const ON: u32 = 1 << 16;
    pub const BUSY: u32 = 1 << 17;

    // CQ-specific.
    pub const CMD_ILL: u32 = 1 << 9;
    pub const CMD_TO: u32 = 1 << 10;
    pub const FENCE_W_IP: u32 = 1 << 11;

    // FQ/PQ-specific.
    pub const OF: u32 = 1 << 9;
}

/// Which ring index the device (rather than software) drives, and which therefore becomes
/// read-only to software once the queue is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceOwnedIndex {
    Head,
    Tail,
}

/// Latched ring geometry: base physical address and index mask, fixed at enable time and
/// unaffected by further writes to the B register until the next enable transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct RingGeometry {
    pub base: u64,
    pub mask: u32,
}

impl RingGeometry {
    pub fn from_b_register(b: u64) -> Self {
        let ppn = (b & regs::modereg::PPN_MASK) >> regs::modereg::PPN_SHIFT;
        let log2sz_minus_1 = (b & 0x1F) as u32;
        let size = 1u32 << (log2sz_minus_1 + 1);
        Self {
            base: ppn << 12,
            mask: size - 1,
        }
    }
}

/// The fixed, per-queue-type register wiring.
pub struct QueueSpec {
    pub b: u64,
    pub h: u64,
    pub t: u64,
    pub csr: u64,
    pub record_size: u64,
    pub error_bits: u32,
    pub device_owns: DeviceOwnedIndex,
}

pub const CQ_SPEC: QueueSpec = QueueSpec {
    b: offset::CQB,
    h: offset::CQH,
    t: offset::CQT,
    csr: offset::CQCSR,
    record_size: 16,
    error_bits: csr_bits::MF | csr_bits::CMD_ILL | csr_bits::CMD_TO | csr_bits::FENCE_W_IP,
    device_owns: DeviceOwnedIndex::Head,
};

pub const FQ_SPEC: QueueSpec = QueueSpec {
    b: offset::FQB,
    h: offset::FQH,
    t: offset::FQT,
    csr: offset::FQCSR,
    record_size: 32,
    error_bits: csr_bits::MF | csr_bits::OF,
    device_owns: DeviceOwnedIndex::Tail,
};

pub const PQ_SPEC: QueueSpec = QueueSpec {
    b: offset::PQB,
    h: offset::PQH,
    t: offset::PQT,
    csr: offset::PQCSR,
    record_size: 16,
    error_bits: csr_bits::MF | csr_bits::OF,
    device_owns: DeviceOwnedIndex::Tail,
};

fn device_owned_offset(spec: &QueueSpec) -> u64 {
    match spec.device_owns {
        DeviceOwnedIndex::Head => spec.h,
        DeviceOwnedIndex::Tail => spec.t,
    }
}

/// Runs the enable/disable transition for a queue's control register, called whenever the CSR
/// is written. No-op if EN/ON are already in agreement.
pub fn process_control(regs: &mut RegisterFile, spec: &QueueSpec, geometry: &mut RingGeometry) {
    let csr = regs.read(spec.csr, 4).unwrap() as u32;
    let was_on = csr & csr_bits::ON != 0;
    let en = csr & csr_bits::EN != 0;

    if en && !was_on {
        let b = regs.read(spec.b, 8).unwrap();
        *geometry = RingGeometry::from_b_register(b);
        regs.commit(spec.h, 4, 0);
        regs.commit(spec.t, 4, 0);
        regs.set_ro(device_owned_offset(spec), 4, u32::MAX as u64);

        let mut new_csr = csr & !(spec.error_bits | csr_bits::BUSY);
        new_csr |= csr_bits::ON;
        regs.commit(spec.csr, 4, new_csr as u64);
    } else if !en && was_on {
        regs.set_ro(device_owned_offset(spec), 4, u32::MAX as u64);
        let new_csr = csr & !(csr_bits::ON | csr_bits::BUSY);
        regs.commit(spec.csr, 4, new_csr as u64);
    }
}

/// Outcome of a producer-side append (FQ/PQ), and of a CQ command fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Appended,
    DroppedNotOn,
    DroppedStickyError,
    Overflow,
}

/// Producer-side append (§4.2): used by FQ/PQ to push a fault/page-request record, and
/// internally shares its "not on / sticky error / overflow" checks with the CQ fetch path.
/// `vector`/`sink` are the interrupt line and host callback used to notify if `IE` is set after
/// a successful append, per §4.2's "if IE set after the attempt, notify (§4.8)".
#[allow(clippy::too_many_arguments)]
pub fn enqueue_record(
    regs: &mut RegisterFile,
    spec: &QueueSpec,
    geometry: &RingGeometry,
    mem: &mut dyn MemoryBus,
    record: &[u8],
    vector: u32,
    sink: &mut dyn InterruptSink,
) -> EnqueueOutcome {
    let csr = regs.read(spec.csr, 4).unwrap() as u32;
    if csr & csr_bits::ON == 0 {
        return EnqueueOutcome::DroppedNotOn;
    }
    if csr & spec.error_bits != 0 {
        return EnqueueOutcome::DroppedStickyError;
    }

    let head = regs.read(spec.h, 4).unwrap() as u32 & geometry.mask;
    let tail = regs.read(spec.t, 4).unwrap() as u32 & geometry.mask;
    let next = (tail.wrapping_add(1)) & geometry.mask;
    if head == next {
        regs.commit(spec.csr, 4, (csr | csr_bits::OF) as u64);
        if csr & csr_bits::IE != 0 {
            interrupt::notify(regs, vector, sink);
        }
        return EnqueueOutcome::Overflow;
    }

    let addr = geometry.base + tail as u64 * spec.record_size;
    mem.write_physical(addr, record);
    regs.commit(spec.t, 4, next as u64);
    if csr & csr_bits::IE != 0 {
        interrupt::notify(regs, vector, sink);
    }
    EnqueueOutcome::Appended
}

/// Whether the queue is currently ON (enabled and not held in a disable transition).
pub fn is_on(regs: &RegisterFile, spec: &QueueSpec) -> bool {
    (regs.read(spec.csr, 4).unwrap() as u32) & csr_bits::ON != 0
}

/// Whether the queue's sticky error bits are set (blocks both production and consumption).
pub fn has_sticky_error(regs: &RegisterFile, spec: &QueueSpec) -> bool {
    (regs.read(spec.csr, 4).unwrap() as u32) & spec.error_bits != 0
}

/// Whether the interrupt-enable bit is set.
pub fn interrupt_enabled(regs: &RegisterFile, spec: &QueueSpec) -> bool {
    (regs.read(spec.csr, 4).unwrap() as u32) & csr_bits::IE != 0
}

pub fn masked_head(regs: &RegisterFile, spec: &QueueSpec, geometry: &RingGeometry) -> u32 {
    regs.read(spec.h, 4).unwrap() as u32 & geometry.mask
}

pub fn masked_tail(regs: &RegisterFile, spec: &QueueSpec, geometry: &RingGeometry) -> u32 {
    regs.read(spec.t, 4).unwrap() as u32 & geometry.mask
}

pub fn set_csr_bits(regs: &mut RegisterFile, spec: &QueueSpec, bits: u32) {
    let csr = regs.read(spec.csr, 4).unwrap() as u32;
    regs.commit(spec.csr, 4, (csr | bits) as u64);
}
