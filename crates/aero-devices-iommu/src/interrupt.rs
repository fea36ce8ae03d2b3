//! Interrupt-pending logic (component H): IPSR recomputation and wire/MSI notification.

use crate::queue::{self, CQ_SPEC, FQ_SPEC, PQ_SPEC};
use crate::regs::{fctl, offset, RegisterFile};

/// Host-supplied interrupt line callback, in the spirit of `aero_platform`'s single-method
/// `MsiTrigger`.
pub trait InterruptSink {
    fn notify(&mut self, line: u32);
}

/// IPSR bit position for each queue's pending flag.
pub const CQ_VECTOR: u32 = 0;
pub const FQ_VECTOR: u32 = 1;
pub const PQ_VECTOR: u32 = 2;

/// Pure re-derivation of `IPSR` from the three queues' CSR state (§4.8): `(queue.IE &&
/// queue.has_active_error) ? 1 : 0` per queue, applied as one atomic write. Called after any
/// write that could change a queue's error or interrupt-enable bits, and specially after a raw
/// write to `IPSR` itself (which would otherwise let software set bits the hardware doesn't
/// believe are pending).
pub fn recompute_ipsr(regs: &mut RegisterFile) {
    let mut ipsr = 0u32;
    for (vector, spec) in [(CQ_VECTOR, &CQ_SPEC), (FQ_VECTOR, &FQ_SPEC), (PQ_VECTOR, &PQ_SPEC)] {
        if queue::has_sticky_error(regs, spec) && queue::interrupt_enabled(regs, spec) {
            ipsr |= 1 << vector;
        }
    }
    regs.commit(offset::IPSR, 4, ipsr as u64);
}

/// Raises interrupt `vector` (one of `CQ_VECTOR`/`FQ_VECTOR`/`PQ_VECTOR`), per §4.8: a no-op
/// under wire-signaled-interrupt mode (`FCTL.WSI`, left to the host); otherwise sets the IPSR
/// bit and, on a clear-to-set edge, delivers on the line named by `IVEC`.
pub fn notify(regs: &mut RegisterFile, vector: u32, sink: &mut dyn InterruptSink) {
    let fctl = regs.read(offset::FCTL, 4).unwrap() as u32;
    if fctl & fctl::WSI != 0 {
        return;
    }
    let ipsr = regs.read(offset::IPSR, 4).unwrap() as u32;
    let bit = 1 << vector;
    if ipsr & bit != 0 {
        return;
    }
    regs.commit(offset::IPSR, 4, (ipsr | bit) as u64);
    let ivec = regs.read(offset::IVEC, 8).unwrap();
    let line = ((ivec >> (vector * 4)) & 0xF) as u32;
    sink.notify(line);
}
