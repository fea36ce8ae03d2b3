//! Translation path (§4.5): MSI pre-check, pass-through fallback, ATS-probe and fault emission.
//!
//! The real stage-1/stage-2 page-table walker is out of scope (see SPEC_FULL.md §1); this module
//! implements exactly the three outcomes the distilled spec allows for today: MSI redirection,
//! unconditional pass-through, and the two fault-reporting paths (page-request, fault-record)
//! that a future walker would also use.

use crate::context::TranslationContext;
use crate::fault::{Cause, FaultRecord, PageRequestRecord, Ttype};
use crate::interrupt::{self, InterruptSink};
use crate::msi;
use crate::queue::{self, QueueSpec, RingGeometry};
use crate::regs::RegisterFile;
use memory::MemoryBus;

const PAGE_MASK: u64 = 0xFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    None,
    R,
    W,
    Rw,
}

impl Permission {
    pub fn is_write(self) -> bool {
        matches!(self, Permission::W | Permission::Rw)
    }
}

/// Result of a translation request. A failed translation is reported as `addr_mask: 0,
/// perm: Permission::None` (§7), with a record already pushed to FQ or PQ as appropriate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranslateOutcome {
    pub addr_mask: u64,
    pub translated_addr: u64,
    pub perm: Permission,
    /// Set when the access was an MSI write that this call already routed through
    /// `msi::msi_write`, rather than a normal untranslated RAM access the caller still needs to
    /// perform itself.
    pub msi_redirect: bool,
}

impl TranslateOutcome {
    fn failed() -> Self {
        Self {
            addr_mask: 0,
            translated_addr: 0,
            perm: Permission::None,
            msi_redirect: false,
        }
    }
}

/// The bundle of queue wiring `translate` needs to push fault/page-request records and raise
/// their interrupts. Grouped into one struct so call sites (command dispatch, PCI front end)
/// don't have to thread six parameters individually.
pub struct FaultSinks<'a> {
    pub fq: &'a QueueSpec,
    pub fq_geometry: &'a RingGeometry,
    pub pq: &'a QueueSpec,
    pub pq_geometry: &'a RingGeometry,
}

#[allow(clippy::too_many_arguments)]
pub fn translate(
    regs: &mut RegisterFile,
    mem: &mut dyn MemoryBus,
    sinks: &FaultSinks,
    sink: &mut dyn InterruptSink,
    ctx: &TranslationContext,
    iova: u64,
    perm: Permission,
    write_data: Option<(u64, usize)>,
) -> TranslateOutcome {
    if perm.is_write() && msi::matches_pattern(ctx, iova) {
        if let Some((data, size)) = write_data {
            if let Err(cause) = msi::msi_write(mem, ctx, iova, data, size) {
                push_fault(regs, mem, sinks, sink, ctx, cause, Ttype::UntranslatedWrite, iova);
                return TranslateOutcome::failed();
            }
        }
        return TranslateOutcome {
            addr_mask: !PAGE_MASK,
            translated_addr: iova,
            perm,
            msi_redirect: true,
        };
    }

    if perm == Permission::None && ctx.tc.prpr {
        push_page_request(regs, mem, sinks, sink, ctx, iova);
        return TranslateOutcome::failed();
    }

    TranslateOutcome {
        addr_mask: !PAGE_MASK,
        translated_addr: iova,
        perm: Permission::Rw,
        msi_redirect: false,
    }
}

fn push_fault(
    regs: &mut RegisterFile,
    mem: &mut dyn MemoryBus,
    sinks: &FaultSinks,
    sink: &mut dyn InterruptSink,
    ctx: &TranslationContext,
    cause: Cause,
    ttype: Ttype,
    iotval: u64,
) {
    if ctx.tc.dtf && !cause.bypasses_dtf_suppression() {
        return;
    }
    let record = FaultRecord {
        cause,
        ttype,
        did: ctx.device_id,
        pid: (ctx.process_id != 0).then_some(ctx.process_id),
        iotval,
        iotval2: 0,
    };
    let bytes = record.to_bytes();
    queue::enqueue_record(
        regs,
        sinks.fq,
        sinks.fq_geometry,
        mem,
        &bytes,
        interrupt::FQ_VECTOR,
        sink,
    );
}

fn push_page_request(
    regs: &mut RegisterFile,
    mem: &mut dyn MemoryBus,
    sinks: &FaultSinks,
    sink: &mut dyn InterruptSink,
    ctx: &TranslationContext,
    iova: u64,
) {
    let record = PageRequestRecord {
        did: ctx.device_id,
        pid: (ctx.process_id != 0).then_some(ctx.process_id),
        m_flag: false,
        iova_page: iova,
    };
    let bytes = record.to_bytes();
    queue::enqueue_record(
        regs,
        sinks.pq,
        sinks.pq_geometry,
        mem,
        &bytes,
        interrupt::PQ_VECTOR,
        sink,
    );
}
