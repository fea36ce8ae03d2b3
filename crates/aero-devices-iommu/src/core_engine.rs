//! Top-level glue: `IommuCore` owns the register file, the three queues' geometry, the context
//! cache and the address-space registry, and dispatches MMIO writes to the right component, per
//! SPEC_FULL.md §4.1/§6.

use crate::address_space::AddressSpaceRegistry;
use crate::command;
use crate::context::ContextCache;
use crate::directory::{self, DdtpMode};
use crate::fault::{Cause, FaultRecord, Ttype};
use crate::interrupt::{self, InterruptSink};
use crate::queue::{self, RingGeometry, CQ_SPEC, FQ_SPEC, PQ_SPEC};
use crate::regs::{cap, modereg, offset, RegisterFile};
use crate::translate::{self, FaultSinks, Permission, TranslateOutcome};
use memory::MemoryBus;

/// Construction-time configuration, per SPEC_FULL.md §6.
#[derive(Debug, Clone, Copy)]
pub struct IommuDeviceConfig {
    /// Reported in `CAP.VERSION`.
    pub version: u8,
    /// Upper byte of the requester-id namespace, used when formatting `PciBdf`s.
    pub bus: u8,
    /// If true, advertise `MSI_FLAT`/`MSI_MRIF` and use the extended device-context format.
    pub intremap: bool,
    /// Initial `DDTP.MODE`: `OFF` if true, `BARE` otherwise.
    pub off: bool,
}

impl Default for IommuDeviceConfig {
    fn default() -> Self {
        Self {
            version: 1,
            bus: 0,
            intremap: false,
            off: true,
        }
    }
}

pub struct IommuCore {
    pub regs: RegisterFile,
    config: IommuDeviceConfig,
    cq_geometry: RingGeometry,
    fq_geometry: RingGeometry,
    pq_geometry: RingGeometry,
    cache: ContextCache,
    pub spaces: AddressSpaceRegistry,
}

impl IommuCore {
    pub fn new(config: IommuDeviceConfig) -> Self {
        let mut regs = RegisterFile::new();

        let mut cap_value = config.version as u64 & cap::VERSION_MASK;
        cap_value |= 56u64 << cap::PAS_SHIFT; // 56-bit physical address space, matching aero's other DMA-capable devices
        cap_value |= cap::PD8;
        if config.intremap {
            cap_value |= cap::MSI_FLAT | cap::MSI_MRIF;
        }
        regs.poke_rw(offset::CAP, 8, cap_value);

        regs.clear_ro(offset::FCTL, 4, 0b11);

        regs.clear_ro(offset::DDTP, 8, modereg::MODE_MASK | modereg::PPN_MASK);
        let initial_mode = if config.off { DdtpMode::Off } else { DdtpMode::Bare };
        regs.poke_rw(offset::DDTP, 8, initial_mode.to_bits());

        for spec in [&CQ_SPEC, &FQ_SPEC, &PQ_SPEC] {
            regs.clear_ro(spec.b, 8, u64::MAX);
            regs.clear_ro(spec.h, 4, u32::MAX as u64);
            regs.clear_ro(spec.t, 4, u32::MAX as u64);
            regs.clear_ro(spec.csr, 4, (queue::csr_bits::EN | queue::csr_bits::IE) as u64);
            regs.set_wc(spec.csr, 4, spec.error_bits as u64);
        }

        regs.clear_ro(offset::IPSR, 4, u32::MAX as u64);
        regs.clear_ro(offset::IVEC, 8, u64::MAX);

        Self {
            regs,
            config,
            cq_geometry: RingGeometry::default(),
            fq_geometry: RingGeometry::default(),
            pq_geometry: RingGeometry::default(),
            cache: ContextCache::new(),
            spaces: AddressSpaceRegistry::new(config.bus),
        }
    }

    pub fn read(&self, offset: u64, size: usize) -> u64 {
        self.regs.read(offset, size).unwrap_or(u64::MAX)
    }

    /// Commits an MMIO write and runs any register-only follow-up (queue enable/disable
    /// transitions, the DDTP mode-transition processor). Command-queue execution needs DMA
    /// access this method doesn't take, so it happens separately in [`Self::process`], the same
    /// way the workspace's other DMA-capable device crates separate "doorbell write" from
    /// "process the ring" (see `NvmeController::process`).
    pub fn write(&mut self, offset: u64, size: usize, value: u64) {
        match offset {
            o if o == offset::IPSR => self.write_ipsr(size, value),
            o if o == offset::DDTP => self.write_ddtp(size, value),
            o if o == CQ_SPEC.csr => {
                let _ = self.regs.write(offset, size, value);
                queue::process_control(&mut self.regs, &CQ_SPEC, &mut self.cq_geometry);
            }
            o if o == FQ_SPEC.csr => {
                let _ = self.regs.write(offset, size, value);
                queue::process_control(&mut self.regs, &FQ_SPEC, &mut self.fq_geometry);
            }
            o if o == PQ_SPEC.csr => {
                let _ = self.regs.write(offset, size, value);
                queue::process_control(&mut self.regs, &PQ_SPEC, &mut self.pq_geometry);
            }
            _ => {
                let _ = self.regs.write(offset, size, value);
            }
        }
    }

    /// Runs the CQ consumer loop against the host memory bus (§4.7). Call after the host writes
    /// `CQT` (ringing the command-queue tail doorbell), mirroring the other device crates'
    /// `process()` entry point.
    pub fn process(&mut self, mem: &mut dyn MemoryBus, sink: &mut dyn InterruptSink) {
        command::process_cq_tail(&mut self.regs, mem, &self.cq_geometry, &mut self.cache, sink);
    }

    fn write_ipsr(&mut self, size: usize, value: u64) {
        let _ = self.regs.compute_masked_update(offset::IPSR, size, value);
        interrupt::recompute_ipsr(&mut self.regs);
    }

    fn write_ddtp(&mut self, size: usize, value: u64) {
        let candidate = match self.regs.compute_masked_update(offset::DDTP, size, value) {
            Ok(c) => c,
            Err(_) => return,
        };
        let current = DdtpMode::from_bits(self.regs.read(offset::DDTP, 8).unwrap_or(0)).unwrap_or(DdtpMode::Off);
        let requested = DdtpMode::from_bits(candidate);

        let Some(requested) = requested else { return };
        let allowed = requested == current
            || matches!(current, DdtpMode::Off | DdtpMode::Bare)
            || matches!(requested, DdtpMode::Off | DdtpMode::Bare);
        if !allowed {
            return;
        }

        let sanitized = (candidate & modereg::PPN_MASK) | requested.to_bits();
        self.regs.commit(offset::DDTP, 8, sanitized);
    }

    /// Resolves `(device_id, process_id)` to a translation outcome, fetching and caching a new
    /// context on a cache miss (the F → E → C chain of SPEC_FULL.md §2's data-flow paragraph).
    #[allow(clippy::too_many_arguments)]
    pub fn translate_request(
        &mut self,
        mem: &mut dyn MemoryBus,
        sink: &mut dyn InterruptSink,
        device_id: u32,
        process_id: u32,
        iova: u64,
        perm: Permission,
        write_data: Option<(u64, usize)>,
    ) -> TranslateOutcome {
        let ctx = match self.cache.lookup(device_id, process_id) {
            Some(ctx) => ctx,
            None => {
                let ddtp = self.regs.read(offset::DDTP, 8).unwrap_or(0);
                let mode = DdtpMode::from_bits(ddtp).unwrap_or(DdtpMode::Off);
                let ppn = (ddtp & modereg::PPN_MASK) >> modereg::PPN_SHIFT;
                let cap_value = self.regs.read(offset::CAP, 8).unwrap_or(0);
                let cap_msi_flat = cap_value & cap::MSI_FLAT != 0;

                match directory::ddt_fetch(mem, ppn, mode, self.config.intremap, false, cap_msi_flat, device_id, process_id) {
                    Ok(ctx) => {
                        self.cache.insert(ctx);
                        ctx
                    }
                    Err(cause) => {
                        self.push_ctx_fetch_fault(mem, sink, cause, perm, device_id, process_id, iova);
                        return TranslateOutcome::failed();
                    }
                }
            }
        };

        let sinks = FaultSinks {
            fq: &FQ_SPEC,
            fq_geometry: &self.fq_geometry,
            pq: &PQ_SPEC,
            pq_geometry: &self.pq_geometry,
        };
        translate::translate(&mut self.regs, mem, &sinks, sink, &ctx, iova, perm, write_data)
    }

    /// A fetch failure (no context was ever resolved) is always reported: `tc.DTF` only
    /// suppresses faults raised *against* an already-resolved context (see DESIGN.md).
    fn push_ctx_fetch_fault(
        &mut self,
        mem: &mut dyn MemoryBus,
        sink: &mut dyn InterruptSink,
        cause: Cause,
        perm: Permission,
        device_id: u32,
        process_id: u32,
        iova: u64,
    ) {
        let ttype = if perm.is_write() {
            Ttype::UntranslatedWrite
        } else {
            Ttype::UntranslatedRead
        };
        let record = FaultRecord {
            cause,
            ttype,
            did: device_id,
            pid: (process_id != 0).then_some(process_id),
            iotval: iova,
            iotval2: 0,
        };
        queue::enqueue_record(
            &mut self.regs,
            &FQ_SPEC,
            &self.fq_geometry,
            mem,
            &record.to_bytes(),
            interrupt::FQ_VECTOR,
            sink,
        );
    }
}
