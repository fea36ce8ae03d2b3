//! PCI/MMIO front end wrapping [`IommuCore`] (see `NvmePciDevice`/`NvmeController` for the split
//! this mirrors: a protocol engine plus a thin bus-facing wrapper).
//!
//! *Grounding note*: the retrieval pack's `aero-devices` crate ships only its `Cargo.toml` (no
//! `src/`), so the exact shape of its `PciDevice`/`PciConfigSpace` types could only be
//! reconstructed from other crates' test call-sites, not read directly (see DESIGN.md). This
//! front end commits only to what those call-sites confirm beyond doubt — `PciBdf` identity and
//! the `memory::MmioHandler` read/write surface — rather than fabricate an unverifiable
//! `impl PciDevice`.

use crate::core_engine::{IommuCore, IommuDeviceConfig};
use crate::interrupt::InterruptSink;
use aero_devices::pci::PciBdf;
use memory::{MemoryBus, MmioHandler};

/// A RISC-V IOMMU realized as a PCI/MMIO device: BAR0 is the 0x1000-byte register window
/// `IommuCore` owns; `device_id` (the requester-id this IOMMU itself answers to on the bus it
/// sits on) is derived from `bdf`.
pub struct IommuPciDevice {
    core: IommuCore,
    bdf: PciBdf,
}

impl IommuPciDevice {
    pub fn new(config: IommuDeviceConfig, device: u8, function: u8) -> Self {
        let bdf = PciBdf::new(config.bus, device, function);
        Self {
            core: IommuCore::new(config),
            bdf,
        }
    }

    pub fn bdf(&self) -> PciBdf {
        self.bdf
    }

    pub fn core(&self) -> &IommuCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut IommuCore {
        &mut self.core
    }

    /// Runs the command-queue consumer against `mem`; call after the host rings the CQ tail
    /// doorbell (a `CQT` MMIO write), mirroring `NvmeController::process`.
    pub fn process(&mut self, mem: &mut dyn MemoryBus, sink: &mut dyn InterruptSink) {
        self.core.process(mem, sink);
    }
}

impl MmioHandler for IommuPciDevice {
    fn read(&mut self, offset: u64, size: usize) -> u64 {
        self.core.read(offset, size)
    }

    fn write(&mut self, offset: u64, size: usize, value: u64) {
        self.core.write(offset, size, value);
    }
}
