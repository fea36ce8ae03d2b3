//! Per-requester-id address-space registry (component F).
//!
//! *Expansion*: modeled as entries in an order-preserving `Vec` behind a `RefCell`, rather than a
//! hand-rolled linked list — the only operations SPEC_FULL.md §4.9 requires are "append on first
//! sighting" and "linear scan by device_id", both of which `Vec` gives for free and safely (see
//! DESIGN.md, Open Question decision #3).

use std::cell::RefCell;

use aero_devices::pci::PciBdf;

/// A per-device IOMMU-backed address space. `device_id` is the 16-bit requester-id; translation
/// itself is driven by the owning `IommuCore` (see `translate::translate`), not by this type.
#[derive(Debug, Clone, Copy)]
pub struct IommuAddressSpace {
    pub device_id: u32,
    pub notifier_enabled: bool,
}

impl IommuAddressSpace {
    /// Number of distinct PASID-indexed contexts this space can report, per SPEC_FULL.md §4.9:
    /// `2^pasid_bits`.
    pub fn index_count(&self, pasid_bits: u32) -> u64 {
        1u64 << pasid_bits
    }

    /// The context-cache index for an access: the transaction's `process_id` (PASID) if present,
    /// else 0.
    pub fn context_index(process_id: Option<u32>) -> u32 {
        process_id.unwrap_or(0)
    }
}

/// Registry of address spaces keyed by requester-id, with `bus` fixing the upper byte of the
/// requester-id namespace for formatting `PciBdf`s (see `IommuDeviceConfig::bus`).
#[derive(Debug, Default)]
pub struct AddressSpaceRegistry {
    bus: u8,
    spaces: RefCell<Vec<IommuAddressSpace>>,
}

impl AddressSpaceRegistry {
    pub fn new(bus: u8) -> Self {
        Self {
            bus,
            spaces: RefCell::new(Vec::new()),
        }
    }

    /// Finds the address space for `device_id`, allocating one on first sighting.
    pub fn find_address_space(&self, device_id: u32) -> IommuAddressSpace {
        let mut spaces = self.spaces.borrow_mut();
        if let Some(space) = spaces.iter().find(|s| s.device_id == device_id) {
            return *space;
        }
        let space = IommuAddressSpace {
            device_id,
            notifier_enabled: false,
        };
        spaces.push(space);
        space
    }

    pub fn bdf_for(&self, device_id: u32) -> PciBdf {
        let device = ((device_id >> 3) & 0x1F) as u8;
        let function = (device_id & 0x7) as u8;
        PciBdf::new(self.bus, device, function)
    }

    pub fn len(&self) -> usize {
        self.spaces.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
