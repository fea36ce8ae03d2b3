//! Per-{device_id, process_id} translation context and the bounded cache over it (component E).

use std::collections::HashMap;
use std::rc::Rc;

/// Bit-level `tc` fields consumed by the directory walk and translation path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tc {
    pub v: bool,
    pub pdtv: bool,
    pub dtf: bool,
    /// Bit 32: "page-request capable" (also gates the `EN_PRI` validation rule in §4.4 and the
    /// ATS-probe page-request path in §4.5).
    pub prpr: bool,
    pub en_pri: bool,
    pub t2gpa: bool,
    /// Endianness selector; only little-endian (`false`) is supported by this model.
    pub sbe: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ta {
    pub v: bool,
    /// `FSC.MODE`: process directory tree depth, meaningful only when `tc.pdtv` is set.
    pub pdt_mode: crate::directory::PdtpMode,
    /// `FSC.PPN`: root of the process directory tree when `tc.pdtv` is set.
    pub ppn: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MsiMode {
    #[default]
    Off,
    Flat,
    Reserved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Msiptp {
    pub mode: MsiMode,
    pub ppn: u64,
}

/// A fully-resolved translation context for one `(device_id, process_id)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslationContext {
    pub device_id: u32,
    pub process_id: u32,
    pub tc: Tc,
    pub ta: Ta,
    pub msiptp: Msiptp,
    pub msi_addr_mask: u64,
    pub msi_addr_pattern: u64,
}

impl TranslationContext {
    /// A pass-through context for `ddtp.mode == BARE`: valid, nothing else populated.
    pub fn pass_through(device_id: u32, process_id: u32) -> Self {
        Self {
            device_id,
            process_id,
            tc: Tc {
                v: true,
                ..Tc::default()
            },
            ..Self::default()
        }
    }
}

pub const LIMIT_CACHE_CTX: usize = 128;

#[derive(Debug, Clone, Default)]
pub struct ContextTable(HashMap<(u32, u32), TranslationContext>);

impl ContextTable {
    pub fn get(&self, device_id: u32, process_id: u32) -> Option<&TranslationContext> {
        self.0
            .get(&(device_id, process_id))
            .filter(|ctx| ctx.tc.v)
    }
}

/// `Rc`-swapped context cache (§5): a lookup clones the `Rc`, pinning the snapshot for the
/// duration of the walk/validate that follows a miss; only [`Self::insert`]'s overflow path
/// swaps the `Rc` the cache itself holds. A clone taken before that swap keeps seeing the old
/// table.
pub struct ContextCache {
    table: Rc<ContextTable>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self {
            table: Rc::new(ContextTable::default()),
        }
    }

    /// Pins and returns the current snapshot.
    pub fn snapshot(&self) -> Rc<ContextTable> {
        Rc::clone(&self.table)
    }

    pub fn lookup(&self, device_id: u32, process_id: u32) -> Option<TranslationContext> {
        self.table.get(device_id, process_id).copied()
    }

    /// Inserts (or replaces) a context. On overflow (§3: "on cache overflow, the entire cache is
    /// atomically replaced with a fresh empty one"), the whole table is swapped rather than
    /// evicting individual entries.
    pub fn insert(&mut self, ctx: TranslationContext) {
        if self.table.0.len() >= LIMIT_CACHE_CTX && self.table.get(ctx.device_id, ctx.process_id).is_none() {
            let mut fresh = ContextTable::default();
            fresh.0.insert((ctx.device_id, ctx.process_id), ctx);
            self.table = Rc::new(fresh);
            return;
        }
        Rc::make_mut(&mut self.table).0.insert((ctx.device_id, ctx.process_id), ctx);
    }

    /// IODIR.INVAL_DDT: `dv == false` invalidates every cached entry; otherwise only entries
    /// whose `device_id` matches.
    pub fn invalidate_ddt(&mut self, device_id: u32, dv: bool) {
        let table = Rc::make_mut(&mut self.table);
        for (key, ctx) in table.0.iter_mut() {
            if !dv || key.0 == device_id {
                ctx.tc.v = false;
            }
        }
    }

    /// IODIR.INVAL_PDT: invalidates the entry matching `(device_id, process_id)`.
    pub fn invalidate_pdt(&mut self, device_id: u32, process_id: u32) {
        let table = Rc::make_mut(&mut self.table);
        if let Some(ctx) = table.0.get_mut(&(device_id, process_id)) {
            ctx.tc.v = false;
        }
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}
