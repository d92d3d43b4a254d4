use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::protocol::RespOpc;
use serde::Serialize;
use std::sync::Arc;

/// Register offsets (byte addresses) of the fault counters, as exposed to
/// software on the peripheral bus.
pub const DATA_CORRECTABLE_OFFSET: u32 = 0x0;
pub const DATA_UNCORRECTABLE_OFFSET: u32 = 0x4;
pub const META_CORRECTABLE_OFFSET: u32 = 0x8;
pub const META_UNCORRECTABLE_OFFSET: u32 = 0xC;

/// Per-cycle fault flags aggregated across all monitored codec instances,
/// one bit per chunk/codeword.  Codec instances never touch the counters
/// directly; the fabric collects their flags into these vectors and hands
/// them to the manager once per cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultFlags {
    pub data_single: u64,
    pub data_double: u64,
    pub meta_single: u64,
    pub meta_double: u64,
}

impl FaultFlags {
    pub fn any(&self) -> bool {
        (self.data_single | self.data_double | self.meta_single | self.meta_double) != 0
    }
}

/// Software-visible snapshot of the four counters.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct EccCounters {
    pub data_correctable: u32,
    pub data_uncorrectable: u32,
    pub meta_correctable: u32,
    pub meta_uncorrectable: u32,
}

/// Request on the generic peripheral bus the register block hangs off of.
#[derive(Debug, Clone, Default)]
pub struct PeriphRequest {
    pub addr: u32,
    pub is_write: bool,
    pub wdata: u32,
    pub be: u8,
    pub id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PeriphResponse {
    pub rdata: u32,
    pub opc: RespOpc,
    pub id: u32,
}

#[derive(Debug, Default)]
pub struct EccManagerState {
    counters: EccCounters,
}

/// Aggregates per-cycle fault flags into four saturating counters.  Counters
/// only move toward saturation; the sole way down is a software clear through
/// the register bus.
#[derive(Debug, Default)]
pub struct EccManager {
    base: ModuleBase<EccManagerState, ()>,
}

module!(EccManager, EccManagerState, (),);

impl ModuleBehaviors for EccManager {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state.counters = EccCounters::default();
    }
}

impl EccManager {
    pub fn new() -> Self {
        let mut me = EccManager::default();
        me.init_conf(Arc::new(()));
        me
    }

    /// Fold one cycle's worth of fault flags into the counters.
    pub fn record(&mut self, flags: &FaultFlags) {
        let c = &mut self.base.state.counters;
        c.data_correctable = c
            .data_correctable
            .saturating_add(flags.data_single.count_ones());
        c.data_uncorrectable = c
            .data_uncorrectable
            .saturating_add(flags.data_double.count_ones());
        c.meta_correctable = c
            .meta_correctable
            .saturating_add(flags.meta_single.count_ones());
        c.meta_uncorrectable = c
            .meta_uncorrectable
            .saturating_add(flags.meta_double.count_ones());
    }

    pub fn counters(&self) -> EccCounters {
        self.base.state.counters
    }

    /// Single-cycle register access.  Reads return the current value; a write
    /// with any active strobe clears the addressed counter and nothing else.
    /// Grant is unconditional (reads never block).
    pub fn periph_access(&mut self, req: &PeriphRequest) -> PeriphResponse {
        let c = &mut self.base.state.counters;
        let slot: Option<&mut u32> = match req.addr {
            DATA_CORRECTABLE_OFFSET => Some(&mut c.data_correctable),
            DATA_UNCORRECTABLE_OFFSET => Some(&mut c.data_uncorrectable),
            META_CORRECTABLE_OFFSET => Some(&mut c.meta_correctable),
            META_UNCORRECTABLE_OFFSET => Some(&mut c.meta_uncorrectable),
            _ => None,
        };
        match slot {
            Some(counter) => {
                let rdata = *counter;
                if req.is_write && req.be != 0 {
                    *counter = 0;
                }
                PeriphResponse {
                    rdata,
                    opc: RespOpc::Ok,
                    id: req.id,
                }
            }
            None => PeriphResponse {
                rdata: 0,
                opc: RespOpc::Err,
                id: req.id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(addr: u32) -> PeriphRequest {
        PeriphRequest {
            addr,
            ..PeriphRequest::default()
        }
    }

    fn clear(addr: u32) -> PeriphRequest {
        PeriphRequest {
            addr,
            is_write: true,
            wdata: 0xFFFF_FFFF,
            be: 0xF,
            ..PeriphRequest::default()
        }
    }

    #[test]
    fn counters_accumulate_popcounts() {
        let mut mgr = EccManager::new();
        mgr.record(&FaultFlags {
            data_single: 0b1011,
            meta_double: 0b1,
            ..FaultFlags::default()
        });
        mgr.record(&FaultFlags {
            data_single: 0b1,
            data_double: 0b11,
            ..FaultFlags::default()
        });
        let c = mgr.counters();
        assert_eq!(4, c.data_correctable);
        assert_eq!(2, c.data_uncorrectable);
        assert_eq!(0, c.meta_correctable);
        assert_eq!(1, c.meta_uncorrectable);
    }

    #[test]
    fn counters_are_monotonic_between_clears() {
        let mut mgr = EccManager::new();
        let mut last = 0;
        for _ in 0..100 {
            mgr.record(&FaultFlags {
                data_single: 0b1,
                ..FaultFlags::default()
            });
            let now = mgr.counters().data_correctable;
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn clear_targets_exactly_one_counter() {
        let mut mgr = EccManager::new();
        mgr.record(&FaultFlags {
            data_single: 0b1,
            data_double: 0b1,
            meta_single: 0b1,
            meta_double: 0b1,
        });
        let resp = mgr.periph_access(&clear(META_CORRECTABLE_OFFSET));
        // RW1C-like: the write returns the pre-clear value.
        assert_eq!(1, resp.rdata);
        let c = mgr.counters();
        assert_eq!(0, c.meta_correctable);
        assert_eq!(1, c.data_correctable);
        assert_eq!(1, c.data_uncorrectable);
        assert_eq!(1, c.meta_uncorrectable);
    }

    #[test]
    fn reads_do_not_disturb_state() {
        let mut mgr = EccManager::new();
        mgr.record(&FaultFlags {
            data_double: 0b111,
            ..FaultFlags::default()
        });
        assert_eq!(3, mgr.periph_access(&read(DATA_UNCORRECTABLE_OFFSET)).rdata);
        assert_eq!(3, mgr.periph_access(&read(DATA_UNCORRECTABLE_OFFSET)).rdata);
    }

    #[test]
    fn unmapped_offset_returns_error_opcode() {
        let mut mgr = EccManager::new();
        let resp = mgr.periph_access(&read(0x10));
        assert_eq!(RespOpc::Err, resp.opc);
        assert_eq!(0, resp.rdata);
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        let mut mgr = EccManager::new();
        mgr.base.state.counters.data_correctable = u32::MAX - 1;
        mgr.record(&FaultFlags {
            data_single: 0b111,
            ..FaultFlags::default()
        });
        assert_eq!(u32::MAX, mgr.counters().data_correctable);
    }
}
