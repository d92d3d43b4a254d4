use crate::base::behavior::*;
use crate::ecc::{
    EccConfig, EccCounters, EccManager, FaultFlags, FaultInjectConfig, FaultInjector,
    PeriphRequest, PeriphResponse, RequestCodec, ResponseCodec,
};
use crate::interco::arbiter::{ArbMode, Arbiter, ArbiterConfig, BranchSel};
use crate::interco::ooo_mux::{OooMux, OooMuxConfig};
use crate::interco::router::{BankRouter, WideRequest, WideResponse};
use crate::mem::TcdmBanks;
use crate::protocol::{ChannelParams, MasterPort, MemRequest, MemResponse, RespOpc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FabricConfig {
    pub num_cores: usize,
    pub num_dma: usize,
    pub num_ext: usize,
    pub num_banks: usize,
    pub tot_mem_size_kb: usize,
    pub hwpe_present: bool,
    /// Banks one wide HWPE word spans, all in a single cycle.
    pub hwpe_width: usize,
    pub invert_priority: bool,
    pub low_priority_max_stall: u8,
    pub arb_mode: ArbMode,
    /// Whether `r_valid` pulses after a granted write.  Non-normative either
    /// way; masters must not rely on it.
    pub rvalid_on_write: bool,
    pub user_width: usize,
    pub id_width: usize,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            num_cores: 8,
            num_dma: 0,
            num_ext: 0,
            num_banks: 8,
            tot_mem_size_kb: 32,
            hwpe_present: true,
            hwpe_width: 4,
            invert_priority: false,
            low_priority_max_stall: 0,
            arb_mode: ArbMode::Global,
            rvalid_on_write: true,
            user_width: 8,
            id_width: 8,
        }
    }
}

impl FabricConfig {
    pub fn num_log_ports(&self) -> usize {
        self.num_cores + self.num_dma + self.num_ext
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FabricStats {
    pub cycles: u64,
    pub log_grants: u64,
    pub hwpe_grants: u64,
    /// Cycles where the HWPE lost at least one spanned bank and therefore
    /// got no grant at all (all-or-nothing wide handshake).
    pub hwpe_partial_stalls: u64,
    pub starvation_overrides: u64,
    pub resps_delivered: u64,
    pub bank_grants: Vec<u64>,
    /// Cycles where both branches wanted the same bank.
    pub bank_conflicts: Vec<u64>,
}

/// Wide HWPE-facing channel endpoint, same handshake discipline as
/// `MasterPort` but carrying one word per spanned bank.
#[derive(Debug, Default)]
pub struct HwpePort {
    req: Option<WideRequest>,
    granted: bool,
    resp: Option<WideResponse>,
}

impl HwpePort {
    pub fn post(&mut self, req: WideRequest) {
        assert!(
            self.req.is_none(),
            "posted a wide request while one is still pending"
        );
        self.req = Some(req);
        self.granted = false;
    }

    pub fn has_pending(&self) -> bool {
        self.req.is_some()
    }

    pub fn granted(&self) -> bool {
        self.granted
    }

    pub fn take_resp(&mut self) -> Option<WideResponse> {
        self.resp.take()
    }
}

struct EccPipeline {
    req_codec: RequestCodec,
    resp_codec: ResponseCodec,
    injector: FaultInjector,
    manager: EccManager,
}

enum Staged {
    Narrow {
        bank: usize,
        resp: MemResponse,
        suppress_rvalid: bool,
    },
    Hwpe {
        lanes: Vec<MemResponse>,
        user: u32,
        id: u32,
        suppress_rvalid: bool,
    },
}

/// The interconnect: narrow core/DMA/external ports on the log branch (the
/// crossbar black box realized as one N-to-1 mux per bank), the wide HWPE
/// port on the HWPE branch through the bank router, both joined per bank by
/// the priority arbiter in front of the banks.
///
/// `tick_one` advances the whole fabric as one atomic cycle:
/// deliver the previous cycle's bank responses, arbitrate the current
/// requests, perform granted bank accesses, and stage their responses for the
/// next cycle.  Grants are computed from posted (registered) requests only,
/// so no valid can ever depend on a same-cycle grant.
pub struct TcdmFabric {
    config: Arc<FabricConfig>,
    params: ChannelParams,
    banks: TcdmBanks,
    ports: Vec<MasterPort>,
    hwpe: HwpePort,
    log_mux: Vec<OooMux>,
    arbiter: Arbiter,
    router: Option<BankRouter>,
    ecc: Option<EccPipeline>,
    staged: Vec<Staged>,
    stats: FabricStats,
    cycle: u64,
}

impl TcdmFabric {
    pub fn new(
        config: Arc<FabricConfig>,
        ecc_config: &EccConfig,
        inject_config: &FaultInjectConfig,
    ) -> Self {
        assert!(config.num_log_ports() > 0, "fabric needs at least one narrow port");
        assert!(config.num_banks > 0, "fabric needs at least one bank");

        let banks = TcdmBanks::new(config.num_banks, config.tot_mem_size_kb << 10);
        let mut params = ChannelParams {
            user_width: config.user_width,
            id_width: config.id_width,
            ..ChannelParams::default()
        };
        let ecc = ecc_config.enabled.then(|| {
            let req_codec = RequestCodec::new(params, ecc_config);
            let resp_codec = ResponseCodec::new(params, ecc_config);
            let injector = FaultInjector::new(*inject_config, &params, ecc_config.chunk_bits);
            EccPipeline {
                req_codec,
                resp_codec,
                injector,
                manager: EccManager::new(),
            }
        });
        if let Some(pipeline) = &ecc {
            params.ecc_width = pipeline.req_codec.ecc_width();
        }

        let log_mux = (0..config.num_banks)
            .map(|_| {
                OooMux::new(Arc::new(OooMuxConfig {
                    num_inputs: config.num_log_ports(),
                }))
            })
            .collect();
        let arbiter = Arbiter::new(Arc::new(ArbiterConfig {
            num_banks: config.num_banks,
            invert_priority: config.invert_priority,
            low_priority_max_stall: config.low_priority_max_stall,
            mode: config.arb_mode,
        }));
        let router = config.hwpe_present.then(|| {
            BankRouter::new(
                config.hwpe_width,
                config.num_banks,
                banks.word_bytes(),
                banks.total_bytes(),
            )
        });

        let mut stats = FabricStats::default();
        stats.bank_grants = vec![0; config.num_banks];
        stats.bank_conflicts = vec![0; config.num_banks];

        Self {
            params,
            banks,
            ports: (0..config.num_log_ports())
                .map(|_| MasterPort::default())
                .collect(),
            hwpe: HwpePort::default(),
            log_mux,
            arbiter,
            router,
            ecc,
            staged: Vec::new(),
            stats,
            cycle: 0,
            config,
        }
    }

    pub fn params(&self) -> ChannelParams {
        self.params
    }

    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    pub fn port_mut(&mut self, idx: usize) -> &mut MasterPort {
        &mut self.ports[idx]
    }

    pub fn port(&self, idx: usize) -> &MasterPort {
        &self.ports[idx]
    }

    pub fn hwpe(&self) -> &HwpePort {
        &self.hwpe
    }

    pub fn hwpe_mut(&mut self) -> &mut HwpePort {
        assert!(self.router.is_some(), "no HWPE port configured");
        &mut self.hwpe
    }

    pub fn stats(&self) -> &FabricStats {
        &self.stats
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn mem(&self) -> &TcdmBanks {
        &self.banks
    }

    pub fn ecc_counters(&self) -> Option<EccCounters> {
        self.ecc.as_ref().map(|p| p.manager.counters())
    }

    /// Fault-counter register block access, one cycle, never stalls.
    pub fn ecc_periph(&mut self, req: &PeriphRequest) -> Option<PeriphResponse> {
        self.ecc.as_mut().map(|p| p.manager.periph_access(req))
    }

    fn deliver_staged(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        for entry in staged {
            match entry {
                Staged::Narrow {
                    bank,
                    resp,
                    suppress_rvalid,
                } => {
                    // the latched grant-time issuer steers r_valid, not the
                    // current-cycle mux winner
                    let master = self.log_mux[bank].take_issuer();
                    if !suppress_rvalid {
                        self.ports[master].deliver(resp);
                        self.stats.resps_delivered += 1;
                    }
                }
                Staged::Hwpe {
                    lanes,
                    user,
                    id,
                    suppress_rvalid,
                } => {
                    let router = self.router.as_ref().expect("hwpe response without router");
                    if !suppress_rvalid {
                        self.hwpe.resp = Some(router.gather(&lanes, user, id));
                        self.stats.resps_delivered += 1;
                    }
                }
            }
        }
    }

    /// Run one granted narrow request through the optional ECC pipe and the
    /// bank, returning the staged response.
    fn access_bank(
        &mut self,
        mut req: MemRequest,
        flags: &mut FaultFlags,
        flag_base: usize,
    ) -> (MemResponse, bool) {
        let mut uncorrectable = false;
        if let Some(pipeline) = &mut self.ecc {
            pipeline.req_codec.encode(&mut req);
            let _ = pipeline.injector.maybe_inject(&mut req);
            let decode = pipeline.req_codec.decode(&mut req);
            for (chunk, (&s, &d)) in decode
                .data_single
                .iter()
                .zip(decode.data_double.iter())
                .enumerate()
            {
                let bit = (flag_base + chunk) % 64;
                if s {
                    flags.data_single |= 1 << bit;
                }
                if d {
                    flags.data_double |= 1 << bit;
                }
            }
            let bit = flag_base % 64;
            if decode.meta_single {
                flags.meta_single |= 1 << bit;
            }
            if decode.meta_double {
                flags.meta_double |= 1 << bit;
            }
            uncorrectable = decode.any_double();
        }

        let is_write = !req.is_read;
        let access = if is_write {
            self.banks
                .write_word(req.addr, req.wdata as u32, req.be)
                .map(|_| 0u32)
        } else {
            self.banks.read_word(req.addr)
        };
        let (rdata, fault) = match access {
            Ok(word) => (word, false),
            Err(err) => {
                // report, don't block: deliver an error response instead of
                // taking the fabric down
                warn!("bank access fault: {}", err);
                (0, true)
            }
        };
        let mut resp = MemResponse {
            rdata: rdata as u64,
            opc: if uncorrectable || fault {
                RespOpc::Err
            } else {
                RespOpc::Ok
            },
            user: req.user,
            id: req.id,
            ecc: 0,
        };
        if let Some(pipeline) = &mut self.ecc {
            pipeline.resp_codec.encode(&mut resp);
            let decode = pipeline.resp_codec.decode(&mut resp);
            debug_assert!(!decode.meta_single && !decode.meta_double);
        }
        (resp, is_write && !self.config.rvalid_on_write)
    }

    pub fn reset(&mut self) {
        self.banks.clear();
        for port in &mut self.ports {
            port.reset();
        }
        self.hwpe = HwpePort::default();
        for mux in &mut self.log_mux {
            mux.reset();
        }
        self.arbiter.reset();
        if let Some(pipeline) = &mut self.ecc {
            pipeline.manager.reset();
        }
        self.staged.clear();
        self.stats = FabricStats {
            bank_grants: vec![0; self.config.num_banks],
            bank_conflicts: vec![0; self.config.num_banks],
            ..FabricStats::default()
        };
        self.cycle = 0;
    }
}

impl ModuleBehaviors for TcdmFabric {
    fn tick_one(&mut self) {
        let num_banks = self.config.num_banks;
        let num_ports = self.config.num_log_ports();

        for port in &mut self.ports {
            port.begin_cycle();
        }
        self.hwpe.granted = false;
        self.hwpe.resp = None;

        // responses of requests granted last cycle become visible now
        self.deliver_staged();

        // log branch: per-bank winner among the narrow ports
        let mut log_winner: Vec<Option<usize>> = vec![None; num_banks];
        for bank in 0..num_banks {
            let valid: Vec<bool> = (0..num_ports)
                .map(|m| {
                    self.ports[m]
                        .pending()
                        .is_some_and(|req| self.banks.bank_of(req.addr) == bank)
                })
                .collect();
            log_winner[bank] = self.log_mux[bank].decide(&valid, None);
        }
        let log_valid: Vec<bool> = log_winner.iter().map(|w| w.is_some()).collect();

        // HWPE branch: a pending wide request asserts valid on every bank it
        // spans
        let mut hwpe_split: Vec<(usize, MemRequest)> = Vec::new();
        let mut hwpe_valid = vec![false; num_banks];
        if let (Some(router), Some(req)) = (&self.router, &self.hwpe.req) {
            hwpe_split = router.split(req);
            for &(bank, _) in &hwpe_split {
                hwpe_valid[bank] = true;
            }
        }

        for bank in 0..num_banks {
            if log_valid[bank] && hwpe_valid[bank] {
                self.stats.bank_conflicts[bank] += 1;
            }
        }

        // join the branches: log is the physical high input, HWPE the low
        let decision = self.arbiter.decide(&log_valid, &hwpe_valid);
        if decision.override_active {
            self.stats.starvation_overrides += 1;
        }

        // wide handshake is all-or-nothing across the spanned banks
        let hwpe_all_granted = !hwpe_split.is_empty()
            && hwpe_split
                .iter()
                .all(|&(bank, _)| decision.winners[bank] == Some(BranchSel::Low));
        if !hwpe_split.is_empty() && !hwpe_all_granted {
            self.stats.hwpe_partial_stalls += 1;
        }

        let mut flags = FaultFlags::default();

        for bank in 0..num_banks {
            match decision.winners[bank] {
                Some(BranchSel::High) => {
                    let master = log_winner[bank].expect("arbiter granted an idle branch");
                    let req = self.ports[master].consume_granted();
                    self.log_mux[bank].commit(Some(master), true);
                    let (resp, suppress_rvalid) = self.access_bank(req, &mut flags, master);
                    self.staged.push(Staged::Narrow {
                        bank,
                        resp,
                        suppress_rvalid,
                    });
                    self.stats.log_grants += 1;
                    self.stats.bank_grants[bank] += 1;
                }
                _ => {
                    // losing or idle log winner holds for next cycle
                    self.log_mux[bank].commit(log_winner[bank], false);
                }
            }
        }

        if hwpe_all_granted {
            let req = self.hwpe.req.take().expect("wide grant with no request");
            self.hwpe.granted = true;
            let mut lanes = Vec::with_capacity(hwpe_split.len());
            let mut is_write = false;
            for (lane, (bank, narrow)) in hwpe_split.into_iter().enumerate() {
                is_write = !narrow.is_read;
                let (resp, _) = self.access_bank(narrow, &mut flags, num_ports + lane);
                self.stats.bank_grants[bank] += 1;
                lanes.push(resp);
            }
            self.staged.push(Staged::Hwpe {
                lanes,
                user: req.user,
                id: req.id,
                suppress_rvalid: is_write && !self.config.rvalid_on_write,
            });
            self.stats.hwpe_grants += 1;
        }

        if let Some(pipeline) = &mut self.ecc {
            pipeline.manager.record(&flags);
            pipeline.manager.tick_one();
        }
        self.arbiter.commit(&decision);
        self.arbiter.tick_one();
        for mux in &mut self.log_mux {
            mux.tick_one();
        }
        self.stats.cycles += 1;
        self.cycle += 1;
    }

    fn reset(&mut self) {
        TcdmFabric::reset(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fabric(config: FabricConfig) -> TcdmFabric {
        TcdmFabric::new(
            Arc::new(config),
            &EccConfig::default(),
            &FaultInjectConfig::default(),
        )
    }

    fn read(addr: u64, id: u32) -> MemRequest {
        MemRequest {
            addr,
            is_read: true,
            id,
            ..MemRequest::default()
        }
    }

    fn write(addr: u64, data: u64, id: u32) -> MemRequest {
        MemRequest {
            addr,
            is_read: false,
            be: 0xF,
            wdata: data,
            id,
            ..MemRequest::default()
        }
    }

    #[test]
    fn read_response_exactly_one_cycle_after_grant() {
        let mut fab = fabric(FabricConfig {
            num_cores: 1,
            hwpe_present: false,
            ..FabricConfig::default()
        });
        fab.port_mut(0).post(write(0x10, 0xABCD, 0));
        fab.tick_one();
        assert!(fab.port(0).granted());
        fab.tick_one();

        fab.port_mut(0).post(read(0x10, 0));
        fab.tick_one();
        assert!(fab.port(0).granted());
        assert!(fab.port(0).resp().is_none(), "same-cycle response is illegal");
        fab.tick_one();
        let resp = fab.port_mut(0).take_resp().expect("r_valid at t+1");
        assert_eq!(0xABCD, resp.rdata);
        assert_eq!(RespOpc::Ok, resp.opc);
    }

    #[test]
    fn disjoint_banks_grant_in_parallel() {
        let mut fab = fabric(FabricConfig {
            num_cores: 4,
            hwpe_present: false,
            ..FabricConfig::default()
        });
        for m in 0..4 {
            fab.port_mut(m).post(read((m * 4) as u64, m as u32));
        }
        fab.tick_one();
        for m in 0..4 {
            assert!(fab.port(m).granted(), "core {} should be granted", m);
        }
    }

    #[test]
    fn same_bank_conflict_serializes_round_robin() {
        let mut fab = fabric(FabricConfig {
            num_cores: 4,
            hwpe_present: false,
            ..FabricConfig::default()
        });
        for m in 0..4 {
            fab.port_mut(m).post(read(0x0, m as u32));
        }
        let mut grant_order = Vec::new();
        for _ in 0..4 {
            fab.tick_one();
            let granted: Vec<usize> = (0..4).filter(|&m| fab.port(m).granted()).collect();
            assert_eq!(1, granted.len(), "one grant per bank per cycle");
            grant_order.push(granted[0]);
        }
        assert_eq!(vec![0, 1, 2, 3], grant_order);
    }

    #[test]
    fn loser_keeps_its_request_pending() {
        let mut fab = fabric(FabricConfig {
            num_cores: 2,
            hwpe_present: false,
            ..FabricConfig::default()
        });
        fab.port_mut(0).post(read(0x0, 0));
        fab.port_mut(1).post(read(0x0, 1));
        fab.tick_one();
        assert!(fab.port(0).granted());
        assert!(!fab.port(1).granted());
        // valid stays asserted; nothing the grant logic did this cycle could
        // retract it
        assert!(fab.port(1).has_pending());
        fab.tick_one();
        assert!(fab.port(1).granted());
    }

    #[test]
    fn responses_steer_to_the_issuing_master() {
        let mut fab = fabric(FabricConfig {
            num_cores: 2,
            hwpe_present: false,
            ..FabricConfig::default()
        });
        fab.port_mut(0).post(write(0x0, 0xAA, 0));
        fab.port_mut(1).post(write(0x4, 0xBB, 1));
        fab.tick_one();
        fab.tick_one();
        fab.port_mut(0).post(read(0x4, 0));
        fab.port_mut(1).post(read(0x0, 1));
        fab.tick_one();
        fab.tick_one();
        assert_eq!(0xBB, fab.port_mut(0).take_resp().unwrap().rdata);
        assert_eq!(0xAA, fab.port_mut(1).take_resp().unwrap().rdata);
    }

    #[test]
    fn wide_hwpe_round_trip() {
        let mut fab = fabric(FabricConfig {
            num_cores: 1,
            ..FabricConfig::default()
        });
        fab.hwpe_mut().post(WideRequest {
            addr: 0x20,
            is_read: false,
            wdata: vec![0x10, 0x20, 0x30, 0x40],
            be: vec![0xF; 4],
            user: 0,
            id: 9,
        });
        fab.tick_one();
        assert!(fab.hwpe_mut().granted());
        fab.tick_one();

        fab.hwpe_mut().post(WideRequest {
            addr: 0x20,
            is_read: true,
            wdata: vec![0; 4],
            be: vec![0; 4],
            user: 3,
            id: 9,
        });
        fab.tick_one();
        fab.tick_one();
        let resp = fab.hwpe_mut().take_resp().expect("wide r_valid at t+1");
        assert_eq!(vec![0x10, 0x20, 0x30, 0x40], resp.rdata);
        assert_eq!(3, resp.user);
        assert_eq!(9, resp.id);
    }

    // Contention scenario: 4 cores + width-4 HWPE + 8 banks, core 0 reads
    // 0x00 in the same cycle the HWPE writes banks 0-3.
    #[test]
    fn core_beats_hwpe_on_bank_zero_with_default_priority() {
        let mut fab = fabric(FabricConfig {
            num_cores: 4,
            ..FabricConfig::default()
        });
        fab.port_mut(0).post(read(0x0, 0));
        fab.hwpe_mut().post(WideRequest {
            addr: 0x0,
            is_read: false,
            wdata: vec![1, 2, 3, 4],
            be: vec![0xF; 4],
            user: 0,
            id: 0,
        });
        fab.tick_one();
        // log branch is high priority by default: the core wins bank 0 and
        // the all-or-nothing wide handshake stalls entirely
        assert!(fab.port(0).granted());
        assert!(!fab.hwpe_mut().granted());
        assert_eq!(1, fab.stats().hwpe_partial_stalls);
        fab.tick_one();
        assert!(fab.hwpe_mut().granted());
    }

    #[test]
    fn starvation_bound_forces_hwpe_through() {
        let mut fab = fabric(FabricConfig {
            num_cores: 1,
            low_priority_max_stall: 3,
            ..FabricConfig::default()
        });
        fab.hwpe_mut().post(WideRequest {
            addr: 0x0,
            is_read: true,
            wdata: vec![0; 4],
            be: vec![0; 4],
            user: 0,
            id: 0,
        });
        // the core hammers bank 0 every cycle; the HWPE (low side) must get
        // through by the 4th contended cycle
        for cycle in 0..3 {
            fab.port_mut(0).post(read(0x0, 0));
            fab.tick_one();
            assert!(fab.port(0).granted(), "cycle {}", cycle);
            assert!(!fab.hwpe_mut().granted(), "cycle {}", cycle);
        }
        fab.port_mut(0).post(read(0x0, 0));
        fab.tick_one();
        assert!(fab.hwpe_mut().granted(), "override must fire");
        assert!(!fab.port(0).granted());
        assert_eq!(1, fab.stats().starvation_overrides);
    }

    #[test]
    fn invert_priority_gives_hwpe_the_high_role() {
        let mut fab = fabric(FabricConfig {
            num_cores: 1,
            invert_priority: true,
            ..FabricConfig::default()
        });
        fab.port_mut(0).post(read(0x0, 0));
        fab.hwpe_mut().post(WideRequest {
            addr: 0x0,
            is_read: true,
            wdata: vec![0; 4],
            be: vec![0; 4],
            user: 0,
            id: 0,
        });
        fab.tick_one();
        assert!(fab.hwpe_mut().granted());
        assert!(!fab.port(0).granted());
    }

    #[test]
    fn rvalid_after_write_is_suppressible() {
        let mut fab = fabric(FabricConfig {
            num_cores: 1,
            hwpe_present: false,
            rvalid_on_write: false,
            ..FabricConfig::default()
        });
        fab.port_mut(0).post(write(0x8, 0x1, 0));
        fab.tick_one();
        assert!(fab.port(0).granted());
        fab.tick_one();
        assert!(fab.port(0).resp().is_none());
        // the write still took effect
        fab.port_mut(0).post(read(0x8, 0));
        fab.tick_one();
        fab.tick_one();
        assert_eq!(0x1, fab.port_mut(0).take_resp().unwrap().rdata);
    }

    #[test]
    fn ecc_corrects_injected_single_faults_end_to_end() {
        let config = FabricConfig {
            num_cores: 1,
            hwpe_present: false,
            ..FabricConfig::default()
        };
        let ecc = EccConfig {
            enabled: true,
            ..EccConfig::default()
        };
        let inject = FaultInjectConfig {
            enabled: true,
            period: 1,
            target_meta: false,
            double_every: 0,
            seed: 7,
        };
        let mut fab = TcdmFabric::new(Arc::new(config), &ecc, &inject);
        for i in 0..8u64 {
            fab.port_mut(0).post(write(i * 4, 0x100 + i, 0));
            fab.tick_one();
            fab.tick_one();
        }
        for i in 0..8u64 {
            fab.port_mut(0).post(read(i * 4, 0));
            fab.tick_one();
            fab.tick_one();
            let resp = fab.port_mut(0).take_resp().unwrap();
            assert_eq!(0x100 + i, resp.rdata, "single faults must be corrected");
            assert_eq!(RespOpc::Ok, resp.opc);
        }
        let counters = fab.ecc_counters().unwrap();
        assert_eq!(16, counters.data_correctable);
        assert_eq!(0, counters.data_uncorrectable);
    }

    #[test]
    fn injected_double_faults_flag_the_response() {
        let config = FabricConfig {
            num_cores: 1,
            hwpe_present: false,
            ..FabricConfig::default()
        };
        let ecc = EccConfig {
            enabled: true,
            ..EccConfig::default()
        };
        let inject = FaultInjectConfig {
            enabled: true,
            period: 1,
            double_every: 1,
            target_meta: false,
            seed: 3,
        };
        let mut fab = TcdmFabric::new(Arc::new(config), &ecc, &inject);
        fab.port_mut(0).post(read(0x0, 0));
        fab.tick_one();
        fab.tick_one();
        let resp = fab.port_mut(0).take_resp().unwrap();
        assert_eq!(RespOpc::Err, resp.opc, "uncorrectable must be reported");
        assert_eq!(1, fab.ecc_counters().unwrap().data_uncorrectable);
    }

    #[test]
    fn counter_register_block_reads_and_clears_through_the_fabric() {
        let config = FabricConfig {
            num_cores: 1,
            hwpe_present: false,
            ..FabricConfig::default()
        };
        let ecc = EccConfig {
            enabled: true,
            ..EccConfig::default()
        };
        let inject = FaultInjectConfig {
            enabled: true,
            period: 1,
            target_meta: false,
            seed: 5,
            ..FaultInjectConfig::default()
        };
        let mut fab = TcdmFabric::new(Arc::new(config), &ecc, &inject);
        fab.port_mut(0).post(read(0x0, 0));
        fab.tick_one();
        fab.tick_one();
        let req = PeriphRequest {
            addr: crate::ecc::manager::DATA_CORRECTABLE_OFFSET,
            ..PeriphRequest::default()
        };
        assert_eq!(1, fab.ecc_periph(&req).unwrap().rdata);
        let clear = PeriphRequest {
            is_write: true,
            wdata: 0xFFFF_FFFF,
            be: 0xF,
            ..req.clone()
        };
        let _ = fab.ecc_periph(&clear).unwrap();
        assert_eq!(0, fab.ecc_periph(&req).unwrap().rdata);
    }
}
