use crate::interco::rob::{ReorderBuffer, RobConfig};
use crate::interco::router::WideRequest;
use crate::interco::top::HwpePort;
use crate::protocol::{MasterPort, MemRequest, RespOpc};
use crate::traffic::config::{HwpeTrafficConfig, TrafficConfig};
use crate::traffic::patterns::{mix64, CompiledPattern};
use crate::traffic::stimuli::Stimulus;
use log::{debug, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

/// Golden image of the scratchpad, shared by all self-checking drivers.
/// Updated at write grant, sampled at read grant; because equal addresses
/// land in the same bank, two drivers can never handshake on the same word in
/// the same cycle, so grant order fully serializes the mirror.
pub type Mirror = Rc<RefCell<HashMap<u64, u32>>>;

fn wdata_for(seed: u64, master: usize, idx: u32) -> u32 {
    mix64(seed ^ ((master as u64) << 32) ^ idx as u64) as u32
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct MasterStats {
    pub writes: u32,
    pub reads: u32,
    /// Read responses whose data matched the mirror.
    pub reads_checked: u32,
    pub mismatches: u32,
    /// Responses flagged `Err` by the fabric (uncorrectable path faults).
    pub err_resps: u32,
    /// Cycles spent with a posted request left ungranted.
    pub stall_cycles: u64,
}

#[derive(Debug, Clone)]
enum Step {
    Gap(u64),
    Op {
        is_read: bool,
        addr: u64,
        wdata: u32,
        id: u32,
    },
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    is_read: bool,
    addr: u64,
    wdata: u32,
    id: u32,
    /// Mirror value sampled at grant; None when reading a never-written word.
    expect: Option<u32>,
}

/// In-order self-checking driver for one narrow port.  Runs a write pass over
/// its address pattern followed by a read-back pass, inserting random idle
/// bubbles between requests, and compares every read response against the
/// shared mirror.
pub struct TrafficMaster {
    idx: usize,
    program: VecDeque<Step>,
    mirror: Mirror,
    rng: StdRng,
    max_gap: u64,
    gap_left: u64,
    in_flight: Option<InFlight>,
    awaiting_resp: bool,
    pub stats: MasterStats,
}

impl TrafficMaster {
    pub fn from_pattern(
        idx: usize,
        config: &TrafficConfig,
        pattern: &CompiledPattern,
        mirror: Mirror,
    ) -> Self {
        let mut program = VecDeque::new();
        for pass in 0..2 {
            for req in 0..config.reqs_per_master {
                program.push_back(Step::Op {
                    is_read: pass == 1,
                    addr: pattern.addr(req),
                    wdata: wdata_for(config.seed, idx, req),
                    id: req & 0xFF,
                });
            }
        }
        Self::with_program(idx, config, program, mirror)
    }

    pub fn from_stimuli(
        idx: usize,
        config: &TrafficConfig,
        stimuli: &[Stimulus],
        mirror: Mirror,
    ) -> Self {
        let program = stimuli
            .iter()
            .map(|s| match *s {
                Stimulus::Idle => Step::Gap(1),
                Stimulus::Op {
                    id,
                    is_read,
                    data,
                    addr,
                } => Step::Op {
                    is_read,
                    addr,
                    wdata: data,
                    id,
                },
            })
            .collect();
        Self::with_program(idx, config, program, mirror)
    }

    fn with_program(
        idx: usize,
        config: &TrafficConfig,
        program: VecDeque<Step>,
        mirror: Mirror,
    ) -> Self {
        Self {
            idx,
            program,
            mirror,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(idx as u64)),
            max_gap: config.max_cycle_offset,
            gap_left: 0,
            in_flight: None,
            awaiting_resp: false,
            stats: MasterStats::default(),
        }
    }

    /// Post the next request, if any.  Called before the fabric tick so that
    /// the posted valid comes from registered state only.
    pub fn drive(&mut self, port: &mut MasterPort) {
        if port.has_pending() {
            self.stats.stall_cycles += 1;
            return;
        }
        if self.awaiting_resp {
            return;
        }
        if self.gap_left > 0 {
            self.gap_left -= 1;
            return;
        }
        match self.program.pop_front() {
            None => {}
            Some(Step::Gap(n)) => self.gap_left = n.saturating_sub(1),
            Some(Step::Op {
                is_read,
                addr,
                wdata,
                id,
            }) => {
                port.post(MemRequest {
                    addr,
                    is_read,
                    be: if is_read { 0 } else { 0xF },
                    wdata: wdata as u64,
                    user: 0,
                    id,
                    ecc: 0,
                });
                self.in_flight = Some(InFlight {
                    is_read,
                    addr,
                    wdata,
                    id,
                    expect: None,
                });
            }
        }
    }

    /// Collect grant and response, check read data, and schedule the idle gap
    /// before the next request.  Called after the fabric tick.
    pub fn observe(&mut self, port: &mut MasterPort) {
        // Response first: a write response can share a cycle with the grant
        // of the request that follows it, and must not be mistaken for it.
        if let Some(resp) = port.take_resp() {
            if self.awaiting_resp {
                let fly = self.in_flight.take().expect("response with nothing in flight");
                self.awaiting_resp = false;
                if resp.opc == RespOpc::Err {
                    self.stats.err_resps += 1;
                } else if let Some(expect) = fly.expect {
                    if resp.rdata as u32 == expect && resp.id == fly.id {
                        self.stats.reads_checked += 1;
                    } else {
                        self.stats.mismatches += 1;
                        warn!(
                            "master {}: read @ {:#010x} returned {:#010x}, expected {:#010x}",
                            self.idx, fly.addr, resp.rdata as u32, expect
                        );
                    }
                }
                self.schedule_gap();
            }
            // Write responses (when the fabric generates them) carry no data
            // worth checking and are dropped here.
        }
        if port.granted() {
            let fly = self.in_flight.as_mut().expect("grant with nothing in flight");
            if fly.is_read {
                fly.expect = self.mirror.borrow().get(&fly.addr).copied();
                self.awaiting_resp = true;
                self.stats.reads += 1;
            } else {
                self.mirror.borrow_mut().insert(fly.addr, fly.wdata);
                self.stats.writes += 1;
                self.in_flight = None;
                self.schedule_gap();
            }
        }
    }

    fn schedule_gap(&mut self) {
        if self.max_gap > 0 {
            self.gap_left = self.rng.gen_range(0..=self.max_gap);
        }
    }

    pub fn done(&self, port: &MasterPort) -> bool {
        self.program.is_empty()
            && self.in_flight.is_none()
            && !self.awaiting_resp
            && !port.has_pending()
    }
}

#[derive(Debug, Clone, Copy)]
enum DmaFly {
    Write { addr: u64, wdata: u32 },
    Read { addr: u64, tag: u32 },
}

/// DMA-style driver: same write/read-back program as [`TrafficMaster`], but
/// the read pass funnels through a reorder buffer.  Each read carries its ROB
/// tag in the `user` field; the fabric echoes the tag and completions retire
/// strictly in allocation order regardless of fill order.
pub struct DmaMaster {
    idx: usize,
    writes: VecDeque<(u64, u32)>,
    reads: VecDeque<u64>,
    mirror: Mirror,
    rob: ReorderBuffer,
    /// (tag, mirror value at grant), in allocation order.
    expected: VecDeque<(u32, Option<u32>)>,
    in_flight: Option<DmaFly>,
    awaiting_read: bool,
    pub stats: MasterStats,
}

impl DmaMaster {
    pub fn new(
        idx: usize,
        config: &TrafficConfig,
        pattern: &CompiledPattern,
        rob_depth: usize,
        mirror: Mirror,
    ) -> Self {
        let writes = (0..config.reqs_per_master)
            .map(|req| (pattern.addr(req), wdata_for(config.seed, idx, req)))
            .collect();
        let reads = (0..config.reqs_per_master)
            .map(|req| pattern.addr(req))
            .collect();
        Self {
            idx,
            writes,
            reads,
            mirror,
            rob: ReorderBuffer::new(Arc::new(RobConfig { depth: rob_depth })),
            expected: VecDeque::new(),
            in_flight: None,
            awaiting_read: false,
            stats: MasterStats::default(),
        }
    }

    pub fn rob(&self) -> &ReorderBuffer {
        &self.rob
    }

    pub fn drive(&mut self, port: &mut MasterPort) {
        if port.has_pending() {
            self.stats.stall_cycles += 1;
            return;
        }
        if let Some((addr, wdata)) = self.writes.pop_front() {
            port.post(MemRequest {
                addr,
                is_read: false,
                be: 0xF,
                wdata: wdata as u64,
                id: self.idx as u32,
                ..MemRequest::default()
            });
            self.in_flight = Some(DmaFly::Write { addr, wdata });
            return;
        }
        if self.awaiting_read || !self.rob.can_alloc() {
            return;
        }
        if let Some(addr) = self.reads.pop_front() {
            let tag = self.rob.alloc();
            port.post(MemRequest {
                addr,
                is_read: true,
                user: tag,
                id: self.idx as u32,
                ..MemRequest::default()
            });
            self.in_flight = Some(DmaFly::Read { addr, tag });
        }
    }

    pub fn observe(&mut self, port: &mut MasterPort) {
        if let Some(resp) = port.take_resp() {
            if self.awaiting_read {
                self.awaiting_read = false;
                if resp.opc == RespOpc::Err {
                    self.stats.err_resps += 1;
                    // The slot must still retire; fill with what arrived.
                }
                self.rob.fill(resp.user, resp);
            }
        }
        if port.granted() {
            match self.in_flight.take().expect("grant with nothing in flight") {
                DmaFly::Write { addr, wdata } => {
                    self.mirror.borrow_mut().insert(addr, wdata);
                    self.stats.writes += 1;
                }
                DmaFly::Read { addr, tag } => {
                    let expect = self.mirror.borrow().get(&addr).copied();
                    self.expected.push_back((tag, expect));
                    self.awaiting_read = true;
                    self.stats.reads += 1;
                }
            }
        }
        while let Some(resp) = self.rob.retire() {
            let (tag, expect) = self
                .expected
                .pop_front()
                .expect("retirement with no allocation on record");
            assert_eq!(tag, resp.user, "reorder buffer retired out of allocation order");
            if resp.opc == RespOpc::Err {
                // already counted at fill time
            } else if let Some(expect) = expect {
                if resp.rdata as u32 == expect {
                    self.stats.reads_checked += 1;
                } else {
                    self.stats.mismatches += 1;
                    warn!(
                        "dma {}: reordered read returned {:#010x}, expected {:#010x}",
                        self.idx, resp.rdata as u32, expect
                    );
                }
            }
        }
    }

    pub fn done(&self, port: &MasterPort) -> bool {
        self.writes.is_empty()
            && self.reads.is_empty()
            && self.rob.occupancy() == 0
            && self.in_flight.is_none()
            && !self.awaiting_read
            && !port.has_pending()
    }
}

/// Wide-port driver: a strided write pass followed by a read-back pass, each
/// request spanning `width` consecutive banks with all-or-nothing handshakes.
pub struct HwpeDriver {
    config: HwpeTrafficConfig,
    width: usize,
    mem_bytes: u64,
    seed: u64,
    mirror: Mirror,
    phase_read: bool,
    next: u32,
    in_flight: Option<(u64, Vec<Option<u32>>)>,
    awaiting_resp: bool,
    pub stats: MasterStats,
}

impl HwpeDriver {
    pub fn new(
        config: &HwpeTrafficConfig,
        seed: u64,
        width: usize,
        mem_bytes: u64,
        mirror: Mirror,
    ) -> Self {
        Self {
            config: config.clone(),
            width,
            mem_bytes,
            seed,
            mirror,
            phase_read: false,
            next: 0,
            in_flight: None,
            awaiting_resp: false,
            stats: MasterStats::default(),
        }
    }

    fn addr_of(&self, idx: u32) -> u64 {
        let span = (self.width * 4) as u64;
        // Keep the whole span inside the scratchpad window.
        (self.config.base + idx as u64 * self.config.stride) % (self.mem_bytes - span + 4) & !0x3
    }

    fn lane_data(&self, idx: u32) -> Vec<u32> {
        (0..self.width)
            .map(|lane| wdata_for(self.seed, usize::MAX, idx * self.width as u32 + lane as u32))
            .collect()
    }

    pub fn drive(&mut self, port: &mut HwpePort) {
        if port.has_pending() {
            self.stats.stall_cycles += 1;
            return;
        }
        if self.awaiting_resp || self.next >= self.config.reqs {
            return;
        }
        let idx = self.next;
        let addr = self.addr_of(idx);
        if self.phase_read {
            port.post(WideRequest {
                addr,
                is_read: true,
                wdata: vec![0; self.width],
                be: vec![0; self.width],
                user: 0,
                id: idx,
            });
        } else {
            port.post(WideRequest {
                addr,
                is_read: false,
                wdata: self.lane_data(idx),
                be: vec![0xF; self.width],
                user: 0,
                id: idx,
            });
        }
        self.in_flight = Some((addr, Vec::new()));
    }

    pub fn observe(&mut self, port: &mut HwpePort) {
        if let Some(resp) = port.take_resp() {
            if self.awaiting_resp {
                self.awaiting_resp = false;
                let (addr, expect) = self.in_flight.take().expect("response with nothing in flight");
                if resp.opc == RespOpc::Err {
                    self.stats.err_resps += 1;
                } else {
                    let ok = resp
                        .rdata
                        .iter()
                        .zip(expect.iter())
                        .all(|(got, want)| want.map_or(true, |w| *got == w));
                    if ok {
                        self.stats.reads_checked += 1;
                    } else {
                        self.stats.mismatches += 1;
                        warn!(
                            "hwpe: wide read @ {:#010x} mismatched mirror: {:08x?}",
                            addr, resp.rdata
                        );
                    }
                }
                self.advance();
            }
        }
        if port.granted() {
            let idx = self.next;
            let addr = self.addr_of(idx);
            if self.phase_read {
                let mirror = self.mirror.borrow();
                let expect = (0..self.width)
                    .map(|lane| mirror.get(&(addr + lane as u64 * 4)).copied())
                    .collect();
                self.in_flight = Some((addr, expect));
                self.awaiting_resp = true;
                self.stats.reads += 1;
            } else {
                let data = self.lane_data(idx);
                {
                    let mut mirror = self.mirror.borrow_mut();
                    for (lane, word) in data.iter().enumerate() {
                        mirror.insert(addr + lane as u64 * 4, *word);
                    }
                }
                self.in_flight = None;
                self.stats.writes += 1;
                self.advance();
            }
        }
    }

    fn advance(&mut self) {
        self.next += 1;
        if self.next >= self.config.reqs && !self.phase_read {
            debug!("hwpe: write pass complete, starting read-back");
            self.phase_read = true;
            self.next = 0;
        }
    }

    pub fn done(&self, port: &HwpePort) -> bool {
        self.phase_read && self.next >= self.config.reqs && !port.has_pending() && !self.awaiting_resp
    }
}
