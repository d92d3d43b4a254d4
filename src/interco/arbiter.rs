use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use log::debug;
use serde::Deserialize;
use std::sync::Arc;

/// Which branch an output channel is bound to for the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchSel {
    High,
    Low,
}

/// How the starvation counter detects contention.
///
/// `PerBankConflict` is experimental: the original design wires its conflict
/// detection inconsistently, so no fairness bound is guaranteed in this mode.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArbMode {
    #[default]
    Global,
    PerBankConflict,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct ArbiterConfig {
    pub num_banks: usize,
    /// Swaps which input plays the high-priority role, without rewiring.
    pub invert_priority: bool,
    /// Consecutive contended cycles the low-priority side can lose before it
    /// is forced through.  Zero disables the override entirely.
    pub low_priority_max_stall: u8,
    pub mode: ArbMode,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            num_banks: 8,
            invert_priority: false,
            low_priority_max_stall: 0,
            mode: ArbMode::Global,
        }
    }
}

/// One cycle's combinational arbitration outcome.  Computed from registered
/// state plus the input valid vectors, then committed at the clock edge.
#[derive(Debug, Clone)]
pub struct ArbDecision {
    pub winners: Vec<Option<BranchSel>>,
    pub override_active: bool,
    contended: bool,
}

#[derive(Debug, Default)]
pub struct ArbiterState {
    stall_count: u8,
}

/// Two-branch priority arbiter over `num_banks` output channels.
///
/// Requests from the winning branch are bound through to the bank; responses
/// are broadcast back to both branches by the fabric, with `r_valid`
/// deliberately left to the fabric's issuer latch (the arbiter does not know
/// which side consumed the bank last cycle).
#[derive(Debug, Default)]
pub struct Arbiter {
    base: ModuleBase<ArbiterState, ArbiterConfig>,
}

module!(Arbiter, ArbiterState, ArbiterConfig,);

impl ModuleBehaviors for Arbiter {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state.stall_count = 0;
    }
}

impl Arbiter {
    pub fn new(config: Arc<ArbiterConfig>) -> Self {
        assert!(config.num_banks > 0, "arbiter needs at least one bank");
        let mut me = Arbiter::default();
        me.init_conf(config);
        me
    }

    pub fn stall_count(&self) -> u8 {
        self.base.state.stall_count
    }

    /// Pure per-cycle selection.  `high_valid[i]` / `low_valid[i]` are the
    /// request valids of each branch on bank `i`.  Reads only registered
    /// state, so grant wiring derived from the result can never feed back
    /// into the inputs.
    pub fn decide(&self, high_valid: &[bool], low_valid: &[bool]) -> ArbDecision {
        let conf = self.conf();
        assert_eq!(conf.num_banks, high_valid.len());
        assert_eq!(conf.num_banks, low_valid.len());

        // invert_priority renames the branches, it does not rewire them
        let (hs, ls): (&[bool], &[bool]) = if conf.invert_priority {
            (low_valid, high_valid)
        } else {
            (high_valid, low_valid)
        };

        let contended = match conf.mode {
            ArbMode::Global => hs.iter().any(|&v| v) && ls.iter().any(|&v| v),
            ArbMode::PerBankConflict => {
                hs.iter().zip(ls).any(|(&h, &l)| h && l)
            }
        };
        let override_active = conf.low_priority_max_stall > 0
            && self.base.state.stall_count >= conf.low_priority_max_stall
            && contended;

        let winners = (0..conf.num_banks)
            .map(|i| {
                let hs_wins = hs[i] && !(override_active && ls[i]);
                let hs_sel = match (hs_wins, ls[i]) {
                    (true, _) => Some(true),
                    (false, true) => Some(false),
                    (false, false) => hs[i].then_some(true),
                };
                hs_sel.map(|h| match h == conf.invert_priority {
                    // equal means the winner is the physical low input
                    true => BranchSel::Low,
                    false => BranchSel::High,
                })
            })
            .collect();

        ArbDecision {
            winners,
            override_active,
            contended,
        }
    }

    /// Clock-edge update of the starvation counter.
    pub fn commit(&mut self, decision: &ArbDecision) {
        let max_stall = self.conf().low_priority_max_stall;
        let state = &mut self.base.state;
        if decision.override_active || !decision.contended {
            state.stall_count = 0;
        } else {
            state.stall_count = state.stall_count.saturating_add(1);
            if state.stall_count == max_stall {
                debug!(
                    "arbiter: low-priority stall bound reached ({} cycles)",
                    state.stall_count
                );
            }
        }
    }
}
