use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct OooMuxConfig {
    pub num_inputs: usize,
}

#[derive(Debug, Default)]
pub struct OooMuxState {
    rr_ptr: usize,
    /// Winner currently bound to the output but not yet granted.  Held so a
    /// later-arriving request cannot overtake one already selected.
    held: Option<usize>,
    /// Input indices of requests granted downstream whose responses are still
    /// in flight, in grant order.
    inflight: VecDeque<usize>,
}

/// N-to-1 out-of-order multiplexer: funnels many request channels onto one
/// physical channel.  The winner's input index is the response-routing id;
/// because the winner at response time can differ from the current-cycle
/// winner, the id is latched at grant time and consulted when the response
/// returns.
#[derive(Debug, Default)]
pub struct OooMux {
    base: ModuleBase<OooMuxState, OooMuxConfig>,
}

module!(OooMux, OooMuxState, OooMuxConfig,);

impl ModuleBehaviors for OooMux {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        self.base.state = OooMuxState::default();
    }
}

impl OooMux {
    pub fn new(config: Arc<OooMuxConfig>) -> Self {
        assert!(config.num_inputs > 0, "mux needs at least one input");
        let mut me = OooMux::default();
        me.init_conf(config);
        me
    }

    /// Pure winner selection for this cycle.  A held (selected but ungranted)
    /// winner keeps the output; otherwise `force` takes it if pending, else
    /// round-robin starting from the pointer.  Reads registered state only.
    pub fn decide(&self, valid: &[bool], force: Option<usize>) -> Option<usize> {
        let n = self.conf().num_inputs;
        assert_eq!(n, valid.len());
        if let Some(held) = self.base.state.held {
            // valid cannot be retracted once raised
            debug_assert!(valid[held], "held winner dropped its request");
            return Some(held);
        }
        if let Some(f) = force {
            assert!(f < n, "forced priority index out of range");
            if valid[f] {
                return Some(f);
            }
        }
        (0..n)
            .map(|off| (self.base.state.rr_ptr + off) % n)
            .find(|&i| valid[i])
    }

    /// Clock-edge update with this cycle's winner and its grant.
    pub fn commit(&mut self, winner: Option<usize>, granted: bool) {
        let num_inputs = self.conf().num_inputs;
        let state = &mut self.base.state;
        match winner {
            Some(w) if granted => {
                state.inflight.push_back(w);
                state.rr_ptr = (w + 1) % num_inputs;
                state.held = None;
            }
            Some(w) => state.held = Some(w),
            None => state.held = None,
        }
    }

    pub fn inflight(&self) -> usize {
        self.base.state.inflight.len()
    }

    /// Input that owns the oldest in-flight response.  Must be called exactly
    /// once per returned response, in return order.
    pub fn take_issuer(&mut self) -> usize {
        self.base
            .state
            .inflight
            .pop_front()
            .expect("response with no in-flight request")
    }

    pub fn peek_issuer(&self) -> Option<usize> {
        self.base.state.inflight.front().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mux(n: usize) -> OooMux {
        OooMux::new(Arc::new(OooMuxConfig { num_inputs: n }))
    }

    #[test]
    fn round_robin_cycles_through_pending_inputs() {
        let mut m = mux(4);
        let valid = [true; 4];
        let mut order = Vec::new();
        for _ in 0..8 {
            let w = m.decide(&valid, None).unwrap();
            order.push(w);
            m.commit(Some(w), true);
            m.tick_one();
        }
        assert_eq!(vec![0, 1, 2, 3, 0, 1, 2, 3], order);
    }

    #[test]
    fn held_winner_is_not_overtaken() {
        let mut m = mux(4);
        // input 2 requests alone and is not granted
        let w = m.decide(&[false, false, true, false], None).unwrap();
        assert_eq!(2, w);
        m.commit(Some(w), false);
        m.tick_one();
        // input 0 shows up; the held winner keeps the output
        let w = m.decide(&[true, false, true, false], None).unwrap();
        assert_eq!(2, w);
        m.commit(Some(w), true);
        assert_eq!(Some(2), m.peek_issuer());
    }

    #[test]
    fn forced_priority_preempts_round_robin() {
        let mut m = mux(4);
        let w = m.decide(&[true, true, true, true], Some(3)).unwrap();
        assert_eq!(3, w);
        // force ignored when that input is idle
        let w = m.decide(&[true, false, false, false], Some(3)).unwrap();
        assert_eq!(0, w);
    }

    #[test]
    fn response_goes_to_grant_time_winner() {
        let mut m = mux(4);
        // grant input 1, then input 3, responses outstanding for both
        m.commit(Some(1), true);
        m.tick_one();
        m.commit(Some(3), true);
        m.tick_one();
        assert_eq!(2, m.inflight());
        // by the time responses return, input 0 is the current winner; the
        // latched ids still steer correctly and in grant order
        let w = m.decide(&[true, false, false, false], None).unwrap();
        assert_eq!(0, w);
        assert_eq!(1, m.take_issuer());
        assert_eq!(3, m.take_issuer());
    }

    #[test]
    #[should_panic(expected = "no in-flight request")]
    fn spurious_response_is_fatal() {
        let mut m = mux(2);
        let _ = m.take_issuer();
    }
}
