use crate::base::behavior::*;
use crate::base::module::{module, IsModule, ModuleBase};
use crate::protocol::{ChannelParams, MemResponse};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
pub struct RobConfig {
    /// Number of slots; must be a power of two.  The buffer reports full at
    /// `depth - 1` occupancy, leaving one slot of slack.
    pub depth: usize,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    occupied: bool,
    filled: bool,
    resp: MemResponse,
}

#[derive(Debug, Default)]
pub struct RobState {
    slots: Vec<Slot>,
    wr_ptr: usize,
    rd_ptr: usize,
    count: usize,
}

/// Reorder buffer for an id-tagged channel.
///
/// Allocation stamps the next slot index into the request's `user` field;
/// downstream completions land in the slot addressed by the tag they echo
/// back, in any order; the upstream requester retires strictly in allocation
/// order from its own read pointer.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    base: ModuleBase<RobState, RobConfig>,
}

module!(ReorderBuffer, RobState, RobConfig,);

impl ModuleBehaviors for ReorderBuffer {
    fn tick_one(&mut self) {
        self.base.cycle += 1;
    }

    fn reset(&mut self) {
        let depth = self.conf().depth;
        self.base.state = RobState {
            slots: vec![Slot::default(); depth],
            ..RobState::default()
        };
    }
}

impl ReorderBuffer {
    pub fn new(config: Arc<RobConfig>) -> Self {
        assert!(
            config.depth >= 2 && config.depth.is_power_of_two(),
            "ROB depth must be a power of two >= 2"
        );
        let mut me = ReorderBuffer::default();
        me.init_conf(config);
        me.reset();
        me
    }

    /// Minimum id width any stage downstream of the tagging point must carry
    /// to echo tags verbatim.
    pub fn required_tag_width(&self) -> usize {
        self.conf().depth.trailing_zeros() as usize
    }

    /// Elaboration-time check against a downstream channel.
    pub fn check_downstream(&self, params: &ChannelParams) {
        assert!(
            params.user_width >= self.required_tag_width(),
            "downstream user width {} too narrow for {} ROB slots",
            params.user_width,
            self.conf().depth
        );
    }

    pub fn can_alloc(&self) -> bool {
        self.base.state.count < self.conf().depth - 1
    }

    pub fn occupancy(&self) -> usize {
        self.base.state.count
    }

    /// Allocate the next slot and return its tag.  The caller stamps the tag
    /// into the outgoing request's `user` field.
    pub fn alloc(&mut self) -> u32 {
        assert!(self.can_alloc(), "allocation from a full reorder buffer");
        let depth = self.conf().depth;
        let state = &mut self.base.state;
        let tag = state.wr_ptr;
        let slot = &mut state.slots[tag];
        slot.occupied = true;
        slot.filled = false;
        state.wr_ptr = (state.wr_ptr + 1) % depth;
        state.count += 1;
        tag as u32
    }

    /// Write a completed response into the slot its echoed tag addresses.
    /// A tag that does not address an allocated slot is a fatal invariant
    /// violation: every stage downstream of the tagging point must echo tags
    /// verbatim.
    pub fn fill(&mut self, tag: u32, resp: MemResponse) {
        let state = &mut self.base.state;
        let slot = state
            .slots
            .get_mut(tag as usize)
            .expect("echoed tag out of range");
        assert!(slot.occupied, "echoed tag addresses a free slot");
        assert!(!slot.filled, "echoed tag filled twice");
        slot.filled = true;
        slot.resp = resp;
    }

    /// Retire the oldest allocated slot once its response has arrived.
    /// Returns None while the head of the window is still in flight, even if
    /// younger slots have already completed.
    pub fn retire(&mut self) -> Option<MemResponse> {
        let depth = self.conf().depth;
        let state = &mut self.base.state;
        let slot = &mut state.slots[state.rd_ptr];
        if !(slot.occupied && slot.filled) {
            return None;
        }
        slot.occupied = false;
        slot.filled = false;
        let resp = std::mem::take(&mut slot.resp);
        state.rd_ptr = (state.rd_ptr + 1) % depth;
        state.count -= 1;
        Some(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rob(depth: usize) -> ReorderBuffer {
        ReorderBuffer::new(Arc::new(RobConfig { depth }))
    }

    fn resp(id: u32) -> MemResponse {
        MemResponse {
            rdata: id as u64 * 0x100,
            id,
            ..MemResponse::default()
        }
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn zero_depth_is_rejected_at_construction() {
        let _ = rob(0);
    }

    #[test]
    fn full_at_depth_minus_one() {
        let mut r = rob(4);
        for _ in 0..3 {
            assert!(r.can_alloc());
            let _ = r.alloc();
        }
        assert!(!r.can_alloc());
        assert_eq!(3, r.occupancy());
    }

    #[test]
    fn reversed_completions_retire_in_allocation_order() {
        let mut r = rob(8);
        let tags: Vec<u32> = (0..5).map(|_| r.alloc()).collect();
        // downstream completes in reverse order
        for &tag in tags.iter().rev() {
            r.fill(tag, resp(tag));
        }
        for &tag in &tags {
            let out = r.retire().expect("head should be filled");
            assert_eq!(tag, out.id);
        }
        assert_eq!(None, r.retire());
    }

    #[test]
    fn head_of_window_blocks_retirement() {
        let mut r = rob(4);
        let t0 = r.alloc();
        let t1 = r.alloc();
        r.fill(t1, resp(t1));
        assert!(r.retire().is_none(), "younger completion must not retire early");
        r.fill(t0, resp(t0));
        assert_eq!(t0, r.retire().unwrap().id);
        assert_eq!(t1, r.retire().unwrap().id);
    }

    #[test]
    fn pointers_wrap_across_many_windows() {
        let mut r = rob(4);
        for round in 0..16u32 {
            let tag = r.alloc();
            r.fill(tag, resp(round));
            assert_eq!(round, r.retire().unwrap().id);
        }
        assert_eq!(0, r.occupancy());
    }

    #[test]
    #[should_panic(expected = "free slot")]
    fn unallocated_tag_is_fatal() {
        let mut r = rob(4);
        r.fill(2, resp(0));
    }

    #[test]
    fn tag_width_check() {
        let r = rob(8);
        assert_eq!(3, r.required_tag_width());
        r.check_downstream(&ChannelParams {
            user_width: 4,
            ..ChannelParams::default()
        });
    }

    #[test]
    #[should_panic(expected = "too narrow")]
    fn narrow_downstream_user_field_is_rejected() {
        let r = rob(8);
        r.check_downstream(&ChannelParams {
            user_width: 2,
            ..ChannelParams::default()
        });
    }
}
