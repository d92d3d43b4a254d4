/// The tightly-coupled memory protocol: request/grant/response channels with
/// single-cycle handshake semantics.
///
/// Contract, per channel and per cycle:
///   - a handshake happens in the cycle where both `valid` and `gnt` are high;
///   - for granted reads, `r_valid` and `rdata` arrive exactly one cycle later;
///   - a master's `valid` must never be a combinational function of the
///     same-cycle `gnt`.  The model enforces this by construction: masters post
///     requests from their own registered state before the fabric computes any
///     grant, and a posted request cannot be retracted.
///
/// `r_valid` after a granted write is implementation defined and must not be
/// relied upon (see `FabricConfig::rvalid_on_write`).
pub type Cycle = u64;

/// Static channel geometry.  Every initiator/target pair that gets wired
/// together must agree on all widths; mismatches are elaboration errors, not
/// runtime faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelParams {
    /// Data width in bits (word size of one bank port).
    pub data_width: usize,
    pub addr_width: usize,
    /// Width of the metadata ("user") field, used e.g. for ROB tags.
    pub user_width: usize,
    pub id_width: usize,
    /// Width of the ECC sideband; zero when the channel carries no ECC.
    pub ecc_width: usize,
}

impl Default for ChannelParams {
    fn default() -> Self {
        Self {
            data_width: 32,
            addr_width: 32,
            user_width: 0,
            id_width: 8,
            ecc_width: 0,
        }
    }
}

impl ChannelParams {
    pub fn be_width(&self) -> usize {
        self.data_width / 8
    }

    /// Elaboration-time width check between two connected channel endpoints.
    pub fn check_match(&self, other: &ChannelParams, what: &str) {
        assert_eq!(
            self, other,
            "channel width mismatch across connection '{}'",
            what
        );
    }
}

/// Response opcode.  `Err` signals a detected-uncorrectable condition on the
/// path; the (possibly corrupted) data is still delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RespOpc {
    #[default]
    Ok,
    Err,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemRequest {
    pub addr: u64,
    pub is_read: bool,
    /// Byte-enable strobes for writes, one bit per data byte.
    pub be: u8,
    pub wdata: u64,
    /// Metadata field; carries the ROB/mux routing tag through the fabric.
    pub user: u32,
    pub id: u32,
    /// ECC sideband, layout `{data chunk codewords, metadata codeword}`.
    pub ecc: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemResponse {
    pub rdata: u64,
    pub opc: RespOpc,
    pub user: u32,
    pub id: u32,
    /// ECC sideband, layout `{zero pad, data codeword, metadata codeword}`.
    pub ecc: u64,
}

/// One narrow master-facing channel endpoint.  The fabric owns the port; the
/// master posts into it and collects responses from it between ticks.
#[derive(Debug, Default)]
pub struct MasterPort {
    req: Option<MemRequest>,
    granted: bool,
    resp: Option<MemResponse>,
}

impl MasterPort {
    /// Post a request.  Once posted, the request stays asserted until the
    /// fabric grants it; it cannot be modified or withdrawn.
    pub fn post(&mut self, req: MemRequest) {
        assert!(
            self.req.is_none(),
            "posted a request while one is still pending (valid cannot be retracted)"
        );
        self.req = Some(req);
        self.granted = false;
    }

    pub fn pending(&self) -> Option<&MemRequest> {
        self.req.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.req.is_some()
    }

    /// Whether the last posted request was granted (and consumed) this cycle.
    pub fn granted(&self) -> bool {
        self.granted
    }

    /// Collect the response presented this cycle, if any.  Responses are valid
    /// for exactly one cycle; an uncollected response is dropped at the next
    /// delivery, matching a master that ignores `r_valid`.
    pub fn take_resp(&mut self) -> Option<MemResponse> {
        self.resp.take()
    }

    pub fn resp(&self) -> Option<&MemResponse> {
        self.resp.as_ref()
    }

    pub(crate) fn consume_granted(&mut self) -> MemRequest {
        self.granted = true;
        self.req.take().expect("grant with no pending request")
    }

    pub(crate) fn begin_cycle(&mut self) {
        self.granted = false;
        self.resp = None;
    }

    pub(crate) fn deliver(&mut self, resp: MemResponse) {
        self.resp = Some(resp);
    }

    pub(crate) fn reset(&mut self) {
        self.req = None;
        self.granted = false;
        self.resp = None;
    }
}
