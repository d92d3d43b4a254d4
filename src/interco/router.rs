use crate::protocol::{MemRequest, MemResponse, RespOpc};

/// A wide HWPE-side request covering `width` consecutive words, one per
/// interleaved bank, all in the same cycle.
#[derive(Debug, Clone, Default)]
pub struct WideRequest {
    pub addr: u64,
    pub is_read: bool,
    /// One word of write data per spanned bank.
    pub wdata: Vec<u32>,
    /// One byte-enable strobe set per spanned bank.
    pub be: Vec<u8>,
    pub user: u32,
    pub id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct WideResponse {
    pub rdata: Vec<u32>,
    pub opc: RespOpc,
    pub user: u32,
    pub id: u32,
}

/// Address-interleave demultiplexer at the HWPE branch boundary: splits one
/// wide request into per-bank narrow requests and gathers the per-bank
/// responses back into one wide response.
#[derive(Debug, Clone)]
pub struct BankRouter {
    width: usize,
    num_banks: usize,
    word_bytes: usize,
    total_bytes: usize,
}

impl BankRouter {
    pub fn new(width: usize, num_banks: usize, word_bytes: usize, total_bytes: usize) -> Self {
        assert!(width > 0, "router width must be > 0");
        assert!(
            width <= num_banks,
            "a wide word cannot span more banks than exist"
        );
        Self {
            width,
            num_banks,
            word_bytes,
            total_bytes,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// The banks a wide request lands on, lane order.
    pub fn banks_spanned(&self, addr: u64) -> Vec<usize> {
        let start_word = addr as usize / self.word_bytes;
        (0..self.width)
            .map(|lane| (start_word + lane) % self.num_banks)
            .collect()
    }

    /// Split a wide request into `(bank, narrow request)` pairs.  An
    /// out-of-range span is a configuration error caught here for
    /// verification builds, never a runtime fault.
    pub fn split(&self, req: &WideRequest) -> Vec<(usize, MemRequest)> {
        assert!(
            req.addr as usize % self.word_bytes == 0,
            "wide request must be word aligned"
        );
        assert!(
            req.addr as usize + self.width * self.word_bytes <= self.total_bytes,
            "wide request spans beyond banked memory @ {:#010x}",
            req.addr
        );
        assert_eq!(self.width, req.wdata.len(), "wide data lane count");
        assert_eq!(self.width, req.be.len(), "wide strobe lane count");

        self.banks_spanned(req.addr)
            .into_iter()
            .enumerate()
            .map(|(lane, bank)| {
                (
                    bank,
                    MemRequest {
                        addr: req.addr + (lane * self.word_bytes) as u64,
                        is_read: req.is_read,
                        be: req.be[lane],
                        wdata: req.wdata[lane] as u64,
                        user: req.user,
                        id: req.id,
                        ecc: 0,
                    },
                )
            })
            .collect()
    }

    /// Gather per-lane responses into the wide response.  Any lane reporting
    /// an error marks the whole wide response.
    pub fn gather(&self, lanes: &[MemResponse], user: u32, id: u32) -> WideResponse {
        assert_eq!(self.width, lanes.len(), "wide response lane count");
        WideResponse {
            rdata: lanes.iter().map(|r| r.rdata as u32).collect(),
            opc: if lanes.iter().any(|r| r.opc == RespOpc::Err) {
                RespOpc::Err
            } else {
                RespOpc::Ok
            },
            user,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> BankRouter {
        BankRouter::new(4, 8, 4, 32 << 10)
    }

    fn wide_write(addr: u64) -> WideRequest {
        WideRequest {
            addr,
            is_read: false,
            wdata: vec![0x11, 0x22, 0x33, 0x44],
            be: vec![0xF; 4],
            ..WideRequest::default()
        }
    }

    #[test]
    fn splits_across_consecutive_banks() {
        let split = router().split(&wide_write(0x0));
        let banks: Vec<usize> = split.iter().map(|(b, _)| *b).collect();
        assert_eq!(vec![0, 1, 2, 3], banks);
        assert_eq!(0x4, split[1].1.addr);
        assert_eq!(0x22, split[1].1.wdata);
    }

    #[test]
    fn span_wraps_around_the_bank_ring() {
        let split = router().split(&wide_write(0x18));
        let banks: Vec<usize> = split.iter().map(|(b, _)| *b).collect();
        assert_eq!(vec![6, 7, 0, 1], banks);
    }

    #[test]
    #[should_panic(expected = "beyond banked memory")]
    fn overflowing_span_asserts() {
        let _ = router().split(&wide_write((32 << 10) - 8));
    }

    #[test]
    fn gather_merges_lane_errors() {
        let r = router();
        let mut lanes = vec![MemResponse::default(); 4];
        lanes[2].opc = RespOpc::Err;
        lanes[1].rdata = 0xBEEF;
        let wide = r.gather(&lanes, 7, 3);
        assert_eq!(RespOpc::Err, wide.opc);
        assert_eq!(0xBEEF, wide.rdata[1]);
        assert_eq!(7, wide.user);
    }
}
