use crate::ecc::secded::SecdedCode;
use crate::protocol::{ChannelParams, MemRequest, MemResponse};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use smallvec::SmallVec;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct EccConfig {
    pub enabled: bool,
    /// Chunk size of one data codeword, in bits.
    pub chunk_bits: usize,
    /// When false, only the metadata is protected; data and the data portion
    /// of the ECC field pass through untouched so the bit layout stays
    /// compatible with a paired encoder elsewhere in the chain.
    pub protect_data: bool,
}

impl Default for EccConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_bits: 32,
            protect_data: true,
        }
    }
}

/// Per-chunk error flags from one decode.  One bit per chunk so a manager can
/// popcount across many parallel codec instances.
pub type ChunkFlags = SmallVec<[bool; 4]>;

#[derive(Debug, Clone, Default)]
pub struct RequestDecode {
    pub data_single: ChunkFlags,
    pub data_double: ChunkFlags,
    pub meta_single: bool,
    pub meta_double: bool,
}

impl RequestDecode {
    pub fn any_double(&self) -> bool {
        self.meta_double || self.data_double.iter().any(|&b| b)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseDecode {
    pub data_single: ChunkFlags,
    pub data_double: ChunkFlags,
    pub meta_single: bool,
    pub meta_double: bool,
}

/// Encoder/decoder pair for the request side of one channel.
///
/// ECC field layout (low to high): `{metadata codeword, chunk 0 codeword,
/// chunk 1 codeword, ...}`.  Every encoder has a complementary decoder
/// expecting exactly this order.
#[derive(Debug, Clone)]
pub struct RequestCodec {
    params: ChannelParams,
    protect_data: bool,
    data_code: SecdedCode,
    meta_code: SecdedCode,
    num_chunks: usize,
}

impl RequestCodec {
    pub fn new(params: ChannelParams, config: &EccConfig) -> Self {
        let chunk_bits = config.chunk_bits;
        assert!(
            chunk_bits > 0 && params.data_width % chunk_bits == 0,
            "data width must be a whole number of ECC chunks"
        );
        let meta_width = params.addr_width + 1 + params.be_width() + params.user_width;
        Self {
            params,
            protect_data: config.protect_data,
            data_code: SecdedCode::new(chunk_bits),
            meta_code: SecdedCode::new(meta_width),
            num_chunks: params.data_width / chunk_bits,
        }
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn ecc_width(&self) -> usize {
        self.meta_code.ecc_width() + self.num_chunks * self.data_code.ecc_width()
    }

    fn pack_meta(&self, req: &MemRequest) -> u128 {
        let aw = self.params.addr_width;
        let bw = self.params.be_width();
        let mut meta = req.addr as u128;
        meta |= (req.is_read as u128) << aw;
        meta |= (req.be as u128) << (aw + 1);
        meta |= (req.user as u128) << (aw + 1 + bw);
        meta
    }

    fn unpack_meta(&self, meta: u128, req: &mut MemRequest) {
        let aw = self.params.addr_width;
        let bw = self.params.be_width();
        req.addr = (meta & ((1u128 << aw) - 1)) as u64;
        req.is_read = meta >> aw & 1 != 0;
        req.be = (meta >> (aw + 1) & ((1u128 << bw) - 1)) as u8;
        req.user = (meta >> (aw + 1 + bw)) as u32;
    }

    /// Compute and install the ECC sideband for a request.  Pure apart from
    /// the field write.
    pub fn encode(&self, req: &mut MemRequest) {
        let meta_w = self.meta_code.ecc_width();
        let chunk_w = self.data_code.ecc_width();
        let chunk_bits = self.data_code.width();

        let mut ecc;
        if self.protect_data {
            ecc = 0u64;
            for chunk in 0..self.num_chunks {
                let value = (req.wdata >> (chunk * chunk_bits)) as u128
                    & ((1u128 << chunk_bits) - 1);
                ecc |= self.data_code.encode(value) << (meta_w + chunk * chunk_w);
            }
        } else {
            // Data portion is a pass-through lane in this mode.
            ecc = req.ecc >> meta_w << meta_w;
        }
        ecc |= self.meta_code.encode(self.pack_meta(req));
        req.ecc = ecc;
    }

    /// Decode a request in place: single-bit errors are corrected
    /// transparently, double-bit errors are flagged with the corrupted value
    /// left as delivered.
    pub fn decode(&self, req: &mut MemRequest) -> RequestDecode {
        let meta_w = self.meta_code.ecc_width();
        let chunk_w = self.data_code.ecc_width();
        let chunk_bits = self.data_code.width();

        let mut out = RequestDecode::default();

        let meta = self
            .meta_code
            .decode(self.pack_meta(req), req.ecc & ((1 << meta_w) - 1));
        out.meta_single = meta.single_err;
        out.meta_double = meta.double_err;
        self.unpack_meta(meta.value, req);

        if self.protect_data {
            let mut data = 0u64;
            for chunk in 0..self.num_chunks {
                let value = (req.wdata >> (chunk * chunk_bits)) as u128
                    & ((1u128 << chunk_bits) - 1);
                let ecc = req.ecc >> (meta_w + chunk * chunk_w) & ((1 << chunk_w) - 1);
                let decoded = self.data_code.decode(value, ecc);
                data |= (decoded.value as u64) << (chunk * chunk_bits);
                out.data_single.push(decoded.single_err);
                out.data_double.push(decoded.double_err);
            }
            req.wdata = data;
        }
        out
    }
}

/// Encoder/decoder pair for the response side, covering `{read_data,
/// metadata}`.  ECC field layout (low to high): `{metadata codeword, chunk
/// codewords, zero pad}`.
#[derive(Debug, Clone)]
pub struct ResponseCodec {
    params: ChannelParams,
    protect_data: bool,
    data_code: SecdedCode,
    meta_code: SecdedCode,
    num_chunks: usize,
}

impl ResponseCodec {
    pub fn new(params: ChannelParams, config: &EccConfig) -> Self {
        let chunk_bits = config.chunk_bits;
        assert!(
            chunk_bits > 0 && params.data_width % chunk_bits == 0,
            "data width must be a whole number of ECC chunks"
        );
        let meta_width = params.user_width + params.id_width;
        Self {
            params,
            protect_data: config.protect_data,
            data_code: SecdedCode::new(chunk_bits),
            meta_code: SecdedCode::new(meta_width.max(1)),
            num_chunks: params.data_width / chunk_bits,
        }
    }

    pub fn ecc_width(&self) -> usize {
        self.meta_code.ecc_width() + self.num_chunks * self.data_code.ecc_width()
    }

    fn pack_meta(&self, resp: &MemResponse) -> u128 {
        resp.user as u128 | (resp.id as u128) << self.params.user_width
    }

    fn unpack_meta(&self, meta: u128, resp: &mut MemResponse) {
        let uw = self.params.user_width;
        resp.user = (meta & ((1u128 << uw) - 1)) as u32;
        resp.id = (meta >> uw) as u32;
    }

    pub fn encode(&self, resp: &mut MemResponse) {
        let meta_w = self.meta_code.ecc_width();
        let chunk_w = self.data_code.ecc_width();
        let chunk_bits = self.data_code.width();

        let mut ecc;
        if self.protect_data {
            ecc = 0u64;
            for chunk in 0..self.num_chunks {
                let value = (resp.rdata >> (chunk * chunk_bits)) as u128
                    & ((1u128 << chunk_bits) - 1);
                ecc |= self.data_code.encode(value) << (meta_w + chunk * chunk_w);
            }
        } else {
            ecc = resp.ecc >> meta_w << meta_w;
        }
        ecc |= self.meta_code.encode(self.pack_meta(resp));
        resp.ecc = ecc;
    }

    pub fn decode(&self, resp: &mut MemResponse) -> ResponseDecode {
        let meta_w = self.meta_code.ecc_width();
        let chunk_w = self.data_code.ecc_width();
        let chunk_bits = self.data_code.width();

        let mut out = ResponseDecode::default();

        let meta = self
            .meta_code
            .decode(self.pack_meta(resp), resp.ecc & ((1 << meta_w) - 1));
        out.meta_single = meta.single_err;
        out.meta_double = meta.double_err;
        self.unpack_meta(meta.value, resp);

        if self.protect_data {
            let mut data = 0u64;
            for chunk in 0..self.num_chunks {
                let value = (resp.rdata >> (chunk * chunk_bits)) as u128
                    & ((1u128 << chunk_bits) - 1);
                let ecc = resp.ecc >> (meta_w + chunk * chunk_w) & ((1 << chunk_w) - 1);
                let decoded = self.data_code.decode(value, ecc);
                data |= (decoded.value as u64) << (chunk * chunk_bits);
                out.data_single.push(decoded.single_err);
                out.data_double.push(decoded.double_err);
            }
            resp.rdata = data;
        }
        out
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct FaultInjectConfig {
    pub enabled: bool,
    /// Inject into every Nth encoded request.
    pub period: u64,
    /// Every Mth injection flips two bits of the same codeword instead of
    /// one.  Zero disables double flips.
    pub double_every: u64,
    /// Alternate injections target the metadata codeword when set.
    pub target_meta: bool,
    pub seed: u64,
}

impl Default for FaultInjectConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period: 64,
            double_every: 0,
            target_meta: true,
            seed: 1,
        }
    }
}

/// Transient-fault model for verification runs: xors bits into encoded
/// requests between the encoder and the decoder.
///
/// Single flips alternate between a data bit and an address bit (the decoder
/// corrects both before anything downstream uses them).  Double flips always
/// land in one data chunk, so an injected uncorrectable fault corrupts the
/// payload but never the routing.
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultInjectConfig,
    rng: StdRng,
    seen: u64,
    injected: u64,
    chunk_bits: usize,
    num_chunks: usize,
    addr_width: usize,
}

impl FaultInjector {
    pub fn new(config: FaultInjectConfig, params: &ChannelParams, chunk_bits: usize) -> Self {
        assert!(config.period > 0, "fault injection period must be > 0");
        Self {
            config,
            rng: StdRng::seed_from_u64(config.seed),
            seen: 0,
            injected: 0,
            chunk_bits,
            num_chunks: params.data_width / chunk_bits,
            addr_width: params.addr_width,
        }
    }

    pub fn injected(&self) -> u64 {
        self.injected
    }

    /// Maybe corrupt one in-flight encoded request.  Returns the number of
    /// bits flipped (0, 1 or 2).
    pub fn maybe_inject(&mut self, req: &mut MemRequest) -> u32 {
        if !self.config.enabled {
            return 0;
        }
        self.seen += 1;
        if self.seen % self.config.period != 0 {
            return 0;
        }
        self.injected += 1;
        let double = self.config.double_every > 0
            && self.injected % self.config.double_every == 0;
        if double {
            let chunk = self.rng.gen_range(0..self.num_chunks);
            let a = self.rng.gen_range(0..self.chunk_bits);
            let mut b = self.rng.gen_range(0..self.chunk_bits);
            while b == a {
                b = self.rng.gen_range(0..self.chunk_bits);
            }
            req.wdata ^= 1 << (chunk * self.chunk_bits + a);
            req.wdata ^= 1 << (chunk * self.chunk_bits + b);
            return 2;
        }
        if self.config.target_meta && self.injected % 2 == 0 {
            req.addr ^= 1 << self.rng.gen_range(0..self.addr_width);
        } else {
            let bit = self.rng.gen_range(0..self.num_chunks * self.chunk_bits);
            req.wdata ^= 1 << bit;
        }
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ChannelParams {
        ChannelParams {
            user_width: 4,
            ..ChannelParams::default()
        }
    }

    fn write_req() -> MemRequest {
        MemRequest {
            addr: 0x1234,
            is_read: false,
            be: 0xF,
            wdata: 0xDEAD_BEEF,
            user: 0x5,
            ..MemRequest::default()
        }
    }

    #[test]
    fn request_round_trip_is_clean() {
        let codec = RequestCodec::new(params(), &EccConfig::default());
        let mut req = write_req();
        codec.encode(&mut req);
        let golden = req.clone();
        let flags = codec.decode(&mut req);
        assert_eq!(golden, req);
        assert!(!flags.meta_single && !flags.meta_double);
        assert!(flags.data_single.iter().all(|&b| !b));
        assert!(flags.data_double.iter().all(|&b| !b));
    }

    #[test]
    fn single_data_flip_is_corrected_and_flagged_per_chunk() {
        let codec = RequestCodec::new(params(), &EccConfig::default());
        let mut req = write_req();
        codec.encode(&mut req);
        let golden_data = req.wdata;
        req.wdata ^= 1 << 7;
        let flags = codec.decode(&mut req);
        assert_eq!(golden_data, req.wdata);
        assert_eq!(vec![true], flags.data_single.to_vec());
        assert!(!flags.meta_single);
    }

    #[test]
    fn address_flip_is_a_metadata_error() {
        let codec = RequestCodec::new(params(), &EccConfig::default());
        let mut req = write_req();
        codec.encode(&mut req);
        req.addr ^= 1 << 3;
        let flags = codec.decode(&mut req);
        assert_eq!(0x1234, req.addr);
        assert!(flags.meta_single);
        assert!(!flags.meta_double);
    }

    #[test]
    fn double_data_flip_is_flagged_uncorrectable() {
        let codec = RequestCodec::new(params(), &EccConfig::default());
        let mut req = write_req();
        codec.encode(&mut req);
        req.wdata ^= 0b101;
        let flags = codec.decode(&mut req);
        assert_eq!(vec![true], flags.data_double.to_vec());
        assert!(flags.any_double());
    }

    #[test]
    fn data_disabled_mode_passes_data_ecc_through() {
        let config = EccConfig {
            protect_data: false,
            ..EccConfig::default()
        };
        let codec = RequestCodec::new(params(), &config);
        let mut req = write_req();
        // Simulate an upstream encoder's data codewords in the high bits.
        let upstream = 0x3Fu64 << 40;
        req.ecc = upstream;
        codec.encode(&mut req);
        assert_eq!(upstream, req.ecc >> 40 << 40);
        let flags = codec.decode(&mut req);
        assert!(flags.data_single.is_empty());
        assert!(!flags.meta_single);
    }

    #[test]
    fn response_round_trip_and_single_flip() {
        let codec = ResponseCodec::new(params(), &EccConfig::default());
        let mut resp = MemResponse {
            rdata: 0xCAFE_F00D,
            user: 0x3,
            id: 0x21,
            ..MemResponse::default()
        };
        codec.encode(&mut resp);
        resp.rdata ^= 1 << 30;
        let flags = codec.decode(&mut resp);
        assert_eq!(0xCAFE_F00D, resp.rdata);
        assert_eq!(vec![true], flags.data_single.to_vec());
        assert_eq!(0x3, resp.user);
        assert_eq!(0x21, resp.id);
    }

    #[test]
    fn injector_honors_period() {
        let config = FaultInjectConfig {
            enabled: true,
            period: 4,
            target_meta: false,
            ..FaultInjectConfig::default()
        };
        let mut injector = FaultInjector::new(config, &params(), 32);
        let mut flips = 0;
        for _ in 0..16 {
            let mut req = write_req();
            flips += injector.maybe_inject(&mut req);
        }
        assert_eq!(4, flips);
        assert_eq!(4, injector.injected());
    }
}
