/// Single-error-correct, double-error-detect codec (Hsiao code family,
/// realized as an extended Hamming code) over one fixed-width chunk.
///
/// The code is pure: `encode`/`decode` have no side effects, so one
/// `SecdedCode` instance can serve any number of parallel channels of the
/// same width.
#[derive(Debug, Clone)]
pub struct SecdedCode {
    width: usize,
    parity_bits: usize,
    /// Codeword position (1-based, Hamming numbering) of each data bit.
    data_pos: Vec<u32>,
}

/// Outcome of decoding one chunk.  `double_err` means detected but not
/// correctable; the (corrupted) value is still returned and it is the
/// consumer's responsibility to act on the flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecdedDecode {
    pub value: u128,
    pub single_err: bool,
    pub double_err: bool,
}

impl SecdedCode {
    pub fn new(width: usize) -> Self {
        assert!(width > 0 && width <= 120, "chunk width out of range");
        let mut parity_bits = 0;
        while (1usize << parity_bits) < width + parity_bits + 1 {
            parity_bits += 1;
        }
        // Data bits occupy the non-power-of-two codeword positions.
        let mut data_pos = Vec::with_capacity(width);
        let mut pos = 1u32;
        while data_pos.len() < width {
            if !pos.is_power_of_two() {
                data_pos.push(pos);
            }
            pos += 1;
        }
        Self {
            width,
            parity_bits,
            data_pos,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of check bits, including the overall-parity bit.
    pub fn ecc_width(&self) -> usize {
        self.parity_bits + 1
    }

    fn check_bits_for(&self, value: u128) -> u64 {
        let mut checks = 0u64;
        for (bit, &pos) in self.data_pos.iter().enumerate() {
            if value >> bit & 1 != 0 {
                for p in 0..self.parity_bits {
                    if pos >> p & 1 != 0 {
                        checks ^= 1 << p;
                    }
                }
            }
        }
        checks
    }

    pub fn encode(&self, value: u128) -> u64 {
        let value = value & mask(self.width);
        let checks = self.check_bits_for(value);
        let overall =
            (value.count_ones() + checks.count_ones()) as u64 & 1;
        checks | overall << self.parity_bits
    }

    pub fn decode(&self, value: u128, ecc: u64) -> SecdedDecode {
        let value = value & mask(self.width);
        let recv_checks = ecc & ((1 << self.parity_bits) - 1);
        let recv_overall = ecc >> self.parity_bits & 1;
        let syndrome = (self.check_bits_for(value) ^ recv_checks) as u32;
        let overall_ok = (value.count_ones() as u64
            + recv_checks.count_ones() as u64
            + recv_overall)
            & 1
            == 0;

        if syndrome == 0 && overall_ok {
            return SecdedDecode {
                value,
                single_err: false,
                double_err: false,
            };
        }
        if !overall_ok {
            // Odd number of flips, assumed one: correct it if it landed on a
            // data position; flips of check bits leave the data intact.
            let mut corrected = value;
            if syndrome != 0 && !syndrome.is_power_of_two() {
                if let Some(bit) = self.data_pos.iter().position(|&p| p == syndrome) {
                    corrected ^= 1 << bit;
                }
            }
            return SecdedDecode {
                value: corrected,
                single_err: true,
                double_err: false,
            };
        }
        // Even number of flips with a nonzero syndrome: uncorrectable.
        SecdedDecode {
            value,
            single_err: false,
            double_err: true,
        }
    }
}

fn mask(width: usize) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}
