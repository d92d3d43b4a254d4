use crate::traffic::config::TrafficPatternSpec;
use anyhow::bail;

#[derive(Debug, Clone)]
enum PatternKind {
    Linear {
        stride: u64,
    },
    Grid2d {
        stride: u64,
        len: u64,
        stride2: u64,
    },
    Grid3d {
        stride: u64,
        len: u64,
        stride2: u64,
        len2: u64,
        stride3: u64,
    },
    Random {
        min: u64,
        max: u64,
        seed: u64,
    },
}

/// An address generator compiled from a pattern spec: a pure function from
/// request index to a word-aligned byte address inside the scratchpad.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    base: u64,
    kind: PatternKind,
    mem_bytes: u64,
}

impl CompiledPattern {
    pub fn addr(&self, req_idx: u32) -> u64 {
        let idx = req_idx as u64;
        let offset = match self.kind {
            PatternKind::Linear { stride } => idx * stride,
            PatternKind::Grid2d {
                stride,
                len,
                stride2,
            } => (idx % len) * stride + (idx / len) * stride2,
            PatternKind::Grid3d {
                stride,
                len,
                stride2,
                len2,
                stride3,
            } => {
                let i = idx % len;
                let j = idx / len % len2;
                let k = idx / (len * len2);
                i * stride + j * stride2 + k * stride3
            }
            PatternKind::Random { min, max, seed } => {
                let span = (max - min).max(4);
                min + mix64(seed ^ idx.wrapping_mul(0x9E37_79B9_7F4A_7C15)) % span
            }
        };
        (self.base + offset) % self.mem_bytes & !0x3
    }
}

/// Compile a spec against the addressable scratchpad size.  Out-of-window
/// generators wrap instead of faulting; unknown kinds are configuration
/// errors.
pub fn compile_pattern(
    spec: &TrafficPatternSpec,
    mem_bytes: u64,
) -> Result<CompiledPattern, anyhow::Error> {
    assert!(mem_bytes >= 4, "scratchpad too small for any pattern");
    let kind = match spec.kind.as_str() {
        "linear" => PatternKind::Linear { stride: spec.stride },
        "2d" => PatternKind::Grid2d {
            stride: spec.stride,
            len: spec.len.max(1) as u64,
            stride2: spec.stride2,
        },
        "3d" => PatternKind::Grid3d {
            stride: spec.stride,
            len: spec.len.max(1) as u64,
            stride2: spec.stride2,
            len2: spec.len2.max(1) as u64,
            stride3: spec.stride3,
        },
        "random" => PatternKind::Random {
            min: spec.min,
            max: if spec.max > spec.min {
                spec.max
            } else {
                mem_bytes
            },
            seed: spec.seed,
        },
        other => bail!("unsupported traffic pattern kind '{}'", other),
    };
    Ok(CompiledPattern {
        name: if spec.name.is_empty() {
            spec.kind.clone()
        } else {
            spec.name.clone()
        },
        base: spec.base,
        kind,
        mem_bytes,
    })
}

pub(crate) fn mix64(mut x: u64) -> u64 {
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(kind: &str) -> TrafficPatternSpec {
        TrafficPatternSpec {
            kind: kind.to_string(),
            ..TrafficPatternSpec::default()
        }
    }

    #[test]
    fn linear_walks_by_stride() {
        let p = compile_pattern(&spec("linear"), 32 << 10).unwrap();
        assert_eq!(0, p.addr(0));
        assert_eq!(4, p.addr(1));
        assert_eq!(40, p.addr(10));
    }

    #[test]
    fn grid_2d_steps_rows() {
        let mut s = spec("2d");
        s.stride = 4;
        s.len = 4;
        s.stride2 = 256;
        let p = compile_pattern(&s, 32 << 10).unwrap();
        assert_eq!(12, p.addr(3));
        assert_eq!(256, p.addr(4));
        assert_eq!(256 + 4, p.addr(5));
    }

    #[test]
    fn grid_3d_steps_planes() {
        let mut s = spec("3d");
        s.stride = 4;
        s.len = 2;
        s.stride2 = 64;
        s.len2 = 2;
        s.stride3 = 4096;
        let p = compile_pattern(&s, 32 << 10).unwrap();
        assert_eq!(0, p.addr(0));
        assert_eq!(4, p.addr(1));
        assert_eq!(64, p.addr(2));
        assert_eq!(4096, p.addr(4));
    }

    #[test]
    fn random_is_reproducible_aligned_and_in_window() {
        let mut s = spec("random");
        s.seed = 42;
        let p = compile_pattern(&s, 32 << 10).unwrap();
        let q = compile_pattern(&s, 32 << 10).unwrap();
        for idx in 0..256 {
            let addr = p.addr(idx);
            assert_eq!(addr, q.addr(idx));
            assert_eq!(0, addr % 4);
            assert!(addr < 32 << 10);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(compile_pattern(&spec("diagonal"), 32 << 10).is_err());
    }

    #[test]
    fn generated_addresses_wrap_into_memory() {
        let mut s = spec("linear");
        s.stride = 4096;
        let p = compile_pattern(&s, 8 << 10).unwrap();
        for idx in 0..64 {
            assert!(p.addr(idx) < 8 << 10);
        }
    }
}
