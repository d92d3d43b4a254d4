use anyhow::{bail, Context};
use std::fs;
use std::path::Path;

/// One parsed stimuli line.  The on-disk format is whitespace-separated
/// `req id wen data add` with `id`, `data` and `add` in hex; `wen = 1` is a
/// read (TCDM convention).  A line with `req = 0` is an idle bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stimulus {
    Idle,
    Op {
        id: u32,
        is_read: bool,
        data: u32,
        addr: u64,
    },
}

pub fn parse_stimuli(text: &str) -> Result<Vec<Stimulus>, anyhow::Error> {
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 5 {
            bail!(
                "stimuli line {}: expected 5 fields `req id wen data add`, got {}",
                lineno + 1,
                fields.len()
            );
        }
        let req = parse_bit(fields[0], lineno, "req")?;
        if !req {
            out.push(Stimulus::Idle);
            continue;
        }
        let id = u32::from_str_radix(fields[1], 16)
            .with_context(|| format!("stimuli line {}: bad id field", lineno + 1))?;
        let is_read = parse_bit(fields[2], lineno, "wen")?;
        let data = u32::from_str_radix(fields[3], 16)
            .with_context(|| format!("stimuli line {}: bad data field", lineno + 1))?;
        let addr = u64::from_str_radix(fields[4], 16)
            .with_context(|| format!("stimuli line {}: bad add field", lineno + 1))?;
        if addr % 4 != 0 {
            bail!("stimuli line {}: unaligned address {:#x}", lineno + 1, addr);
        }
        out.push(Stimulus::Op {
            id,
            is_read,
            data,
            addr,
        });
    }
    Ok(out)
}

pub fn load_stimuli(path: &Path) -> Result<Vec<Stimulus>, anyhow::Error> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read stimuli file {}", path.display()))?;
    parse_stimuli(&text)
}

fn parse_bit(field: &str, lineno: usize, name: &str) -> Result<bool, anyhow::Error> {
    match field {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => bail!(
            "stimuli line {}: field '{}' must be 0 or 1, got '{}'",
            lineno + 1,
            name,
            field
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ops_bubbles_and_comments() {
        let text = "\
# write then read back
1 00 0 deadbeef 00000010
0 00 0 00000000 00000000
1 01 1 00000000 00000010
";
        let stim = parse_stimuli(text).unwrap();
        assert_eq!(3, stim.len());
        assert_eq!(
            Stimulus::Op {
                id: 0,
                is_read: false,
                data: 0xDEAD_BEEF,
                addr: 0x10,
            },
            stim[0]
        );
        assert_eq!(Stimulus::Idle, stim[1]);
        assert_eq!(
            Stimulus::Op {
                id: 1,
                is_read: true,
                data: 0,
                addr: 0x10,
            },
            stim[2]
        );
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_stimuli("1 00 0 deadbeef").is_err());
        assert!(parse_stimuli("2 00 0 deadbeef 00000010").is_err());
        assert!(parse_stimuli("1 00 0 zzzz 00000010").is_err());
        assert!(parse_stimuli("1 00 0 deadbeef 00000002").is_err());
    }
}
