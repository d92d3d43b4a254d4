use anyhow::bail;

/// Word-interleaved banked scratchpad (the TCDM).  Consecutive words live in
/// consecutive banks; each bank serves at most one access per cycle with a
/// fixed one-cycle read latency.  The latency itself is modeled by the
/// fabric's response register, so accesses here are plain functional
/// read/write calls.
#[derive(Debug)]
pub struct TcdmBanks {
    num_banks: usize,
    words_per_bank: usize,
    word_bytes: usize,
    banks: Vec<Vec<u32>>,
}

impl TcdmBanks {
    pub fn new(num_banks: usize, total_size_bytes: usize) -> Self {
        assert!(num_banks > 0, "TCDM must have at least one bank");
        let word_bytes = 4;
        assert!(
            total_size_bytes % (num_banks * word_bytes) == 0,
            "memory size must be a whole number of words per bank"
        );
        let words_per_bank = total_size_bytes / (num_banks * word_bytes);
        Self {
            num_banks,
            words_per_bank,
            word_bytes,
            banks: vec![vec![0u32; words_per_bank]; num_banks],
        }
    }

    pub fn num_banks(&self) -> usize {
        self.num_banks
    }

    pub fn word_bytes(&self) -> usize {
        self.word_bytes
    }

    pub fn total_bytes(&self) -> usize {
        self.num_banks * self.words_per_bank * self.word_bytes
    }

    /// Bank targeted by a byte address.  The crossbar contract: one address
    /// maps to exactly one bank.
    pub fn bank_of(&self, addr: u64) -> usize {
        (addr as usize / self.word_bytes) % self.num_banks
    }

    fn locate(&self, addr: u64) -> Result<(usize, usize), anyhow::Error> {
        // the model itself must maintain alignment; stimuli are checked at load
        assert!(
            addr as usize % self.word_bytes == 0,
            "word-aligned accesses only"
        );
        let word = addr as usize / self.word_bytes;
        let (bank, row) = (word % self.num_banks, word / self.num_banks);
        if row >= self.words_per_bank {
            bail!("access beyond banked memory @ {:#010x}", addr);
        }
        Ok((bank, row))
    }

    pub fn read_word(&self, addr: u64) -> Result<u32, anyhow::Error> {
        let (bank, row) = self.locate(addr)?;
        Ok(self.banks[bank][row])
    }

    pub fn write_word(&mut self, addr: u64, data: u32, be: u8) -> Result<(), anyhow::Error> {
        let (bank, row) = self.locate(addr)?;
        let word = &mut self.banks[bank][row];
        for byte in 0..self.word_bytes {
            if be & (1 << byte) != 0 {
                let shift = 8 * byte;
                let mask = 0xFFu32 << shift;
                *word = (*word & !mask) | (data & mask);
            }
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        for bank in &mut self.banks {
            bank.fill(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaving_maps_consecutive_words_to_consecutive_banks() {
        let mem = TcdmBanks::new(8, 32 << 10);
        for word in 0..16u64 {
            assert_eq!((word % 8) as usize, mem.bank_of(word * 4));
        }
    }

    #[test]
    fn byte_enables_mask_the_store() {
        let mut mem = TcdmBanks::new(4, 4 << 10);
        mem.write_word(0x20, 0xAABBCCDD, 0xF).unwrap();
        mem.write_word(0x20, 0x11223344, 0x5).unwrap();
        assert_eq!(0xAA22CC44, mem.read_word(0x20).unwrap());
    }

    #[test]
    fn out_of_range_access_is_an_error() {
        let mem = TcdmBanks::new(8, 32 << 10);
        assert!(mem.read_word(32 << 10).is_err());
        assert!(mem.read_word((32 << 10) - 4).is_ok());
    }
}
