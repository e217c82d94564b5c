/// A reader counts as cold once the probe sequence has advanced this far
/// past the last sequence number it observed.
pub const LIFE_TIME: u64 = 10_000;

/// Configuration for filter block construction and the filter cache.
#[derive(Debug, Clone)]
pub struct Options {
    /// Filter units loaded when a reader is created (default: 1)
    pub init_units: u32,

    /// Filter units generated per filter block (default: 4)
    pub all_units: u32,

    /// log2 of the block-offset range one filter covers (default: 11 -> 2KiB)
    pub base_lg: u8,

    /// Bits per key for the bloom filter policy (default: 10)
    pub bloom_bits_per_key: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            init_units: 1,
            all_units: 4,
            base_lg: 11,
            bloom_bits_per_key: 10,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of units loaded at reader creation
    pub fn init_units(mut self, units: u32) -> Self {
        self.init_units = units;
        self
    }

    /// Set the number of units generated per filter block
    pub fn all_units(mut self, units: u32) -> Self {
        self.all_units = units;
        self
    }

    /// Set the filter base exponent
    pub fn base_lg(mut self, base_lg: u8) -> Self {
        self.base_lg = base_lg;
        self
    }

    /// Set the bloom policy's bits per key
    pub fn bloom_bits_per_key(mut self, bits: usize) -> Self {
        self.bloom_bits_per_key = bits;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = Options::default();
        assert_eq!(opts.init_units, 1);
        assert_eq!(opts.all_units, 4);
        assert_eq!(opts.base_lg, 11);
        assert_eq!(opts.bloom_bits_per_key, 10);
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::new().init_units(2).all_units(6).base_lg(12);
        assert_eq!(opts.init_units, 2);
        assert_eq!(opts.all_units, 6);
        assert_eq!(opts.base_lg, 12);
        assert_eq!(opts.bloom_bits_per_key, 10);
    }
}
