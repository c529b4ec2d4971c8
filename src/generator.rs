use anyhow::{Result, ensure};
use rand::Rng;
use rand::distr::Alphanumeric;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Zipf};
use std::ops::Range;

/// One named field of a generated record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bin {
    pub name: String,
    pub value: String,
}

/// Produces synthetic records. Value lengths are Zipf-skewed within the
/// configured range, values are random alphanumeric text.
pub struct BinGen {
    bin_count: usize,
    size_floor: u64,
    size_spread: Zipf<f64>,
}

impl BinGen {
    pub fn new(bin_count: usize, sizes: Range<u64>) -> Result<Self> {
        ensure!(bin_count >= 1, "a record needs at least one bin");
        ensure!(sizes.end > sizes.start, "value size range must be non-empty");
        Ok(BinGen {
            bin_count,
            size_floor: sizes.start,
            size_spread: Zipf::new((sizes.end - sizes.start) as f64, 1.0)?,
        })
    }

    /// Generates a non-empty record: one bin, or `bin_count` bins when
    /// `multi_bin` is set.
    pub fn generate(&self, rng: &mut SmallRng, multi_bin: bool) -> Vec<Bin> {
        let bins = if multi_bin { self.bin_count } else { 1 };
        (0..bins)
            .map(|i| {
                let len = self.size_floor + self.size_spread.sample(rng) as u64;
                let value = (&mut *rng)
                    .sample_iter(&Alphanumeric)
                    .take(len as usize)
                    .map(char::from)
                    .collect();
                Bin {
                    name: format!("bin_{i}"),
                    value,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn single_bin_unless_multi_bin_requested() {
        let mut rng = SmallRng::seed_from_u64(7);
        let bin_gen = BinGen::new(4, 8..32).unwrap();

        assert_eq!(bin_gen.generate(&mut rng, false).len(), 1);
        assert_eq!(bin_gen.generate(&mut rng, true).len(), 4);
    }

    #[test]
    fn bin_names_are_distinct_and_ordered() {
        let mut rng = SmallRng::seed_from_u64(7);
        let bin_gen = BinGen::new(3, 8..32).unwrap();

        let record = bin_gen.generate(&mut rng, true);
        let names: Vec<&str> = record.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["bin_0", "bin_1", "bin_2"]);
    }

    #[test]
    fn value_lengths_stay_within_configured_range() {
        let mut rng = SmallRng::seed_from_u64(11);
        let bin_gen = BinGen::new(1, 16..64).unwrap();

        for _ in 0..200 {
            let record = bin_gen.generate(&mut rng, false);
            let len = record[0].value.len() as u64;
            assert!((16..=64).contains(&len), "value length {len} out of range");
        }
    }

    #[test]
    fn zero_bins_rejected() {
        assert!(BinGen::new(0, 8..32).is_err());
    }
}
