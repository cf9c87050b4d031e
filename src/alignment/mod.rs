use std::error::Error;
use std::fmt;

use bio::io::fasta::Record;
use rand::Rng;

pub const GAP: u8 = b'-';
pub(crate) const POSSIBLE_GAPS: &[u8] = b"-.*";

pub(crate) struct InvalidAlignment {
    pub(crate) message: String,
}
impl fmt::Debug for InvalidAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl fmt::Display for InvalidAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}
impl Error for InvalidAlignment {}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub(crate) s: Vec<Record>,
    pub(crate) aligned: bool,
    pub(crate) msa_len: usize,
}

impl Alignment {
    pub fn new(s: Vec<Record>) -> Alignment {
        let len = if s.is_empty() { 0 } else { s[0].seq().len() };
        if s.iter().filter(|rec| rec.seq().len() != len).count() == 0 {
            Alignment {
                s,
                aligned: true,
                msa_len: len,
            }
        } else {
            Alignment {
                s,
                aligned: false,
                msa_len: 0,
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.s.iter()
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    pub fn record(&self, idx: usize) -> &Record {
        &self.s[idx]
    }

    pub fn msa_len(&self) -> usize {
        self.msa_len
    }

    /// Creates a bootstrap replicate by drawing `msa_len` columns uniformly
    /// with replacement. Record order and ids are preserved.
    ///
    /// Unaligned or zero-column inputs are returned as-is; the distance
    /// calculator rejects them downstream.
    pub fn resample_columns<R: Rng>(&self, rng: &mut R) -> Alignment {
        if !self.aligned || self.msa_len == 0 {
            return self.clone();
        }
        let columns: Vec<usize> = (0..self.msa_len)
            .map(|_| rng.gen_range(0..self.msa_len))
            .collect();
        let records = self
            .s
            .iter()
            .map(|rec| {
                let seq = rec.seq();
                let resampled: Vec<u8> = columns.iter().map(|&col| seq[col]).collect();
                Record::with_attrs(rec.id(), rec.desc(), &resampled)
            })
            .collect();
        Alignment::new(records)
    }
}
