//! FASTQ emission (component H). Sequences reaching here have already been
//! validated as concrete bases by [`crate::core`], so unlike the teacher's
//! `FastX::fmt` this skips the ASCII-SIMD fast path entirely — there's
//! nothing left to check.

use crate::core::quality::{Quality, encode_qual};
use crate::core::sam::Base;
use std::fmt::{self, Display};

/// One family-consensus FASTQ record, carrying its family size in the
/// header as `XF:i:<family_size>` (spec.md §2 component H).
pub struct FastqRecord {
    pub qname: String,
    pub family_size: usize,
    pub seq: Vec<Base>,
    pub qual: Vec<Quality>,
}

impl Display for FastqRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seq: Vec<u8> = self.seq.iter().map(|b| b.to_ascii()).collect();
        let qual = encode_qual(&self.qual);

        writeln!(f, "@{} XF:i:{}", self.qname, self.family_size)?;
        // SAFETY: both byte strings are built from ASCII-only encodings.
        f.write_str(unsafe { std::str::from_utf8_unchecked(&seq) })?;
        f.write_str("\n+\n")?;
        f.write_str(unsafe { std::str::from_utf8_unchecked(&qual) })?;
        f.write_str("\n")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formats_four_line_record() {
        let record = FastqRecord {
            qname: "read1".to_string(),
            family_size: 3,
            seq: vec![Base::A, Base::C, Base::G, Base::T],
            qual: vec![Quality(40); 4],
        };
        assert_eq!(record.to_string(), "@read1 XF:i:3\nACGT\n+\nIIII\n");
    }
}
