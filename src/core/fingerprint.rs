//! Fingerprint builder (component C) and barcode policy (component D).

use crate::core::sam::SamRecord;
use clap::ValueEnum;

/// Orientation derived from the SAM reverse-strand flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    #[inline]
    fn from_record(record: &SamRecord) -> Self {
        if record.is_reverse() { Strand::Reverse } else { Strand::Forward }
    }
}

/// The alignment-derived portion of one mate's fingerprint contribution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MateKey {
    pub rname: String,
    pub pos: i64,
    pub strand: Strand,
    pub cigar: String,
}

impl MateKey {
    fn from_record(record: &SamRecord) -> Self {
        MateKey {
            rname: record.rname.clone(),
            pos: record.pos,
            strand: Strand::from_record(record),
            cigar: record.cigar_raw.clone(),
        }
    }
}

/// A canonical equality key for PCR-duplicate family membership
/// (spec.md §4.3). `mate_a`/`mate_b` are ordered so the fingerprint is
/// symmetric under mate swap.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint {
    pub mate_a: MateKey,
    pub mate_b: MateKey,
    pub barcode_key: String,
}

/// Which `--umi` barcode policy is in effect (spec.md §4.4). `Prism` and
/// `Thruplex` behave identically for fingerprinting purposes; the
/// distinction is reserved for future asymmetric handling elsewhere in the
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BarcodePolicy {
    Prism,
    Thruplex,
}

impl BarcodePolicy {
    /// Derives the `barcode_key` for a pair given its `RX` tag (if any).
    /// `rx` should come from whichever mate carried the tag; `policy` of
    /// `None` always yields the empty key regardless of `rx`.
    pub fn barcode_key(policy: Option<BarcodePolicy>, rx: Option<&str>) -> String {
        match policy {
            None => String::new(),
            Some(BarcodePolicy::Prism | BarcodePolicy::Thruplex) => rx.unwrap_or("").to_string(),
        }
    }
}

/// Builds the canonical fingerprint for a pair (spec.md §4.3).
pub fn build_fingerprint(read1: &SamRecord, read2: &SamRecord, policy: Option<BarcodePolicy>) -> Fingerprint {
    let key1 = MateKey::from_record(read1);
    let key2 = MateKey::from_record(read2);

    let rx = read1.rx.as_deref().or(read2.rx.as_deref());
    let barcode_key = BarcodePolicy::barcode_key(policy, rx);

    let (mate_a, mate_b) = if key1 <= key2 { (key1, key2) } else { (key2, key1) };

    Fingerprint { mate_a, mate_b, barcode_key }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::sam::{decode_seq, flags, parse_cigar};
    use crate::core::quality::decode_qual;

    fn record(qname: &str, pos: i64, cigar: &str, reverse: bool, rx: Option<&str>) -> SamRecord {
        let mut flag = flags::FIRST_MATE;
        if reverse {
            flag |= flags::REVERSE;
        }
        SamRecord {
            qname: qname.to_string(),
            flag,
            rname: "chr1".to_string(),
            pos,
            cigar_raw: cigar.to_string(),
            cigar: parse_cigar(cigar).unwrap(),
            seq: decode_seq(b"ACGT"),
            qual: decode_qual(b"IIII"),
            rx: rx.map(str::to_string),
        }
    }

    #[test]
    fn fingerprint_is_symmetric_under_mate_swap() {
        let r1 = record("a", 10, "4M", false, None);
        let r2 = record("a", 20, "4M", true, None);
        let fp_ab = build_fingerprint(&r1, &r2, None);
        let fp_ba = build_fingerprint(&r2, &r1, None);
        assert_eq!(fp_ab, fp_ba);
    }

    #[test]
    fn different_cigars_never_collide() {
        let r1 = record("a", 10, "1I6M", false, None);
        let r2 = record("a", 20, "4M", true, None);
        let other = record("a", 10, "2I5M", false, None);
        let fp1 = build_fingerprint(&r1, &r2, None);
        let fp2 = build_fingerprint(&other, &r2, None);
        assert_ne!(fp1, fp2);
    }

    #[test]
    fn barcode_none_ignores_rx() {
        let r1 = record("a", 10, "4M", false, Some("AAAA"));
        let r2 = record("a", 20, "4M", true, Some("BBBB"));
        let fp = build_fingerprint(&r1, &r2, None);
        assert_eq!(fp.barcode_key, "");
    }

    #[test]
    fn barcode_prism_splits_families() {
        let r1 = record("a", 10, "4M", false, Some("AAAA"));
        let r2 = record("a", 20, "4M", true, Some("AAAA"));
        let r3 = record("a", 10, "4M", false, Some("BBBB"));
        let fp_a = build_fingerprint(&r1, &r2, Some(BarcodePolicy::Prism));
        let fp_b = build_fingerprint(&r3, &r2, Some(BarcodePolicy::Prism));
        assert_ne!(fp_a, fp_b);
    }
}
