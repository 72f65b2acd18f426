//! CIGAR projection and the minimal SAM tokenizer (component G). Parsing
//! here is deliberately permissive about everything the core doesn't need
//! (mapq, rnext, pnext, tlen) and strict about the fields that drive
//! fingerprinting and merging.

use crate::core::quality::{Quality, decode_qual};
use crate::error::ConsensusError;
use std::io::BufRead;

/// One IUPAC-reduced base. `N` is the "no call" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Base {
    A,
    C,
    G,
    T,
    N,
}

impl Base {
    #[inline]
    pub fn from_ascii(byte: u8) -> Self {
        match byte.to_ascii_uppercase() {
            b'A' => Base::A,
            b'C' => Base::C,
            b'G' => Base::G,
            b'T' => Base::T,
            _ => Base::N,
        }
    }

    #[inline]
    pub fn to_ascii(self) -> u8 {
        match self {
            Base::A => b'A',
            Base::C => b'C',
            Base::G => b'G',
            Base::T => b'T',
            Base::N => b'N',
        }
    }

    #[inline]
    pub fn complement(self) -> Base {
        match self {
            Base::A => Base::T,
            Base::T => Base::A,
            Base::C => Base::G,
            Base::G => Base::C,
            Base::N => Base::N,
        }
    }
}

/// Decodes a raw SAM `SEQ` field.
pub fn decode_seq(seq: &[u8]) -> Vec<Base> {
    seq.iter().map(|&b| Base::from_ascii(b)).collect()
}

/// Reverses and complements a sequence (component A).
pub fn reverse_complement(seq: &[Base]) -> Vec<Base> {
    seq.iter().rev().map(|&b| b.complement()).collect()
}

/// Reverses a quality string in place order (component A), paired with
/// [`reverse_complement`] when flipping strand.
pub fn reverse_qual(qual: &[Quality]) -> Vec<Quality> {
    qual.iter().rev().copied().collect()
}

/// One CIGAR operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    Match,
    Ins,
    Del,
    Skip,
    SoftClip,
    HardClip,
    Pad,
    Eq,
    Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    pub len: u32,
    pub kind: CigarOpKind,
}

/// Parses a CIGAR string such as `"76M"` or `"5S70M1I5M"`.
///
/// ## Errors
///
/// Returns an error message if the string contains a malformed length or an
/// unrecognized operator.
pub fn parse_cigar(raw: &str) -> Result<Vec<CigarOp>, String> {
    if raw == "*" {
        return Ok(Vec::new());
    }

    let mut ops = Vec::new();
    let mut len_start = 0;

    for (i, ch) in raw.char_indices() {
        if ch.is_ascii_digit() {
            continue;
        }

        let len: u32 = raw[len_start..i]
            .parse()
            .map_err(|_| format!("invalid CIGAR length in {raw:?}"))?;
        let kind = match ch {
            'M' => CigarOpKind::Match,
            'I' => CigarOpKind::Ins,
            'D' => CigarOpKind::Del,
            'N' => CigarOpKind::Skip,
            'S' => CigarOpKind::SoftClip,
            'H' => CigarOpKind::HardClip,
            'P' => CigarOpKind::Pad,
            '=' => CigarOpKind::Eq,
            'X' => CigarOpKind::Diff,
            other => return Err(format!("unrecognized CIGAR operator {other:?} in {raw:?}")),
        };
        ops.push(CigarOp { len, kind });
        len_start = i + ch.len_utf8();
    }

    if len_start != raw.len() {
        return Err(format!("trailing garbage in CIGAR {raw:?}"));
    }

    Ok(ops)
}

/// Sum of the reference-consuming operator lengths (`M`,`D`,`N`,`=`,`X`).
fn ref_consuming_len(cigar: &[CigarOp]) -> i64 {
    cigar
        .iter()
        .filter(|op| {
            matches!(
                op.kind,
                CigarOpKind::Match | CigarOpKind::Del | CigarOpKind::Skip | CigarOpKind::Eq | CigarOpKind::Diff
            )
        })
        .map(|op| i64::from(op.len))
        .sum()
}

/// Sum of the query-consuming operator lengths (`M`,`I`,`S`,`=`,`X`) — the
/// number of `SEQ`/`QUAL` bases a CIGAR implies.
fn query_consuming_len(cigar: &[CigarOp]) -> i64 {
    cigar
        .iter()
        .filter(|op| {
            matches!(
                op.kind,
                CigarOpKind::Match | CigarOpKind::Ins | CigarOpKind::SoftClip | CigarOpKind::Eq | CigarOpKind::Diff
            )
        })
        .map(|op| i64::from(op.len))
        .sum()
}

/// The rightmost reference coordinate this alignment covers (1-based, inclusive).
pub fn ref_end(pos: i64, cigar: &[CigarOp]) -> i64 {
    pos + ref_consuming_len(cigar) - 1
}

/// One base of a read projected onto the reference coordinate axis.
#[derive(Debug, Clone, Copy)]
pub struct BasePos {
    /// A reference coordinate. For `M`/`=`/`X` bases this is the true
    /// 1-based reference position. For soft-clip flanks it is a virtual
    /// coordinate outside `[pos, ref_end]` (decreasing before the start,
    /// increasing after the end); for inserted bases it is the reference
    /// coordinate of the base immediately preceding the insertion. This
    /// lets every downstream window filter be a plain numeric range check.
    pub ref_pos: i64,
    /// Whether this base participates in overlap reconciliation (`true`
    /// only for `M`/`=`/`X`).
    pub aligned: bool,
    pub base: Base,
    pub qual: Quality,
}

/// Projects a read's bases onto the reference axis using its CIGAR.
///
/// Soft clips are assumed to appear only at the ends of `cigar`, per the SAM
/// spec; hard clips are skipped entirely since they never contribute bases
/// to `SEQ`.
pub fn project(pos: i64, cigar: &[CigarOp], bases: &[Base], quals: &[Quality]) -> Vec<BasePos> {
    let mut out = Vec::with_capacity(bases.len());
    let mut idx = 0usize;

    let leading_clip = cigar
        .iter()
        .find(|op| op.kind != CigarOpKind::HardClip)
        .filter(|op| op.kind == CigarOpKind::SoftClip)
        .map(|op| op.len);

    if let Some(len) = leading_clip {
        for k in (1..=i64::from(len)).rev() {
            if idx >= bases.len() {
                break;
            }
            out.push(BasePos {
                ref_pos: pos - k,
                aligned: false,
                base: bases[idx],
                qual: quals[idx],
            });
            idx += 1;
        }
    }

    let mut ref_cursor = pos;
    for op in cigar {
        match op.kind {
            CigarOpKind::Match | CigarOpKind::Eq | CigarOpKind::Diff => {
                for _ in 0..op.len {
                    if idx >= bases.len() {
                        break;
                    }
                    out.push(BasePos {
                        ref_pos: ref_cursor,
                        aligned: true,
                        base: bases[idx],
                        qual: quals[idx],
                    });
                    ref_cursor += 1;
                    idx += 1;
                }
            }
            CigarOpKind::Del | CigarOpKind::Skip => ref_cursor += i64::from(op.len),
            CigarOpKind::Ins => {
                for _ in 0..op.len {
                    if idx >= bases.len() {
                        break;
                    }
                    out.push(BasePos {
                        ref_pos: ref_cursor - 1,
                        aligned: false,
                        base: bases[idx],
                        qual: quals[idx],
                    });
                    idx += 1;
                }
            }
            CigarOpKind::SoftClip | CigarOpKind::HardClip | CigarOpKind::Pad => {}
        }
    }

    let end = ref_cursor - 1;
    let trailing_clip = cigar
        .iter()
        .rev()
        .find(|op| op.kind != CigarOpKind::HardClip)
        .filter(|op| op.kind == CigarOpKind::SoftClip)
        .map(|op| op.len);

    if let Some(len) = trailing_clip {
        for k in 0..i64::from(len) {
            if idx >= bases.len() {
                break;
            }
            out.push(BasePos {
                ref_pos: end + 1 + k,
                aligned: false,
                base: bases[idx],
                qual: quals[idx],
            });
            idx += 1;
        }
    }

    out
}

/// SAM flag bits the core inspects. See SAM spec §1.4.
pub mod flags {
    pub const UNMAPPED: u16 = 0x4;
    pub const REVERSE: u16 = 0x10;
    pub const FIRST_MATE: u16 = 0x40;
    pub const LAST_MATE: u16 = 0x80;
}

/// One parsed SAM data line.
#[derive(Debug, Clone)]
pub struct SamRecord {
    pub qname: String,
    pub flag: u16,
    pub rname: String,
    pub pos: i64,
    pub cigar_raw: String,
    pub cigar: Vec<CigarOp>,
    pub seq: Vec<Base>,
    pub qual: Vec<Quality>,
    /// The `RX:Z:<barcode>` tag, if present.
    pub rx: Option<String>,
}

impl SamRecord {
    #[inline]
    pub fn is_unmapped(&self) -> bool {
        self.flag & flags::UNMAPPED != 0
    }

    #[inline]
    pub fn is_reverse(&self) -> bool {
        self.flag & flags::REVERSE != 0
    }

    #[inline]
    pub fn is_first_mate(&self) -> bool {
        self.flag & flags::FIRST_MATE != 0
    }

    #[inline]
    pub fn ref_end(&self) -> i64 {
        ref_end(self.pos, &self.cigar)
    }
}

static MODULE: &str = module_path!();

/// A line-oriented SAM reader, yielding [`SamRecord`]s in file order and
/// skipping `@`-prefixed header lines.
pub struct SamReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> SamReader<R> {
    pub fn new(reader: R) -> Self {
        SamReader {
            lines: reader.lines(),
            line_no: 0,
        }
    }

    fn parse_line(&self, line: &str) -> Result<SamRecord, ConsensusError> {
        let mut fields = line.split('\t');

        let mut next = |name: &str| -> Result<&str, ConsensusError> {
            fields.next().ok_or_else(|| ConsensusError::MalformedRecord {
                line: self.line_no,
                reason: format!("{MODULE} missing field {name}"),
            })
        };

        let qname = next("QNAME")?.to_string();
        let flag: u16 = next("FLAG")?
            .parse()
            .map_err(|_| ConsensusError::MalformedRecord {
                line: self.line_no,
                reason: format!("{MODULE} unparseable FLAG"),
            })?;
        let rname = next("RNAME")?.to_string();
        let pos: i64 = next("POS")?.parse().map_err(|_| ConsensusError::MalformedRecord {
            line: self.line_no,
            reason: format!("{MODULE} unparseable POS"),
        })?;
        let _mapq = next("MAPQ")?;
        let cigar_raw = next("CIGAR")?.to_string();
        let _rnext = next("RNEXT")?;
        let _pnext = next("PNEXT")?;
        let _tlen = next("TLEN")?;
        let seq_raw = next("SEQ")?;
        let qual_raw = next("QUAL")?;

        let cigar = parse_cigar(&cigar_raw).map_err(|reason| ConsensusError::MalformedRecord {
            line: self.line_no,
            reason,
        })?;

        if !cigar.is_empty() && query_consuming_len(&cigar) != seq_raw.len() as i64 {
            return Err(ConsensusError::MalformedRecord {
                line: self.line_no,
                reason: format!(
                    "{MODULE} CIGAR {cigar_raw:?} implies {} query bases but SEQ has {}",
                    query_consuming_len(&cigar),
                    seq_raw.len()
                ),
            });
        }

        let seq = decode_seq(seq_raw.as_bytes());
        let qual = decode_qual(qual_raw.as_bytes());

        let rx = fields
            .filter_map(|tag| tag.strip_prefix("RX:Z:"))
            .next()
            .map(str::to_string);

        Ok(SamRecord {
            qname,
            flag,
            rname,
            pos,
            cigar_raw,
            cigar,
            seq,
            qual,
            rx,
        })
    }
}

impl<R: BufRead> Iterator for SamReader<R> {
    type Item = Result<SamRecord, ConsensusError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(ConsensusError::Io(e))),
            };
            self.line_no += 1;

            if line.is_empty() || line.starts_with('@') {
                continue;
            }

            return Some(self.parse_line(&line));
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_plain_match_cigar() {
        let cigar = parse_cigar("7M").unwrap();
        assert_eq!(cigar, vec![CigarOp { len: 7, kind: CigarOpKind::Match }]);
        assert_eq!(ref_end(4, &cigar), 10);
    }

    #[test]
    fn projects_soft_clipped_read() {
        // "2S3M1I2S" implies 2+3+1+2 = 8 query bases.
        let cigar = parse_cigar("2S3M1I2S").unwrap();
        let bases: Vec<Base> = b"ACGTAGGT".iter().map(|&b| Base::from_ascii(b)).collect();
        let quals = vec![Quality(30); 8];
        let projected = project(10, &cigar, &bases, &quals);
        let positions: Vec<i64> = projected.iter().map(|b| b.ref_pos).collect();
        assert_eq!(positions, vec![8, 9, 10, 11, 12, 12, 13, 14]);
        assert!(projected[2].aligned && projected[3].aligned && projected[4].aligned);
        assert!(!projected[0].aligned && !projected[5].aligned && !projected[6].aligned && !projected[7].aligned);
    }

    #[test]
    fn project_does_not_panic_on_short_sequence() {
        // Defensive bound: a CIGAR implying more query bases than are
        // actually present must not index out of range.
        let cigar = parse_cigar("2S3M1I2S").unwrap();
        let bases: Vec<Base> = b"ACGTAGG".iter().map(|&b| Base::from_ascii(b)).collect();
        let quals = vec![Quality(30); 7];
        let projected = project(10, &cigar, &bases, &quals);
        assert_eq!(projected.len(), 7);
    }

    #[test]
    fn reads_sam_lines_skipping_headers() {
        let data = b"@HD\tVN:1.6\nread1\t99\tchr1\t5\t60\t4M\t=\t5\t4\tACGT\tIIII\tRX:Z:AAAA\n";
        let reader = SamReader::new(&data[..]);
        let records: Vec<_> = reader.map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].qname, "read1");
        assert_eq!(records[0].rx.as_deref(), Some("AAAA"));
    }

    #[test]
    fn rejects_cigar_seq_length_mismatch() {
        // "4M" implies 4 query bases but SEQ only has 3.
        let data = b"read1\t99\tchr1\t5\t60\t4M\t=\t5\t4\tACG\tIII\n";
        let reader = SamReader::new(&data[..]);
        let records: Vec<_> = reader.collect();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_err());
    }
}
