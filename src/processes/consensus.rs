//! Pipeline driver (component F): assembles a SAM stream into mate pairs,
//! merges and fingerprints each pair, accumulates PCR-duplicate families,
//! and emits one consensus FASTQ pair per family.

use clap::{Args, ValueHint};
use indoc::writedoc;
use std::io::Write as _;
use std::path::PathBuf;

use crate::core::family::Family;
use crate::core::fingerprint::{BarcodePolicy, build_fingerprint};
use crate::core::mate_merge::merge_mates;
use crate::core::sam::{SamReader, SamRecord};
use crate::error::ConsensusError;
use crate::io::fastq::FastqRecord;
use crate::io::{create_output, open_input};
use crate::utils::{SeedableFoldHashMap, get_seed};

#[derive(Args, Debug)]
pub struct ConsensusArgs {
    /// Coordinate-sorted input SAM file, or `-` for stdin.
    #[arg(value_hint = ValueHint::FilePath)]
    pub sam_path: String,

    /// Output FASTQ path (`.gz` gzips); defaults to stdout.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: Option<PathBuf>,

    /// Families smaller than this are discarded without emission.
    #[arg(long, default_value_t = 1, value_parser = parse_min_family_size)]
    pub min_family_size: usize,

    /// UMI barcode convention used to split families sharing alignment
    /// coordinates; omit to ignore barcodes entirely.
    #[arg(long, value_enum)]
    pub umi: Option<BarcodePolicy>,
}

fn parse_min_family_size(s: &str) -> Result<usize, String> {
    let value: usize = s.parse().map_err(|_| format!("not a valid integer: {s}"))?;
    if value < 1 {
        return Err("must be at least 1".to_string());
    }
    Ok(value)
}

static MODULE: &str = module_path!();

#[derive(Debug, Default)]
struct RunStats {
    pairs_assembled: usize,
    dangling_mates: usize,
    families_emitted: usize,
    families_discarded_too_small: usize,
}

/// Runs the family-consensus pipeline end to end (spec.md §4.6).
///
/// ## Errors
///
/// Returns an error if the input cannot be opened/read, the output cannot
/// be opened/written, or a SAM record is malformed (spec.md §5/§7: a fatal
/// upstream error aborts the run without a partial flush).
pub fn consensus_process(args: &ConsensusArgs) -> Result<(), ConsensusError> {
    let input = open_input(&args.sam_path)?;
    let mut output = create_output(args.output.as_ref())?;

    let seed = get_seed();
    let mut pending: SeedableFoldHashMap<String, SamRecord> = SeedableFoldHashMap::new(seed);
    let mut families: SeedableFoldHashMap<crate::core::fingerprint::Fingerprint, Family> = SeedableFoldHashMap::new(seed);

    let mut stats = RunStats::default();

    for record in SamReader::new(input) {
        let record = record?;

        if record.is_unmapped() {
            continue;
        }

        prune_pending(&mut pending, record.pos, &mut stats);

        let Some(mate) = pending.remove(&record.qname) else {
            pending.insert(record.qname.clone(), record);
            continue;
        };

        let (read1, read2) = if mate.is_first_mate() { (mate, record) } else { (record, mate) };

        stats.pairs_assembled += 1;
        let flush_before = read1.pos.min(read2.pos);

        let resolved = merge_mates(&read1, &read2);
        let fingerprint = build_fingerprint(&read1, &read2, args.umi);
        let anchor_pos = fingerprint.mate_a.pos.min(fingerprint.mate_b.pos);

        match families.get_mut(&fingerprint) {
            Some(family) => family.add(resolved),
            None => {
                let mut family = Family::new(fingerprint.clone(), anchor_pos, read1.qname.clone());
                family.add(resolved);
                families.insert(fingerprint, family);
            }
        }

        flush_up_to(&mut families, flush_before, args.min_family_size, &mut output, &mut stats)?;
    }

    drop_dangling(pending, &mut stats);

    flush_all(families, args.min_family_size, &mut output, &mut stats)?;

    report(&stats);

    Ok(())
}

/// Drops every pending half-pair whose position is strictly less than
/// `ref_pos` (spec.md §4.6): on coordinate-sorted input, such a mate can
/// never arrive, so it is dropped with a per-record warning rather than
/// held for the rest of the run.
fn prune_pending(pending: &mut SeedableFoldHashMap<String, SamRecord>, ref_pos: i64, stats: &mut RunStats) {
    let stale: Vec<String> = pending.keys().filter(|&qname| pending.get(qname).is_some_and(|r| r.pos < ref_pos)).cloned().collect();

    for qname in stale {
        if let Some(record) = pending.remove(&qname) {
            eprintln!("{MODULE}: warning: dropping dangling mate {qname} at {}:{}", record.rname, record.pos);
            stats.dangling_mates += 1;
        }
    }
}

/// Drops every half-pair still pending at end of stream (its mate never
/// arrived at all), warning for each as [`prune_pending`] does.
fn drop_dangling(pending: SeedableFoldHashMap<String, SamRecord>, stats: &mut RunStats) {
    for (qname, record) in pending {
        eprintln!("{MODULE}: warning: dropping dangling mate {qname} at {}:{}", record.rname, record.pos);
        stats.dangling_mates += 1;
    }
}

/// Flushes and removes every family whose anchor position is strictly
/// less than `ref_pos` (spec.md §4.5's `flush_up_to`); the input is assumed
/// coordinate-sorted, so such families can no longer gain members.
fn flush_up_to(
    families: &mut SeedableFoldHashMap<crate::core::fingerprint::Fingerprint, Family>, ref_pos: i64, min_family_size: usize,
    output: &mut impl std::io::Write, stats: &mut RunStats,
) -> Result<(), ConsensusError> {
    let ready: Vec<_> = families
        .keys()
        .filter(|&fp| families.get(fp).is_some_and(|f| f.anchor_pos < ref_pos))
        .cloned()
        .collect();

    for key in ready {
        if let Some(family) = families.remove(&key) {
            emit_family(family, min_family_size, output, stats)?;
        }
    }

    Ok(())
}

fn flush_all(
    families: SeedableFoldHashMap<crate::core::fingerprint::Fingerprint, Family>, min_family_size: usize,
    output: &mut impl std::io::Write, stats: &mut RunStats,
) -> Result<(), ConsensusError> {
    for (_, family) in families {
        emit_family(family, min_family_size, output, stats)?;
    }
    Ok(())
}

fn emit_family(family: Family, min_family_size: usize, output: &mut impl std::io::Write, stats: &mut RunStats) -> Result<(), ConsensusError> {
    if family.size() < min_family_size {
        stats.families_discarded_too_small += 1;
        return Ok(());
    }

    let qname = family.qname.clone();
    let Some(consensus) = family.consensus() else {
        return Ok(());
    };

    let fwd = FastqRecord {
        qname: qname.clone(),
        family_size: consensus.size,
        seq: consensus.fwd_seq,
        qual: consensus.fwd_qual,
    };
    let rev = FastqRecord {
        qname,
        family_size: consensus.size,
        seq: consensus.rev_seq,
        qual: consensus.rev_qual,
    };

    write!(output, "{fwd}{rev}")?;
    stats.families_emitted += 1;

    Ok(())
}

fn report(stats: &RunStats) {
    let RunStats {
        pairs_assembled: pairs,
        dangling_mates: dangling,
        families_emitted: emitted,
        families_discarded_too_small: discarded,
    } = *stats;

    let mut err = std::io::stderr();
    let _ = writedoc!(
        &mut err,
        "{MODULE} run summary:
           pairs assembled:            {pairs}
           dangling mates dropped:     {dangling}
           families emitted:           {emitted}
           families below min size:    {discarded}
         "
    );
}
