use super::{paired_records, run_ordered};
use crate::align::local::{construct_pair_align, get_trace};
use crate::align::{
    halign_start, local_trace, overlap_align, BestResult, LocalOverlap, LocalParams, LocalSegment,
    LocalTrace, OverlapParams, OverlapRegion,
};
use crate::cli::OverlapArgs;
use crate::utils::{create_writer, FastaRecord, Result};
use std::io::Write;
use std::path::Path;

const HEADER: &str = "#name1\tname2\ta_lo\ta_hi\tb_lo\tb_hi\terrors\tscore\tkind\terror_rate";

struct PairSettings {
    params: OverlapParams,
    local_trace: bool,
    min_piece_len: usize,
}

/// Rebuilds the overlap as a chain of ungapped pieces and splices them into
/// a single trace.
fn local_pieces_trace(a: &[u8], b: &[u8], best: &BestResult, settings: &PairSettings) -> Result<LocalTrace> {
    let aln = halign_start(&a[best.a_lo..best.a_hi], &b[best.b_lo..best.b_hi])?
        .with_offsets(best.a_lo + 1, best.b_lo + 1);
    let pieces: Vec<LocalSegment> = aln
        .segments()
        .filter(|seg| seg.len >= settings.min_piece_len)
        .map(|seg| {
            LocalSegment::new(
                seg.bgn1 as i32,
                (seg.bgn1 + seg.len) as i32,
                seg.bgn2 as i32,
                (seg.bgn2 + seg.len) as i32,
                (seg.len - seg.matches) as f64 / seg.len as f64,
            )
        })
        .collect();

    let mut overlap = LocalOverlap::from_segments(&pieces, a.len(), b.len())?;
    let params = LocalParams {
        error_rate: settings.params.error_rate,
        ..LocalParams::default()
    };
    overlap.check_gaps(&params).map_err(|e| e.to_string())?;

    if log::log_enabled!(log::Level::Trace) {
        let mut probe = overlap.clone();
        if let Some(trace) = get_trace(a, b, &mut probe, 0) {
            let pair = construct_pair_align(a, b, &probe.chain[0].piece, &trace);
            log::trace!(
                "First piece:\n{}\n{}",
                String::from_utf8_lossy(&pair.aseg),
                String::from_utf8_lossy(&pair.bseg)
            );
        }
    }

    local_trace(&mut overlap, a, b, &params)
}

fn overlap_pair(a: &FastaRecord, b: &FastaRecord, settings: &PairSettings) -> Option<String> {
    let region = OverlapRegion::whole(a.seq.len(), b.seq.len());
    let Some(best) = overlap_align(&a.seq, &b.seq, region, &settings.params) else {
        log::debug!("{} vs {}: no overlap", a.name, b.name);
        return None;
    };
    if best.length() < settings.params.min_overlap {
        log::debug!(
            "{} vs {}: overlap of {} bases is too short",
            a.name,
            b.name,
            best.length()
        );
        return None;
    }

    let mut line = format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{:.4}",
        a.name,
        b.name,
        best.a_lo,
        best.a_hi,
        best.b_lo,
        best.b_hi,
        best.errors,
        best.score,
        best.kind,
        best.error_rate()
    );
    if settings.local_trace {
        match local_pieces_trace(&a.seq, &b.seq, &best, settings) {
            Ok(res) => {
                let gaps = res.trace.len() - 1;
                line.push_str(&format!("\t{}\t{}\t{}", res.ahang, res.bhang, gaps));
            }
            Err(e) => {
                log::debug!("{} vs {}: no local trace: {}", a.name, b.name, e);
                line.push_str("\tNA\tNA\tNA");
            }
        }
    }
    Some(line)
}

pub fn overlap(args: OverlapArgs) -> Result<()> {
    let settings = PairSettings {
        params: OverlapParams {
            mer_size: args.mer_size,
            min_mer_size: args.min_mer_size,
            error_rate: args.error_rate,
            min_overlap: args.min_overlap,
            merge_contiguous: args.merge_contiguous,
            partial: args.partial,
        },
        local_trace: args.local_trace,
        min_piece_len: args.min_piece_len.max(1),
    };
    settings.params.validate()?;

    let mut writer = create_writer(args.output_path.as_deref().map(Path::new))?;
    let header = if settings.local_trace {
        format!("{}\tahang\tbhang\tgaps", HEADER)
    } else {
        HEADER.to_string()
    };
    writeln!(writer, "{}", header).map_err(|e| e.to_string())?;

    let pairs = paired_records(&args.first_path, &args.second_path)?;
    let count = run_ordered(
        pairs,
        args.num_threads,
        |(a, b)| overlap_pair(&a, &b, &settings),
        move |line| {
            if let Some(line) = line {
                writeln!(writer, "{}", line).map_err(|e| e.to_string())?;
            }
            writer.flush().map_err(|e| e.to_string())
        },
    )?;
    log::info!("Processed {} pairs", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::fs;
    use tempfile::NamedTempFile;

    fn random_seq(rng: &mut StdRng, len: usize) -> Vec<u8> {
        (0..len).map(|_| b"ACGT"[rng.random_range(0..4)]).collect()
    }

    fn fasta_file(records: &[(&str, &[u8])]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for (name, seq) in records {
            writeln!(file, ">{}\n{}", name, String::from_utf8_lossy(seq)).unwrap();
        }
        file
    }

    fn args(first: &NamedTempFile, second: &NamedTempFile, out: &Path, local_trace: bool) -> OverlapArgs {
        OverlapArgs {
            first_path: first.path().to_path_buf(),
            second_path: second.path().to_path_buf(),
            output_path: Some(out.to_string_lossy().to_string()),
            num_threads: 2,
            error_rate: 0.06,
            min_overlap: 40,
            mer_size: 17,
            min_mer_size: 8,
            merge_contiguous: false,
            partial: false,
            local_trace,
            min_piece_len: 20,
        }
    }

    #[test]
    fn test_overlap_command_reports_dovetail() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = random_seq(&mut rng, 300);
        let mut b = a[100..].to_vec();
        b.extend(random_seq(&mut rng, 100));
        let unrelated = vec![b'A'; 200];
        let other = vec![b'C'; 200];

        let first = fasta_file(&[("a", a.as_slice()), ("x", unrelated.as_slice())]);
        let second = fasta_file(&[("b", b.as_slice()), ("y", other.as_slice())]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("overlaps.tsv");
        overlap(args(&first, &second, &out, false)).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "a\tb\t100\t300\t0\t200\t0\t200\tdovetail\t0.0000");
    }

    #[test]
    fn test_overlap_command_local_trace_columns() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = random_seq(&mut rng, 300);
        let mut b = a[100..].to_vec();
        b.extend(random_seq(&mut rng, 100));

        let first = fasta_file(&[("a", a.as_slice())]);
        let second = fasta_file(&[("b", b.as_slice())]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("overlaps.tsv");
        overlap(args(&first, &second, &out, true)).unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let fields: Vec<_> = text.lines().nth(1).unwrap().split('\t').collect();
        assert_eq!(fields.len(), 13);
        assert_eq!(&fields[10..], &["100", "100", "0"]);
    }

    #[test]
    fn test_overlap_command_rejects_bad_params() {
        let first = fasta_file(&[("a", b"ACGT".as_slice())]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("overlaps.tsv");
        let mut bad = args(&first, &first, &out, false);
        bad.mer_size = 4;
        assert!(overlap(bad).is_err());
    }
}
