use super::{paired_records, run_ordered};
use crate::align::{halign, DiffParams};
use crate::cli::AlignArgs;
use crate::utils::{create_writer, FastaRecord, Result};
use std::io::Write;
use std::path::Path;

/// Ungapped segments of one aligned pair, one TSV line each.
fn align_pair(a: &FastaRecord, b: &FastaRecord, params: &DiffParams) -> Result<Vec<String>> {
    let aln = halign(&a.seq, &b.seq, params).map_err(|e| format!("{} vs {}: {}", a.name, b.name, e))?;
    log::debug!(
        "{} vs {}: score {}, {} matches over {} ops",
        a.name,
        b.name,
        aln.score,
        aln.matches(),
        aln.num_ops()
    );
    Ok(aln
        .segments()
        .map(|seg| {
            format!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                a.name, b.name, seg.bgn1, seg.bgn2, seg.len, seg.matches, aln.score
            )
        })
        .collect())
}

pub fn align(args: AlignArgs) -> Result<()> {
    let params = DiffParams {
        free_start: args.free_ends,
        free_end: args.free_ends,
        ..args.costs
    };
    let mut writer = create_writer(args.output_path.as_deref().map(Path::new))?;
    writeln!(writer, "#name1\tname2\tbgn1\tbgn2\tlen\tmatches\tscore").map_err(|e| e.to_string())?;

    let pairs = paired_records(&args.first_path, &args.second_path)?;
    let mut failed = 0;
    let count = run_ordered(
        pairs,
        args.num_threads,
        |(a, b)| align_pair(&a, &b, &params),
        move |lines| {
            match lines {
                Ok(lines) => {
                    for line in lines {
                        writeln!(writer, "{}", line).map_err(|e| e.to_string())?;
                    }
                }
                Err(e) => {
                    failed += 1;
                    log::warn!("Skipping pair: {} ({} so far)", e, failed);
                }
            }
            writer.flush().map_err(|e| e.to_string())
        },
    )?;
    log::info!("Aligned {} pairs", count);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    fn fasta_file(records: &[(&str, &str)]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for (name, seq) in records {
            writeln!(file, ">{}\n{}", name, seq).unwrap();
        }
        file
    }

    #[test]
    fn test_align_pair_segments() {
        let a = FastaRecord {
            name: "a".to_string(),
            seq: b"ACGTTACGTA".to_vec(),
        };
        let b = FastaRecord {
            name: "b".to_string(),
            seq: b"ACGTACGTA".to_vec(),
        };
        let lines = align_pair(&a, &b, &DiffParams::default()).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("a\tb\t0\t0\t"), "{}", lines[0]);
        assert!(lines.iter().all(|l| l.ends_with("\t2")));
    }

    #[test]
    fn test_align_pair_empty_sequence() {
        let a = FastaRecord {
            name: "a".to_string(),
            seq: vec![],
        };
        let b = FastaRecord {
            name: "b".to_string(),
            seq: b"ACGT".to_vec(),
        };
        assert!(align_pair(&a, &b, &DiffParams::default()).is_err());
    }

    #[test]
    fn test_align_command_writes_tsv() {
        let first = fasta_file(&[("p1", "ACGTACGTAC"), ("p2", ""), ("p3", "GGGGCCCC")]);
        let second = fasta_file(&[("q1", "ACGTACGTAC"), ("q2", "ACGT"), ("q3", "GGGGCCCC")]);
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("segments.tsv");

        align(AlignArgs {
            first_path: first.path().to_path_buf(),
            second_path: second.path().to_path_buf(),
            output_path: Some(out.to_string_lossy().to_string()),
            num_threads: 2,
            costs: DiffParams::default(),
            free_ends: false,
        })
        .unwrap();

        let text = fs::read_to_string(&out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "#name1\tname2\tbgn1\tbgn2\tlen\tmatches\tscore",
                "p1\tq1\t0\t0\t10\t10\t0",
                "p3\tq3\t0\t0\t8\t8\t0",
            ]
        );
    }
}
