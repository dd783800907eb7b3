use super::run_ordered;
use crate::abacus::{tig_consensus, ConsensusParams, LayoutRead, TigResult};
use crate::cli::ConsensusArgs;
use crate::utils::{create_writer, read_fasta, read_layout, write_fasta, LayoutEntry, Result};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// Groups layout entries by tig, in order of first appearance, and attaches
/// each read's sequence.
fn collect_tigs(
    entries: Vec<LayoutEntry>,
    mut seqs: HashMap<String, Vec<u8>>,
) -> Result<Vec<(String, Vec<LayoutRead>)>> {
    let mut tigs: Vec<(String, Vec<LayoutRead>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        let seq = seqs
            .remove(&entry.read)
            .ok_or_else(|| format!("Read {} of tig {} is missing or used twice", entry.read, entry.tig))?;
        let slot = *index.entry(entry.tig.clone()).or_insert_with(|| {
            tigs.push((entry.tig.clone(), Vec::new()));
            tigs.len() - 1
        });
        tigs[slot].1.push(LayoutRead {
            name: entry.read,
            seq,
            bgn: entry.bgn,
            end: entry.end,
        });
    }
    Ok(tigs)
}

fn placement_lines(result: &TigResult) -> Vec<String> {
    result
        .placements
        .iter()
        .map(|p| {
            let strand = if p.reverse { '-' } else { '+' };
            match p.span {
                Some((bgn, end)) => format!("{}\t{}\t{}\t{}\t{}", result.name, p.name, bgn, end, strand),
                None => format!("{}\t{}\t.\t.\t{}\tunplaced", result.name, p.name, strand),
            }
        })
        .collect()
}

pub fn consensus(args: ConsensusArgs) -> Result<()> {
    let params = ConsensusParams {
        error_rate: args.error_rate,
        min_overlap: args.min_overlap,
        slop: args.slop,
    };
    params.validate()?;

    log::info!("Loading reads from {}", args.reads_path.display());
    let seqs: HashMap<String, Vec<u8>> = read_fasta(&args.reads_path)?
        .into_iter()
        .map(|rec| (rec.name, rec.seq))
        .collect();
    let tigs = collect_tigs(read_layout(&args.layout_path)?, seqs)?;
    log::info!("Loaded layout of {} tigs", tigs.len());

    let fasta_path = format!("{}.fa", args.output_prefix);
    let placements_path = format!("{}.placements.tsv", args.output_prefix);
    let mut fasta_writer = create_writer(Some(Path::new(&fasta_path)))?;
    let mut placements_writer = create_writer(Some(Path::new(&placements_path)))?;
    writeln!(placements_writer, "#tig\tread\tbgn\tend\tstrand").map_err(|e| e.to_string())?;

    let line_width = args.line_width;
    let mut num_placed = 0;
    let mut num_reads = 0;
    let count = run_ordered(
        tigs.into_iter().map(Ok),
        args.num_threads,
        |(name, reads)| tig_consensus(&name, reads, &params).map_err(|e| format!("Tig {}: {}", name, e)),
        move |result| {
            let result = result?;
            num_placed += result.num_placed();
            num_reads += result.placements.len();
            log::debug!(
                "{}: {} bp from {} of {} reads",
                result.name,
                result.consensus.len(),
                result.num_placed(),
                result.placements.len()
            );
            write_fasta(&mut fasta_writer, &result.name, &result.consensus, line_width)
                .map_err(|e| e.to_string())?;
            for line in placement_lines(&result) {
                writeln!(placements_writer, "{}", line).map_err(|e| e.to_string())?;
            }
            fasta_writer.flush().map_err(|e| e.to_string())?;
            placements_writer.flush().map_err(|e| e.to_string())?;
            log::trace!("Placed {} of {} reads so far", num_placed, num_reads);
            Ok(())
        },
    )?;
    log::info!("Built consensus for {} tigs", count);
    Ok(())
}
