use crate::utils::Result;
use flate2::{write::GzEncoder, Compression};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

pub type OutputWriter = BufWriter<Box<dyn Write + Send>>;

/// Opens `path` for writing, gzip compressed when it ends in `.gz`; `None`
/// or `-` writes to stdout.
pub fn create_writer(path: Option<&Path>) -> Result<OutputWriter> {
    let path = match path {
        Some(path) if path.as_os_str() != "-" => path,
        _ => return Ok(BufWriter::new(Box::new(io::stdout()))),
    };
    let file = File::create(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    if path.to_string_lossy().to_lowercase().ends_with(".gz") {
        Ok(BufWriter::new(Box::new(GzEncoder::new(file, Compression::default()))))
    } else {
        Ok(BufWriter::new(Box::new(file)))
    }
}

/// Writes a FASTA record with fixed-width sequence lines.
pub fn write_fasta<W: Write>(out: &mut W, name: &str, seq: &[u8], width: usize) -> io::Result<()> {
    writeln!(out, ">{}", name)?;
    for line in seq.chunks(width.max(1)) {
        out.write_all(line)?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::read_fasta;

    #[test]
    fn test_write_fasta_wraps_lines() {
        let mut out = Vec::new();
        write_fasta(&mut out, "tig1", b"ACGTACGTAC", 4).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), ">tig1\nACGT\nACGT\nAC\n");
    }

    #[test]
    fn test_create_writer_gzip_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.fa.gz");
        {
            let mut writer = create_writer(Some(&path)).unwrap();
            write_fasta(&mut writer, "r1", b"ACGT", 60).unwrap();
            writer.flush().unwrap();
        }
        let records = read_fasta(&path).unwrap();
        assert_eq!(records[0].seq, b"ACGT".to_vec());
    }

    #[test]
    fn test_create_writer_missing_dir() {
        assert!(create_writer(Some(Path::new("/nonexistent/dir/out.tsv"))).is_err());
    }
}
