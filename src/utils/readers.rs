use super::Result;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read as ioRead};
use std::path::Path;

pub type InputReader = BufReader<Box<dyn ioRead + Send>>;

pub fn open_input_reader(path: &Path) -> Result<InputReader> {
    fn is_gzipped(path: &Path) -> bool {
        let path_str = path.to_string_lossy().to_lowercase();
        path_str.ends_with(".gz") || path_str.ends_with(".gzip")
    }
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    if is_gzipped(path) {
        let gz_decoder = MultiGzDecoder::new(file);
        if gz_decoder.header().is_some() {
            Ok(BufReader::new(Box::new(gz_decoder)))
        } else {
            Err(format!("Invalid gzip header: {}", path.to_string_lossy()))
        }
    } else {
        Ok(BufReader::new(Box::new(file)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub name: String,
    pub seq: Vec<u8>,
}

/// Streams records from FASTA text; the name is the first word of the header.
pub struct FastaReader<R: BufRead> {
    lines: Lines<R>,
    line_number: usize,
    header: Option<String>,
}

impl FastaReader<InputReader> {
    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(open_input_reader(path)?))
    }
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_number: 0,
            header: None,
        }
    }
}

fn parse_header(line: &str, line_number: usize) -> Result<String> {
    line[1..]
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| format!("Error at FASTA line {}: empty header", line_number))
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut seq = Vec::new();
        for line in self.lines.by_ref() {
            self.line_number += 1;
            let line = match line {
                Ok(line) => line,
                Err(err) => {
                    return Some(Err(format!(
                        "Error at FASTA line {}: {}",
                        self.line_number, err
                    )))
                }
            };
            let line = line.trim_end();
            if line.starts_with('>') {
                let name = match parse_header(line, self.line_number) {
                    Ok(name) => name,
                    Err(e) => return Some(Err(e)),
                };
                if let Some(prev) = self.header.replace(name) {
                    return Some(Ok(FastaRecord { name: prev, seq }));
                }
            } else if !line.is_empty() {
                if self.header.is_none() {
                    return Some(Err(format!(
                        "Error at FASTA line {}: sequence before first header",
                        self.line_number
                    )));
                }
                seq.extend(line.bytes().map(|b| b.to_ascii_uppercase()));
            }
        }
        self.header.take().map(|name| Ok(FastaRecord { name, seq }))
    }
}

pub fn read_fasta(path: &Path) -> Result<Vec<FastaRecord>> {
    FastaReader::from_path(path)?.collect()
}

/// One read of a tig layout: `tig`, `read`, `bgn`, `end`, tab separated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEntry {
    pub tig: String,
    pub read: String,
    pub bgn: i64,
    pub end: i64,
}

impl LayoutEntry {
    fn from_line(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(format!("Expected 4 fields, found {}", fields.len()));
        }
        let parse = |field: &str, what: &str| -> Result<i64> {
            field
                .parse()
                .map_err(|_| format!("Invalid {} coordinate: {}", what, field))
        };
        Ok(Self {
            tig: fields[0].to_string(),
            read: fields[1].to_string(),
            bgn: parse(fields[2], "begin")?,
            end: parse(fields[3], "end")?,
        })
    }
}

pub fn read_layout(path: &Path) -> Result<Vec<LayoutEntry>> {
    let reader = open_input_reader(path)?;
    let mut entries = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("Error at layout line {}: {}", line_number + 1, e))?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let entry = LayoutEntry::from_line(&line)
            .map_err(|e| format!("Error at layout line {}: {}", line_number + 1, e))?;
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    #[test]
    fn test_fasta_reader_multiline_records() {
        let text = ">r1 first read\nACGT\nacg\n\n>r2\nTTTT\n>r3\n";
        let records: Vec<_> = FastaReader::new(Cursor::new(text))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(
            records,
            vec![
                FastaRecord {
                    name: "r1".to_string(),
                    seq: b"ACGTACG".to_vec()
                },
                FastaRecord {
                    name: "r2".to_string(),
                    seq: b"TTTT".to_vec()
                },
                FastaRecord {
                    name: "r3".to_string(),
                    seq: vec![]
                },
            ]
        );
    }

    #[test]
    fn test_fasta_reader_rejects_headerless_sequence() {
        let mut reader = FastaReader::new(Cursor::new("ACGT\n>r1\nA\n"));
        let err = reader.next().unwrap().unwrap_err();
        assert!(err.contains("line 1"), "{}", err);
    }

    #[test]
    fn test_fasta_reader_rejects_empty_header() {
        let mut reader = FastaReader::new(Cursor::new(">\nA\n"));
        assert!(reader.next().unwrap().is_err());
    }

    #[test]
    fn test_read_fasta_gzipped() {
        let file = tempfile::Builder::new().suffix(".fa.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        encoder.write_all(b">r1\nACGT\n>r2\nGG\n").unwrap();
        encoder.finish().unwrap();

        let records = read_fasta(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].seq, b"GG".to_vec());
    }

    #[test]
    fn test_read_fasta_missing_file() {
        assert!(read_fasta(Path::new("/nonexistent/reads.fa")).is_err());
    }

    #[test]
    fn test_read_layout() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# tig\tread\tbgn\tend").unwrap();
        writeln!(file, "tig1\tr1\t0\t150").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "tig1\tr2\t250\t100").unwrap();

        let entries = read_layout(file.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            LayoutEntry {
                tig: "tig1".to_string(),
                read: "r2".to_string(),
                bgn: 250,
                end: 100
            }
        );
    }

    #[test]
    fn test_read_layout_reports_line() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "tig1\tr1\t0\t150").unwrap();
        writeln!(file, "tig1\tr2\tx\t10").unwrap();
        let err = read_layout(file.path()).unwrap_err();
        assert!(err.contains("line 2"), "{}", err);
        assert!(err.contains("begin"), "{}", err);
    }
}
