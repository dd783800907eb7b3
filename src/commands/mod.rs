pub mod align;
pub mod consensus;
pub mod overlap;

use crate::utils::{FastaReader, FastaRecord, Result};
use crossbeam_channel::bounded;
use itertools::{EitherOrBoth, Itertools};
use rayon::{
    iter::{ParallelBridge, ParallelIterator},
    ThreadPoolBuilder,
};
use std::{collections::BTreeMap, path::Path, thread};

const CHANNEL_BUFFER_SIZE: usize = 2048;

/// Streams records of two FASTA files side by side.
pub fn paired_records(
    first: &Path,
    second: &Path,
) -> Result<impl Iterator<Item = Result<(FastaRecord, FastaRecord)>> + Send + 'static> {
    let first_reader = FastaReader::from_path(first)?;
    let second_reader = FastaReader::from_path(second)?;
    let (first_name, second_name) = (first.display().to_string(), second.display().to_string());

    Ok(first_reader
        .zip_longest(second_reader)
        .map(move |pair| match pair {
            EitherOrBoth::Both(a, b) => Ok((a?, b?)),
            EitherOrBoth::Left(_) => Err(format!("{} has more records than {}", first_name, second_name)),
            EitherOrBoth::Right(_) => Err(format!("{} has more records than {}", second_name, first_name)),
        }))
}

/// Runs `work` over `items` on a thread pool and hands the results to
/// `write` in input order. Reading stops at the first item error.
pub fn run_ordered<I, T, R, F, W>(items: I, num_threads: usize, work: F, mut write: W) -> Result<usize>
where
    I: Iterator<Item = Result<T>> + Send + 'static,
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Sync,
    W: FnMut(R) -> Result<()> + Send + 'static,
{
    let (sender_item, receiver_item) = bounded(CHANNEL_BUFFER_SIZE);
    let reader_thread = thread::spawn(move || -> Result<usize> {
        let mut count = 0;
        for (idx, item) in items.enumerate() {
            if sender_item.send((idx, item?)).is_err() {
                break;
            }
            count += 1;
        }
        Ok(count)
    });

    let (sender_result, receiver_result) = bounded(CHANNEL_BUFFER_SIZE);
    let writer_thread = thread::spawn(move || -> Result<()> {
        let mut pending = BTreeMap::new();
        let mut next_idx = 0;
        for (idx, result) in &receiver_result {
            pending.insert(idx, result);
            while let Some(result) = pending.remove(&next_idx) {
                write(result)?;
                next_idx += 1;
            }
        }
        Ok(())
    });

    log::debug!("Initializing thread pool with {} threads...", num_threads);
    let pool = initialize_thread_pool(num_threads)?;
    pool.install(|| {
        receiver_item
            .into_iter()
            .par_bridge()
            .for_each_with(&sender_result, |s, (idx, item)| {
                if let Err(e) = s.send((idx, work(item))) {
                    log::error!("Failed to send result to writer thread: {}", e);
                }
            });
    });

    // Clean-up
    drop(sender_result);
    let written = writer_thread.join().expect("Writer thread panicked");
    log::trace!("Writer thread finished");
    let count = reader_thread.join().expect("Reader thread panicked")?;
    written?;
    Ok(count)
}

fn initialize_thread_pool(num_threads: usize) -> Result<rayon::ThreadPool> {
    ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .thread_name(|i| format!("tigalign-{}", i))
        .start_handler(|_thread_index| {
            log::trace!("Initialized thread {:?}", std::thread::current().id());
        })
        .build()
        .map_err(|e| format!("Failed to initialize thread pool: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;

    fn fasta_file(records: &[(&str, &str)]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for (name, seq) in records {
            writeln!(file, ">{}\n{}", name, seq).unwrap();
        }
        file
    }

    #[test]
    fn test_paired_records_rejects_uneven_files() {
        let a = fasta_file(&[("a1", "ACGT"), ("a2", "ACGT")]);
        let b = fasta_file(&[("b1", "ACGT")]);
        let pairs: Vec<_> = paired_records(a.path(), b.path()).unwrap().collect();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].is_ok());
        assert!(pairs[1].is_err());
    }

    #[test]
    fn test_run_ordered_keeps_input_order() {
        let items = (0..500u64).map(Ok);
        let out = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&out);
        let count = run_ordered(items, 4, |x| x * x, move |y| {
            sink.lock().unwrap().push(y);
            Ok(())
        })
        .unwrap();
        assert_eq!(count, 500);
        let expected: Vec<u64> = (0..500u64).map(|x| x * x).collect();
        assert_eq!(*out.lock().unwrap(), expected);
    }

    #[test]
    fn test_run_ordered_propagates_reader_error() {
        let items = vec![Ok(1), Err("bad record".to_string()), Ok(3)].into_iter();
        let result = run_ordered(items, 2, |x: i32| x, |_| Ok(()));
        assert_eq!(result, Err("bad record".to_string()));
    }

    #[test]
    fn test_run_ordered_propagates_writer_error() {
        let items = (0..10).map(Ok);
        let result = run_ordered(items, 2, |x: i32| x, |_| Err("disk full".to_string()));
        assert_eq!(result, Err("disk full".to_string()));
    }
}
