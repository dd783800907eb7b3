mod io_utils;
mod readers;
mod revcomp;
mod util;

pub use io_utils::{create_writer, write_fasta, OutputWriter};
pub use readers::{
    open_input_reader, read_fasta, read_layout, FastaReader, FastaRecord, InputReader, LayoutEntry,
};
pub use revcomp::reverse_complement;
pub use util::{handle_error_and_exit, Result};
