use crate::align::DiffParams;
use crate::utils::Result;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use env_logger::fmt::Color;
use log::{Level, LevelFilter};
use once_cell::sync::Lazy;
use std::{
    io::Write,
    path::{Path, PathBuf},
};

pub static FULL_VERSION: Lazy<String> = Lazy::new(|| env!("CARGO_PKG_VERSION").to_string());

#[derive(Parser)]
#[command(name="tigalign",
          version=&**FULL_VERSION,
          about="Pairwise overlap alignment and multi-read consensus for assembly tigs",
          long_about = None,
          disable_help_subcommand = true,
          help_template = "{name} {version}\n{about-section}\n{usage-heading}\n    {usage}\n\n{all-args}{after-help}",
          )]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = ArgAction::Count, help = "Specify multiple times to increase verbosity level (e.g., -vv for more verbosity)")]
    pub verbosity: u8,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Globally align paired sequences")]
    Align(AlignArgs),
    #[clap(about = "Find the best overlap between paired sequences")]
    Overlap(OverlapArgs),
    #[clap(about = "Build tig consensus sequences from a read layout")]
    Consensus(ConsensusArgs),
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("align")))]
#[command(arg_required_else_help(true))]
pub struct AlignArgs {
    #[clap(required = true)]
    #[clap(short = 'a')]
    #[clap(long = "first")]
    #[clap(help = "FASTA with the first sequence of each pair")]
    #[clap(value_name = "FASTA")]
    #[arg(value_parser = check_file_exists)]
    pub first_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'b')]
    #[clap(long = "second")]
    #[clap(help = "FASTA with the second sequence of each pair")]
    #[clap(value_name = "FASTA")]
    #[arg(value_parser = check_file_exists)]
    pub second_path: PathBuf,

    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(help = "Output TSV path (stdout when omitted)")]
    #[clap(value_name = "TSV")]
    #[arg(value_parser = check_prefix_path)]
    pub output_path: Option<String>,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: usize,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "costs")]
    #[clap(value_name = "COSTS")]
    #[clap(help = "Alignment costs (non-negative values): GAPO,GAPE,MISM")]
    #[clap(default_value = "1,1,1")]
    #[arg(value_parser = costs_from_string)]
    pub costs: DiffParams,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "free-ends")]
    #[clap(help = "Do not charge for gaps at either end of the alignment")]
    pub free_ends: bool,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("overlap")))]
#[command(arg_required_else_help(true))]
pub struct OverlapArgs {
    #[clap(required = true)]
    #[clap(short = 'a')]
    #[clap(long = "first")]
    #[clap(help = "FASTA with the first sequence of each pair")]
    #[clap(value_name = "FASTA")]
    #[arg(value_parser = check_file_exists)]
    pub first_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'b')]
    #[clap(long = "second")]
    #[clap(help = "FASTA with the second sequence of each pair")]
    #[clap(value_name = "FASTA")]
    #[arg(value_parser = check_file_exists)]
    pub second_path: PathBuf,

    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(help = "Output TSV path (stdout when omitted)")]
    #[clap(value_name = "TSV")]
    #[arg(value_parser = check_prefix_path)]
    pub output_path: Option<String>,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: usize,

    #[clap(short = 'e')]
    #[clap(long = "error-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Maximum error rate of an overlap")]
    #[clap(default_value = "0.06")]
    #[arg(value_parser = ensure_unit_float)]
    pub error_rate: f64,

    #[clap(short = 'l')]
    #[clap(long = "min-overlap")]
    #[clap(value_name = "LENGTH")]
    #[clap(help = "Minimum overlap length")]
    #[clap(default_value = "40")]
    pub min_overlap: usize,

    #[clap(help_heading("Advanced"))]
    #[clap(short = 'k')]
    #[clap(long = "mer-size")]
    #[clap(value_name = "K")]
    #[clap(help = "Initial seed k-mer size")]
    #[clap(default_value = "17")]
    pub mer_size: usize,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "min-mer-size")]
    #[clap(value_name = "K")]
    #[clap(help = "Smallest k-mer size tried when no seeds are found")]
    #[clap(default_value = "8")]
    pub min_mer_size: usize,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "merge-contiguous")]
    #[clap(help = "Chain seeds that abut on the same diagonal")]
    pub merge_contiguous: bool,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "partial")]
    #[clap(help = "Report partial overlaps instead of extending to sequence ends")]
    pub partial: bool,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "local-trace")]
    #[clap(help = "Rebuild each overlap as a chain of ungapped pieces and report its spliced trace")]
    pub local_trace: bool,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "min-piece-len")]
    #[clap(value_name = "LENGTH")]
    #[clap(help = "Shortest ungapped block used as a piece with --local-trace")]
    #[clap(default_value = "20")]
    pub min_piece_len: usize,
}

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("consensus")))]
#[command(arg_required_else_help(true))]
pub struct ConsensusArgs {
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reads")]
    #[clap(help = "FASTA with the read sequences")]
    #[clap(value_name = "FASTA")]
    #[arg(value_parser = check_file_exists)]
    pub reads_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'l')]
    #[clap(long = "layout")]
    #[clap(help = "Layout TSV: tig, read, begin, end")]
    #[clap(value_name = "LAYOUT")]
    #[arg(value_parser = check_file_exists)]
    pub layout_path: PathBuf,

    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output-prefix")]
    #[clap(help = "Prefix for output files")]
    #[clap(value_name = "OUTPUT_PREFIX")]
    #[arg(value_parser = check_prefix_path)]
    pub output_prefix: String,

    #[clap(short = 't')]
    #[clap(long = "threads")]
    #[clap(help = "Number of threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    #[arg(value_parser = threads_in_range)]
    pub num_threads: usize,

    #[clap(short = 'e')]
    #[clap(long = "error-rate")]
    #[clap(value_name = "RATE")]
    #[clap(help = "Maximum error rate of a read placement")]
    #[clap(default_value = "0.06")]
    #[arg(value_parser = ensure_unit_float)]
    pub error_rate: f64,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "min-overlap")]
    #[clap(value_name = "LENGTH")]
    #[clap(help = "Minimum aligned length of a read placement")]
    #[clap(default_value = "40")]
    pub min_overlap: usize,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "slop")]
    #[clap(value_name = "LENGTH")]
    #[clap(help = "Least extra consensus aligned to around the expected position")]
    #[clap(default_value = "10")]
    pub slop: usize,

    #[clap(help_heading("Advanced"))]
    #[clap(long = "line-width")]
    #[clap(value_name = "WIDTH")]
    #[clap(help = "Width of FASTA sequence lines")]
    #[clap(default_value = "60")]
    pub line_width: usize,
}

pub fn init_verbose(args: &Cli) {
    let filter_level: LevelFilter = match args.verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            let level = record.level();
            let mut style = buf.style();
            match record.level() {
                Level::Error => style.set_color(Color::Red),
                Level::Warn => style.set_color(Color::Yellow),
                Level::Info => style.set_color(Color::Green),
                Level::Debug => style.set_color(Color::Blue),
                Level::Trace => style.set_color(Color::Cyan),
            };

            writeln!(
                buf,
                "{} [{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                style.value(level),
                record.args()
            )
        })
        .filter_level(filter_level)
        .init();
}

fn check_prefix_path(s: &str) -> Result<String> {
    let path = Path::new(s);
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.as_os_str().is_empty() && !parent_dir.exists() {
            return Err(format!("Path does not exist: {}", parent_dir.display()));
        }
    }
    Ok(s.to_string())
}

fn threads_in_range(s: &str) -> Result<usize> {
    let thread: usize = s
        .parse()
        .map_err(|_| format!("`{}` is not a valid thread number", s))?;
    if thread >= 1 {
        Ok(thread)
    } else {
        Err("Number of threads must be at least 1".into())
    }
}

fn check_file_exists(s: &str) -> Result<PathBuf> {
    let path = Path::new(s);
    if !path.exists() {
        Err(format!("File does not exist: {}", path.display()))
    } else {
        Ok(path.to_path_buf())
    }
}

fn ensure_unit_float(s: &str) -> Result<f64> {
    let value = s
        .parse::<f64>()
        .map_err(|e| format!("Could not parse float: {}", e))?;
    if !(0.0..=1.0).contains(&value) {
        Err(format!(
            "The value must be between 0.0 and 1.0, got: {}",
            value
        ))
    } else {
        Ok(value)
    }
}

fn costs_from_string(s: &str) -> Result<DiffParams> {
    const NUM_EXPECTED_VALUES: usize = 3;
    let values: Vec<i64> = s.split(',').filter_map(|x| x.trim().parse().ok()).collect();
    if values.len() != NUM_EXPECTED_VALUES {
        return Err(format!(
            "Expected {} comma-separated values in costs. Got {} -> {}",
            NUM_EXPECTED_VALUES,
            values.len(),
            s
        ));
    }

    if values.iter().any(|&val| val < 0) {
        return Err(format!("Negative values are not allowed in costs. Got {}.", s));
    }
    if values[1] == 0 {
        return Err(format!("Gap extension cost must be positive. Got {}.", s));
    }

    Ok(DiffParams {
        gap_open: values[0],
        gap_extend: values[1],
        mismatch: values[2],
        ..DiffParams::default()
    })
}
