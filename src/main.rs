//! findsim command line interface
//!
//! Builds exact cosine k-NN graphs of sparse document matrices, compares
//! matrices and measures the recall of a graph against a reference.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, info};

use findsim::builder::KnnGraphBuilder;
use findsim::error::Result;
use findsim::graph::Algorithm;
use findsim::info::MatrixInfo;
use findsim::io::{detect_format, read_matrix, write_matrix, Format, ReadOptions, WriteOptions};
use findsim::verify::{compare_matrices, verify_knng, VerifyParams};

/// Exact cosine k-nearest-neighbor graphs over sparse vectors
#[derive(Parser, Debug)]
#[command(name = "findsim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v debug and search progress, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ReadArgs {
    /// Input format (csr, clu, ijv); detected when omitted
    #[arg(long)]
    fmt_read: Option<Format>,

    /// Input contains values after each column index
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    read_vals: bool,

    /// Input indices start at 0 instead of 1
    #[arg(long)]
    read_zero_based: bool,
}

impl ReadArgs {
    fn options(&self) -> ReadOptions {
        ReadOptions {
            format: self.fmt_read,
            read_values: self.read_vals,
            one_based: !self.read_zero_based,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct WriteArgs {
    /// Output format (csr, clu, ijv); taken from the file extension when omitted
    #[arg(long)]
    fmt_write: Option<Format>,

    /// Write values after each column index
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    write_vals: bool,

    /// Write 0-based indices
    #[arg(long)]
    write_zero_based: bool,
}

impl WriteArgs {
    fn options(&self, path: &std::path::Path) -> WriteOptions {
        let format = self
            .fmt_write
            .or_else(|| detect_format(path).ok())
            .unwrap_or(Format::Csr);
        WriteOptions {
            format,
            write_values: self.write_vals,
            one_based: !self.write_zero_based,
        }
    }
}

#[derive(Args, Debug, Clone)]
struct SearchArgs {
    /// Document matrix
    input: PathBuf,

    /// Where to write the neighbor graph
    output: Option<PathBuf>,

    /// Number of neighbors per row
    #[arg(short, default_value_t = 10)]
    k: usize,

    /// Minimum similarity
    #[arg(short, long, default_value_t = 0.5)]
    eps: f32,

    #[command(flatten)]
    read: ReadArgs,

    #[command(flatten)]
    write: WriteArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the k-NN graph with IdxJoin
    Ij(SearchArgs),

    /// Build the k-NN graph with the incremental inverted index
    Inv(SearchArgs),

    /// Compare two matrices
    Testeq {
        a: PathBuf,
        b: PathBuf,

        /// Largest accepted difference between two values
        #[arg(long, default_value_t = 1e-4)]
        fldelta: f32,

        #[command(flatten)]
        read: ReadArgs,
    },

    /// Recall of a neighbor graph against a reference graph
    Recall {
        /// Reference (true) neighbor graph
        truth: PathBuf,

        /// Graph to check
        test: PathBuf,

        /// Number of leading true neighbors checked per row
        #[arg(short, default_value_t = 10)]
        k: usize,

        /// 1: score mismatches, 2: misses and ties, 3: extra neighbors
        #[arg(long, default_value_t = 0)]
        report: u8,

        #[command(flatten)]
        read: ReadArgs,
    },

    /// Print matrix dimensions and density
    Info {
        input: PathBuf,

        /// Also print row and column length statistics
        #[arg(long)]
        stats: bool,

        #[command(flatten)]
        read: ReadArgs,
    },

    /// Convert a matrix between formats
    Io {
        input: PathBuf,
        output: PathBuf,

        #[command(flatten)]
        read: ReadArgs,

        #[command(flatten)]
        write: WriteArgs,
    },
}

fn search(args: &SearchArgs, algorithm: Algorithm, verbosity: u8) -> Result<()> {
    let mut docs = read_matrix(&args.input, &args.read.options())?;
    let builder = KnnGraphBuilder::new()
        .with_k(args.k)
        .with_eps(args.eps)
        .with_algorithm(algorithm)
        .with_verbosity(verbosity);

    let start = Instant::now();
    let graph = builder.build(&mut docs)?;
    let elapsed = start.elapsed();

    println!("Num. total candidates: {}", graph.ncands);
    println!("Num. similar pairs: {}", graph.nsims);
    println!("{} search time: {:.4}s", algorithm, elapsed.as_secs_f64());

    if let Some(out) = &args.output {
        write_matrix(&graph.neighbors, out, &args.write.options(out))?;
        info!("wrote neighbor graph to {}", out.display());
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let verbosity = cli.verbose;
    match cli.command {
        Commands::Ij(args) => search(&args, Algorithm::IdxJoin, verbosity),
        Commands::Inv(args) => search(&args, Algorithm::InvertedIndex, verbosity),
        Commands::Testeq { a, b, fldelta, read } => {
            let ma = read_matrix(&a, &read.options())?;
            let mb = read_matrix(&b, &read.options())?;
            let diff = compare_matrices(&ma, &mb, fldelta, true)?;
            println!("{diff}");
            Ok(())
        }
        Commands::Recall { truth, test, k, report, read } => {
            let mt = read_matrix(&truth, &read.options())?;
            let mc = read_matrix(&test, &read.options())?;
            let params = VerifyParams { check_width: k, verbosity: report, ..Default::default() };
            let result = verify_knng(&mc, &mt, &params)?;
            for e in &result.events {
                println!("{e}");
            }
            println!("{result}");
            Ok(())
        }
        Commands::Info { input, stats, read } => {
            let m = read_matrix(&input, &read.options())?;
            println!("{}: {}", input.display(), MatrixInfo::of(&m, stats)?);
            Ok(())
        }
        Commands::Io { input, output, read, write } => {
            let m = read_matrix(&input, &read.options())?;
            let opts = write.options(&output);
            info!(
                "converting {} ({} rows, {} cols, {} nnz) to {}",
                input.display(),
                m.nrows(),
                m.ncols(),
                m.nnz(),
                opts.format.name()
            );
            write_matrix(&m, &output, &opts)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
