use clap::{Parser, Subcommand};
use deltasync::compress::Compression;
use std::path::PathBuf;

pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim().to_uppercase();

    // Try to extract number and unit
    let (num_str, unit) = if let Some(pos) = s.find(|c: char| c.is_alphabetic()) {
        (&s[..pos], &s[pos..])
    } else {
        // No unit, assume bytes
        return s.parse::<u64>().map_err(|e| format!("Invalid size: {}", e));
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|e| format!("Invalid number '{}': {}", num_str, e))?;

    let multiplier: u64 = match unit.trim() {
        "B" => 1,
        "KB" | "K" => 1024,
        "MB" | "M" => 1024 * 1024,
        _ => return Err(format!("Unknown unit '{}'. Use B, KB or MB", unit)),
    };

    Ok((num * multiplier as f64) as u64)
}

fn parse_block_size(s: &str) -> Result<usize, String> {
    let size = parse_size(s)?;
    if size == 0 {
        return Err("Block size must be positive".to_string());
    }
    usize::try_from(size).map_err(|_| format!("Block size too large: {}", size))
}

#[derive(Parser, Debug)]
#[command(name = "deltasync")]
#[command(about = "Block-level delta synchronization", long_about = None)]
#[command(version)]
#[command(after_help = "EXAMPLES:
    # rdiff-style workflow on local files
    deltasync signature old.bin old.sig --block-size 4K
    deltasync delta old.sig new.bin new.delta --compress zstd
    deltasync patch old.bin new.delta rebuilt.bin

    # Versioned repository
    deltasync repo put report ./report.pdf
    deltasync repo push report ./report-edited.pdf
    deltasync repo get report ./restored.pdf --version 1")]
pub struct Cli {
    /// Verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Machine-readable JSON output
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (default: <config dir>/deltasync/config.toml)
    #[arg(long, global = true, env = "DELTASYNC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the block signature of a base file as JSON
    Signature {
        base: PathBuf,
        output: PathBuf,
        /// Block size (e.g. 2048, 4K); default derives from file size
        #[arg(long, value_parser = parse_block_size)]
        block_size: Option<usize>,
    },
    /// Diff a new file against a signature and write the delta
    Delta {
        signature: PathBuf,
        new: PathBuf,
        output: PathBuf,
        /// Delta payload compression: none, lz4 or zstd
        #[arg(long, default_value = "none")]
        compress: Compression,
        /// Reference not-yet-used base blocks first when content repeats
        #[arg(long)]
        prefer_unused: bool,
    },
    /// Rebuild a file from its base and a delta
    Patch {
        base: PathBuf,
        delta: PathBuf,
        output: PathBuf,
    },
    /// Work with a versioned local repository
    Repo {
        /// Repository directory (default: configured path)
        #[arg(long)]
        repo: Option<PathBuf>,
        #[command(subcommand)]
        action: RepoCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Store a whole file as the next version
    Put { item: String, file: PathBuf },
    /// Print the signature of the latest version (JSON)
    Signature {
        item: String,
        #[arg(long, value_parser = parse_block_size)]
        block_size: Option<usize>,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Apply a delta upload request (JSON file, "-" for stdin)
    UploadDelta { item: String, request: PathBuf },
    /// Upload a file by delta, falling back to a full upload
    Push {
        item: String,
        file: PathBuf,
        #[arg(long, value_parser = parse_block_size)]
        block_size: Option<usize>,
    },
    /// Write a stored version to a file
    Get {
        item: String,
        output: PathBuf,
        /// Version number (default: latest)
        #[arg(long)]
        version: Option<u64>,
    },
}

impl Cli {
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet || self.json {
            return tracing::Level::ERROR;
        }

        match self.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}
