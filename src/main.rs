mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command, RepoCommand};
use colored::Colorize;
use deltasync::compress::{compress, decompress_auto, Compression};
use deltasync::config::Config;
use deltasync::delta::{
    apply_delta_file, calculate_delta_efficiency, compute_checksums, generate_delta_with, Delta,
    DeltaOptions, MatchPreference, Signature,
};
use deltasync::error::format_bytes;
use deltasync::service::{DeltaSyncService, DeltaUploadRequest};
use deltasync::store::{LocalContentStore, SqliteVersionRepository};
use deltasync::DeltaError;
use serde::Serialize;
use std::io::{Read, Write};
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

type Repository = DeltaSyncService<LocalContentStore, SqliteVersionRepository>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().as_str()));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match &cli.command {
        Command::Signature {
            base,
            output,
            block_size,
        } => cmd_signature(&cli, &config, base, output, *block_size),
        Command::Delta {
            signature,
            new,
            output,
            compress,
            prefer_unused,
        } => cmd_delta(&cli, &config, signature, new, output, *compress, *prefer_unused),
        Command::Patch {
            base,
            delta,
            output,
        } => cmd_patch(&cli, base, delta, output),
        Command::Repo { repo, action } => {
            let root = match repo {
                Some(path) => path.clone(),
                None => config.repository_path()?,
            };
            let service = open_repository(&root, config.clone())?;
            run_repo(&cli, &service, action).await
        }
    }
}

/// Print `value` as JSON in --json mode, else the human summary
fn report<T: Serialize>(cli: &Cli, value: &T, human: impl FnOnce()) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else if !cli.quiet {
        human();
    }
    Ok(())
}

fn cmd_signature(
    cli: &Cli,
    config: &Config,
    base: &Path,
    output: &Path,
    block_size: Option<usize>,
) -> Result<()> {
    let file_size = std::fs::metadata(base)
        .with_context(|| format!("Cannot read {}", base.display()))?
        .len();
    let block_size = block_size.unwrap_or_else(|| config.block_size_for(file_size));

    let signature = compute_checksums(base, block_size)?;
    let json = serde_json::to_vec(&signature)?;
    std::fs::write(output, &json).with_context(|| format!("Cannot write {}", output.display()))?;

    #[derive(Serialize)]
    struct Summary {
        blocks: usize,
        block_size: usize,
        file_size: u64,
    }
    let summary = Summary {
        blocks: signature.block_count(),
        block_size,
        file_size,
    };
    report(cli, &summary, || {
        println!(
            "{} {} blocks of {} ({})",
            "✓ Signature:".green().bold(),
            summary.blocks.to_string().blue(),
            format_bytes(block_size as u64),
            format_bytes(file_size)
        );
    })
}

fn cmd_delta(
    cli: &Cli,
    config: &Config,
    signature_path: &Path,
    new: &Path,
    output: &Path,
    compression: Compression,
    prefer_unused: bool,
) -> Result<()> {
    let raw = std::fs::read(signature_path)
        .with_context(|| format!("Cannot read {}", signature_path.display()))?;
    let signature: Signature = serde_json::from_slice(&decompress_auto(&raw)?)
        .with_context(|| format!("{} is not a signature file", signature_path.display()))?;
    let data = std::fs::read(new).with_context(|| format!("Cannot read {}", new.display()))?;

    let options = DeltaOptions {
        match_preference: if prefer_unused {
            MatchPreference::PreferUnused
        } else {
            config.delta.match_preference
        },
    };
    let delta = generate_delta_with(&signature, &data, &options)?;

    let payload = compress(&serde_json::to_vec(&delta)?, compression)?;
    std::fs::write(output, &payload).with_context(|| format!("Cannot write {}", output.display()))?;

    #[derive(Serialize)]
    struct Summary {
        copies: usize,
        inserts: usize,
        literal_bytes: u64,
        target_size: u64,
        efficiency: f64,
        payload_bytes: usize,
        compression: &'static str,
    }
    let summary = Summary {
        copies: delta.copy_count(),
        inserts: delta.insert_count(),
        literal_bytes: delta.literal_bytes(),
        target_size: delta.target_size,
        efficiency: calculate_delta_efficiency(&delta),
        payload_bytes: payload.len(),
        compression: compression.as_str(),
    };
    report(cli, &summary, || {
        println!("{}", "✓ Delta written".green().bold());
        println!("  Copied blocks:     {}", summary.copies.to_string().blue());
        println!("  Literal bytes:     {}", format_bytes(summary.literal_bytes).yellow());
        println!("  Changed:           {:.1}%", summary.efficiency * 100.0);
        println!(
            "  Payload:           {} ({})",
            format_bytes(summary.payload_bytes as u64).cyan(),
            summary.compression
        );
    })
}

fn cmd_patch(cli: &Cli, base: &Path, delta_path: &Path, output: &Path) -> Result<()> {
    let raw = std::fs::read(delta_path)
        .with_context(|| format!("Cannot read {}", delta_path.display()))?;
    let delta: Delta = serde_json::from_slice(&decompress_auto(&raw)?)
        .with_context(|| format!("{} is not a delta file", delta_path.display()))?;

    let stats = apply_delta_file(base, &delta, output)?;

    #[derive(Serialize)]
    struct Summary {
        operations_count: usize,
        copied_bytes: u64,
        literal_bytes: u64,
    }
    let summary = Summary {
        operations_count: stats.operations_count,
        copied_bytes: stats.copied_bytes,
        literal_bytes: stats.literal_bytes,
    };
    report(cli, &summary, || {
        println!(
            "{} {} ({} reused, {} new)",
            "✓ Patched".green().bold(),
            output.display(),
            format_bytes(stats.copied_bytes).blue(),
            format_bytes(stats.literal_bytes).yellow()
        );
    })
}

fn open_repository(root: &Path, config: Config) -> Result<Repository> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("Cannot create repository at {}", root.display()))?;
    let store = LocalContentStore::new(root.join("objects"));
    let versions = SqliteVersionRepository::open(&root.join(SqliteVersionRepository::DB_FILE))?;
    tracing::debug!("Opened repository at {}", root.display());
    Ok(DeltaSyncService::new(store, versions, config))
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut data = Vec::new();
        std::io::stdin().read_to_end(&mut data)?;
        return Ok(data);
    }
    std::fs::read(path).with_context(|| format!("Cannot read {}", path.display()))
}

async fn run_repo(cli: &Cli, service: &Repository, action: &RepoCommand) -> Result<()> {
    match action {
        RepoCommand::Put { item, file } => {
            let data = read_input(file)?;
            let version = service.upload_full(item, data).await?;
            report(cli, &version, || {
                println!(
                    "{} {} v{} ({})",
                    "✓ Stored".green().bold(),
                    item,
                    version.version,
                    format_bytes(version.size)
                );
            })
        }
        RepoCommand::Signature {
            item,
            block_size,
            output,
        } => {
            let response = service.fetch_signature(item, *block_size).await?;
            let json = serde_json::to_string(&response)?;
            match output {
                Some(path) => std::fs::write(path, json)
                    .with_context(|| format!("Cannot write {}", path.display()))?,
                None => println!("{}", json),
            }
            Ok(())
        }
        RepoCommand::UploadDelta { item, request } => {
            let request: DeltaUploadRequest = serde_json::from_slice(&read_input(request)?)
                .context("Invalid delta upload request")?;
            let response = service.upload_delta(item, request).await?;
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        RepoCommand::Push {
            item,
            file,
            block_size,
        } => push(cli, service, item, file, *block_size).await,
        RepoCommand::Get {
            item,
            output,
            version,
        } => {
            let (record, data) = service.download(item, *version).await?;
            let mut out = std::fs::File::create(output)
                .with_context(|| format!("Cannot create {}", output.display()))?;
            out.write_all(&data)?;
            out.flush()?;
            report(cli, &record, || {
                println!(
                    "{} {} v{} -> {}",
                    "✓ Restored".green().bold(),
                    item,
                    record.version,
                    output.display()
                );
            })
        }
    }
}

/// Client-side flow: fetch signature, diff locally, upload the delta
async fn push(
    cli: &Cli,
    service: &Repository,
    item: &str,
    file: &Path,
    block_size: Option<usize>,
) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("Cannot read {}", file.display()))?;

    let response = match service.fetch_signature(item, block_size).await {
        Ok(response) => response,
        Err(DeltaError::NotFound { .. }) => {
            tracing::info!("{} has no stored version, uploading in full", item);
            let version = service.upload_full(item, data).await?;
            return report(cli, &version, || {
                println!("{} {} v{} (full upload)", "✓ Stored".green().bold(), item, version.version);
            });
        }
        Err(e) => return Err(e.into()),
    };

    let base_version = response.version_number;
    let signature = response.into_signature()?;
    let checksum_type = service.config().repository.checksum;
    let options = DeltaOptions {
        match_preference: service.config().delta.match_preference,
    };

    let (data, delta, checksum) = tokio::task::spawn_blocking(move || {
        let delta = generate_delta_with(&signature, &data, &options)?;
        let checksum = checksum_type.compute(&data).to_hex();
        Ok::<_, DeltaError>((data, delta, checksum))
    })
    .await??;

    let efficiency = calculate_delta_efficiency(&delta);
    let request = DeltaUploadRequest::from_delta(base_version, &delta, checksum);

    match service.upload_delta(item, request).await {
        Ok(result) => report(cli, &result, || {
            println!(
                "{} {} v{} -> v{} ({:.1}% sent as literals)",
                "✓ Delta applied".green().bold(),
                item,
                base_version,
                result.new_version,
                efficiency * 100.0
            );
        }),
        Err(e) if e.is_retryable_with_full_upload() => {
            tracing::warn!("Delta rejected ({}), falling back to full upload", e);
            let version = service.upload_full(item, data).await?;
            report(cli, &version, || {
                println!("{} {} v{} (full upload)", "✓ Stored".green().bold(), item, version.version);
            })
        }
        Err(e) => Err(e.into()),
    }
}
