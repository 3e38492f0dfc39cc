use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use depot_binstore::{BinaryStore, BinaryStoreConfig, ChainBuilder, ProviderSettings};
use depot_types::{BinaryRecord, Sha1};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.base_dir)?;
    debug!(base_dir = ?config.base_dir, "configuration loaded");
    match cli.command {
        Command::Chain => cmd_chain(&config, cli.format),
        Command::Put(args) => cmd_put(&open(&config)?, args, cli.format),
        Command::Get(args) => cmd_get(&open(&config)?, args),
        Command::Exists(args) => cmd_exists(&open(&config)?, args, cli.format),
        Command::Rm(args) => cmd_rm(&open(&config)?, args, cli.format),
    }
}

/// The configuration file if given, else defaults. Default locations resolve
/// against `--base-dir`, then the file's `base-dir`, then the working
/// directory.
fn load_config(path: Option<&Path>, base_dir: Option<PathBuf>) -> anyhow::Result<BinaryStoreConfig> {
    let mut config = match path {
        Some(path) => BinaryStoreConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => BinaryStoreConfig::default(),
    };
    if let Some(dir) = base_dir {
        config.base_dir = Some(dir);
    }
    if config.base_dir.is_none() {
        config.base_dir = Some(std::env::current_dir()?);
    }
    Ok(config)
}

fn open(config: &BinaryStoreConfig) -> anyhow::Result<BinaryStore> {
    BinaryStore::from_config(config).context("building provider chain")
}

fn parse_sha1(hex: &str) -> anyhow::Result<Sha1> {
    Sha1::from_hex(hex).with_context(|| format!("invalid SHA-1 '{hex}'"))
}

fn cmd_chain(config: &BinaryStoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let plan = ChainBuilder::new(config).resolve()?;
    if format == OutputFormat::Json {
        let providers: Vec<_> = plan
            .providers
            .iter()
            .map(|p| json!({ "id": p.id, "type": p.kind(), "settings": describe(&p.settings) }))
            .collect();
        let out = json!({ "template": plan.template, "chain": plan.kinds(), "providers": providers });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match &plan.template {
        Some(template) => println!("Template: {}", template.yellow()),
        None => println!("Template: {}", "custom".yellow()),
    }
    println!("Chain: {}", plan.to_string().bold());
    for provider in &plan.providers {
        println!(
            "  {} {} {}",
            provider.id.bold(),
            format!("({})", provider.kind()).cyan(),
            describe(&provider.settings).dimmed()
        );
    }
    Ok(())
}

fn describe(settings: &ProviderSettings) -> String {
    match settings {
        ProviderSettings::FileSystem { dir } => format!("dir={}", dir.display()),
        ProviderSettings::CacheFs { dir, max_size } => {
            format!("dir={} max-cache-size={max_size}", dir.display())
        }
        ProviderSettings::Blob { db_path } => format!("db-path={}", db_path.display()),
        ProviderSettings::Retry {
            max_tries,
            interval,
        } => format!("max-tries={max_tries} interval={}ms", interval.as_millis()),
    }
}

fn cmd_put(store: &BinaryStore, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let file = File::open(&args.file).with_context(|| format!("opening {}", args.file.display()))?;
    let reader = BufReader::new(file);
    let record = match &args.sha1 {
        Some(hex) => store.store(&parse_sha1(hex)?, reader)?,
        None => store.ingest(reader)?,
    };
    print_record(&record, format)
}

fn print_record(record: &BinaryRecord, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(record)?),
        OutputFormat::Text => {
            println!("{} Stored {} bytes", "✓".green().bold(), record.length);
            println!("  sha1:   {}", record.sha1.to_string().yellow());
            println!("  md5:    {}", record.md5);
            println!("  sha256: {}", record.sha256);
        }
    }
    Ok(())
}

fn cmd_get(store: &BinaryStore, args: GetArgs) -> anyhow::Result<()> {
    let sha1 = parse_sha1(&args.sha1)?;
    let Some(mut stream) = store.fetch(&sha1)? else {
        bail!("no content stored for {sha1}");
    };
    let copied = match &args.output {
        Some(path) => {
            let mut out = File::create(path).with_context(|| format!("creating {}", path.display()))?;
            io::copy(&mut stream, &mut out)?
        }
        None => {
            let mut out = io::stdout().lock();
            let n = io::copy(&mut stream, &mut out)?;
            out.flush()?;
            n
        }
    };
    if let Some(path) = &args.output {
        eprintln!("{} Wrote {copied} bytes to {}", "✓".green().bold(), path.display());
    }
    Ok(())
}

fn cmd_exists(store: &BinaryStore, args: Sha1Arg, format: OutputFormat) -> anyhow::Result<()> {
    let sha1 = parse_sha1(&args.sha1)?;
    let exists = store.exists(&sha1)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "sha1": sha1, "exists": exists })),
        OutputFormat::Text if exists => println!("{} {sha1}", "stored".green()),
        OutputFormat::Text => println!("{} {sha1}", "missing".red()),
    }
    Ok(())
}

fn cmd_rm(store: &BinaryStore, args: Sha1Arg, format: OutputFormat) -> anyhow::Result<()> {
    let sha1 = parse_sha1(&args.sha1)?;
    let removed = store.remove(&sha1)?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "sha1": sha1, "removed": removed })),
        OutputFormat::Text if removed => println!("{} Removed {sha1}", "✓".green().bold()),
        OutputFormat::Text => println!("Nothing stored for {sha1}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn base_dir_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("depot.toml");
        std::fs::write(&path, "base-dir = \"/from-file\"\n").unwrap();

        let config = load_config(Some(&path), Some("/from-flag".into())).unwrap();
        assert_eq!(config.base_dir, Some(PathBuf::from("/from-flag")));
        let config = load_config(Some(&path), None).unwrap();
        assert_eq!(config.base_dir, Some(PathBuf::from("/from-file")));
    }

    #[test]
    fn missing_config_file_is_reported() {
        let err = load_config(Some(Path::new("/nonexistent/depot.toml")), None).unwrap_err();
        assert!(err.to_string().contains("loading"));
    }

    #[test]
    fn describes_settings() {
        let retry = ProviderSettings::Retry {
            max_tries: 3,
            interval: Duration::from_millis(250),
        };
        assert_eq!(describe(&retry), "max-tries=3 interval=250ms");
    }

    #[test]
    fn put_then_fetch_through_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(None, Some(dir.path().to_path_buf())).unwrap();
        let store = open(&config).unwrap();

        let file = dir.path().join("upload.bin");
        std::fs::write(&file, b"payload").unwrap();
        cmd_put(&store, PutArgs { file, sha1: None }, OutputFormat::Json).unwrap();

        let out = dir.path().join("download.bin");
        let sha1 = depot_crypto::ChecksumCalculator::of_bytes(b"payload").sha1;
        cmd_get(
            &store,
            GetArgs {
                sha1: sha1.to_hex(),
                output: Some(out.clone()),
            },
        )
        .unwrap();
        assert_eq!(std::fs::read(out).unwrap(), b"payload");
    }
}
