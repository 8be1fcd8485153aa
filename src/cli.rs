//! Command-line shell for wikit-engine
//!
//! Usage:
//!   wikit-cli list
//!   wikit-cli lookup <dictid> <word> [--json]
//!   wikit-cli complete <dictid> <prefix>
//!   wikit-cli info <dictid>
//!   wikit-cli media <dictid> <key> -o <file>
//!   wikit-cli dump <dictid> -o <file>

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use wikit_engine::{BoundaryError, EngineConfig, MatchKind, QueryService};

#[derive(Parser, Debug)]
#[command(name = "wikit-cli")]
#[command(about = "Look words up in installed wikit dictionaries")]
struct Args {
    /// Dictionary directory, overriding the config file
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Config file to read instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed dictionaries
    List,
    /// Look up a word and print the rendered definition
    Lookup {
        dictid: String,
        word: String,
        /// Print the boundary JSON string instead
        #[arg(long)]
        json: bool,
    },
    /// Complete a headword prefix
    Complete { dictid: String, prefix: String },
    /// Load a dictionary and show its details
    Info { dictid: String },
    /// Write a media resource to a file
    Media {
        dictid: String,
        key: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write a dictionary out as a text source
    Dump {
        dictid: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_config(args: &Args) -> wikit_engine::Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let mut config = EngineConfig::from_path(path)?;
            config.apply_env()?;
            config
        }
        None => EngineConfig::load()?,
    };
    if let Some(dir) = &args.dir {
        config.dict_dir = dir.clone();
    }
    Ok(config)
}

fn fail(err: BoundaryError) -> ! {
    eprintln!("Error ({:?}): {}", err.kind, err.message);
    process::exit(1);
}

fn main() {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    let service = match QueryService::new(&config) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error opening {}: {}", config.dict_dir.display(), e);
            process::exit(1);
        }
    };

    match args.command {
        Command::List => {
            let dicts = service.list_dictionaries();
            if dicts.is_empty() {
                println!("No dictionaries in {}", config.dict_dir.display());
            }
            for dict in dicts {
                println!("{}\t{}", dict.id, dict.name);
            }
        }
        Command::Lookup { dictid, word, json } => {
            if json {
                println!("{}", service.lookup_json(&dictid, &word));
                return;
            }
            let definition = service.lookup(&dictid, &word).unwrap_or_else(|e| fail(e));
            if definition.match_kind == MatchKind::None {
                println!("Word '{}' not found", word);
                return;
            }
            println!("{}", definition.html);
            if !definition.media.is_empty() {
                println!();
                println!("Media:");
                for media in &definition.media {
                    println!("  {:?}: {}", media.kind, media.locator);
                }
            }
        }
        Command::Complete { dictid, prefix } => {
            let words = service.complete(&dictid, &prefix).unwrap_or_else(|e| fail(e));
            println!("Found {} words with prefix '{}':", words.len(), prefix);
            for word in words {
                println!("  {}", word);
            }
        }
        Command::Info { dictid } => {
            let info = service.info(&dictid).unwrap_or_else(|e| fail(e));
            println!("Dictionary Info:");
            println!("  Id: {}", info.id);
            println!("  Name: {}", info.name);
            if let Some(title) = &info.title {
                println!("  Title: {}", title);
            }
            println!("  Format: {}", info.format.as_str());
            println!("  File: {}", info.path.display());
            println!("  Entries: {}", info.entries);
            println!("  Keys: {}", info.keys);
            println!("  Skipped: {}", info.skipped);
            println!("  Parse mode: {}", if info.lazy { "lazy" } else { "eager" });
            match info.media_resources {
                Some(count) => println!("  Media resources: {}", count),
                None => println!("  Media resources: none"),
            }
            println!("  Stylesheet: {}", if info.has_style { "yes" } else { "no" });
        }
        Command::Media { dictid, key, output } => {
            let media = service.media(&dictid, &key).unwrap_or_else(|e| fail(e));
            if let Err(e) = fs::write(&output, &media.data) {
                eprintln!("Error writing {}: {}", output.display(), e);
                process::exit(1);
            }
            println!(
                "Wrote {} ({}, {} bytes) to {}",
                media.key,
                media.mime_type,
                media.data.len(),
                output.display()
            );
        }
        Command::Dump { dictid, output } => {
            let file = match File::create(&output) {
                Ok(file) => file,
                Err(e) => {
                    eprintln!("Error creating {}: {}", output.display(), e);
                    process::exit(1);
                }
            };
            let summary = service
                .export(&dictid, BufWriter::new(file))
                .unwrap_or_else(|e| fail(e));
            println!(
                "Wrote {} entries of {} to {} ({} skipped)",
                summary.written,
                dictid,
                output.display(),
                summary.skipped
            );
        }
    }
}
