//! tombstore admin binary
//!
//! Offline inspection and maintenance of tombstore files.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tombstore::header::{self, AnyHeader};
use tombstore::index::{BPlusTree, ExtensibleHash, Index, IndexKind};
use tombstore::{vacuum, Config, RecordStore, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// tombstore admin
#[derive(Parser, Debug)]
#[command(name = "tombstore-admin")]
#[command(about = "Inspect, verify and compact tombstore files")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode and print the header of any tombstore file
    Inspect { file: PathBuf },

    /// Check index invariants, or recount a record store
    Verify { file: PathBuf },

    /// List the physical records of a record store
    Scan {
        file: PathBuf,

        /// Include tombstoned records
        #[arg(short, long)]
        all: bool,
    },

    /// Compact a record store and rebuild its index
    Vacuum {
        file: PathBuf,

        /// Index kind next to the data file: btree or hash
        #[arg(short, long, default_value = "btree")]
        index: IndexKind,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tombstore=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();
    tracing::debug!("tombstore-admin v{}", tombstore::VERSION);

    let outcome = match args.command {
        Command::Inspect { file } => inspect(&file),
        Command::Verify { file } => verify(&file),
        Command::Scan { file, all } => scan(&file, all),
        Command::Vacuum { file, index } => run_vacuum(&file, index),
    };

    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn inspect(file: &Path) -> Result<()> {
    match header::read_any(file)? {
        AnyHeader::RecordStore(h) => {
            println!("kind:          record store");
            println!("version:       {}", h.version);
            println!("next_id:       {}", h.next_id);
            println!("active_count:  {}", h.active_count);
            println!("generation:    {}", h.generation);
        }
        AnyHeader::BPlusTree(h) => {
            println!("kind:          B+ tree");
            println!("version:       {}", h.version);
            println!("root:          {}", h.root);
            println!("order:         {}", h.order);
            println!("height:        {}", h.height);
            println!("total_keys:    {}", h.total_keys);
            println!("source_gen:    {}", h.source_generation);
        }
        AnyHeader::ExtensibleHash(h) => {
            println!("kind:          extensible hash");
            println!("version:       {}", h.version);
            println!("global_depth:  {}", h.global_depth);
            println!("capacity:      {}", h.bucket_capacity);
            println!("directory_at:  {}", h.directory_offset);
            println!("total_keys:    {}", h.total_keys);
            println!("source_gen:    {}", h.source_generation);
        }
    }
    Ok(())
}

/// Settings that match what is already on disk
fn settings_for(file: &Path) -> Result<(AnyHeader, tombstore::IndexSettings)> {
    let header = header::read_any(file)?;
    let mut settings = Config::builder()
        .format_version(header.version())
        .build()
        .index_settings();
    match &header {
        AnyHeader::BPlusTree(h) => settings.btree_order = h.order as usize,
        AnyHeader::ExtensibleHash(h) => {
            settings.hash_bucket_capacity = h.bucket_capacity as usize
        }
        AnyHeader::RecordStore(_) => {}
    }
    Ok((header, settings))
}

fn verify(file: &Path) -> Result<()> {
    let (header, settings) = settings_for(file)?;
    match header {
        AnyHeader::BPlusTree(_) => {
            let stats = BPlusTree::open(file, settings)?.verify()?;
            println!(
                "ok: height {}, {} internal pages, {} leaves, {} keys, fullest leaf {}",
                stats.height,
                stats.internal_pages,
                stats.leaf_pages,
                stats.keys,
                stats.max_leaf_fill
            );
        }
        AnyHeader::ExtensibleHash(_) => {
            let stats = ExtensibleHash::open(file, settings)?.verify()?;
            println!(
                "ok: global depth {}, {} slots, {} buckets, {} keys, max local depth {}",
                stats.global_depth,
                stats.directory_len,
                stats.buckets,
                stats.keys,
                stats.max_local_depth
            );
        }
        AnyHeader::RecordStore(h) => {
            let store = RecordStore::open(file, settings.format_version)?;
            let active = store.recount()?;
            println!("ok: {} active records (header said {})", active, h.active_count);
        }
    }
    Ok(())
}

fn scan(file: &Path, all: bool) -> Result<()> {
    let (_, settings) = settings_for(file)?;
    let store = RecordStore::open(file, settings.format_version)?;
    println!("{:>12}  {:>20}  {:>4}  {:>8}", "offset", "key", "dead", "length");
    for record in store.scan()? {
        let record = record?;
        if record.tombstoned && !all {
            continue;
        }
        println!(
            "{:>12}  {:>20}  {:>4}  {:>8}",
            record.offset,
            record.key,
            if record.tombstoned { "yes" } else { "" },
            record.payload.len()
        );
    }
    Ok(())
}

fn run_vacuum(file: &Path, kind: IndexKind) -> Result<()> {
    let (_, settings) = settings_for(file)?;
    let index_path = kind.index_path(file);
    let settings = if index_path.exists() {
        let (_, index_settings) = settings_for(&index_path)?;
        index_settings
    } else {
        settings
    };

    let mut store = RecordStore::open(file, settings.format_version)?;
    let mut index: Box<dyn Index> = tombstore::open_index(kind, &index_path, settings)?;
    let report = vacuum::vacuum(&mut store, &mut index, settings)?;
    println!(
        "kept {} records, dropped {}, {} -> {} bytes, generation {}",
        report.records_kept,
        report.records_dropped,
        report.bytes_before,
        report.bytes_after,
        report.generation
    );
    Ok(())
}
