use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use localdb_core::config::Settings;
use localdb_core::telemetry::init_tracing;
use localdb_core::traits::NoPreview;
use localdb_core::types::{Content, UpdateCheckResult};
use localdb_text::DesktopIndex;

// Index plain text files into the desktop index.
// Usage:
//   cargo run -p localdb-text --example index -- [--dir ../dev_data/txt] [--index ../dev_data/indexes/desktop]
// Notes:
//   - Files already indexed with the same modification time are skipped.
//   - Defaults resolve relative to the workspace root so you can run from anywhere.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut data_dir: Option<PathBuf> = None;
    let mut index_dir: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => {
                if i + 1 >= args.len() { eprintln!("--dir requires a path"); std::process::exit(2); }
                data_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "--index" => {
                if i + 1 >= args.len() { eprintln!("--index requires a path"); std::process::exit(2); }
                index_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            s if s.starts_with('-') => {
                eprintln!("Unknown flag: {}", s); std::process::exit(2);
            }
            _ => { i += 1; }
        }
    }

    let ws_root = Path::new(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap_or(Path::new("."));
    let data_dir = data_dir
        .or_else(|| env::var("TEXT_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| ws_root.join("dev_data/txt"));

    let mut settings = Settings::load()?;
    if let Some(dir) = index_dir {
        settings.index.dir = dir.to_string_lossy().into_owned();
    }

    println!("Desktop index\n=============");
    println!("Data dir : {}", data_dir.display());
    println!("Index dir: {}", settings.index_dir().display());

    let index = DesktopIndex::open(settings, Arc::new(NoPreview))?;
    index.start();
    index.refresh()?;

    let mut indexed = 0;
    let mut skipped = 0;
    for entry in walkdir::WalkDir::new(&data_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || entry.path().extension().map_or(true, |ext| ext != "txt") {
            continue;
        }
        let path = std::fs::canonicalize(entry.path())?;
        let meta = entry.metadata()?;
        let modified: DateTime<Utc> = meta.modified()?.into();
        if index.check_modified(&path, modified.timestamp_millis())? == UpdateCheckResult::Unmodified {
            skipped += 1;
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else { continue };

        let content = Content::new(&path, text)
            .with_size(meta.len())
            .with_last_modified(modified.timestamp_millis())
            .with_language("en")
            .with_metadata("extension", "txt")
            .with_metadata("last-modified-year", modified.year().to_string())
            .with_metadata("modified", modified.fixed_offset());
        let location = path.parent().map(|p| p.to_string_lossy().into_owned()).unwrap_or_default();
        index.add_or_update(&location, &content)?;
        indexed += 1;
    }

    let removed = index.garbage_collect()?;
    index.shutdown().await?;
    println!("Done. Indexed {} files, {} unchanged, {} stale entries removed.", indexed, skipped, removed);
    Ok(())
}
