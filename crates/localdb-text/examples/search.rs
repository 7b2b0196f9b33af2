use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use localdb_core::config::Settings;
use localdb_core::telemetry::init_tracing;
use localdb_core::traits::NoPreview;
use localdb_text::{drilldown, DesktopIndex, Drilldown};

// Query the desktop index and print results, facets and suggestions.
// Usage:
//   cargo run -p localdb-text --example search -- "your query" \
//     [--index ../dev_data/indexes/desktop] [--limit 10] [--facets] [--similar] \
//     [--drill "extension=txt"]... [--suggest]

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut query = String::new();
    let mut index_dir: Option<PathBuf> = None;
    let mut limit: Option<usize> = None;
    let mut show_facets = false;
    let mut show_similar = false;
    let mut show_suggestions = false;
    let mut drilldown = Drilldown::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--index" => {
                if i + 1 >= args.len() { eprintln!("--index requires a path"); std::process::exit(2); }
                index_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "--limit" => {
                if i + 1 >= args.len() { eprintln!("--limit requires a number"); std::process::exit(2); }
                limit = args[i + 1].parse().ok();
                i += 2; continue;
            }
            "--drill" => {
                if i + 1 >= args.len() { eprintln!("--drill requires a constraint"); std::process::exit(2); }
                drilldown::add_to_map(&args[i + 1], &mut drilldown)?;
                i += 2; continue;
            }
            "--facets" => { show_facets = true; i += 1; continue; }
            "--similar" => { show_similar = true; i += 1; continue; }
            "--suggest" => { show_suggestions = true; i += 1; continue; }
            s if s.starts_with("-") => {
                eprintln!("Unknown flag: {}", s); std::process::exit(2);
            }
            s => {
                if query.is_empty() { query = s.to_string(); }
                i += 1; continue;
            }
        }
    }

    let mut settings = Settings::load()?;
    if let Some(dir) = index_dir {
        settings.index.dir = dir.to_string_lossy().into_owned();
    }
    let mut options = settings.query_options();
    if let Some(limit) = limit {
        options.max_hits = limit.max(1);
    }
    options.show_similar_documents |= show_similar;

    println!("Desktop search\n==============");
    println!("Index: {}", settings.index_dir().display());
    println!("Query: {:?} (limit {})\n", query, options.max_hits);

    let index = DesktopIndex::open(settings, Arc::new(NoPreview))?;

    if show_suggestions {
        for s in index.suggest(&query)? {
            println!("  suggest: {} ({})", s.phrase, s.label);
        }
        println!();
    }

    let result = index.query(&query, "/", "/search", options, &drilldown).await?;
    println!("{} of {} documents in {} ms", result.documents.len(), result.total_indexed_docs, result.elapsed_millis);
    for (i, d) in result.documents.iter().enumerate() {
        println!("{:>2}. score={} path={}\n    snippet: {}", i + 1, d.normalized_score, d.path, d.snippet);
        for dup in &d.duplicate_paths {
            println!("    duplicate: {}", dup);
        }
        for similar in &d.similar_files {
            println!("    similar: {}", similar);
        }
    }

    if show_facets {
        println!("\nFacets:");
        for dim in &result.facet_dimensions {
            println!("  {}", dim.name);
            for f in &dim.facets {
                println!("    {} -> {}  [{}]", f.label, f.count, f.link);
            }
        }
    }

    index.shutdown().await?;
    Ok(())
}
