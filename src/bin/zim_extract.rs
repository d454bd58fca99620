//! Extracts every item in a ZIM archive to a directory tree, resolving
//! redirects and parallelizing per-entry extraction across a `rayon` pool.

use clap::Parser;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use zim::Archive;

#[derive(Parser)]
#[command(name = "zim-extract", version, about = "Extract a ZIM archive to a directory")]
struct Args {
    /// The ZIM file to extract.
    input: String,

    /// Output directory.
    #[arg(short, long, default_value = "out")]
    out: String,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let archive = Archive::open(&args.input).unwrap_or_else(|e| {
        eprintln!("failed to open {}: {e}", args.input);
        std::process::exit(1);
    });

    let root: PathBuf = PathBuf::from(&args.out);
    fs::create_dir_all(&root).expect("failed to create output directory");

    let entries: Vec<_> = archive
        .iter_by_url()
        .collect::<Result<Vec<_>, _>>()
        .expect("failed to enumerate entries");

    let progress = indicatif::ProgressBar::new(entries.len() as u64);

    entries.par_iter().for_each(|entry| {
        progress.inc(1);
        if entry.is_redirect() {
            return;
        }
        let resolved = match archive.resolve(entry) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("failed to resolve {}: {e}", entry.path());
                return;
            }
        };
        let blob = match archive.blob(&resolved) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("failed to read blob for {}: {e}", entry.path());
                return;
            }
        };
        let data = match blob.data() {
            Ok(d) => d,
            Err(e) => {
                log::warn!("failed to materialize blob for {}: {e}", entry.path());
                return;
            }
        };

        let dst = make_path(&root, entry.namespace().as_char(), entry.path());
        if let Some(parent) = dst.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("failed to create {}: {e}", parent.display());
                return;
            }
        }
        if let Err(e) = fs::write(&dst, &data) {
            log::warn!("failed to write {}: {e}", dst.display());
        }
    });

    progress.finish_with_message("done");

    if let Ok(Some(entry)) = archive.main_entry() {
        println!("Main page is {}", entry.path());
    }
}

fn make_path(root: &Path, namespace: char, path: &str) -> PathBuf {
    let relative = path.trim_start_matches('/');
    root.join(namespace.to_string()).join(relative)
}
