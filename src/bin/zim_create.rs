//! Builds a ZIM archive from a directory tree: each regular file becomes
//! one item, namespaced and MIME-typed from its immediate parent directory
//! name and extension.

use clap::Parser;
use std::path::{Path, PathBuf};
use zim::namespace::Namespace;
use zim::writer::{Config, Creator};

#[derive(Parser)]
#[command(name = "zim-create", version, about = "Build a ZIM archive from a directory tree")]
struct Args {
    /// Directory to read content from. Each top-level subdirectory name is
    /// used as the single-character namespace for the files beneath it
    /// (e.g. `A/` for articles, `I/` for media).
    input_dir: String,

    /// Path of the ZIM file to write.
    output: String,

    /// Compression codec: "none", "lzma", or "zstd".
    #[arg(long, default_value = "zstd")]
    compression: String,

    /// Path (namespace/path form, e.g. "A/index.html") of the main page.
    #[arg(long)]
    main_path: Option<String>,

    /// Number of worker threads used to close and compress clusters.
    #[arg(long)]
    workers: Option<usize>,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let compression = match args.compression.as_str() {
        "none" => zim::CompressionCode::None,
        "lzma" => zim::CompressionCode::Lzma,
        "zstd" => zim::CompressionCode::Zstd,
        other => {
            eprintln!("unknown compression codec: {other}");
            std::process::exit(1);
        }
    };

    let config = Config {
        compression,
        main_path: args.main_path,
        worker_threads: args.workers.unwrap_or_else(num_cpus::get),
        ..Config::default()
    };

    let mut creator = Creator::new(config).expect("failed to initialize creator");

    let root = PathBuf::from(&args.input_dir);
    let mut files = Vec::new();
    collect_files(&root, &mut files);

    for file in files {
        let Some((namespace, rel_path)) = split_namespace(&root, &file) else {
            continue;
        };
        let data = std::fs::read(&file).expect("failed to read input file");
        let mime_type = guess_mime_type(&file);
        if let Err(e) = creator.add_item(namespace, &rel_path, mime_type, data) {
            log::warn!("skipping {}: {e}", file.display());
        }
    }

    creator.finish(&args.output).expect("failed to write archive");
    println!("Wrote {}", args.output);
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

fn split_namespace(root: &Path, file: &Path) -> Option<(Namespace, String)> {
    let relative = file.strip_prefix(root).ok()?;
    let mut components = relative.components();
    let first = components.next()?.as_os_str().to_str()?;
    let namespace = Namespace(*first.as_bytes().first()?);
    let rest: PathBuf = components.collect();
    Some((namespace, rest.to_string_lossy().replace('\\', "/")))
}

fn guess_mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("gif") => "image/gif",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}
