//! Prints header and summary information about a ZIM archive.

use clap::Parser;
use zim::Archive;

#[derive(Parser)]
#[command(name = "zim-info", version, about = "Inspect a ZIM archive")]
struct Args {
    /// The ZIM file to inspect.
    input: String,

    /// Also recompute and verify the trailing MD5 checksum.
    #[arg(long)]
    verify: bool,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let archive = Archive::open(&args.input).unwrap_or_else(|e| {
        eprintln!("failed to open {}: {e}", args.input);
        std::process::exit(1);
    });

    println!("UUID: {}", archive.uuid());
    println!("Article count: {}", archive.article_count());
    println!("Cluster count: {}", archive.cluster_count());

    match archive.main_entry() {
        Ok(Some(entry)) => println!("Main page: {} (index {})", entry.path(), entry.index),
        Ok(None) => println!("Main page: -"),
        Err(e) => println!("Main page: error ({e})"),
    }

    if args.verify {
        match archive.verify_checksum() {
            Ok(true) => println!("Checksum: ok"),
            Ok(false) => println!("Checksum: not present"),
            Err(e) => println!("Checksum: error ({e})"),
        }
    }
}
