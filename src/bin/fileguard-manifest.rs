//! # fileguard-manifest - describe files as a JSON manifest
//!
//! Prints one record per regular file (name, MD5 hash, size) as a
//! pretty-printed JSON array. Missing paths are skipped.
//!
//! ## Usage
//! ```bash
//! fileguard-manifest pakchunk0.pak pakchunk1.pak > manifest.json
//! ```

use anyhow::Context;
use clap::Parser;
use colored::*;
use fileguard::manifest::{build_manifest, render_manifest};
use std::path::PathBuf;

/// Compute MD5 hashes and sizes of files and print them as JSON
#[derive(Parser)]
#[command(name = "fileguard-manifest")]
#[command(version)]
#[command(about = "Print a JSON manifest (name, MD5, size) for the given files")]
struct Cli {
    /// Files to describe
    files: Vec<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if cli.files.is_empty() {
        println!("Pass one or more files (e.g. .pak files) to generate a manifest.");
        return;
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let entries = build_manifest(&cli.files).context("failed to hash input files")?;
    let json = render_manifest(&entries).context("failed to render manifest")?;
    println!("{}", json);
    Ok(())
}
