//! epub-forge – EPUB → PDF converter.
//!
//! Usage:
//!   epub-forge serve
//!   epub-forge convert <input.epub> [output.pdf] [--html] [--layout <layout.json>]
//!
//! If `output.pdf` is omitted the PDF is written next to the input file with
//! the same stem (e.g. `novel.epub` → `novel.pdf`). `serve` reads `HOST`,
//! `PORT`, `LAYOUT_MODE` and `MAX_UPLOAD_MB` from the environment or `.env`.

use std::{env, fs, path::PathBuf, process};

use epub_forge::config::{ConvertConfig, LayoutMode, ServerConfig};
use epub_forge::observer::LogObserver;
use epub_forge::pipeline::convert_file;
use epub_forge::server;

fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("epub-forge");

    match args.get(1).map(String::as_str) {
        Some("serve") => run_server(),
        Some("convert") => run_convert(prog, &args[2..]),
        Some("--help" | "-h") => print_usage(prog),
        Some(other) => {
            eprintln!("Unknown command: {other}");
            print_usage(prog);
            process::exit(1);
        }
        None => {
            print_usage(prog);
            process::exit(1);
        }
    }
}

fn run_server() {
    let config = ServerConfig::from_env();
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(server::serve(config)) {
        eprintln!("Server error: {e}");
        process::exit(1);
    }
}

fn run_convert(prog: &str, args: &[String]) {
    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut layout_path: Option<PathBuf> = None;
    let mut mode = LayoutMode::Blocks;
    let mut positional = 0usize;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--html" => mode = LayoutMode::Html,
            "--layout" => match iter.next() {
                Some(v) => layout_path = Some(PathBuf::from(v)),
                None => {
                    eprintln!("--layout needs a path");
                    process::exit(1);
                }
            },
            "--help" | "-h" => {
                print_usage(prog);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(prog);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(prog);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no input file specified.");
            print_usage(prog);
            process::exit(1);
        }
    };

    // Default output: same directory + same stem as input, but with .pdf
    let output = output_path.unwrap_or_else(|| input.with_extension("pdf"));

    let config = ConvertConfig {
        mode,
        ..ConvertConfig::default()
    };

    let result = match convert_file(&input, &config, &LogObserver) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error converting '{}': {e}", input.display());
            process::exit(1);
        }
    };

    // Create output directory if necessary.
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent) {
                eprintln!("Error creating output directory: {e}");
                process::exit(1);
            }
        }
    }
    if let Err(e) = fs::write(&output, &result.pdf) {
        eprintln!("Error writing '{}': {e}", output.display());
        process::exit(1);
    }

    if let Some(path) = layout_path {
        let written = result
            .layout
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| fs::write(&path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Error writing layout '{}': {e}", path.display());
            process::exit(1);
        }
    }

    let pages = result.page_count();
    eprintln!(
        "Wrote '{}' ({} bytes, {} chapter{}, {} page{})",
        output.display(),
        result.pdf.len(),
        result.chapters,
        if result.chapters == 1 { "" } else { "s" },
        pages,
        if pages == 1 { "" } else { "s" }
    );
}

fn print_usage(prog: &str) {
    eprintln!("epub-forge – EPUB to PDF converter");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} serve");
    eprintln!("  {prog} convert <input.epub> [output.pdf] [--html] [--layout <layout.json>]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <input.epub>   EPUB file to convert");
    eprintln!("  [output.pdf]   Output path  (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --html         Compose the book as styled HTML instead of fixed blocks");
    eprintln!("  --layout       Also write the page layout as JSON");
    eprintln!("  --help         Print this message");
}
