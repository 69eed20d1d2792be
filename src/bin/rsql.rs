//! Command-line launcher (spec.md §6, grounded on
//! `original_source/backend/Launcher.go`'s `main`/`parseMem`): creates or
//! opens a database at a path prefix and starts the TCP server over it.
//!
//! ```text
//! rsql --create PATH | --open PATH [--mem SIZE]
//! ```
//!
//! `SIZE` is an integer followed by `KB`, `MB`, or `GB` (e.g. `64MB`);
//! it bounds the page cache, not the file on disk.

use std::process::ExitCode;

use rsql::config::{DEFAULT_PAGE_CACHE_PAGES, PAGE_SIZE_BYTES, PORT};
use rsql::execution::Engine;
use rsql::{init_log, server};
use tracing::error;

const USAGE: &str = "Usage: rsql --open PATH | --create PATH [--mem SIZE]";

enum Mode {
    Create(String),
    Open(String),
}

fn parse_args() -> Option<(Mode, Option<String>)> {
    let mut args = std::env::args().skip(1);
    let mut mode = None;
    let mut mem = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--create" => mode = Some(Mode::Create(args.next()?)),
            "--open" => mode = Some(Mode::Open(args.next()?)),
            "--mem" => mem = Some(args.next()?),
            _ => return None,
        }
    }
    Some((mode?, mem))
}

/// Parses a `<int>(KB|MB|GB)` memory size into a page count, following
/// `Launcher.go`'s `parseMem`.
fn parse_mem_pages(text: &str) -> Option<usize> {
    if text.len() < 3 {
        return None;
    }
    let (num, unit) = text.split_at(text.len() - 2);
    let count: u64 = num.parse().ok()?;
    let bytes = match unit.to_ascii_uppercase().as_str() {
        "KB" => count * 1024,
        "MB" => count * 1024 * 1024,
        "GB" => count * 1024 * 1024 * 1024,
        _ => return None,
    };
    Some((bytes / PAGE_SIZE_BYTES as u64).max(1) as usize)
}

fn main() -> ExitCode {
    let Some((mode, mem)) = parse_args() else {
        println!("{USAGE}");
        return ExitCode::SUCCESS;
    };

    init_log();

    let max_pages = match mem {
        Some(text) => match parse_mem_pages(&text) {
            Some(pages) => pages,
            None => {
                eprintln!("invalid memory size: {text}");
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_PAGE_CACHE_PAGES,
    };

    let result = match mode {
        Mode::Create(path) => Engine::create(&path, max_pages).map(|_| None),
        Mode::Open(path) => Engine::open(&path, max_pages).map(Some),
    };

    let engine = match result {
        Ok(engine) => engine,
        Err(e) => {
            error!(error = %e, "failed to initialize database");
            return ExitCode::FAILURE;
        }
    };

    let Some(engine) = engine else {
        return ExitCode::SUCCESS;
    };

    {
        let engine = engine.clone();
        let _ = ctrlc::set_handler(move || {
            engine.close();
            std::process::exit(0);
        });
    }

    if let Err(e) = server::serve(engine, PORT) {
        error!(error = %e, "server exited");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
