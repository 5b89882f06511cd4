use std::env;
use std::io;
use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use sced::{parse_command, run};

fn main() -> ExitCode {
    init_tracing();
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}

// Logs go to stderr so command output on stdout stays pipeable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run_cli() -> Result<(), String> {
    let args = env::args().skip(1).collect::<Vec<_>>();
    if args.is_empty() {
        return Err(usage_text());
    }
    if args[0] == "-h" || args[0] == "--help" {
        print_usage();
        return Ok(());
    }

    let (kind, options) = parse_command(&args)?;
    run(kind, options, &mut io::stdout())
}

fn print_usage() {
    println!("{}", usage_text());
}

fn usage_text() -> String {
    [
        "sced - scenario document tools",
        "",
        "Usage:",
        "  sced info <doc.xml> [--json]",
        "  sced validate <doc.xml> [--editor] [--json]",
        "  sced uses <doc.xml> <id> [--json]",
        "  sced rename <doc.xml> <old-id> <new-id> [--editor] [--apply]",
        "  sced rename <doc.xml> --batch <renames.json> [--editor] [--apply]",
        "  sced delete <doc.xml> <id> [--editor] [--apply]",
        "  sced repack <doc.xml> [--editor] [--apply]",
        "",
        "Flags:",
        "  --editor  tolerate unresolved references instead of failing",
        "  --json    machine-readable output where supported",
        "  --apply   write changes back to the document files",
        "",
        "Flags may appear before or after the subcommand.",
    ]
    .join("\n")
}
