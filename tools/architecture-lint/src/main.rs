//! `architecture-lint [BACKEND_DIR]`
//!
//! Checks the layer boundaries of the busfleet backend. Without an argument
//! the `backend/` directory of the enclosing workspace is linted.

use std::io::{self, Write};
use std::process::ExitCode;

use camino::{Utf8Path, Utf8PathBuf};

fn main() -> ExitCode {
    let backend_dir = match std::env::args().nth(1) {
        Some(dir) => Utf8PathBuf::from(dir),
        None => match workspace_backend_dir() {
            Some(dir) => dir,
            None => {
                writeln!(
                    io::stderr().lock(),
                    "no backend/Cargo.toml above {}; pass the backend directory",
                    env!("CARGO_MANIFEST_DIR")
                )
                .ok();
                return ExitCode::from(2);
            }
        },
    };

    match architecture_lint::lint_backend_sources(&backend_dir) {
        Ok(checked) => {
            writeln!(
                io::stdout().lock(),
                "{checked} files in {backend_dir} respect the layer boundaries"
            )
            .ok();
            ExitCode::SUCCESS
        }
        Err(error) => {
            write!(io::stderr().lock(), "{error}").ok();
            ExitCode::FAILURE
        }
    }
}

/// Nearest ancestor of this tool's manifest directory holding `backend/`.
fn workspace_backend_dir() -> Option<Utf8PathBuf> {
    Utf8Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .map(|dir| dir.join("backend"))
        .find(|candidate| candidate.join("Cargo.toml").is_file())
}
