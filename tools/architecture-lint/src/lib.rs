//! Boundary lint for the busfleet backend.
//!
//! Every file under `backend/src/{domain,inbound,outbound}` is assigned a
//! [`Zone`] from its path, parsed with `syn`, and each path it mentions is
//! resolved against the file's own module path (so `super::` and `self::`
//! land where the compiler would put them). The resolved targets are checked
//! against the rule table in [`rules`].
//!
//! Run it with `cargo run -p architecture-lint [BACKEND_DIR]`.

mod paths;
pub mod rules;
mod sources;

use std::collections::BTreeSet;
use std::fmt;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};

pub use rules::{RULES, Rule, Zone};
pub use sources::collect_backend_sources;

/// A file that breaks one rule, and the module or crate it reached for.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    /// File path relative to `backend/src`.
    pub file: Utf8PathBuf,
    /// Identifier of the broken rule, e.g. `domain-crates`.
    pub rule: &'static str,
    /// `crate::…` module prefix or external crate name that was reached.
    pub target: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = RULES
            .iter()
            .find(|rule| rule.id == self.rule)
            .map_or("", |rule| rule.reason);
        write!(
            f,
            "{}: `{}` breaks {} ({reason})",
            self.file, self.target, self.rule
        )
    }
}

/// Why a lint run did not pass.
#[derive(Debug)]
pub enum ArchitectureLintError {
    /// A directory or file under `backend/src` could not be read.
    Io { path: Utf8PathBuf, source: io::Error },
    /// A directory entry name is not UTF-8.
    NonUtf8Name { parent: Utf8PathBuf, name: String },
    /// The file sits outside every known zone.
    UnknownZone { file: Utf8PathBuf },
    /// `syn` rejected the file.
    Parse { file: Utf8PathBuf, message: String },
    /// At least one rule was broken.
    Violations(Vec<Violation>),
}

impl ArchitectureLintError {
    pub(crate) fn io(path: &Utf8Path) -> impl FnOnce(io::Error) -> Self {
        let path = path.to_path_buf();
        move |source| Self::Io { path, source }
    }
}

impl fmt::Display for ArchitectureLintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "cannot read {path}: {source}"),
            Self::NonUtf8Name { parent, name } => {
                write!(f, "non UTF-8 entry '{name}' under {parent}")
            }
            Self::UnknownZone { file } => write!(
                f,
                "{file} is not under domain/, inbound/{{http,ws}}/ or outbound/{{persistence,channels}}/"
            ),
            Self::Parse { file, message } => write!(f, "cannot parse {file}: {message}"),
            Self::Violations(violations) => {
                writeln!(f, "{} boundary violation(s):", violations.len())?;
                for violation in violations {
                    writeln!(f, "  {violation}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ArchitectureLintError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A Rust source file handed to the lint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintSource {
    /// Path relative to `backend/src`.
    pub file: Utf8PathBuf,
    pub contents: String,
}

impl LintSource {
    pub fn new(file: impl Into<Utf8PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            contents: contents.into(),
        }
    }
}

/// Lint the backend crate rooted at `backend_dir` and return how many files
/// were checked.
///
/// # Errors
/// Any [`ArchitectureLintError`]; rule breaches come back as
/// [`ArchitectureLintError::Violations`].
pub fn lint_backend_sources(backend_dir: &Utf8Path) -> Result<usize, ArchitectureLintError> {
    let sources = collect_backend_sources(&backend_dir.join("src"))?;
    lint_sources(&sources)?;
    Ok(sources.len())
}

/// Lint in-memory sources.
///
/// # Errors
/// As [`lint_backend_sources`], without the I/O cases.
pub fn lint_sources(sources: &[LintSource]) -> Result<(), ArchitectureLintError> {
    let mut violations = BTreeSet::new();
    for source in sources {
        violations.extend(lint_source(source)?);
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ArchitectureLintError::Violations(
            violations.into_iter().collect(),
        ))
    }
}

fn lint_source(source: &LintSource) -> Result<Vec<Violation>, ArchitectureLintError> {
    let zone = Zone::of(&source.file).ok_or_else(|| ArchitectureLintError::UnknownZone {
        file: source.file.clone(),
    })?;
    let parsed = syn::parse_file(&source.contents).map_err(|err| ArchitectureLintError::Parse {
        file: source.file.clone(),
        message: err.to_string(),
    })?;
    let targets = paths::referenced_targets(&source.file, &parsed);
    let applicable: Vec<&Rule> = RULES.iter().filter(|rule| rule.covers(zone)).collect();

    let mut found = Vec::new();
    for target in &targets {
        for rule in &applicable {
            if let Some(reached) = rule.breached_by(target) {
                found.push(Violation {
                    file: source.file.clone(),
                    rule: rule.id,
                    target: reached,
                });
            }
        }
    }
    Ok(found)
}
