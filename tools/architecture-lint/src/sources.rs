//! Reading the backend's layered sources from disk.

use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs::Dir;

use crate::{ArchitectureLintError, LintSource};

const LAYER_DIRS: [&str; 3] = ["domain", "inbound", "outbound"];

/// Read every `.rs` file under the layer directories of `src_dir`, sorted
/// by path. Missing layer directories are skipped.
///
/// # Errors
/// [`ArchitectureLintError::Io`] when a directory or file cannot be read and
/// [`ArchitectureLintError::NonUtf8Name`] for entries that are not UTF-8.
pub fn collect_backend_sources(
    src_dir: &Utf8Path,
) -> Result<Vec<LintSource>, ArchitectureLintError> {
    let src = Dir::open_ambient_dir(src_dir, ambient_authority())
        .map_err(ArchitectureLintError::io(src_dir))?;
    let mut sources = Vec::new();
    for layer in LAYER_DIRS {
        let layer_dir = match src.open_dir(layer) {
            Ok(dir) => dir,
            Err(error) if error.kind() == io::ErrorKind::NotFound => continue,
            Err(error) => return Err(ArchitectureLintError::io(&src_dir.join(layer))(error)),
        };
        walk(&layer_dir, Utf8PathBuf::from(layer), src_dir, &mut sources)?;
    }
    sources.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(sources)
}

fn walk(
    dir: &Dir,
    relative: Utf8PathBuf,
    src_dir: &Utf8Path,
    sources: &mut Vec<LintSource>,
) -> Result<(), ArchitectureLintError> {
    let on_disk = src_dir.join(&relative);
    for entry in dir.entries().map_err(ArchitectureLintError::io(&on_disk))? {
        let entry = entry.map_err(ArchitectureLintError::io(&on_disk))?;
        let name = entry.file_name().into_string().map_err(|raw| {
            ArchitectureLintError::NonUtf8Name {
                parent: on_disk.clone(),
                name: raw.to_string_lossy().into_owned(),
            }
        })?;
        let file = relative.join(&name);
        let kind = entry
            .file_type()
            .map_err(ArchitectureLintError::io(&src_dir.join(&file)))?;
        if kind.is_dir() {
            let child = entry
                .open_dir()
                .map_err(ArchitectureLintError::io(&src_dir.join(&file)))?;
            walk(&child, file, src_dir, sources)?;
        } else if name.ends_with(".rs") {
            let contents = dir
                .read_to_string(&name)
                .map_err(ArchitectureLintError::io(&src_dir.join(&file)))?;
            sources.push(LintSource { file, contents });
        }
    }
    Ok(())
}
