//! Generated files on disk.
//!
//! Writing is incremental: a file is only rewritten when its content changed,
//! so build tools watching the output directory see no churn. Object stubs
//! that no longer belong to the catalog are removed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

/// Directory (relative to the output root) holding one module per object.
pub const OBJECTS_DIR: &str = "objects";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> Error + '_ {
    move |source| Error::Io { path: path.to_path_buf(), source }
}

/// Everything generated from one catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StubArtifacts {
    /// One module per qualifier.
    pub objects: BTreeMap<String, String>,
    pub events: String,
    pub runtime: String,
    pub types: String,
    pub index: String,
}

impl StubArtifacts {
    /// Output-relative path and content of every file, in a stable order.
    pub fn files(&self) -> Vec<(PathBuf, &str)> {
        let mut files = vec![
            (PathBuf::from("events.ts"), self.events.as_str()),
            (PathBuf::from("index.ts"), self.index.as_str()),
            (PathBuf::from("runtime.ts"), self.runtime.as_str()),
            (PathBuf::from("types.ts"), self.types.as_str()),
        ];
        for (qualifier, text) in &self.objects {
            files.push((object_path(qualifier), text.as_str()));
        }
        files
    }
}

pub fn object_path(qualifier: &str) -> PathBuf {
    Path::new(OBJECTS_DIR).join(format!("{}.ts", qualifier))
}

/// Outcome of [`write_artifacts`], paths relative to the output root.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub written: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Staleness {
    Missing,
    Outdated,
    /// An object stub with no object behind it.
    Orphaned,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleFile {
    pub path: PathBuf,
    pub staleness: Staleness,
}

fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_error(path)(e)),
    }
}

/// Object stub files present under `out`, relative to `out`.
fn existing_objects(out: &Path) -> Result<Vec<PathBuf>> {
    let dir = out.join(OBJECTS_DIR);
    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(&dir)(e)),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_error(&dir))?;
        let name = entry.file_name();
        if Path::new(&name).extension().is_some_and(|ext| ext == "ts") {
            found.push(Path::new(OBJECTS_DIR).join(name));
        }
    }
    found.sort();
    Ok(found)
}

/// Writes the artifacts under `out`, touching only files that changed.
pub fn write_artifacts(artifacts: &StubArtifacts, out: &Path) -> Result<WriteReport> {
    let mut report = WriteReport::default();
    let files = artifacts.files();

    for (relative, content) in &files {
        let path = out.join(relative);
        if read_if_exists(&path)?.as_deref() == Some(*content) {
            report.unchanged.push(relative.clone());
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::write(&path, content).map_err(io_error(&path))?;
        tracing::debug!(path = %path.display(), "wrote stub");
        report.written.push(relative.clone());
    }

    for relative in existing_objects(out)? {
        if files.iter().any(|(p, _)| *p == relative) {
            continue;
        }
        let path = out.join(&relative);
        fs::remove_file(&path).map_err(io_error(&path))?;
        tracing::debug!(path = %path.display(), "removed orphaned stub");
        report.removed.push(relative);
    }

    Ok(report)
}

/// Lists every file under `out` that differs from the artifacts. Writes nothing.
pub fn check_artifacts(artifacts: &StubArtifacts, out: &Path) -> Result<Vec<StaleFile>> {
    let mut stale = Vec::new();
    let files = artifacts.files();

    for (relative, content) in &files {
        let staleness = match read_if_exists(&out.join(relative))? {
            None => Staleness::Missing,
            Some(existing) if existing != *content => Staleness::Outdated,
            Some(_) => continue,
        };
        stale.push(StaleFile { path: relative.clone(), staleness });
    }

    for relative in existing_objects(out)? {
        if !files.iter().any(|(p, _)| *p == relative) {
            stale.push(StaleFile { path: relative, staleness: Staleness::Orphaned });
        }
    }

    Ok(stale)
}
