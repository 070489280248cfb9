use serde::Serialize;
use std::fs;
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::markers::{merge, wrap};
use crate::error::{GenerateError, Result};

/// One file to emit; `content` excludes the generated-region markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Target path
    pub path: PathBuf,
    /// Generated content
    pub content: String,
}

impl Artifact {
    /// Artifact at `path` with `content`
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Files of one kind that land together or not at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactUnit {
    /// Kind the files belong to
    pub kind: String,
    /// API module, controller module and CRD manifest
    pub files: Vec<Artifact>,
}

/// Everything a generation run emits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactSet {
    /// Per-kind units, written first
    pub units: Vec<ArtifactUnit>,
    /// Registry listings and shared modules, written after every unit
    pub registries: Vec<Artifact>,
}

impl ArtifactSet {
    /// Every artifact in write order
    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.units
            .iter()
            .flat_map(|u| u.files.iter())
            .chain(self.registries.iter())
    }
}

/// What a write did (or, on a dry run, would do) to each path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    /// Files that did not exist
    pub created: Vec<PathBuf>,
    /// Files whose generated region changed
    pub updated: Vec<PathBuf>,
    /// Files already up to date
    pub unchanged: Vec<PathBuf>,
    /// User-owned files (no markers) that block the write
    pub conflicts: Vec<PathBuf>,
}

impl WriteReport {
    /// Number of files written or to be written
    pub fn changed(&self) -> usize {
        self.created.len() + self.updated.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Create,
    Update,
    Unchanged,
    Conflict,
}

#[derive(Debug)]
struct Planned {
    path: PathBuf,
    action: Action,
    contents: String,
    previous: Option<String>,
}

/// Marker-preserving, idempotent artifact writer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmissionWriter {
    /// Replace user-owned files that carry no markers
    pub force: bool,
    /// Plan only; touch nothing on disk
    pub dry_run: bool,
}

impl EmissionWriter {
    /// Writer with the given overwrite and dry-run behaviour
    pub fn new(force: bool, dry_run: bool) -> Self {
        Self { force, dry_run }
    }

    /// Write `set`: every kind's unit atomically, then the registries.
    ///
    /// Conflicts are detected for the whole set before the first file is
    /// touched, so a conflicting run writes nothing.
    pub fn write(&self, set: &ArtifactSet) -> Result<WriteReport> {
        let units = set
            .units
            .iter()
            .map(|unit| {
                let files = unit
                    .files
                    .iter()
                    .map(|a| self.plan(a))
                    .collect::<Result<Vec<_>>>()?;
                Ok((unit.kind.as_str(), files))
            })
            .collect::<Result<Vec<_>>>()?;
        let registries = set
            .registries
            .iter()
            .map(|a| self.plan(a))
            .collect::<Result<Vec<_>>>()?;

        let mut report = WriteReport::default();
        for planned in units.iter().flat_map(|(_, f)| f).chain(&registries) {
            let bucket = match planned.action {
                Action::Create => &mut report.created,
                Action::Update => &mut report.updated,
                Action::Unchanged => &mut report.unchanged,
                Action::Conflict => &mut report.conflicts,
            };
            bucket.push(planned.path.clone());
        }

        if self.dry_run {
            for path in &report.conflicts {
                warn!(path = %path.display(), "Would skip user-owned file without generated markers");
            }
            info!(
                created = report.created.len(),
                updated = report.updated.len(),
                unchanged = report.unchanged.len(),
                conflicts = report.conflicts.len(),
                "Dry run, nothing written"
            );
            return Ok(report);
        }

        if let Some(path) = report.conflicts.first() {
            return Err(GenerateError::write(
                path,
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "file exists without generated markers (use --force to overwrite)",
                ),
            ));
        }

        for (kind, files) in &units {
            commit(files).inspect_err(|_| {
                warn!(kind = %kind, "Rolled back unit after write failure");
            })?;
            debug!(kind = %kind, "Unit committed");
        }
        for registry in &registries {
            commit(std::slice::from_ref(registry))?;
        }
        Ok(report)
    }

    fn plan(&self, artifact: &Artifact) -> Result<Planned> {
        let path = artifact.path.clone();
        let previous = match fs::read_to_string(&path) {
            Ok(existing) => Some(existing),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(GenerateError::write(&path, e)),
        };
        let (action, contents) = match &previous {
            None => (Action::Create, wrap(&path, &artifact.content)),
            Some(existing) => match merge(existing, &path, &artifact.content) {
                Some(merged) if &merged == existing => (Action::Unchanged, merged),
                Some(merged) => (Action::Update, merged),
                None if self.force => {
                    warn!(path = %path.display(), "Overwriting unmarked file (--force)");
                    (Action::Update, wrap(&path, &artifact.content))
                }
                None => (Action::Conflict, String::new()),
            },
        };
        Ok(Planned {
            path,
            action,
            contents,
            previous,
        })
    }
}

/// Stage every changed file of a unit, then rename them into place.
///
/// If a rename fails, files already renamed in this unit are restored to
/// their previous contents (or removed if they were new).
fn commit(files: &[Planned]) -> Result<()> {
    let mut staged = Vec::new();
    for planned in files {
        match planned.action {
            Action::Unchanged => {
                debug!(path = %planned.path.display(), "Unchanged, skipping");
                continue;
            }
            Action::Conflict => continue,
            Action::Create | Action::Update => {}
        }
        staged.push((planned, stage(&planned.path, &planned.contents)?));
    }

    let mut done: Vec<&Planned> = Vec::new();
    for (planned, tmp) in staged {
        if let Err(err) = tmp.persist(&planned.path) {
            rollback(&done);
            return Err(GenerateError::write(&planned.path, err.error));
        }
        info!(
            path = %planned.path.display(),
            action = if planned.action == Action::Create { "created" } else { "updated" },
            "Wrote artifact"
        );
        done.push(planned);
    }
    Ok(())
}

fn stage(path: &Path, contents: &str) -> Result<NamedTempFile> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| GenerateError::write(dir, e))?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| GenerateError::write(path, e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|()| tmp.flush())
        .map_err(|e| GenerateError::write(path, e))?;
    Ok(tmp)
}

fn rollback(done: &[&Planned]) {
    for planned in done.iter().rev() {
        let restored = match &planned.previous {
            Some(previous) => fs::write(&planned.path, previous),
            None => fs::remove_file(&planned.path),
        };
        if let Err(e) = restored {
            warn!(path = %planned.path.display(), error = %e, "Rollback failed");
        }
    }
}
