//! Stem separation.
//!
//! Isolating the guitar before pitch tracking keeps bass and drums out of
//! the frame-level pitch track. Separation is delegated to the `demucs`
//! command-line tool, run as a subprocess that writes one WAV per stem into
//! a scratch directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;

use crate::error::{TabError, TabResult};

/// Model used when none is configured.
pub const DEFAULT_MODEL: &str = "htdemucs";

/// Environment variable pointing at a `demucs` executable.
pub const DEMUCS_PATH_ENV: &str = "DEMUCS_PATH";

/// Separated stems, keyed by stem name.
///
/// When the stems live in a scratch directory, `Stems` owns it and the files
/// are removed when it is dropped.
#[derive(Debug, Default)]
pub struct Stems {
    paths: BTreeMap<String, PathBuf>,
    _workdir: Option<TempDir>,
}

impl Stems {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Stems that already exist on disk and are not owned.
    pub fn from_paths(paths: BTreeMap<String, PathBuf>) -> Self {
        Self {
            paths,
            _workdir: None,
        }
    }

    fn owned(paths: BTreeMap<String, PathBuf>, workdir: TempDir) -> Self {
        Self {
            paths,
            _workdir: Some(workdir),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// The first stem in `preferred` order that was produced.
    pub fn pick<S: AsRef<str>>(&self, preferred: &[S]) -> Option<(&str, &Path)> {
        preferred.iter().find_map(|name| {
            self.paths
                .get_key_value(name.as_ref())
                .map(|(k, v)| (k.as_str(), v.as_path()))
        })
    }
}

/// Splits a mixed recording into stems.
pub trait StemSeparator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    fn separate(&self, path: &Path) -> TabResult<Stems>;
}

/// Leaves the mix alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSeparation;

impl StemSeparator for NoSeparation {
    fn name(&self) -> &str {
        "none"
    }

    fn separate(&self, _path: &Path) -> TabResult<Stems> {
        Ok(Stems::empty())
    }
}

/// Runs `demucs -n <model> -o <scratch> <input>`.
#[derive(Debug, Clone)]
pub struct DemucsSeparator {
    pub model: String,
    /// Explicit executable; when set it must exist.
    pub executable: Option<PathBuf>,
}

impl Default for DemucsSeparator {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            executable: None,
        }
    }
}

impl DemucsSeparator {
    pub fn new(model: impl Into<String>, executable: Option<PathBuf>) -> Self {
        Self {
            model: model.into(),
            executable,
        }
    }

    /// Finds the `demucs` executable: configured path, then
    /// `$DEMUCS_PATH`, then `PATH`.
    pub fn find_executable(&self) -> TabResult<PathBuf> {
        if let Some(ref path) = self.executable {
            if path.exists() {
                return Ok(path.clone());
            }
            return Err(TabError::separation(format!(
                "configured demucs executable does not exist: {}",
                path.display()
            )));
        }

        if let Ok(path) = std::env::var(DEMUCS_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Ok(path);
            }
            log::warn!(
                "[SEPARATION] {} points at a missing file: {}",
                DEMUCS_PATH_ENV,
                path.display()
            );
        }

        let names = if cfg!(windows) {
            vec!["demucs.exe", "demucs"]
        } else {
            vec!["demucs"]
        };
        for name in names {
            if let Ok(path) = which::which(name) {
                return Ok(path);
            }
        }

        Err(TabError::separation(
            "demucs executable not found; install demucs or set DEMUCS_PATH",
        ))
    }
}

impl StemSeparator for DemucsSeparator {
    fn name(&self) -> &str {
        "demucs"
    }

    fn separate(&self, path: &Path) -> TabResult<Stems> {
        if !path.exists() {
            return Err(TabError::AudioNotFound {
                path: path.to_path_buf(),
            });
        }
        let executable = self.find_executable()?;
        let workdir = tempfile::Builder::new().prefix("demucs_").tempdir()?;

        log::info!(
            "[SEPARATION] Separating {} with model {}",
            path.display(),
            self.model
        );
        let output = Command::new(&executable)
            .arg("-n")
            .arg(&self.model)
            .arg("-o")
            .arg(workdir.path())
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                TabError::separation(format!("failed to run {}: {}", executable.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|l| !l.trim().is_empty());
            return Err(TabError::separation(format!(
                "demucs exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                last_line.unwrap_or("no output")
            )));
        }

        let track = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let paths = collect_stems(workdir.path(), &self.model, &track)?;
        log::info!(
            "[SEPARATION] Produced stems: {}",
            paths.keys().cloned().collect::<Vec<_>>().join(", ")
        );
        Ok(Stems::owned(paths, workdir))
    }
}

/// Reads `<out_dir>/<model>/<track>/*.wav` into a stem map.
fn collect_stems(out_dir: &Path, model: &str, track: &str) -> TabResult<BTreeMap<String, PathBuf>> {
    let stem_dir = out_dir.join(model).join(track);
    if !stem_dir.is_dir() {
        return Err(TabError::separation(format!(
            "demucs produced no output in {}",
            stem_dir.display()
        )));
    }

    let mut paths = BTreeMap::new();
    for entry in std::fs::read_dir(&stem_dir)? {
        let path = entry?.path();
        let is_wav = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
        if !is_wav {
            continue;
        }
        if let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) {
            paths.insert(name, path);
        }
    }

    if paths.is_empty() {
        return Err(TabError::separation(format!(
            "no stems found in {}",
            stem_dir.display()
        )));
    }
    Ok(paths)
}
