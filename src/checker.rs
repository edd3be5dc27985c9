//! Byte-for-byte comparison of a finished workdir against expected outputs.

use crate::core::{OutputVerifier, VerifierFactory};
use crate::executor::RuleTestError;
use itertools::Itertools;
use log::debug;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Top-level entries starting with this prefix belong to the runner's own
/// bookkeeping and are never compared.
const RUNNER_STATE_PREFIX: &str = ".snakemake";

/// One difference between the workdir and the expected outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discrepancy {
    /// The file exists on both sides but the content differs.
    Differs {
        path: PathBuf,
        expected_digest: String,
        actual_digest: String,
    },
    /// The run produced a file that is neither an input nor expected.
    Unexpected { path: PathBuf },
    /// An expected file was not produced.
    Missing { path: PathBuf },
    /// The produced file could not be read, e.g. a dangling symlink.
    Unreadable { path: PathBuf, reason: String },
}

impl Discrepancy {
    /// Relative path of the offending artifact.
    pub fn path(&self) -> &Path {
        match self {
            Discrepancy::Differs { path, .. }
            | Discrepancy::Unexpected { path }
            | Discrepancy::Missing { path }
            | Discrepancy::Unreadable { path, .. } => path,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::Differs {
                path,
                expected_digest,
                actual_digest,
            } => write!(
                f,
                "{} differs (expected blake3 {}, got {})",
                path.display(),
                short_digest(expected_digest),
                short_digest(actual_digest)
            ),
            Discrepancy::Unexpected { path } => write!(f, "{} is unexpected", path.display()),
            Discrepancy::Missing { path } => write!(f, "{} is missing", path.display()),
            Discrepancy::Unreadable { path, reason } => {
                write!(f, "{} is unreadable ({})", path.display(), reason)
            }
        }
    }
}

fn short_digest(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}

/// Every discrepancy found by one check, sorted by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub discrepancies: Vec<Discrepancy>,
}

impl Mismatch {
    /// The artifacts that caused the mismatch, in report order.
    pub fn artifacts(&self) -> Vec<&Path> {
        self.discrepancies.iter().map(Discrepancy::path).collect()
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.discrepancies.iter().join("; "))
    }
}

/// Compares the files produced in `workdir` with the files under
/// `expected_path`, ignoring inputs copied from `data_path`.
#[derive(Debug, Clone)]
pub struct OutputChecker {
    data_path: PathBuf,
    expected_path: PathBuf,
    workdir: PathBuf,
}

impl OutputChecker {
    pub fn new(
        data_path: impl Into<PathBuf>,
        expected_path: impl Into<PathBuf>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_path: data_path.into(),
            expected_path: expected_path.into(),
            workdir: workdir.into(),
        }
    }

    /// Walks the workdir and collects every discrepancy. Returns
    /// `OutputMismatch` when there is at least one.
    pub fn check(&self) -> Result<(), RuleTestError> {
        let input_files = relative_files(&self.data_path).map_err(RuleTestError::Checker)?;
        let expected_files =
            relative_files(&self.expected_path).map_err(RuleTestError::Checker)?;
        let produced_files = relative_files(&self.workdir).map_err(RuleTestError::Checker)?;

        let mut discrepancies = Vec::new();
        let mut seen = BTreeSet::new();
        for file in produced_files.iter().filter(|f| !is_runner_state(f)) {
            if expected_files.contains(file) {
                seen.insert(file);
                if let Some(discrepancy) = self.compare(file)? {
                    discrepancies.push(discrepancy);
                }
            } else if !input_files.contains(file) {
                discrepancies.push(Discrepancy::Unexpected { path: file.clone() });
            }
        }
        discrepancies.extend(
            expected_files
                .iter()
                .filter(|f| !seen.contains(f))
                .map(|f| Discrepancy::Missing { path: f.clone() }),
        );

        if discrepancies.is_empty() {
            debug!(
                "Outputs in {} match {}",
                self.workdir.display(),
                self.expected_path.display()
            );
            return Ok(());
        }

        discrepancies.sort_by(|a, b| a.path().cmp(b.path()));
        Err(RuleTestError::OutputMismatch(Mismatch { discrepancies }))
    }

    fn compare(&self, file: &Path) -> Result<Option<Discrepancy>, RuleTestError> {
        let actual = match fs::read(self.workdir.join(file)) {
            Ok(actual) => actual,
            Err(e) => {
                return Ok(Some(Discrepancy::Unreadable {
                    path: file.to_path_buf(),
                    reason: e.to_string(),
                }))
            }
        };
        let expected = fs::read(self.expected_path.join(file)).map_err(RuleTestError::Checker)?;
        if actual == expected {
            return Ok(None);
        }
        Ok(Some(Discrepancy::Differs {
            path: file.to_path_buf(),
            expected_digest: blake3::hash(&expected).to_hex().to_string(),
            actual_digest: blake3::hash(&actual).to_hex().to_string(),
        }))
    }
}

impl OutputVerifier for OutputChecker {
    fn check(&self) -> Result<(), RuleTestError> {
        OutputChecker::check(self)
    }
}

/// Builds an [`OutputChecker`] per run.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputCheckerFactory;

impl VerifierFactory for OutputCheckerFactory {
    fn build(
        &self,
        data_path: &Path,
        expected_path: &Path,
        workdir: &Path,
    ) -> Box<dyn OutputVerifier> {
        Box::new(OutputChecker::new(data_path, expected_path, workdir))
    }
}

fn is_runner_state(path: &Path) -> bool {
    match path.components().next() {
        Some(Component::Normal(first)) => first.to_string_lossy().starts_with(RUNNER_STATE_PREFIX),
        _ => false,
    }
}

/// All non-directory entries below `root`, relative to `root`. Symlinks to
/// directories are followed; dangling symlinks are leaves.
fn relative_files(root: &Path) -> io::Result<BTreeSet<PathBuf>> {
    let mut files = BTreeSet::new();
    collect_files(root, Path::new(""), &mut files)?;
    Ok(files)
}

fn collect_files(root: &Path, relative: &Path, files: &mut BTreeSet<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(root.join(relative))? {
        let entry = entry?;
        let path = relative.join(entry.file_name());
        let is_dir = match fs::metadata(entry.path()) {
            Ok(metadata) => metadata.is_dir(),
            Err(_) if entry.file_type()?.is_symlink() => false,
            Err(e) => return Err(e),
        };
        if is_dir {
            collect_files(root, &path, files)?;
        } else {
            files.insert(path);
        }
    }
    Ok(())
}
