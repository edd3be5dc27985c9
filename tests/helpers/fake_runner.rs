//! A stand-in for the workflow runner executable.
//!
//! The script logs its arguments to `<log dir>/<target basename>.args`,
//! and behaves according to its mode.

use std::fs;
use std::path::{Path, PathBuf};

pub enum Behavior {
    /// Writes the line count of `input.txt` to the target.
    CountLines,
    /// Writes a fixed, wrong count to the target.
    WrongCount,
    /// Prints an error and exits with the given code.
    Fail(i32),
    /// Sleeps far longer than any test timeout.
    Hang,
}

/// Writes an executable fake runner into `dir` and returns its path.
#[cfg(unix)]
pub fn write_fake_runner(dir: &Path, behavior: Behavior) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let log_dir = dir.join("runner-logs");
    fs::create_dir_all(&log_dir).unwrap();

    let action = match behavior {
        Behavior::CountLines => {
            r#"mkdir -p "$(dirname "$workdir/$target")"
wc -l < "$workdir/input.txt" | tr -d ' ' > "$workdir/$target""#
                .to_string()
        }
        Behavior::WrongCount => {
            r#"mkdir -p "$(dirname "$workdir/$target")"
echo 999 > "$workdir/$target""#
                .to_string()
        }
        Behavior::Fail(code) => format!(
            r#"echo "building $target"
echo "MissingRuleException: no rule to produce $target" >&2
exit {code}"#
        ),
        Behavior::Hang => "exec sleep 30".to_string(),
    };

    let script = format!(
        r#"#!/bin/sh
target="$1"
log="{log_dir}/$(basename "$target").args"
echo "$@" > "$log"
workdir=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--directory" ]; then
    workdir="$2"
  fi
  shift
done
echo "$workdir" > "$log.workdir"
mkdir -p "$workdir/.snakemake/log"
echo "run" > "$workdir/.snakemake/log/run.log"
{action}
"#,
        log_dir = log_dir.display(),
    );

    let path = dir.join("fake-snakemake");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// The arguments the fake runner received for `target`, if it ran.
pub fn logged_args(dir: &Path, target: &str) -> Option<String> {
    let name = Path::new(target).file_name()?.to_string_lossy().into_owned();
    fs::read_to_string(dir.join("runner-logs").join(format!("{name}.args")))
        .ok()
        .map(|s| s.trim().to_string())
}

/// The workdir the fake runner was given for `target`, if it ran.
pub fn logged_workdir(dir: &Path, target: &str) -> Option<PathBuf> {
    let name = Path::new(target).file_name()?.to_string_lossy().into_owned();
    fs::read_to_string(dir.join("runner-logs").join(format!("{name}.args.workdir")))
        .ok()
        .map(|s| PathBuf::from(s.trim()))
}
