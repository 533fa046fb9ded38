// Copyright 2025 The git-duplicate Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A [`Backend`] implementation that drives an external `git` process.

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::Output;
use std::process::Stdio;

use bstr::BString;
use bstr::ByteSlice as _;
use thiserror::Error;

use crate::backend::Backend;
use crate::backend::BackendError;
use crate::backend::BackendResult;
use crate::backend::CommitId;
use crate::backend::CommitMetadata;
use crate::backend::NewCommitMetadata;
use crate::backend::Signature;
use crate::backend::TreeId;
use crate::object_id::ObjectId as _;

/// `git log` format producing author, committer, and raw message separated
/// by NUL bytes. Git forbids NUL in identities and messages, so the split is
/// unambiguous.
const METADATA_FORMAT: &str = "%an%x00%ae%x00%aD%x00%cn%x00%ce%x00%cD%x00%B";

/// Error originating by a git subprocess
#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum GitSubprocessError {
    #[error("Could not find repository at '{0}'")]
    NoSuchRepository(String),
    #[error("Could not execute the git process, found in the OS path '{path}'")]
    SpawnInPath {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Could not execute git process at specified path '{path}'")]
    Spawn {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("Failed to wait for the git process")]
    Wait(std::io::Error),
    #[error("Git process failed: {0}")]
    External(String),
}

/// Commit store backed by an external `git` executable.
///
/// Every operation spawns one `git` plumbing command (`rev-parse`,
/// `rev-list`, `log`, or `commit-tree`) against `git_dir` and blocks until
/// it finishes.
#[derive(Debug)]
pub struct GitBackend {
    git_dir: PathBuf,
    git_executable_path: PathBuf,
}

impl GitBackend {
    /// Opens the repository at `git_dir` without validating it.
    pub fn new(git_dir: impl Into<PathBuf>, git_executable_path: impl Into<PathBuf>) -> Self {
        Self {
            git_dir: git_dir.into(),
            git_executable_path: git_executable_path.into(),
        }
    }

    /// Locates the git directory for the repository containing `workdir` by
    /// asking git itself.
    pub fn detect(
        workdir: &Path,
        git_executable_path: impl Into<PathBuf>,
    ) -> Result<Self, GitSubprocessError> {
        let git_executable_path = git_executable_path.into();
        let mut command = Command::new(&git_executable_path);
        command
            .args(["rev-parse", "--absolute-git-dir"])
            .current_dir(workdir)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let child = spawn_cmd(&git_executable_path, command)?;
        let output = wait_with_output(child)?;
        if !output.status.success() {
            return Err(GitSubprocessError::NoSuchRepository(
                workdir.display().to_string(),
            ));
        }
        let git_dir = chomp(&output.stdout)
            .to_path()
            .map_err(|err| GitSubprocessError::External(format!("git dir is not a path: {err}")))?
            .to_path_buf();
        Ok(Self::new(git_dir, git_executable_path))
    }

    /// Path of the `.git` directory this backend operates on.
    pub fn git_repo_path(&self) -> &Path {
        &self.git_dir
    }

    /// Create the git command
    fn create_command(&self) -> Command {
        let mut git_cmd = Command::new(&self.git_executable_path);
        // Hide console window on Windows (https://stackoverflow.com/a/60958956)
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt as _;
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            git_cmd.creation_flags(CREATE_NO_WINDOW);
        }

        git_cmd
            .arg("--git-dir")
            .arg(&self.git_dir)
            // Disable translation and other locale-dependent behavior so we
            // can parse the output. LC_ALL precedes LC_* and LANG.
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        git_cmd
    }

    /// Spawn the git command
    fn spawn_cmd(&self, git_cmd: Command) -> Result<Child, GitSubprocessError> {
        spawn_cmd(&self.git_executable_path, git_cmd)
    }

    fn run(&self, command: Command) -> Result<Output, GitSubprocessError> {
        wait_with_output(self.spawn_cmd(command)?)
    }

    /// Run a command and parse what it prints on stdout.
    fn run_for_id<T>(
        &self,
        command: Command,
        parse: impl FnOnce(&[u8]) -> Option<T>,
        on_failure: impl FnOnce(GitSubprocessError) -> BackendError,
    ) -> BackendResult<T> {
        let output = self.run(command).map_err(BackendError::other)?;
        if !output.status.success() {
            return Err(on_failure(external_git_error(&output.stderr)));
        }
        parse(&output.stdout).ok_or_else(|| {
            BackendError::other(GitSubprocessError::External(format!(
                "Unexpected git output: {}",
                output.stdout.to_str_lossy()
            )))
        })
    }
}

impl BackendError {
    fn other(err: GitSubprocessError) -> Self {
        Self::Other(err.into())
    }
}

impl Backend for GitBackend {
    fn resolve(&self, name: &str) -> BackendResult<CommitId> {
        let mut command = self.create_command();
        command
            .args(["rev-parse", "--verify"])
            .arg(format!("{name}^{{commit}}"));
        self.run_for_id(command, parse_id_line::<CommitId>, |source| {
            BackendError::RevisionNotFound {
                name: name.to_owned(),
                source: source.into(),
            }
        })
    }

    fn tree_of(&self, id: &CommitId) -> BackendResult<TreeId> {
        let mut command = self.create_command();
        command
            .args(["rev-parse", "--verify"])
            .arg(format!("{}^{{tree}}", id.hex()));
        self.run_for_id(command, parse_id_line::<TreeId>, |source| {
            read_object_error("commit", id.hex(), source)
        })
    }

    fn parents_of(&self, id: &CommitId) -> BackendResult<Vec<CommitId>> {
        let mut command = self.create_command();
        command.args(["rev-list", "-1", "--parents"]).arg(id.hex());
        self.run_for_id(command, parse_parents_line, |source| {
            read_object_error("commit", id.hex(), source)
        })
    }

    fn metadata_of(&self, id: &CommitId) -> BackendResult<CommitMetadata> {
        let mut command = self.create_command();
        command
            .args(["log", "-1"])
            .arg(format!("--format={METADATA_FORMAT}"))
            .arg(id.hex());
        self.run_for_id(command, parse_metadata_output, |source| {
            read_object_error("commit", id.hex(), source)
        })
    }

    fn ancestors_range(
        &self,
        old_base: &CommitId,
        tip: &CommitId,
    ) -> BackendResult<Vec<CommitId>> {
        let mut command = self.create_command();
        command
            .arg("rev-list")
            .arg(format!("{}..{}", old_base.hex(), tip.hex()));
        self.run_for_id(command, parse_rev_list_output, |source| {
            read_object_error("commit", tip.hex(), source)
        })
    }

    fn create_revision(
        &self,
        tree: &TreeId,
        parents: &[CommitId],
        metadata: NewCommitMetadata,
    ) -> BackendResult<CommitId> {
        let mut command = self.create_command();
        command.stdin(Stdio::piped());
        command.arg("commit-tree");
        for parent in parents {
            command.arg("-p").arg(parent.hex());
        }
        command.arg(tree.hex());
        apply_signature_env(&mut command, "GIT_AUTHOR", &metadata.author);
        if let Some(committer) = &metadata.committer {
            apply_signature_env(&mut command, "GIT_COMMITTER", committer);
        }

        let write_error = |source: GitSubprocessError| BackendError::WriteObject {
            object_type: "commit",
            source: source.into(),
        };
        let mut child = self.spawn_cmd(command).map_err(write_error)?;
        let mut stdin = child.stdin.take().expect("stdin should be piped");
        stdin
            .write_all(&metadata.message)
            .and_then(|()| stdin.flush())
            .map_err(|err| write_error(GitSubprocessError::Wait(err)))?;
        drop(stdin);
        let output = wait_with_output(child).map_err(write_error)?;
        if !output.status.success() {
            return Err(write_error(external_git_error(&output.stderr)));
        }
        parse_id_line::<CommitId>(&output.stdout).ok_or_else(|| {
            write_error(GitSubprocessError::External(format!(
                "Unexpected git commit-tree output: {}",
                output.stdout.to_str_lossy()
            )))
        })
    }
}

fn spawn_cmd(
    git_executable_path: &Path,
    mut git_cmd: Command,
) -> Result<Child, GitSubprocessError> {
    tracing::debug!(cmd = ?git_cmd, "spawning a git subprocess");
    git_cmd.spawn().map_err(|error| {
        if git_executable_path.is_absolute() {
            GitSubprocessError::Spawn {
                path: git_executable_path.to_path_buf(),
                error,
            }
        } else {
            GitSubprocessError::SpawnInPath {
                path: git_executable_path.to_path_buf(),
                error,
            }
        }
    })
}

fn wait_with_output(child: Child) -> Result<Output, GitSubprocessError> {
    child.wait_with_output().map_err(GitSubprocessError::Wait)
}

/// Generate a GitSubprocessError::External if the stderr output was not
/// recognizable
fn external_git_error(stderr: &[u8]) -> GitSubprocessError {
    GitSubprocessError::External(format!(
        "External git program failed:\n{}",
        stderr.to_str_lossy()
    ))
}

fn read_object_error(
    object_type: &'static str,
    hash: String,
    source: GitSubprocessError,
) -> BackendError {
    let missing = match &source {
        GitSubprocessError::External(message) => stderr_indicates_missing(message.as_bytes()),
        _ => false,
    };
    if missing {
        BackendError::ObjectNotFound {
            object_type,
            hash,
            source: source.into(),
        }
    } else {
        BackendError::ReadObject {
            object_type,
            hash,
            source: source.into(),
        }
    }
}

/// Whether a failed plumbing command complained about a missing object
/// rather than some environment problem.
///
/// Git reports missing objects on the first `fatal:` line, e.g.
/// `fatal: bad revision 'deadbeef'` or
/// `fatal: Needed a single revision`.
fn stderr_indicates_missing(stderr: &[u8]) -> bool {
    stderr.lines().any(|line| {
        let Some(rest) = line
            .strip_prefix(b"fatal: ")
            .or_else(|| line.strip_prefix(b"error: "))
        else {
            return false;
        };
        [
            &b"unknown revision"[..],
            b"bad revision",
            b"bad object",
            b"Needed a single revision",
            b"not a valid object name",
            b"could not get object info",
        ]
        .iter()
        .any(|pattern| rest.contains_str(pattern))
    })
}

fn apply_signature_env(command: &mut Command, prefix: &str, signature: &Signature) {
    command
        .env(format!("{prefix}_NAME"), &signature.name)
        .env(format!("{prefix}_EMAIL"), &signature.email)
        .env(format!("{prefix}_DATE"), signature.timestamp.to_rfc2822());
}

/// Strips one trailing newline, the way git terminates single-value output.
fn chomp(bytes: &[u8]) -> &[u8] {
    bytes.strip_suffix(b"\n").unwrap_or(bytes)
}

fn parse_id_line<T: TryFromHexBytes>(stdout: &[u8]) -> Option<T> {
    T::try_from_hex_bytes(chomp(stdout))
}

// rev-list --parents prints `<commit> <parent>...` on one line; a root
// commit prints no parents at all.
fn parse_parents_line(stdout: &[u8]) -> Option<Vec<CommitId>> {
    let mut ids = chomp(stdout).split_str(" ");
    let _commit = ids.next()?;
    ids.map(CommitId::try_from_hex).collect()
}

fn parse_rev_list_output(stdout: &[u8]) -> Option<Vec<CommitId>> {
    stdout.lines().map(CommitId::try_from_hex).collect()
}

fn parse_metadata_output(stdout: &[u8]) -> Option<CommitMetadata> {
    let fields: Vec<&[u8]> = stdout.splitn_str(7, b"\0").collect();
    let [an, ae, ad, cn, ce, cd, message] = fields.try_into().ok()?;
    Some(CommitMetadata {
        author: parse_signature(an, ae, ad)?,
        committer: parse_signature(cn, ce, cd)?,
        message: BString::from(message),
    })
}

fn parse_signature(name: &[u8], email: &[u8], date: &[u8]) -> Option<Signature> {
    Some(Signature {
        name: name.to_str().ok()?.to_owned(),
        email: email.to_str().ok()?.to_owned(),
        timestamp: chrono::DateTime::parse_from_rfc2822(date.to_str().ok()?).ok()?,
    })
}

// Allows `parse_id_line` to work for both id types.
trait TryFromHexBytes: Sized {
    fn try_from_hex_bytes(hex: &[u8]) -> Option<Self>;
}

impl TryFromHexBytes for CommitId {
    fn try_from_hex_bytes(hex: &[u8]) -> Option<Self> {
        Self::try_from_hex(hex)
    }
}

impl TryFromHexBytes for TreeId {
    fn try_from_hex_bytes(hex: &[u8]) -> Option<Self> {
        Self::try_from_hex(hex)
    }
}
