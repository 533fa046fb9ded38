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

use std::io::Write as _;

use git_duplicate_lib::backend::Backend as _;
use git_duplicate_lib::backend::CommitId;
use git_duplicate_lib::duplicate::DuplicateOptions;
use git_duplicate_lib::duplicate::duplicate_range;
use git_duplicate_lib::git_backend::GitBackend;
use tracing::instrument;

use crate::command_error::CommandError;
use crate::command_error::user_error_with_message;
use crate::progress::DuplicationProgress;
use crate::ui::Ui;

/// Recreate a range of commits on top of a different base
///
/// All ancestors of TIP that are not ancestors of OLD-BASE are recreated
/// on top of the --onto commit, keeping each original's tree, author, and
/// message, and remapping parent links to the new counterparts. No content
/// merging ever happens: the old base and the onto commit must already
/// have identical trees.
///
/// No branch or tag is created or moved. On success the id of the
/// duplicated tip is printed on stdout.
#[derive(clap::Parser, Clone, Debug)]
#[command(name = "git-duplicate", version)]
pub struct DuplicateArgs {
    /// The commit the duplicated range currently sits on
    #[arg(value_name = "OLD-BASE")]
    pub old_base: String,

    /// The newest commit to duplicate
    #[arg(value_name = "TIP")]
    pub tip: String,

    /// The commit to recreate the range on top of. Its tree must be
    /// identical to OLD-BASE's tree
    #[arg(long, default_value = "HEAD", value_name = "REVISION")]
    pub onto: String,

    /// Copy the committer of each original commit instead of committing as
    /// the current user at the current time
    #[arg(long)]
    pub keep_committer: bool,

    /// Drop parent links that point outside the duplicated range instead
    /// of keeping them
    #[arg(long)]
    pub isolate: bool,

    /// Check every duplicated commit against its original and abort on any
    /// mismatch
    #[arg(long)]
    pub verify: bool,

    /// Print each old -> new commit mapping to stderr
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Show a progress line (default: when stderr is a terminal)
    #[arg(long, overrides_with = "no_progress")]
    pub progress: bool,

    /// Don't show a progress line
    #[arg(long, overrides_with = "progress")]
    pub no_progress: bool,

    /// Enable debug logging
    #[arg(long, hide = true)]
    pub debug: bool,
}

impl DuplicateArgs {
    pub fn progress_indicator(&self) -> Option<bool> {
        match (self.progress, self.no_progress) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            (false, false) => None,
        }
    }
}

#[instrument(skip_all)]
pub fn cmd_duplicate(ui: &mut Ui, args: &DuplicateArgs) -> Result<(), CommandError> {
    let cwd = std::env::current_dir()
        .map_err(|err| user_error_with_message("Failed to get the current directory", err))?;
    let backend = GitBackend::detect(&cwd, "git")
        .map_err(|err| user_error_with_message("Failed to find a git repository", err))?;

    let old_base = backend.resolve(&args.old_base)?;
    let tip = backend.resolve(&args.tip)?;
    let onto = backend.resolve(&args.onto)?;

    let options = DuplicateOptions {
        isolate: args.isolate,
        keep_committer: args.keep_committer,
        verify: args.verify,
    };
    let mut progress = ui.progress_output().map(DuplicationProgress::new);
    let verbose = args.verbose;
    let status = ui.status();
    let mut on_duplicated = |old_id: &CommitId, new_id: &CommitId, done: usize, total: usize| {
        if verbose {
            writeln!(&status, "{old_id} -> {new_id}").ok();
        }
        if let Some(progress) = &mut progress {
            progress.update(done, total);
        }
    };
    let stats = duplicate_range(&backend, &old_base, &tip, &onto, &options, &mut on_duplicated)?;
    // Clear the progress line before the result is printed.
    drop(progress);

    tracing::debug!(
        duplicated = stats.duplicated_commits.len(),
        new_tip = %stats.new_tip,
        "duplication finished"
    );
    writeln!(ui.stdout(), "{}", stats.new_tip)?;
    Ok(())
}
