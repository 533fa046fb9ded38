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

use std::error;
use std::fmt::Write as _;
use std::io;
use std::io::Write as _;
use std::iter;
use std::process::ExitCode;
use std::sync::Arc;

use git_duplicate_lib::backend::BackendError;
use git_duplicate_lib::duplicate::DuplicateError;
use git_duplicate_lib::verify::ConsistencyError;
use itertools::Itertools as _;
use thiserror::Error;

use crate::ui::Ui;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommandErrorKind {
    User,
    /// Invalid command line. The inner error type may be `clap::Error`.
    Cli,
    BrokenPipe,
    Internal,
}

#[derive(Clone, Debug)]
pub struct CommandError {
    pub kind: CommandErrorKind,
    pub error: Arc<dyn error::Error + Send + Sync>,
    pub hints: Vec<String>,
}

impl CommandError {
    pub fn new(
        kind: CommandErrorKind,
        err: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            kind,
            error: Arc::from(err.into()),
            hints: vec![],
        }
    }

    pub fn with_message(
        kind: CommandErrorKind,
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self::new(kind, ErrorWithMessage::new(message, source))
    }

    /// Returns error with the given `hint` attached.
    pub fn hinted(mut self, hint: impl Into<String>) -> Self {
        self.add_hint(hint);
        self
    }

    /// Appends `hint` to the error.
    pub fn add_hint(&mut self, hint: impl Into<String>) {
        self.hints.push(hint.into());
    }
}

/// Wraps error with an extra message.
#[derive(Debug, Error)]
#[error("{message}")]
struct ErrorWithMessage {
    message: String,
    source: Box<dyn error::Error + Send + Sync>,
}

impl ErrorWithMessage {
    fn new(
        message: impl Into<String>,
        source: impl Into<Box<dyn error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            message: message.into(),
            source: source.into(),
        }
    }
}

pub fn user_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::User, err)
}

pub fn user_error_with_message(
    message: impl Into<String>,
    source: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> CommandError {
    CommandError::with_message(CommandErrorKind::User, message, source)
}

pub fn cli_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Cli, err)
}

pub fn internal_error(err: impl Into<Box<dyn error::Error + Send + Sync>>) -> CommandError {
    CommandError::new(CommandErrorKind::Internal, err)
}

pub fn internal_error_with_message(
    message: impl Into<String>,
    source: impl Into<Box<dyn error::Error + Send + Sync>>,
) -> CommandError {
    CommandError::with_message(CommandErrorKind::Internal, message, source)
}

impl From<io::Error> for CommandError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::BrokenPipe {
            CommandError::new(CommandErrorKind::BrokenPipe, err)
        } else {
            user_error(err)
        }
    }
}

impl From<clap::Error> for CommandError {
    fn from(err: clap::Error) -> Self {
        cli_error(err)
    }
}

impl From<BackendError> for CommandError {
    fn from(err: BackendError) -> Self {
        user_error(err)
    }
}

impl From<DuplicateError> for CommandError {
    fn from(err: DuplicateError) -> Self {
        match err {
            DuplicateError::BaseTreesDiffer { .. } => user_error(err).hinted(
                "The commits can only be duplicated onto a commit whose tree is \
                 identical to the old base's tree.",
            ),
            DuplicateError::EmptyRange { .. } => user_error(err),
            DuplicateError::Backend(err) => user_error(err),
            DuplicateError::Consistency(err) => consistency_error(*err),
        }
    }
}

/// A consistency violation is a defect in this tool, not in the user's
/// input, so the report carries the full picture of both commits.
fn consistency_error(err: ConsistencyError) -> CommandError {
    let mut report = String::new();
    writeln!(
        report,
        "Old commit {} has tree {} and parents [{}].",
        err.old_id,
        err.old_tree,
        err.old_parents.iter().join(", "),
    )
    .unwrap();
    writeln!(
        report,
        "New commit {} has tree {} and parents [{}].",
        err.new_id,
        err.new_tree,
        err.new_parents.iter().join(", "),
    )
    .unwrap();
    for violation in &err.violations {
        writeln!(report, "- {violation}").unwrap();
    }
    report.push_str("This indicates a bug in git-duplicate. Please report it.");
    internal_error(err).hinted(report)
}

const BROKEN_PIPE_EXIT_CODE: u8 = 3;

pub fn handle_command_result(ui: &mut Ui, result: Result<(), CommandError>) -> ExitCode {
    try_handle_command_result(ui, result).unwrap_or_else(|_| ExitCode::from(BROKEN_PIPE_EXIT_CODE))
}

fn try_handle_command_result(
    ui: &mut Ui,
    result: Result<(), CommandError>,
) -> io::Result<ExitCode> {
    let Err(cmd_err) = &result else {
        return Ok(ExitCode::SUCCESS);
    };
    let err = &cmd_err.error;
    let hints = &cmd_err.hints;
    match cmd_err.kind {
        CommandErrorKind::User => {
            print_error(ui, "Error: ", err.as_ref(), hints)?;
            Ok(ExitCode::from(1))
        }
        CommandErrorKind::Cli => {
            if let Some(err) = err.downcast_ref::<clap::Error>() {
                handle_clap_error(ui, err)
            } else {
                print_error(ui, "Error: ", err.as_ref(), hints)?;
                Ok(ExitCode::from(2))
            }
        }
        CommandErrorKind::BrokenPipe => {
            // A broken pipe is not an error, but a signal to exit gracefully.
            Ok(ExitCode::from(BROKEN_PIPE_EXIT_CODE))
        }
        CommandErrorKind::Internal => {
            print_error(ui, "Internal error: ", err.as_ref(), hints)?;
            Ok(ExitCode::from(255))
        }
    }
}

fn handle_clap_error(ui: &mut Ui, err: &clap::Error) -> io::Result<ExitCode> {
    match err.kind() {
        clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
            write!(ui.stdout(), "{err}")?;
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            write!(ui.status(), "{err}")?;
            Ok(ExitCode::from(2))
        }
    }
}

fn print_error(ui: &Ui, heading: &str, err: &dyn error::Error, hints: &[String]) -> io::Result<()> {
    writeln!(ui.status(), "{heading}{err}")?;
    print_error_sources(ui, err.source())?;
    for hint in hints {
        writeln!(ui.status(), "Hint: {hint}")?;
    }
    Ok(())
}

fn print_error_sources(ui: &Ui, source: Option<&dyn error::Error>) -> io::Result<()> {
    let Some(err) = source else {
        return Ok(());
    };
    if err.source().is_none() {
        writeln!(ui.status(), "Caused by: {err}")?;
    } else {
        writeln!(ui.status(), "Caused by:")?;
        for (i, err) in iter::successors(Some(err), |err| err.source()).enumerate() {
            writeln!(ui.status(), "{}: {err}", i + 1)?;
        }
    }
    Ok(())
}
