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

//! Terminal output channels.
//!
//! The final commit id is the only thing ever written to stdout; status
//! lines, mapping lines, progress, and errors all go to stderr so the
//! stdout stream stays machine-readable.

use std::fmt;
use std::io;
use std::io::IsTerminal as _;
use std::io::Stderr;
use std::io::Write;

#[derive(Debug)]
pub struct Ui {
    progress_indicator: Option<bool>,
}

impl Ui {
    pub fn new() -> Self {
        Self {
            progress_indicator: None,
        }
    }

    /// `Some` forces the progress indicator on or off; `None` means
    /// auto-detect from the terminal.
    pub fn set_progress_indicator(&mut self, choice: Option<bool>) {
        self.progress_indicator = choice;
    }

    fn use_progress_indicator(&self) -> bool {
        self.progress_indicator
            .unwrap_or_else(|| io::stderr().is_terminal())
    }

    pub fn progress_output(&self) -> Option<ProgressOutput<Stderr>> {
        self.use_progress_indicator()
            .then(ProgressOutput::for_stderr)
    }

    /// Stream for the final result line.
    pub fn stdout(&self) -> io::Stdout {
        io::stdout()
    }

    /// Stream for status and diagnostic messages.
    pub fn status(&self) -> Stderr {
        io::stderr()
    }
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct ProgressOutput<W> {
    output: W,
}

impl ProgressOutput<Stderr> {
    pub fn for_stderr() -> Self {
        Self {
            output: io::stderr(),
        }
    }
}

impl<W> ProgressOutput<W> {
    pub fn for_test(output: W) -> Self {
        Self { output }
    }

    pub fn into_inner(self) -> W {
        self.output
    }

    /// Construct a guard object which writes `text` when dropped. Useful
    /// for restoring terminal state.
    pub fn output_guard(&self, text: String) -> OutputGuard {
        OutputGuard {
            text,
            output: io::stderr(),
        }
    }
}

impl<W: Write> ProgressOutput<W> {
    pub fn write_fmt(&mut self, fmt: fmt::Arguments<'_>) -> io::Result<()> {
        self.output.write_fmt(fmt)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

pub struct OutputGuard {
    text: String,
    output: Stderr,
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        self.output.write_all(self.text.as_bytes()).ok();
        self.output.flush().ok();
    }
}
