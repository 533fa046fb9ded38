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

use std::io::Write;
use std::time::Duration;
use std::time::Instant;

use crossterm::terminal::Clear;
use crossterm::terminal::ClearType;

use crate::ui::OutputGuard;
use crate::ui::ProgressOutput;

pub const UPDATE_HZ: u32 = 30;
pub const INITIAL_DELAY: Duration = Duration::from_millis(250);

/// A transient "Duplicating commits... (m/n)" line. The line is cleared
/// when the progress indicator is dropped.
pub struct DuplicationProgress<W: Write> {
    output: ProgressOutput<W>,
    guard: Option<OutputGuard>,
    next_display_time: Instant,
}

impl<W: Write> DuplicationProgress<W> {
    pub fn new(output: ProgressOutput<W>) -> Self {
        // Don't clutter the output during fast operations.
        let next_display_time = Instant::now() + INITIAL_DELAY;
        Self {
            output,
            guard: None,
            next_display_time,
        }
    }

    pub fn update(&mut self, done: usize, total: usize) {
        let now = Instant::now();
        if now < self.next_display_time {
            return;
        }
        self.next_display_time = now + Duration::from_secs(1) / UPDATE_HZ;

        if self.guard.is_none() {
            self.guard = Some(
                self.output
                    .output_guard(format!("\r{}", Clear(ClearType::CurrentLine))),
            );
        }

        write!(
            self.output,
            "\r{}Duplicating commits... ({done}/{total})",
            Clear(ClearType::CurrentLine),
        )
        .ok();
        self.output.flush().ok();
    }

    #[cfg(test)]
    fn into_output(self) -> ProgressOutput<W> {
        let Self {
            output,
            guard,
            next_display_time: _,
        } = self;
        drop(guard);
        output
    }
}
