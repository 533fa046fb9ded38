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

use std::process::ExitCode;

use clap::Parser as _;
use tracing_subscriber::prelude::*;

use crate::command_error::CommandError;
use crate::command_error::handle_command_result;
use crate::command_error::internal_error_with_message;
use crate::commands::DuplicateArgs;
use crate::ui::Ui;

/// Handle to initialize or change tracing subscription.
#[derive(Clone, Debug)]
pub struct TracingSubscription {
    reload_log_filter: tracing_subscriber::reload::Handle<
        tracing_subscriber::EnvFilter,
        tracing_subscriber::Registry,
    >,
}

impl TracingSubscription {
    const ENV_VAR_NAME: &str = "GIT_DUPLICATE_LOG";

    /// Initializes tracing with the default configuration. This should be
    /// called as early as possible.
    pub fn init() -> Self {
        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(tracing::metadata::LevelFilter::ERROR.into())
            .with_env_var(Self::ENV_VAR_NAME)
            .from_env_lossy();
        let (filter, reload_log_filter) = tracing_subscriber::reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::Layer::default()
                    .with_writer(std::io::stderr)
                    .with_filter(filter),
            )
            .init();
        Self { reload_log_filter }
    }

    pub fn enable_debug_logging(&self) -> Result<(), CommandError> {
        self.reload_log_filter
            .modify(|filter| {
                // Only this tool's crates are whitelisted for DEBUG logging,
                // so other crates' logging doesn't show up by default.
                *filter = tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::metadata::LevelFilter::INFO.into())
                    .with_env_var(Self::ENV_VAR_NAME)
                    .from_env_lossy()
                    .add_directive("git_duplicate_lib=debug".parse().unwrap())
                    .add_directive("git_duplicate_cli=debug".parse().unwrap());
            })
            .map_err(|err| internal_error_with_message("failed to enable debug logging", err))?;
        tracing::info!("debug logging enabled");
        Ok(())
    }
}

pub struct CliRunner {
    tracing_subscription: TracingSubscription,
}

impl CliRunner {
    /// Initializes CliRunner with default state.
    #[must_use]
    pub fn init() -> Self {
        let tracing_subscription = TracingSubscription::init();
        Self {
            tracing_subscription,
        }
    }

    pub fn run(self) -> ExitCode {
        let mut ui = Ui::new();
        let result = self.run_internal(&mut ui);
        handle_command_result(&mut ui, result)
    }

    fn run_internal(&self, ui: &mut Ui) -> Result<(), CommandError> {
        let args = DuplicateArgs::try_parse()?;
        if args.debug {
            self.tracing_subscription.enable_debug_logging()?;
        }
        ui.set_progress_indicator(args.progress_indicator());
        crate::commands::cmd_duplicate(ui, &args)
    }
}
