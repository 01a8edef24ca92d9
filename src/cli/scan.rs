use std::io;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::instrument;

use crate::app::SessionHandler;

use super::Output;
use super::command::parse_duration;
use super::ui::ScanResultView;

const DEFAULT_SCAN_DURATION: Duration = Duration::from_secs(5);

/// Arguments for the `scan` command.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// How long to scan for (e.g. `3s`, `1m`).
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    duration: Duration,
    /// List every advertising peripheral instead of only those matching `--name-prefix`.
    #[arg(long)]
    all: bool,
}

impl Default for ScanArgs {
    fn default() -> Self {
        Self {
            duration: DEFAULT_SCAN_DURATION,
            all: false,
        }
    }
}

impl ScanArgs {
    /// Creates scan arguments for a fixed duration.
    #[must_use]
    pub fn new(duration: Duration, all: bool) -> Self {
        Self { duration, all }
    }
}

/// Executes the `scan` command.
#[instrument(skip(handler, output), level = "info")]
pub(crate) async fn run<W>(
    handler: SessionHandler,
    args: &ScanArgs,
    mut output: Output<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let prefix = if args.all {
        String::new()
    } else {
        handler.options().name_prefix().to_string()
    };
    let devices = handler.scan(&prefix, args.duration).await?;

    let painter = output.painter();
    output.emit(&devices, &ScanResultView::new(&devices, &painter))
}
