use std::io;

use anyhow::Result;
use clap::{Args, ValueEnum};
use serde::Serialize;
use tracing::instrument;

use crate::app::{SessionHandler, callback_channel};
use crate::error::InteractionError;
use crate::hw::PeripheralId;

use super::Output;
use super::ui::LedReportView;

/// Requested LED state.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LedState {
    On,
    Off,
}

impl LedState {
    fn is_on(self) -> bool {
        self == Self::On
    }
}

/// Arguments for the `led` command.
#[derive(Debug, Args)]
pub struct LedArgs {
    /// State to switch the LED to.
    #[arg(value_enum)]
    state: LedState,
}

impl LedArgs {
    #[must_use]
    pub fn new(state: LedState) -> Self {
        Self { state }
    }
}

/// The LED state requested and the state the peripheral read back.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub(crate) struct LedReport {
    pub(crate) peripheral: PeripheralId,
    pub(crate) requested: bool,
    pub(crate) reported: bool,
}

/// Executes the `led` command.
#[instrument(skip(handler, output), level = "info")]
pub(crate) async fn run<W>(
    handler: SessionHandler,
    args: &LedArgs,
    mut output: Output<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let mut connected = handler.connect().await?;
    let requested = args.state.is_on();

    let (on_led, mut echoes) = callback_channel();
    let session = connected.session_mut()?;
    session.set_led_callback(on_led);
    session.set_led(requested)?;
    connected
        .wait_until(|| !echoes.is_empty(), "read back the LED state")
        .await?;
    let reported = echoes.try_recv().map_err(|_| InteractionError::EventStreamClosed)?;

    let report = LedReport {
        peripheral: connected.device().peripheral().clone(),
        requested,
        reported,
    };
    connected.close()?;

    let painter = output.painter();
    output.emit(&report, &LedReportView::new(&report, &painter))
}
