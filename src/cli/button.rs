use std::io;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::{info, instrument};

use crate::app::{SessionHandler, callback_channel};
use crate::error::InteractionError;

use super::Output;
use super::ui::ButtonEventView;

/// Arguments for the `button` command.
#[derive(Debug, Default, Args)]
pub struct ButtonArgs {
    /// Stop after this many button changes. If omitted, listen until Ctrl+C.
    #[arg(long)]
    count: Option<usize>,
}

impl ButtonArgs {
    /// Creates button arguments with an optional change limit.
    #[must_use]
    pub fn new(count: Option<usize>) -> Self {
        Self { count }
    }
}

/// One reported button state; index 0 is the initial read.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
pub(crate) struct ButtonEvent {
    pub(crate) index: usize,
    pub(crate) pressed: bool,
}

/// Executes the `button` command.
#[instrument(skip(handler, output), level = "info")]
pub(crate) async fn run<W>(
    handler: SessionHandler,
    args: &ButtonArgs,
    mut output: Output<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let mut connected = handler.connect().await?;
    let painter = output.painter();

    let (on_button, mut states) = callback_channel();
    let session = connected.session_mut()?;
    session.set_button_callback(on_button);
    session.read_button_state()?;
    connected
        .wait_until(|| !states.is_empty(), "read the button state")
        .await?;

    let limit_reached = |changes: usize| args.count.is_some_and(|limit| changes >= limit);
    let mut index = 0;
    'listen: loop {
        while let Ok(pressed) = states.try_recv() {
            let event = ButtonEvent { index, pressed };
            output.emit_line(&event, &ButtonEventView::new(&event, &painter))?;
            if limit_reached(index) {
                break 'listen;
            }
            index += 1;
        }
        match connected.listen_next().await {
            Ok(true) => {}
            Ok(false) => break,
            Err(InteractionError::EventStreamClosed) => {
                info!("adapter event stream closed");
                break;
            }
            Err(error) => return Err(error.into()),
        }
    }

    info!("button listening finished");
    connected.close()?;
    Ok(())
}
