use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::{info, instrument, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::app::{ConnectedSession, SessionHandler, callback_channel};
use crate::audio::{AudioBuffer, MICROPHONE_SAMPLE_RATE};
use crate::error::InteractionError;
use crate::hw::PeripheralId;

use super::Output;
use super::command::parse_duration;
use super::ui::MicSummaryView;

/// Arguments for the `mic` command.
#[derive(Debug, Args)]
pub struct MicArgs {
    /// How long to stream for (e.g. `5s`). Ctrl+C stops early.
    #[arg(long, value_parser = parse_duration, default_value = "5s")]
    duration: Duration,
    /// Write the captured samples as raw little-endian `f32` mono at 16 kHz.
    #[arg(long)]
    save: Option<PathBuf>,
}

impl MicArgs {
    #[must_use]
    pub fn new(duration: Duration, save: Option<PathBuf>) -> Self {
        Self { duration, save }
    }
}

/// What a microphone capture produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct MicSummary {
    pub(crate) peripheral: PeripheralId,
    pub(crate) buffers: usize,
    pub(crate) samples: usize,
    pub(crate) seconds: f64,
    pub(crate) peak: f32,
    pub(crate) saved_to: Option<String>,
}

impl MicSummary {
    fn new(
        peripheral: PeripheralId,
        buffers: usize,
        samples: &[f32],
        saved_to: Option<&Path>,
    ) -> Self {
        let peak = samples
            .iter()
            .map(|sample| sample.abs())
            .fold(0.0_f32, f32::max);

        Self {
            peripheral,
            buffers,
            samples: samples.len(),
            seconds: samples.len() as f64 / f64::from(MICROPHONE_SAMPLE_RATE),
            peak,
            saved_to: saved_to.map(|path| path.display().to_string()),
        }
    }
}

/// Executes the `mic` command.
#[instrument(skip(handler, output), level = "info")]
pub(crate) async fn run<W>(
    handler: SessionHandler,
    args: &MicArgs,
    mut output: Output<'_, W>,
) -> Result<()>
where
    W: io::Write,
{
    let mut connected = handler.connect().await?;

    let (on_buffer, mut buffers) = callback_channel::<AudioBuffer>();
    let (on_ready, mut ready) = callback_channel::<bool>();
    connected
        .session_mut()?
        .start_microphone(Box::new(on_buffer), on_ready)?;
    connected
        .wait_until(|| !ready.is_empty(), "start the microphone")
        .await?;
    if !ready.try_recv().unwrap_or(false) {
        connected.close()?;
        return Err(InteractionError::MicrophoneUnavailable.into());
    }

    record(&mut connected, args.duration).await?;

    let (on_stopped, mut stopped) = callback_channel::<bool>();
    connected.session_mut()?.stop_microphone(on_stopped);
    connected
        .wait_until(|| !stopped.is_empty(), "stop the microphone")
        .await?;
    if !stopped.try_recv().unwrap_or(false) {
        warn!("microphone notifications were not disabled cleanly");
    }
    let peripheral = connected.device().peripheral().clone();
    connected.close()?;

    let mut buffer_count = 0;
    let mut samples = Vec::new();
    while let Ok(buffer) = buffers.try_recv() {
        buffer_count += 1;
        samples.extend_from_slice(buffer.samples());
    }
    if let Some(path) = &args.save {
        write_f32_le(path, &samples)?;
    }

    let summary = MicSummary::new(peripheral, buffer_count, &samples, args.save.as_deref());
    let painter = output.painter();
    output.emit(&summary, &MicSummaryView::new(&summary, &painter))
}

#[instrument(skip(connected), level = "info")]
async fn record(
    connected: &mut ConnectedSession,
    duration: Duration,
) -> Result<(), InteractionError> {
    let span = tracing::Span::current();
    span.pb_set_message(&format!(
        "Recording for {}",
        humantime::format_duration(duration)
    ));
    connected.listen_for(duration).await?;
    info!("recording finished");
    Ok(())
}

fn write_f32_le(path: &Path, samples: &[f32]) -> Result<(), InteractionError> {
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    std::fs::write(path, bytes).map_err(|source| InteractionError::CaptureWrite {
        path: path.display().to_string(),
        source,
    })
}
