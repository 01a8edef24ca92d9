pub(crate) mod button;
pub(crate) mod command;
pub(crate) mod config;
pub(crate) mod inspect;
pub(crate) mod led;
pub(crate) mod mic;
pub(crate) mod scan;
pub(crate) mod ui;

use std::fmt::Display;
use std::io;

use anyhow::Result;
use serde::Serialize;

use crate::terminal::TerminalClient;

use self::ui::Painter;

pub use self::button::ButtonArgs;
pub use self::command::{Args, Command, FakeArgs, LogLevel, OutputFormat, SessionOptions};
pub use self::config::{ConfigAction, ConfigArgs};
pub use self::led::{LedArgs, LedState};
pub use self::mic::MicArgs;
pub use self::scan::ScanArgs;

/// Command output sink that renders either styled text or JSON.
pub(crate) struct Output<'a, W> {
    out: &'a mut W,
    painter: Painter,
    format: OutputFormat,
}

impl<'a, W> Output<'a, W>
where
    W: io::Write,
{
    pub(crate) fn new(
        out: &'a mut W,
        terminal_client: &dyn TerminalClient,
        format: OutputFormat,
    ) -> Self {
        Self {
            out,
            painter: Painter::new(terminal_client.stdout_is_terminal()),
            format,
        }
    }

    pub(crate) fn painter(&self) -> Painter {
        self.painter
    }

    /// Writes a complete result: `pretty` as text, or `value` as one JSON document.
    pub(crate) fn emit<T>(&mut self, value: &T, pretty: &dyn Display) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        match self.format {
            OutputFormat::Pretty => writeln!(self.out, "{pretty}")?,
            OutputFormat::Json => {
                serde_json::to_writer_pretty(&mut *self.out, value)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }

    /// Writes one streamed record: `pretty` as text, or `value` as a JSON line.
    pub(crate) fn emit_line<T>(&mut self, value: &T, pretty: &dyn Display) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        match self.format {
            OutputFormat::Pretty => writeln!(self.out, "{pretty}")?,
            OutputFormat::Json => {
                serde_json::to_writer(&mut *self.out, value)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }
}
