use std::fmt::{self, Display, Formatter};

use crate::cli::button::ButtonEvent;
use crate::cli::config::ConfigReport;
use crate::cli::led::LedReport;
use crate::cli::mic::MicSummary;

use super::painter::Painter;
use super::table::Table;

/// Renders the requested and read-back LED state.
pub(crate) struct LedReportView<'a> {
    report: &'a LedReport,
    painter: &'a Painter,
}

impl<'a> LedReportView<'a> {
    pub(crate) fn new(report: &'a LedReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for LedReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        let table = Table::key_value(
            painter,
            vec![
                ("peripheral", painter.value(self.report.peripheral.as_str())),
                ("requested", painter.switch(self.report.requested)),
                ("reported", painter.switch(self.report.reported)),
            ],
        );
        write!(f, "{table}")?;
        if self.report.requested != self.report.reported {
            write!(
                f,
                "\n{}",
                painter.warning("The peripheral reported a different LED state.")
            )?;
        }
        Ok(())
    }
}

/// Renders one button state line.
pub(crate) struct ButtonEventView<'a> {
    event: &'a ButtonEvent,
    painter: &'a Painter,
}

impl<'a> ButtonEventView<'a> {
    pub(crate) fn new(event: &'a ButtonEvent, painter: &'a Painter) -> Self {
        Self { event, painter }
    }
}

impl Display for ButtonEventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index_label = self.painter.muted(format!("[{:04}]", self.event.index));
        let label = if self.event.index == 0 {
            "initial"
        } else {
            "changed"
        };
        let state = if self.event.pressed {
            self.painter.success("pressed")
        } else {
            self.painter.muted("released")
        };
        write!(f, "{index_label} {} {state}", self.painter.value(label))
    }
}

/// Renders the command sent and the response received.
pub(crate) struct ConfigReportView<'a> {
    report: &'a ConfigReport,
    painter: &'a Painter,
}

impl<'a> ConfigReportView<'a> {
    pub(crate) fn new(report: &'a ConfigReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for ConfigReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        let response = match self.report.response_command {
            Some(command) => painter.value(command.to_string()),
            None => painter.warning("unknown"),
        };
        let opcode = match self.report.response_opcode {
            Some(opcode) => format!("0x{opcode:02X}"),
            None => painter.muted("-"),
        };
        let table = Table::key_value(
            painter,
            vec![
                ("sent", painter.value(self.report.sent.to_string())),
                ("response", response),
                ("opcode", opcode),
                ("payload", self.report.response_payload.clone()),
            ],
        );
        write!(f, "{table}")
    }
}

/// Renders a microphone capture summary.
pub(crate) struct MicSummaryView<'a> {
    summary: &'a MicSummary,
    painter: &'a Painter,
}

impl<'a> MicSummaryView<'a> {
    pub(crate) fn new(summary: &'a MicSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for MicSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        let saved_to = match &self.summary.saved_to {
            Some(path) => painter.value(path),
            None => painter.muted("-"),
        };
        let table = Table::key_value(
            painter,
            vec![
                ("peripheral", painter.value(self.summary.peripheral.as_str())),
                ("buffers", self.summary.buffers.to_string()),
                ("samples", self.summary.samples.to_string()),
                ("duration", format!("{:.3}s", self.summary.seconds)),
                ("peak", format!("{:.3}", self.summary.peak)),
                ("saved_to", saved_to),
            ],
        );
        write!(f, "{}", painter.heading("Microphone capture:"))?;
        write!(f, "\n{table}")
    }
}
