use std::fmt::{self, Display, Formatter};

use crate::cli::inspect::InspectReport;

use super::device_view::DeviceView;
use super::painter::Painter;
use super::table::Table;

/// Renders a full inspect report with device, session, service and binding tables.
pub(crate) struct InspectReportView<'a> {
    report: &'a InspectReport,
    painter: &'a Painter,
}

impl<'a> InspectReportView<'a> {
    pub(crate) fn new(report: &'a InspectReport, painter: &'a Painter) -> Self {
        Self { report, painter }
    }
}

impl Display for InspectReportView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let painter = self.painter;
        let firmware_version = match &self.report.firmware_version {
            Some(version) => painter.value(version),
            None => painter.warning("<unknown>"),
        };
        let session = Table::key_value(
            painter,
            vec![
                ("connection", painter.value(&self.report.connection_state)),
                ("discovery", painter.value(&self.report.discovery_state)),
                ("firmware_version", firmware_version),
            ],
        );
        let services = Table::grid(
            ["uuid", "role"],
            self.report
                .services
                .iter()
                .map(|service| vec![service.uuid.clone(), service.role.to_string()]),
        );
        let bindings = Table::grid(
            ["role", "service", "characteristic"],
            self.report.bindings.iter().map(|binding| {
                vec![
                    painter.value(binding.role.to_string()),
                    binding.service.to_string(),
                    binding.characteristic.clone(),
                ]
            }),
        );

        write!(f, "{}", painter.heading("Connected device:"))?;
        write!(f, "\n{}", DeviceView::new(&self.report.device, painter))?;
        writeln!(f)?;
        write!(f, "\n{}", painter.heading("Session:"))?;
        write!(f, "\n{session}")?;
        writeln!(f)?;
        write!(f, "\n{}", painter.heading("Services:"))?;
        write!(f, "\n{services}")?;
        writeln!(f)?;
        write!(f, "\n{}", painter.heading("Bindings:"))?;
        if self.report.bindings.is_empty() {
            write!(f, "\n{}", painter.warning("No characteristics bound."))
        } else {
            write!(f, "\n{bindings}")
        }
    }
}
