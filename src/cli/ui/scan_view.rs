use std::fmt::{self, Display, Formatter};

use crate::hw::FoundDevice;
use crate::utils::format_rssi;

use super::device_view::services_label;
use super::painter::Painter;
use super::table::Table;

/// Renders scan results as one row per peripheral.
pub(crate) struct ScanResultView<'a> {
    devices: &'a [FoundDevice],
    painter: &'a Painter,
}

impl<'a> ScanResultView<'a> {
    pub(crate) fn new(devices: &'a [FoundDevice], painter: &'a Painter) -> Self {
        Self { devices, painter }
    }
}

impl Display for ScanResultView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.devices.is_empty() {
            return write!(f, "{}", self.painter.warning("No devices found."));
        }

        let rows = self.devices.iter().map(|device| {
            vec![
                self.painter.value(device.name()),
                device.peripheral().to_string(),
                format_rssi(device.rssi()),
                services_label(device, self.painter),
            ]
        });
        let table = Table::grid(["name", "peripheral", "rssi", "services"], rows);

        let count = self.devices.len();
        let noun = if count == 1 { "device" } else { "devices" };
        write!(f, "{}", self.painter.heading(format!("Found {count} {noun}:")))?;
        write!(f, "\n{table}")
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::advertisement::{
        AdvertisementData, AdvertisementKey, AdvertisementParser, AdvertisementValue,
    };

    fn device(peripheral: &str, name: &str, rssi: Option<i16>, services: &[&str]) -> FoundDevice {
        let data = AdvertisementData::from([
            (
                AdvertisementKey::LocalName,
                AdvertisementValue::Text(name.to_string()),
            ),
            (
                AdvertisementKey::ServiceUuids,
                AdvertisementValue::Identifiers(services.iter().map(ToString::to_string).collect()),
            ),
        ]);
        FoundDevice::new(peripheral.into(), AdvertisementParser::parse(&data), rssi)
    }

    #[test]
    fn scan_view_lists_each_device() {
        let devices = [
            device("AA:BB:CC", "Nordic_Blinky", Some(-43), &["180a"]),
            device("DD:EE:FF", "Thingy", None, &[]),
        ];
        let painter = Painter::new(false);
        assert_snapshot!(ScanResultView::new(&devices, &painter).to_string(), @r"
        Found 2 devices:
        ╭───────────────┬────────────┬──────┬──────────────────────────────────────╮
        │ name          │ peripheral │ rssi │ services                             │
        ├───────────────┼────────────┼──────┼──────────────────────────────────────┤
        │ Nordic_Blinky │ AA:BB:CC   │ -43  │ 0000180a-0000-1000-8000-00805f9b34fb │
        │ Thingy        │ DD:EE:FF   │ -    │ -                                    │
        ╰───────────────┴────────────┴──────┴──────────────────────────────────────╯
        ");
    }

    #[test]
    fn scan_view_reports_empty_scan() {
        let painter = Painter::new(false);
        assert_snapshot!(ScanResultView::new(&[], &painter).to_string(), @"No devices found.");
    }
}
