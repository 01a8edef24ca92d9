use std::fmt::{self, Display, Formatter};

use crate::hw::FoundDevice;
use crate::utils::format_rssi;

use super::painter::Painter;
use super::table::Table;

/// Renders a `FoundDevice` as a key-value table.
pub(crate) struct DeviceView<'a> {
    device: &'a FoundDevice,
    painter: &'a Painter,
}

impl<'a> DeviceView<'a> {
    pub(crate) fn new(device: &'a FoundDevice, painter: &'a Painter) -> Self {
        Self { device, painter }
    }
}

impl Display for DeviceView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let table = Table::key_value(
            self.painter,
            vec![
                ("peripheral", self.painter.value(self.device.peripheral().as_str())),
                ("name", self.painter.value(self.device.name())),
                ("rssi", self.painter.value(format_rssi(self.device.rssi()))),
                ("services", services_label(self.device, self.painter)),
            ],
        );
        write!(f, "{table}")
    }
}

/// Joins advertised service identifiers, or a muted dash when there are none.
pub(crate) fn services_label(device: &FoundDevice, painter: &Painter) -> String {
    if device.service_ids().is_empty() {
        return painter.muted("-");
    }
    device
        .service_ids()
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;
    use crate::advertisement::{
        AdvertisementData, AdvertisementKey, AdvertisementParser, AdvertisementValue,
    };

    fn device(name: Option<&str>, services: &[&str]) -> FoundDevice {
        let mut data = AdvertisementData::new();
        if let Some(name) = name {
            data.insert(
                AdvertisementKey::LocalName,
                AdvertisementValue::Text(name.to_string()),
            );
        }
        data.insert(
            AdvertisementKey::ServiceUuids,
            AdvertisementValue::Identifiers(services.iter().map(ToString::to_string).collect()),
        );
        FoundDevice::new("AA:BB:CC".into(), AdvertisementParser::parse(&data), Some(-43))
    }

    #[test]
    fn device_view_renders_every_field() {
        let found = device(Some("Nordic_Blinky"), &["180a"]);
        let painter = Painter::new(false);
        assert_snapshot!(DeviceView::new(&found, &painter).to_string(), @r"
        ╭────────────┬──────────────────────────────────────╮
        │ field      │ value                                │
        ├────────────┼──────────────────────────────────────┤
        │ peripheral │ AA:BB:CC                             │
        │ name       │ Nordic_Blinky                        │
        │ rssi       │ -43                                  │
        │ services   │ 0000180a-0000-1000-8000-00805f9b34fb │
        ╰────────────┴──────────────────────────────────────╯
        ");
    }

    #[test]
    fn device_view_marks_missing_name_and_services() {
        let found = device(None, &[]);
        let painter = Painter::new(false);
        assert_snapshot!(DeviceView::new(&found, &painter).to_string(), @r"
        ╭────────────┬──────────╮
        │ field      │ value    │
        ├────────────┼──────────┤
        │ peripheral │ AA:BB:CC │
        │ name       │ N/A      │
        │ rssi       │ -43      │
        │ services   │ -        │
        ╰────────────┴──────────╯
        ");
    }
}
