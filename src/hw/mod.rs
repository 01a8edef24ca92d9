mod adapter;
mod btleplug_backend;
mod fake_backend;
mod hardware;
mod model;

pub use self::adapter::{AdapterCommand, AdapterEvent, BleAdapter};
pub use self::fake_backend::{FakeBackend, FakeBackendConfig, NotificationPayloads, ScanFixture};
pub use self::hardware::{
    AdapterConnection, HardwareClient, fake_hardware_client, real_hardware_client,
};
pub use self::model::{CharacteristicInfo, FoundDevice, PeripheralId, WriteMode};
