mod advertisement;
mod app;
mod audio;
mod cli;
mod dfu;
mod error;
mod handlers;
mod hw;
mod notification;
mod protocol;
mod session;
mod telemetry;
mod terminal;
mod utils;

pub use advertisement::{
    AdvertisementData, AdvertisementKey, AdvertisementParser, AdvertisementValue,
    ParsedAdvertisement, UNNAMED_PERIPHERAL,
};
pub use app::{
    ConnectedSession, SessionHandler, fake_hardware_client, real_hardware_client, run,
    run_with_clients_and_log_level, run_with_log_level,
};
pub use audio::{
    AudioBuffer, AudioSink, MICROPHONE_CHANNELS, MICROPHONE_SAMPLE_RATE, pcm16_from_le_bytes,
    reassemble,
};
pub use cli::{
    Args, ButtonArgs, Command, ConfigAction, ConfigArgs, FakeArgs, LedArgs, LedState, LogLevel,
    MicArgs, OutputFormat, ScanArgs, SessionOptions,
};
pub use dfu::{DfuError, DfuEvent, FirmwareImage, FirmwareUpdater};
pub use error::{AdapterFault, FixtureError, InteractionError, ProtocolError, SessionError};
pub use handlers::{
    CommandCodec, CommandFrame, CommandKind, ConfigCommand, DeviceTime, EventLogHandler,
    FRAME_PREAMBLE, FrameCodecError, OpcodeTable, OpcodeTableError, PairingCode,
    PairingCodeHandler, Threshold, ThresholdHandler, TimeSyncHandler, Udi, UdiHandler,
    ValidationError,
};
pub use hw::{
    AdapterCommand, AdapterConnection, AdapterEvent, BleAdapter, CharacteristicInfo, FakeBackend,
    FakeBackendConfig, FoundDevice, HardwareClient, NotificationPayloads, PeripheralId,
    ScanFixture, WriteMode,
};
pub use notification::{NotificationEvent, NotificationHandler};
pub use protocol::{
    CharacteristicRole, ServiceRole, classify_characteristic, classify_service, normalise_uuid,
};
pub use session::{
    BindingTable, CharacteristicBinding, ConnectionState, DeviceSession, DiscoveryAction,
    DiscoveryEvent, DiscoveryFailure, DiscoveryMachine, DiscoveryState, MicrophoneState,
    ReadyCallback, SessionDriver, SessionHandle, SessionManager, StoppedCallback,
};
pub use terminal::TerminalClient;
