mod device;
mod discovery;
mod driver;
mod manager;
mod microphone;

pub use self::device::{ConnectionState, DeviceSession};
pub use self::discovery::{
    BindingTable, CharacteristicBinding, DiscoveryAction, DiscoveryEvent, DiscoveryFailure,
    DiscoveryMachine, DiscoveryState,
};
pub use self::driver::SessionDriver;
pub use self::manager::{SessionHandle, SessionManager};
pub use self::microphone::{MicrophoneState, ReadyCallback, StoppedCallback};
