mod command_codec;
mod event_log;
mod frame_codec;
mod opcode_table;
mod pairing_code;
mod threshold;
mod time_sync;
mod udi;
mod validation;

pub use self::command_codec::{CommandCodec, ConfigCommand};
pub use self::event_log::EventLogHandler;
pub use self::frame_codec::{CommandFrame, FRAME_PREAMBLE, FrameCodecError};
pub use self::opcode_table::{CommandKind, OpcodeTable, OpcodeTableError};
pub use self::pairing_code::{PairingCode, PairingCodeHandler};
pub use self::threshold::{Threshold, ThresholdHandler};
pub use self::time_sync::{DeviceTime, TimeSyncHandler};
pub use self::udi::{Udi, UdiHandler};
pub use self::validation::ValidationError;
