use std::path::PathBuf;
use std::time::Duration;

use bon::Builder;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::cli::button::ButtonArgs;
use crate::cli::config::ConfigArgs;
use crate::cli::led::LedArgs;
use crate::cli::mic::MicArgs;
use crate::cli::scan::ScanArgs;
use crate::error::{CliConfigError, FixtureError};
use crate::handlers::{CommandCodec, OpcodeTable};
use crate::hw::{FakeBackendConfig, NotificationPayloads, PeripheralId, ScanFixture};

/// Local-name prefix advertised by the Blinky firmware.
pub(crate) const DEFAULT_DEVICE_NAME_PREFIX: &str = "Nordic_Blinky";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Command-line options for the Blinky BLE tool.
#[derive(Debug, Parser)]
#[command(name = "blinky", about = "Interact with Nordic Blinky and Thingy BLE peripherals.")]
pub struct Args {
    /// Log verbosity; overrides `RUST_LOG`.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Output format; defaults to `pretty` on a terminal and `json` otherwise.
    #[arg(long, global = true, value_enum)]
    output: Option<OutputFormat>,
    /// Local-name prefix used to pick a peripheral.
    #[arg(long, global = true, default_value = DEFAULT_DEVICE_NAME_PREFIX)]
    name_prefix: String,
    /// Connect to this peripheral identifier instead of matching by name.
    #[arg(long, global = true)]
    device: Option<PeripheralId>,
    /// Upper bound for each scan, discovery or response wait (e.g. `500ms`, `10s`).
    #[arg(long, global = true, value_parser = parse_duration)]
    timeout: Option<Duration>,
    /// JSON opcode table for the connected device family.
    #[arg(long, global = true)]
    opcode_table: Option<PathBuf>,
    /// Uses the fake BLE backend with fixture-driven discovery and payloads.
    #[arg(long, global = true)]
    fake: bool,
    /// Fake scan fixtures in the form `peripheral_id|local_name|rssi|service,service;...`.
    #[arg(long, global = true, requires = "fake", required_if_eq("fake", "true"))]
    fake_scan: Option<ScanFixture>,
    /// Fake microphone PCM payloads as comma-separated hexadecimal payloads.
    #[arg(long, global = true, requires = "fake")]
    fake_mic: Option<NotificationPayloads>,
    /// Fake button payloads pushed after the button is read.
    #[arg(long, global = true, requires = "fake")]
    fake_button: Option<NotificationPayloads>,
    #[command(subcommand)]
    command: Command,
}

impl Args {
    /// Creates argument values directly without CLI parsing.
    ///
    /// ```
    /// use blinky::{Args, Command};
    ///
    /// let inspect = Args::new(Command::Inspect);
    /// let _ = inspect;
    /// ```
    #[must_use]
    pub fn new(command: Command) -> Self {
        Self {
            log_level: None,
            output: None,
            name_prefix: DEFAULT_DEVICE_NAME_PREFIX.to_string(),
            device: None,
            timeout: None,
            opcode_table: None,
            fake: false,
            fake_scan: None,
            fake_mic: None,
            fake_button: None,
            command,
        }
    }

    /// Enables fake backend mode with pre-parsed fake configuration.
    #[must_use]
    pub fn with_fake(mut self, fake: FakeArgs) -> Self {
        let FakeArgs {
            scan_fixture,
            microphone,
            button,
        } = fake;

        self.fake = true;
        self.fake_scan = Some(scan_fixture);
        self.fake_mic = microphone;
        self.fake_button = button;
        self
    }

    /// Returns the explicit log level, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LogLevel> {
        self.log_level
    }

    /// Returns the explicit output format, if any.
    #[must_use]
    pub fn output_format(&self) -> Option<OutputFormat> {
        self.output
    }

    /// Splits parsed CLI arguments into command, session options and optional
    /// fake-client settings.
    ///
    /// # Errors
    ///
    /// Returns an error if CLI backend configuration is invalid.
    pub fn into_parts(self) -> anyhow::Result<(Command, SessionOptions, Option<FakeArgs>)> {
        let Args {
            log_level: _,
            output: _,
            name_prefix,
            device,
            timeout,
            opcode_table,
            fake,
            fake_scan,
            fake_mic,
            fake_button,
            command,
        } = self;

        let fake_args = if fake {
            let Some(scan_fixture) = fake_scan else {
                return Err(CliConfigError::MissingFakeScanFixture.into());
            };
            Some(FakeArgs {
                scan_fixture,
                microphone: fake_mic,
                button: fake_button,
            })
        } else {
            None
        };

        let options = SessionOptions {
            name_prefix,
            device,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            opcode_table,
        };

        Ok((command, options, fake_args))
    }
}

/// Peripheral selection and wait settings shared by every command.
#[derive(Debug, Clone, Builder)]
pub struct SessionOptions {
    #[builder(default = DEFAULT_DEVICE_NAME_PREFIX.to_string(), into)]
    name_prefix: String,
    device: Option<PeripheralId>,
    #[builder(default = DEFAULT_TIMEOUT)]
    timeout: Duration,
    opcode_table: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl SessionOptions {
    pub(crate) fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub(crate) fn device(&self) -> Option<&PeripheralId> {
        self.device.as_ref()
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the command codec from the configured opcode table.
    pub(crate) fn codec(&self) -> Result<CommandCodec, CliConfigError> {
        let Some(path) = &self.opcode_table else {
            return Ok(CommandCodec::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|source| CliConfigError::OpcodeTableIo {
            path: path.display().to_string(),
            source,
        })?;
        Ok(CommandCodec::new(OpcodeTable::from_json(&raw)?))
    }
}

/// Fake backend arguments for programmatic runs.
#[derive(Debug, Builder)]
pub struct FakeArgs {
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    scan_fixture: ScanFixture,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    microphone: Option<NotificationPayloads>,
    #[builder(with = |value: &str| -> std::result::Result<_, FixtureError> { value.parse() })]
    button: Option<NotificationPayloads>,
}

impl FakeArgs {
    pub(crate) fn into_backend_config(self) -> FakeBackendConfig {
        let Self {
            scan_fixture,
            microphone,
            button,
        } = self;

        FakeBackendConfig::builder()
            .scan_fixture(scan_fixture)
            .maybe_microphone(microphone)
            .maybe_button(button)
            .build()
    }
}

/// Log verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
            Self::Trace => LevelFilter::TRACE,
        }
    }
}

/// Rendering for command results.
#[derive(Debug, Clone, Copy, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan for advertising peripherals and list them.
    Scan(ScanArgs),
    /// Connect, run discovery and print the bound characteristics.
    Inspect,
    /// Switch the LED and report the state read back from the device.
    Led(LedArgs),
    /// Read the button, then print button notifications.
    Button(ButtonArgs),
    /// Send one configuration command and print the response.
    Config(ConfigArgs),
    /// Stream microphone audio for a while and summarise it.
    Mic(MicArgs),
}

pub(crate) fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime::parse_duration(value).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use clap::error::ErrorKind;
    use pretty_assertions::assert_eq;

    use super::*;

    const FIXTURE: &str = "AA:BB:CC|Nordic_Blinky|-43|-";

    #[test]
    fn fake_mode_requires_scan_fixture() {
        let result = Args::try_parse_from(["blinky", "--fake", "inspect"]);

        let error = result.expect_err("missing --fake-scan should fail argument parsing");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_fixture_flags_require_fake_mode() {
        let result = Args::try_parse_from(["blinky", "--fake-mic", "0100FF7F", "inspect"]);

        let error = result.expect_err("fake payload flags should require --fake");
        assert_eq!(ErrorKind::MissingRequiredArgument, error.kind());
    }

    #[test]
    fn fake_mode_builds_fake_settings() {
        let cli = Args::try_parse_from(["blinky", "--fake", "--fake-scan", FIXTURE, "inspect"])
            .expect("valid fake arguments should parse");

        let (command, options, fake_args) = cli
            .into_parts()
            .expect("valid fake arguments should resolve fake settings");
        assert_matches!(command, Command::Inspect);
        assert_matches!(fake_args, Some(_));
        assert_eq!(DEFAULT_DEVICE_NAME_PREFIX, options.name_prefix());
        assert_eq!(DEFAULT_TIMEOUT, options.timeout());
    }

    #[test]
    fn global_options_parse_after_subcommand() {
        let cli = Args::try_parse_from([
            "blinky",
            "inspect",
            "--device",
            "AA:BB:CC",
            "--timeout",
            "1s 500ms",
            "--log-level",
            "debug",
        ])
        .expect("global options should parse");

        assert_eq!(Some(LogLevel::Debug), cli.log_level());
        let (_, options, fake_args) = cli.into_parts().expect("real backend settings");
        assert_eq!(Some(&PeripheralId::from("AA:BB:CC")), options.device());
        assert_eq!(Duration::from_millis(1500), options.timeout());
        assert_matches!(fake_args, None);
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let error = Args::try_parse_from(["blinky", "--timeout", "soon", "inspect"])
            .expect_err("invalid durations should fail");
        assert_eq!(ErrorKind::ValueValidation, error.kind());
    }

    #[test]
    fn missing_opcode_table_is_a_config_error() {
        let options = SessionOptions::builder()
            .opcode_table(PathBuf::from("/nonexistent/opcodes.json"))
            .build();

        assert_matches!(options.codec(), Err(CliConfigError::OpcodeTableIo { .. }));
    }
}
