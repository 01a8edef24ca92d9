use std::io;
use std::time::Duration;

use anyhow::Result;
use owo_colors::OwoColorize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use tracing_indicatif::span_ext::IndicatifSpanExt;

use crate::cli::{Command, FakeArgs, LogLevel, OutputFormat, SessionOptions};
use crate::error::{InteractionError, SessionError};
use crate::hw::{
    FoundDevice, HardwareClient, fake_hardware_client as build_fake_hardware_client,
    real_hardware_client as build_real_hardware_client,
};
use crate::session::{DeviceSession, SessionDriver, SessionHandle};
use crate::telemetry;
use crate::terminal::{SystemTerminalClient, TerminalClient};

/// Creates a hardware client backed by the real BLE transport.
#[must_use]
pub fn real_hardware_client() -> Box<dyn HardwareClient> {
    build_real_hardware_client()
}

/// Creates a hardware client backed by fake BLE fixtures.
#[must_use]
pub fn fake_hardware_client(fake_args: FakeArgs) -> Box<dyn HardwareClient> {
    build_fake_hardware_client(fake_args.into_backend_config())
}

/// Session-level app helper for acquiring a Blinky connection.
pub struct SessionHandler {
    hardware_client: Box<dyn HardwareClient>,
    options: SessionOptions,
}

impl SessionHandler {
    /// Creates a session handler using the default Blinky name prefix.
    ///
    /// ```
    /// # async fn demo() -> anyhow::Result<()> {
    /// let handler = blinky::SessionHandler::new(blinky::real_hardware_client());
    /// let _ = handler;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn new(hardware_client: Box<dyn HardwareClient>) -> Self {
        Self {
            hardware_client,
            options: SessionOptions::default(),
        }
    }

    /// Replaces peripheral selection and wait settings.
    ///
    /// ```
    /// # async fn demo() -> anyhow::Result<()> {
    /// let options = blinky::SessionOptions::builder().name_prefix("Thingy").build();
    /// let handler = blinky::SessionHandler::new(blinky::real_hardware_client())
    ///     .with_options(options);
    /// let _ = handler;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Scans for `duration` and returns the devices whose name starts with
    /// `prefix`.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter cannot be opened or the scan fails.
    #[instrument(skip(self), level = "info")]
    pub async fn scan(self, prefix: &str, duration: Duration) -> Result<Vec<FoundDevice>> {
        let span = tracing::Span::current();
        span.pb_set_message(&format!(
            "Scanning for {}",
            humantime::format_duration(duration)
        ));
        span.pb_set_finish_message(&format!("{} Scan finished", "✓".green()));

        let codec = self.options.codec()?;
        let connection = self.hardware_client.open().await?;
        let mut driver = SessionDriver::new(connection, codec);
        cancel_on_ctrl_c(driver.cancellation_token());

        match driver.scan_for(prefix, duration).await {
            Ok(devices) => Ok(devices),
            Err(InteractionError::Cancelled) => {
                info!("scan cancelled");
                Ok(driver
                    .manager()
                    .discovered_devices()
                    .filter(|device| device.name_starts_with(prefix))
                    .cloned()
                    .collect())
            }
            Err(error) => {
                span.pb_set_finish_message(&format!("{} Scan failed", "✗".red()));
                Err(error.into())
            }
        }
    }

    /// Connects to the configured peripheral and waits for discovery.
    ///
    /// An explicit `--device` wins; otherwise the first peripheral whose name
    /// starts with the configured prefix is used.
    ///
    /// # Errors
    ///
    /// Returns an error if no device is found, or connection or discovery fails.
    #[instrument(skip(self), level = "info", fields(name_prefix = %self.options.name_prefix()))]
    pub async fn connect(self) -> Result<ConnectedSession> {
        let span = tracing::Span::current();
        span.pb_set_message("Scanning for Blinky devices and connecting");
        span.pb_set_finish_message(&format!("{} Connected", "✓".green()));

        match self.establish().await {
            Ok(session) => Ok(session),
            Err(error) => {
                span.pb_set_finish_message(&format!("{} Connection failed", "✗".red()));
                Err(error)
            }
        }
    }

    async fn establish(self) -> Result<ConnectedSession> {
        let Self {
            hardware_client,
            options,
        } = self;
        let timeout = options.timeout();
        let codec = options.codec()?;
        let connection = hardware_client.open().await?;
        let mut driver = SessionDriver::new(connection, codec);
        cancel_on_ctrl_c(driver.cancellation_token());

        let device = match options.device() {
            Some(peripheral) => driver.find_peripheral(peripheral, timeout).await?,
            None => driver.find_first(options.name_prefix(), timeout).await?,
        };
        info!(peripheral = %device.peripheral(), name = device.name(), "connecting");
        let handle = driver.connect(device.peripheral(), timeout).await?;

        let (on_error, errors) = callback_channel();
        driver
            .manager_mut()
            .session_mut(&handle)?
            .set_error_callback(on_error);

        Ok(ConnectedSession {
            driver,
            handle,
            device,
            errors,
            timeout,
        })
    }
}

/// A peripheral whose discovery reached Ready, plus the driver that feeds it.
#[derive(Debug)]
pub struct ConnectedSession {
    driver: SessionDriver,
    handle: SessionHandle,
    device: FoundDevice,
    errors: UnboundedReceiver<SessionError>,
    timeout: Duration,
}

impl ConnectedSession {
    /// Returns the advertised device this session is bound to.
    #[must_use]
    pub fn device(&self) -> &FoundDevice {
        &self.device
    }

    /// Returns the bound session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotBound`] if the session was released.
    pub fn session(&self) -> Result<&DeviceSession, SessionError> {
        self.driver
            .manager()
            .session(&self.handle)
            .ok_or_else(|| SessionError::NotBound {
                peripheral: self.handle.peripheral().clone(),
            })
    }

    /// Returns the bound session for issuing operations.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NotBound`] if the session was released.
    pub fn session_mut(&mut self) -> Result<&mut DeviceSession, SessionError> {
        self.driver.manager_mut().session_mut(&self.handle)
    }

    /// Applies events until `done` holds or the session reports an error.
    ///
    /// # Errors
    ///
    /// Returns the first session error, or a timeout naming `operation`.
    pub async fn wait_until<F>(
        &mut self,
        mut done: F,
        operation: &'static str,
    ) -> Result<(), InteractionError>
    where
        F: FnMut() -> bool,
    {
        let errors = &mut self.errors;
        let mut failure = None;
        self.driver
            .pump_until(
                |_manager| {
                    if let Ok(error) = errors.try_recv() {
                        failure = Some(error);
                        return true;
                    }
                    done()
                },
                self.timeout,
                operation,
            )
            .await?;

        match failure {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    /// Applies events for `duration`. Ctrl+C ends the wait early without error.
    ///
    /// # Errors
    ///
    /// Returns the first session error, or an error if the event stream closes.
    pub async fn listen_for(&mut self, duration: Duration) -> Result<(), InteractionError> {
        match self.driver.pump_for(duration).await {
            Ok(()) | Err(InteractionError::Cancelled) => {}
            Err(error) => return Err(error),
        }
        self.take_error()
    }

    /// Applies the next event. Returns `false` once Ctrl+C was pressed.
    ///
    /// # Errors
    ///
    /// Returns the first session error, or an error if the event stream closes.
    pub async fn listen_next(&mut self) -> Result<bool, InteractionError> {
        match self.driver.pump_next().await {
            Ok(()) => {}
            Err(InteractionError::Cancelled) => return Ok(false),
            Err(error) => return Err(error),
        }
        self.take_error().map(|()| true)
    }

    fn take_error(&mut self) -> Result<(), InteractionError> {
        match self.errors.try_recv() {
            Ok(error) => Err(error.into()),
            Err(_) => Ok(()),
        }
    }

    /// Releases the session and disconnects the peripheral.
    ///
    /// # Errors
    ///
    /// Returns an error when the adapter rejects the disconnect.
    #[instrument(skip(self), fields(peripheral = %self.device.peripheral()), level = "debug")]
    pub fn close(mut self) -> Result<(), InteractionError> {
        self.driver.manager_mut().release(&self.handle)?;
        debug!("session released");
        Ok(())
    }
}

/// Forwards callback values into a channel drained between event pumps.
pub(crate) fn callback_channel<T>() -> (impl FnMut(T) + Send + 'static, UnboundedReceiver<T>)
where
    T: Send + 'static,
{
    let (sender, receiver) = mpsc::unbounded_channel();
    let forward = move |value: T| {
        if sender.send(value).is_err() {
            trace!("callback receiver dropped");
        }
    };
    (forward, receiver)
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        let outcome = tokio::select! {
            () = token.cancelled() => return,
            signal = tokio::signal::ctrl_c() => signal,
        };
        match outcome.map_err(|source| InteractionError::CtrlC { source }) {
            Ok(()) => {
                info!("Ctrl+C received, stopping");
                token.cancel();
            }
            Err(error) => warn!(%error, "Ctrl+C handling unavailable"),
        }
    });
}

/// Runs the CLI command with injected clients.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = blinky::Args::try_parse_from([
///     "blinky",
///     "--fake",
///     "--fake-scan",
///     "AA:BB:CC|Nordic_Blinky|-43|-",
///     "inspect",
/// ])?;
/// let (command, options, maybe_fake_args) = args.into_parts()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => blinky::fake_hardware_client(fake_args),
///     None => blinky::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// blinky::run(command, options, &mut out, hardware_client).await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run<W>(
    command: Command,
    options: SessionOptions,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
) -> Result<()>
where
    W: io::Write,
{
    run_with_log_level(
        command,
        options,
        out,
        hardware_client,
        None,
        OutputFormat::Pretty,
    )
    .await
}

/// Runs the CLI command with an explicit telemetry log-level override.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// let args = blinky::Args::try_parse_from([
///     "blinky",
///     "--log-level",
///     "debug",
///     "--fake",
///     "--fake-scan",
///     "AA:BB:CC|Nordic_Blinky|-43|-",
///     "led",
///     "on",
/// ])?;
/// let log_level = args.log_level();
/// let (command, options, maybe_fake_args) = args.into_parts()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => blinky::fake_hardware_client(fake_args),
///     None => blinky::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// blinky::run_with_log_level(
///     command,
///     options,
///     &mut out,
///     hardware_client,
///     log_level,
///     blinky::OutputFormat::Json,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
pub async fn run_with_log_level<W>(
    command: Command,
    options: SessionOptions,
    out: &mut W,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    run_with_clients_and_log_level(
        command,
        options,
        out,
        &SystemTerminalClient,
        hardware_client,
        log_level,
        output_format,
    )
    .await
}

/// Runs the CLI command with injected clients and explicit telemetry settings.
///
/// ```
/// # async fn run() -> anyhow::Result<()> {
/// use clap::Parser;
///
/// struct FakeTerminal;
/// impl blinky::TerminalClient for FakeTerminal {
///     fn stdout_is_terminal(&self) -> bool { false }
///     fn stderr_is_terminal(&self) -> bool { false }
/// }
///
/// let args = blinky::Args::try_parse_from([
///     "blinky",
///     "--log-level",
///     "trace",
///     "--fake",
///     "--fake-scan",
///     "AA:BB:CC|Nordic_Blinky|-43|-",
///     "scan",
/// ])?;
/// let log_level = args.log_level();
/// let (command, options, maybe_fake_args) = args.into_parts()?;
/// let hardware_client = match maybe_fake_args {
///     Some(fake_args) => blinky::fake_hardware_client(fake_args),
///     None => blinky::real_hardware_client(),
/// };
/// let mut out = Vec::new();
/// blinky::run_with_clients_and_log_level(
///     command,
///     options,
///     &mut out,
///     &FakeTerminal,
///     hardware_client,
///     log_level,
///     blinky::OutputFormat::Pretty,
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns an error if tracing initialisation fails, BLE interaction fails, or
/// output writing fails.
#[instrument(
    skip(options, out, terminal_client, hardware_client),
    level = "info",
    fields(command = %command_name(&command), ?log_level, ?output_format)
)]
pub async fn run_with_clients_and_log_level<W>(
    command: Command,
    options: SessionOptions,
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    hardware_client: Box<dyn HardwareClient>,
    log_level: Option<LogLevel>,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    telemetry::initialise_tracing(
        "blinky",
        terminal_client.stderr_is_terminal(),
        log_level.map(LogLevel::as_level_filter),
    )?;

    let handler = SessionHandler::new(hardware_client).with_options(options);
    let output = crate::cli::Output::new(out, terminal_client, output_format);
    match command {
        Command::Scan(args) => crate::cli::scan::run(handler, &args, output).await,
        Command::Inspect => crate::cli::inspect::run(handler, output).await,
        Command::Led(args) => crate::cli::led::run(handler, &args, output).await,
        Command::Button(args) => crate::cli::button::run(handler, &args, output).await,
        Command::Config(args) => crate::cli::config::run(handler, &args, output).await,
        Command::Mic(args) => crate::cli::mic::run(handler, &args, output).await,
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Scan(_args) => "scan",
        Command::Inspect => "inspect",
        Command::Led(_args) => "led",
        Command::Button(_args) => "button",
        Command::Config(_args) => "config",
        Command::Mic(_args) => "mic",
    }
}
