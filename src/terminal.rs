use std::io::{self, IsTerminal};

/// Reports whether the process streams are attached to a terminal.
///
/// Injected so output styling and progress rendering can be decided without
/// touching the real streams in tests.
pub trait TerminalClient {
    fn stdout_is_terminal(&self) -> bool;
    fn stderr_is_terminal(&self) -> bool;
}

/// Queries the real process streams.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SystemTerminalClient;

impl TerminalClient for SystemTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        io::stdout().is_terminal()
    }

    fn stderr_is_terminal(&self) -> bool {
        io::stderr().is_terminal()
    }
}
