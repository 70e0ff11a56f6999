//! Transport abstraction for the instrument link.
//!
//! The analyzer speaks a query-response protocol over GPIB: every command,
//! including the ones that only change device state, is issued as a query
//! and acknowledged in the response. Abstracting that single operation
//! behind a trait lets the session run against a simulated device in tests
//! and offline mode.

use anyhow::Result;
use async_trait::async_trait;

#[cfg(feature = "instrument_visa")]
use anyhow::{anyhow, Context};
#[cfg(feature = "instrument_visa")]
use log::debug;
#[cfg(feature = "instrument_visa")]
use std::io::Write;
#[cfg(feature = "instrument_visa")]
use std::sync::{Arc, Mutex};
#[cfg(feature = "instrument_visa")]
use std::time::Duration;

/// Synchronous-semantics query channel to the analyzer.
///
/// Implementations hold the one open handle for the process lifetime; the
/// core does not manage connection lifecycle beyond that.
#[async_trait]
pub trait OsaTransport: Send + Sync {
    /// Send `command` and return the instrument's raw response.
    async fn query(&self, command: &str) -> Result<String>;
}

/// VISA-backed transport for GPIB instruments.
///
/// Wraps the `visa-rs` crate and executes the blocking VISA I/O on Tokio's
/// blocking-task executor so the runtime is never stalled by the bus.
///
/// Supports resource strings like:
/// - "GPIB0::3::INSTR" (GPIB interface)
/// - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
#[cfg(feature = "instrument_visa")]
pub struct VisaTransport {
    resource_string: String,
    timeout: Duration,
    line_terminator: String,
    instrument: Arc<Mutex<visa_rs::Instrument>>,
}

#[cfg(feature = "instrument_visa")]
impl VisaTransport {
    /// Open the VISA resource and hold the session for the process lifetime.
    pub fn open(resource_string: &str, timeout: Duration) -> Result<Self> {
        use std::ffi::CString;
        use visa_rs::prelude::*;

        let rm = DefaultRM::new().context("Failed to create VISA resource manager")?;
        let c_string = CString::new(resource_string).context("Failed to create CString")?;
        let visa_string = visa_rs::VisaString::from(c_string);
        let instrument = rm
            .open(&visa_string, AccessMode::NO_LOCK, timeout)
            .with_context(|| format!("Failed to open VISA resource: {}", resource_string))?;

        debug!(
            "VISA resource '{}' opened with {}ms timeout",
            resource_string,
            timeout.as_millis()
        );

        Ok(Self {
            resource_string: resource_string.to_string(),
            timeout,
            line_terminator: "\n".to_string(),
            instrument: Arc::new(Mutex::new(instrument)),
        })
    }

    /// Set the line terminator appended to commands (default "\n").
    pub fn with_line_terminator(mut self, terminator: String) -> Self {
        self.line_terminator = terminator;
        self
    }

    /// Resource string this transport was opened with.
    pub fn resource_string(&self) -> &str {
        &self.resource_string
    }
}

#[cfg(feature = "instrument_visa")]
#[async_trait]
impl OsaTransport for VisaTransport {
    async fn query(&self, command: &str) -> Result<String> {
        let command_str = format!("{}{}", command, self.line_terminator);
        let command_for_log = command.to_string();
        let instrument = self.instrument.clone();
        let timeout = self.timeout;

        // Execute blocking VISA I/O on a dedicated thread.
        tokio::task::spawn_blocking(move || {
            let mut session = instrument
                .lock()
                .map_err(|_| anyhow!("VISA session lock poisoned"))?;

            session
                .write_all(command_str.as_bytes())
                .with_context(|| format!("VISA write failed for: {}", command_for_log))?;

            // Data dumps can run to hundreds of kilobytes; accumulate until
            // the terminating newline arrives or the device stops sending.
            let deadline = std::time::Instant::now() + timeout;
            let response = read_until_newline(&mut *session, deadline)
                .with_context(|| format!("VISA read failed for: {}", command_for_log))?;

            let response = String::from_utf8_lossy(&response).trim().to_string();
            debug!("VISA query '{}' -> {} bytes", command_for_log, response.len());
            Ok(response)
        })
        .await
        .context("VISA I/O task panicked")?
    }
}

/// Accumulate reads until the terminating newline arrives. A short read is
/// a partial chunk, not end of message; only a zero-length read ends the
/// stream early, and the point-count check downstream flags any truncation.
#[cfg(any(test, feature = "instrument_visa"))]
fn read_until_newline(
    reader: &mut impl std::io::Read,
    deadline: std::time::Instant,
) -> Result<Vec<u8>> {
    let mut response = Vec::new();
    let mut buf = [0u8; 16 * 1024];
    loop {
        let bytes_read = reader.read(&mut buf)?;
        response.extend_from_slice(&buf[..bytes_read]);
        if response.ends_with(b"\n") || bytes_read == 0 {
            return Ok(response);
        }
        if std::time::Instant::now() > deadline {
            anyhow::bail!("read timed out before the line terminator arrived");
        }
    }
}
