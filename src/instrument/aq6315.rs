//! ANDO AQ6315-series instrument session.
//!
//! Sole owner of the device link: translates validated logical settings into
//! the analyzer's command vocabulary and owns the sweep-and-fetch protocol.
//! Every operation validates its input as a pure precondition, so a request
//! that is out of range never reaches the wire.
//!
//! The command set (reproduced bit-exact from the programming manual):
//!
//! | Command            | Effect                                   |
//! |--------------------|------------------------------------------|
//! | `ACTV{A\|B\|C}`    | select active trace                      |
//! | `STAWL{:.2}`       | start wavelength, nm                     |
//! | `STPWL{:.2}`       | stop wavelength, nm                      |
//! | `REFL{:.1}`        | reference level, dBm                     |
//! | `RESLN{:.2}`       | resolution bandwidth, nm                 |
//! | `SMPL{n}`          | sample point count                       |
//! | `SNHD`..`SHI3`     | sensitivity mode (bare code)             |
//! | `SGL`              | trigger single sweep                     |
//! | `SWEEP?`           | sweep status; `0` means idle             |
//! | `WDAT{t}`/`LDAT{t}`| wavelength / power data dump             |

use crate::config::{ResolutionLimits, Settings, SweepSettings};
use crate::error::{AppResult, OsaError};
use crate::instrument::transport::OsaTransport;
use crate::quantity::{Quantity, QuantityVec, Unit};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::sleep;

/// Hardware wavelength floor in nm.
pub const WAVELENGTH_MIN_NM: f64 = 600.0;
/// Hardware wavelength ceiling in nm.
pub const WAVELENGTH_MAX_NM: f64 = 1750.0;
/// Lowest accepted reference level in dBm.
pub const REFERENCE_MIN_DBM: f64 = -90.0;
/// Highest accepted reference level in dBm.
pub const REFERENCE_MAX_DBM: f64 = 20.0;
/// Smallest accepted sample point count.
pub const SAMPLE_POINTS_MIN: u32 = 11;
/// Largest accepted sample point count.
pub const SAMPLE_POINTS_MAX: u32 = 20001;

/// The analyzer's three display traces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceSelector {
    /// Trace A.
    A,
    /// Trace B.
    B,
    /// Trace C.
    C,
}

impl TraceSelector {
    /// Letter used in `ACTV`, `WDAT` and `LDAT` commands.
    pub fn letter(self) -> char {
        match self {
            TraceSelector::A => 'A',
            TraceSelector::B => 'B',
            TraceSelector::C => 'C',
        }
    }
}

impl fmt::Display for TraceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

impl FromStr for TraceSelector {
    type Err = OsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(TraceSelector::A),
            "B" | "b" => Ok(TraceSelector::B),
            "C" | "c" => Ok(TraceSelector::C),
            other => Err(OsaError::validation(
                "trace",
                format!("'{}' is not one of A, B, C", other),
            )),
        }
    }
}

/// Detector sensitivity modes, mapped to their fixed device codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sensitivity {
    /// Sweep with the sensitivity held at its current setting.
    Hold,
    /// Automatic sensitivity selection.
    Auto,
    /// High sensitivity, level 1.
    High1,
    /// High sensitivity, level 2.
    High2,
    /// High sensitivity, level 3.
    High3,
}

impl Sensitivity {
    /// All modes, in device-code order.
    pub const ALL: [Sensitivity; 5] = [
        Sensitivity::Hold,
        Sensitivity::Auto,
        Sensitivity::High1,
        Sensitivity::High2,
        Sensitivity::High3,
    ];

    /// The bare command this mode is written as.
    pub fn device_code(self) -> &'static str {
        match self {
            Sensitivity::Hold => "SNHD",
            Sensitivity::Auto => "SNAT",
            Sensitivity::High1 => "SHI1",
            Sensitivity::High2 => "SHI2",
            Sensitivity::High3 => "SHI3",
        }
    }
}

impl fmt::Display for Sensitivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Sensitivity::Hold => "Hold",
            Sensitivity::Auto => "Auto",
            Sensitivity::High1 => "High 1",
            Sensitivity::High2 => "High 2",
            Sensitivity::High3 => "High 3",
        };
        f.write_str(name)
    }
}

impl FromStr for Sensitivity {
    type Err = OsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-' && *c != '_')
            .collect();
        match normalized.as_str() {
            "hold" => Ok(Sensitivity::Hold),
            "auto" => Ok(Sensitivity::Auto),
            "high1" => Ok(Sensitivity::High1),
            "high2" => Ok(Sensitivity::High2),
            "high3" => Ok(Sensitivity::High3),
            _ => Err(OsaError::validation(
                "sensitivity",
                format!("'{}' is not one of Hold, Auto, High 1, High 2, High 3", s),
            )),
        }
    }
}

/// Which of the two parallel data channels to fetch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataChannel {
    /// The wavelength axis (`WDAT`), in nm.
    Wavelength,
    /// The power axis (`LDAT`), in dBm or linear watts.
    Power,
}

/// An open session to one analyzer.
pub struct OsaSession {
    transport: Arc<dyn OsaTransport>,
    sweep: SweepSettings,
    resolution_limits: ResolutionLimits,
}

impl OsaSession {
    /// Build a session over `transport` with protocol settings from config.
    pub fn new(transport: Arc<dyn OsaTransport>, settings: &Settings) -> Self {
        Self {
            transport,
            sweep: settings.instrument.sweep.clone(),
            resolution_limits: settings.instrument.resolution_limits.clone(),
        }
    }

    /// Resolution bounds this session validates against.
    pub fn resolution_limits(&self) -> &ResolutionLimits {
        &self.resolution_limits
    }

    async fn command(&self, command: &str) -> AppResult<String> {
        debug!("OSA <- {}", command);
        let response = self.transport.query(command).await.map_err(|e| {
            OsaError::DeviceCommunication {
                command: command.to_string(),
                reason: format!("{:#}", e),
            }
        })?;
        let response = response.trim().to_string();
        debug!("OSA -> {} byte response", response.len());
        Ok(response)
    }

    /// Pure precondition check for a wavelength range. Returns the bounds in
    /// nm on success, without touching the device.
    pub fn validate_wavelength_range(start: Quantity, stop: Quantity) -> AppResult<(f64, f64)> {
        let start_nm = start.to_unit(Unit::Nanometer)?.value();
        let stop_nm = stop.to_unit(Unit::Nanometer)?.value();
        for (field, nm) in [("start wavelength", start_nm), ("stop wavelength", stop_nm)] {
            if !(WAVELENGTH_MIN_NM..=WAVELENGTH_MAX_NM).contains(&nm) {
                return Err(OsaError::validation(
                    field,
                    format!(
                        "{} nm outside [{}, {}] nm",
                        nm, WAVELENGTH_MIN_NM, WAVELENGTH_MAX_NM
                    ),
                ));
            }
        }
        if start_nm >= stop_nm {
            return Err(OsaError::validation(
                "wavelength range",
                format!("start {} nm must be below stop {} nm", start_nm, stop_nm),
            ));
        }
        Ok((start_nm, stop_nm))
    }

    /// Pure precondition check for a reference level, in dBm.
    pub fn validate_reference_level(level: Quantity) -> AppResult<f64> {
        let dbm = level.to_unit(Unit::Dbm)?.value();
        if !(REFERENCE_MIN_DBM..=REFERENCE_MAX_DBM).contains(&dbm) {
            return Err(OsaError::validation(
                "reference level",
                format!(
                    "{} dBm outside [{}, {}] dBm",
                    dbm, REFERENCE_MIN_DBM, REFERENCE_MAX_DBM
                ),
            ));
        }
        Ok(dbm)
    }

    /// Pure precondition check for a resolution bandwidth, in nm. The bounds
    /// vary by firmware revision and come from configuration.
    pub fn validate_resolution(&self, resolution: Quantity) -> AppResult<f64> {
        let nm = resolution.to_unit(Unit::Nanometer)?.value();
        let limits = &self.resolution_limits;
        if !(limits.min_nm..=limits.max_nm).contains(&nm) {
            return Err(OsaError::validation(
                "resolution",
                format!("{} nm outside [{}, {}] nm", nm, limits.min_nm, limits.max_nm),
            ));
        }
        Ok(nm)
    }

    /// Pure precondition check for a sample point count.
    pub fn validate_sample_points(count: u32) -> AppResult<u32> {
        if !(SAMPLE_POINTS_MIN..=SAMPLE_POINTS_MAX).contains(&count) {
            return Err(OsaError::validation(
                "sample points",
                format!(
                    "{} outside [{}, {}]",
                    count, SAMPLE_POINTS_MIN, SAMPLE_POINTS_MAX
                ),
            ));
        }
        Ok(count)
    }

    /// Select the active trace. Later data reads depend on this selection.
    pub async fn set_active_trace(&self, trace: TraceSelector) -> AppResult<()> {
        self.command(&format!("ACTV{}", trace.letter())).await?;
        Ok(())
    }

    /// Write the sweep boundaries, start first.
    pub async fn set_wavelength_range(&self, start: Quantity, stop: Quantity) -> AppResult<()> {
        let (start_nm, stop_nm) = Self::validate_wavelength_range(start, stop)?;
        self.command(&format!("STAWL{:.2}", start_nm)).await?;
        self.command(&format!("STPWL{:.2}", stop_nm)).await?;
        Ok(())
    }

    /// Write the reference level.
    pub async fn set_reference_level(&self, level: Quantity) -> AppResult<()> {
        let dbm = Self::validate_reference_level(level)?;
        self.command(&format!("REFL{:.1}", dbm)).await?;
        Ok(())
    }

    /// Write the resolution bandwidth.
    pub async fn set_resolution(&self, resolution: Quantity) -> AppResult<()> {
        let nm = self.validate_resolution(resolution)?;
        self.command(&format!("RESLN{:.2}", nm)).await?;
        Ok(())
    }

    /// Write the sensitivity mode (sent as its bare device code).
    pub async fn set_sensitivity(&self, sensitivity: Sensitivity) -> AppResult<()> {
        self.command(sensitivity.device_code()).await?;
        Ok(())
    }

    /// Write the sample point count.
    pub async fn set_sample_points(&self, count: u32) -> AppResult<()> {
        let count = Self::validate_sample_points(count)?;
        self.command(&format!("SMPL{}", count)).await?;
        Ok(())
    }

    /// Trigger one sweep and block until the instrument reports idle.
    ///
    /// Polls `SWEEP?` at the configured interval; a response of `0` means the
    /// sweep is complete, anything else means it is still running. Exceeding
    /// the configured poll budget fails with [`OsaError::SweepTimeout`]
    /// instead of hanging on an unresponsive device.
    pub async fn sweep_single(&self) -> AppResult<()> {
        info!("Triggering single sweep");
        self.command("SGL").await?;
        for attempt in 1..=self.sweep.max_polls {
            sleep(self.sweep.poll_interval).await;
            let status = self.command("SWEEP?").await?;
            if status == "0" {
                info!("Sweep complete after {} status poll(s)", attempt);
                return Ok(());
            }
        }
        Err(OsaError::SweepTimeout {
            attempts: self.sweep.max_polls,
        })
    }

    /// Fetch one data channel of `trace` and decode it as a unit-tagged
    /// vector. The trace must already be the active one.
    pub async fn read_channel(
        &self,
        trace: TraceSelector,
        channel: DataChannel,
    ) -> AppResult<QuantityVec> {
        let command = match channel {
            DataChannel::Wavelength => format!("WDAT{}", trace.letter()),
            DataChannel::Power => format!("LDAT{}", trace.letter()),
        };
        let response = self.command(&command).await?;
        let dump = parse_data_dump(&command, &response)?;
        let unit = match channel {
            DataChannel::Wavelength => Unit::Nanometer,
            // Some firmware revisions tag the level dump with a unit code;
            // absent a code the analyzer is reporting dBm.
            DataChannel::Power => match &dump.unit_code {
                Some(code) => power_unit_from_code(code)?,
                None => Unit::Dbm,
            },
        };
        Ok(QuantityVec::new(dump.values, unit))
    }
}

#[derive(Debug)]
struct DataDump {
    unit_code: Option<String>,
    values: Vec<f64>,
}

/// Decode a `WDAT`/`LDAT` response: a leading metadata token holding the
/// reported point count (optionally preceded by a unit code), then that many
/// comma-separated floating-point values.
fn parse_data_dump(command: &str, response: &str) -> AppResult<DataDump> {
    let mut tokens = response.trim().split(',');
    let header = tokens.next().unwrap_or("").trim();

    let fields: Vec<&str> = header.split_whitespace().collect();
    let (unit_code, count_field) = match fields.as_slice() {
        [count] => (None, *count),
        [code, count] => (Some(code.to_string()), *count),
        _ => {
            return Err(OsaError::DeviceCommunication {
                command: command.to_string(),
                reason: format!("malformed data dump header '{}'", header),
            })
        }
    };

    let reported: usize = count_field.parse().map_err(|_| OsaError::DeviceCommunication {
        command: command.to_string(),
        reason: format!("unparseable point count '{}'", count_field),
    })?;

    let values = tokens
        .map(|t| {
            t.trim().parse::<f64>().map_err(|_| OsaError::DeviceCommunication {
                command: command.to_string(),
                reason: format!("unparseable sample '{}'", t.trim()),
            })
        })
        .collect::<AppResult<Vec<f64>>>()?;

    if values.len() != reported {
        return Err(OsaError::DataIntegrity(format!(
            "'{}' reported {} points but supplied {}",
            command,
            reported,
            values.len()
        )));
    }

    Ok(DataDump { unit_code, values })
}

/// Map a device power unit code to its unit. Only `DBM` and `LNW` (linear
/// watts) are recognized; anything else is a data-integrity fault rather
/// than a guess.
fn power_unit_from_code(code: &str) -> AppResult<Unit> {
    match code {
        "DBM" => Ok(Unit::Dbm),
        "LNW" => Ok(Unit::Watt),
        other => Err(OsaError::DataIntegrity(format!(
            "unrecognized power unit code '{}'",
            other
        ))),
    }
}
