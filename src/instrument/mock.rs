//! Simulated analyzer for testing and offline operation.
//!
//! [`SimulatedOsa`] speaks the full AQ6315 command vocabulary in-process:
//! it tracks device-side parameter state, arms on `SGL`, reports sweep
//! status on `SWEEP?` and synthesizes deterministic data dumps for
//! `WDAT`/`LDAT`. It also provides call logging and failure injection so
//! integration tests can verify exactly what reached the wire.

use crate::instrument::transport::OsaTransport;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

const SENSITIVITY_CODES: [&str; 5] = ["SNHD", "SNAT", "SHI1", "SHI2", "SHI3"];

#[derive(Debug)]
struct SimState {
    active_trace: char,
    start_nm: f64,
    stop_nm: f64,
    reference_dbm: f64,
    resolution_nm: f64,
    sensitivity: String,
    sample_points: usize,
    sweep_polls_remaining: u32,
    sweeps_triggered: u32,
    call_log: Vec<String>,
    fail_prefix: Option<String>,
}

impl Default for SimState {
    fn default() -> Self {
        // Power-on defaults of the simulated device.
        Self {
            active_trace: 'A',
            start_nm: 600.0,
            stop_nm: 1750.0,
            reference_dbm: 0.0,
            resolution_nm: 1.0,
            sensitivity: "SNAT".to_string(),
            sample_points: 501,
            sweep_polls_remaining: 0,
            sweeps_triggered: 0,
            call_log: Vec::new(),
            fail_prefix: None,
        }
    }
}

/// In-process stand-in for the physical analyzer.
pub struct SimulatedOsa {
    state: Mutex<SimState>,
    /// How many `SWEEP?` polls report "still sweeping" after each `SGL`.
    polls_until_idle: u32,
    /// Offset applied to the reported point count of every data dump,
    /// for provoking integrity failures in tests.
    reported_count_skew: i64,
    /// Unit code prepended to `LDAT` headers (e.g. "DBM", "LNW"). `None`
    /// emits the bare-count header format.
    power_unit_code: Option<String>,
}

impl Default for SimulatedOsa {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedOsa {
    /// A simulated device that goes idle on the first status poll.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            polls_until_idle: 0,
            reported_count_skew: 0,
            power_unit_code: None,
        }
    }

    /// Report "still sweeping" for the first `polls` status queries after
    /// each `SGL`.
    pub fn with_polls_until_idle(mut self, polls: u32) -> Self {
        self.polls_until_idle = polls;
        self
    }

    /// Skew the reported point count of every data dump by `delta`.
    pub fn with_reported_count_skew(mut self, delta: i64) -> Self {
        self.reported_count_skew = delta;
        self
    }

    /// Emit `code` in the header of `LDAT` responses. "LNW" switches the
    /// synthesized payload to linear watts.
    pub fn with_power_unit_code(mut self, code: &str) -> Self {
        self.power_unit_code = Some(code.to_string());
        self
    }

    /// Fail the next command matching `prefix` with a transport error. The
    /// injection is one-shot: it clears once it fires.
    pub fn fail_next_matching(&self, prefix: &str) {
        self.lock().fail_prefix = Some(prefix.to_string());
    }

    /// Every command issued so far, oldest first.
    pub fn call_log(&self) -> Vec<String> {
        self.lock().call_log.clone()
    }

    /// Forget the call history (state is kept).
    pub fn clear_call_log(&self) {
        self.lock().call_log.clear();
    }

    /// Number of `SGL` commands received.
    pub fn sweeps_triggered(&self) -> u32 {
        self.lock().sweeps_triggered
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wavelength_axis(state: &SimState) -> Vec<f64> {
        let n = state.sample_points;
        let step = if n > 1 {
            (state.stop_nm - state.start_nm) / (n - 1) as f64
        } else {
            0.0
        };
        (0..n).map(|i| state.start_nm + step * i as f64).collect()
    }

    /// Synthetic power trace: a Gaussian peak at mid-span just below the
    /// reference level, over a noisy -65 dBm floor. Seeded per dump so
    /// repeated reads of the same sweep are reproducible.
    fn power_axis(state: &SimState) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(0xA631_5000 + state.sweeps_triggered as u64);
        let center = (state.start_nm + state.stop_nm) / 2.0;
        let span = state.stop_nm - state.start_nm;
        let sigma = (span / 40.0).max(state.resolution_nm);
        let floor = -65.0;
        let peak = state.reference_dbm - 5.0;
        Self::wavelength_axis(state)
            .iter()
            .map(|wl| {
                let envelope = (-((wl - center).powi(2)) / (2.0 * sigma * sigma)).exp();
                floor + (peak - floor) * envelope + rng.gen_range(-0.5..0.5)
            })
            .collect()
    }

    fn data_dump(&self, values: &[f64], header_code: Option<&str>, scientific: bool) -> String {
        let reported = values.len() as i64 + self.reported_count_skew;
        let header = match header_code {
            Some(code) => format!("{} {}", code, reported),
            None => reported.to_string(),
        };
        let mut out = header;
        for v in values {
            // Watt-scale samples are far below fixed-point resolution.
            if scientific {
                out.push_str(&format!(",{:.5e}", v));
            } else {
                out.push_str(&format!(",{:.5}", v));
            }
        }
        out
    }
}

#[async_trait]
impl OsaTransport for SimulatedOsa {
    async fn query(&self, command: &str) -> Result<String> {
        let mut state = self.lock();
        state.call_log.push(command.to_string());

        if let Some(prefix) = state.fail_prefix.clone() {
            if command.starts_with(&prefix) {
                state.fail_prefix = None;
                return Err(anyhow!("simulated transport failure on '{}'", command));
            }
        }

        if let Some(rest) = command.strip_prefix("ACTV") {
            let trace = rest
                .chars()
                .next()
                .ok_or_else(|| anyhow!("ACTV without trace letter"))?;
            state.active_trace = trace;
            return Ok("0".to_string());
        }
        if let Some(rest) = command.strip_prefix("STAWL") {
            state.start_nm = rest.parse()?;
            return Ok("0".to_string());
        }
        if let Some(rest) = command.strip_prefix("STPWL") {
            state.stop_nm = rest.parse()?;
            return Ok("0".to_string());
        }
        if let Some(rest) = command.strip_prefix("REFL") {
            state.reference_dbm = rest.parse()?;
            return Ok("0".to_string());
        }
        if let Some(rest) = command.strip_prefix("RESLN") {
            state.resolution_nm = rest.parse()?;
            return Ok("0".to_string());
        }
        if let Some(rest) = command.strip_prefix("SMPL") {
            state.sample_points = rest.parse()?;
            return Ok("0".to_string());
        }
        if SENSITIVITY_CODES.contains(&command) {
            state.sensitivity = command.to_string();
            return Ok("0".to_string());
        }
        if command == "SGL" {
            state.sweeps_triggered += 1;
            state.sweep_polls_remaining = self.polls_until_idle;
            return Ok("0".to_string());
        }
        if command == "SWEEP?" {
            return if state.sweep_polls_remaining > 0 {
                state.sweep_polls_remaining -= 1;
                Ok("1".to_string())
            } else {
                Ok("0".to_string())
            };
        }
        if let Some(rest) = command.strip_prefix("WDAT") {
            if rest.chars().next() != Some(state.active_trace) {
                return Err(anyhow!("WDAT for inactive trace '{}'", rest));
            }
            let values = Self::wavelength_axis(&state);
            return Ok(self.data_dump(&values, None, false));
        }
        if let Some(rest) = command.strip_prefix("LDAT") {
            if rest.chars().next() != Some(state.active_trace) {
                return Err(anyhow!("LDAT for inactive trace '{}'", rest));
            }
            let mut values = Self::power_axis(&state);
            let linear = self.power_unit_code.as_deref() == Some("LNW");
            if linear {
                for v in values.iter_mut() {
                    *v = 1e-3 * 10f64.powf(*v / 10.0);
                }
            }
            return Ok(self.data_dump(&values, self.power_unit_code.as_deref(), linear));
        }

        Err(anyhow!("unrecognized command '{}'", command))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracks_parameter_state_and_call_log() {
        let osa = SimulatedOsa::new();
        osa.query("ACTVB").await.unwrap();
        osa.query("STAWL1520.00").await.unwrap();
        osa.query("STPWL1570.00").await.unwrap();
        osa.query("SMPL101").await.unwrap();

        let dump = osa.query("WDATB").await.unwrap();
        let fields: Vec<&str> = dump.split(',').collect();
        assert_eq!(fields[0], "101");
        assert_eq!(fields.len(), 102);
        assert_eq!(fields[1].parse::<f64>().unwrap(), 1520.0);
        assert_eq!(fields[101].parse::<f64>().unwrap(), 1570.0);

        assert_eq!(
            osa.call_log(),
            vec!["ACTVB", "STAWL1520.00", "STPWL1570.00", "SMPL101", "WDATB"]
        );
    }

    #[tokio::test]
    async fn sweep_status_goes_idle_after_configured_polls() {
        let osa = SimulatedOsa::new().with_polls_until_idle(2);
        osa.query("SGL").await.unwrap();
        assert_eq!(osa.query("SWEEP?").await.unwrap(), "1");
        assert_eq!(osa.query("SWEEP?").await.unwrap(), "1");
        assert_eq!(osa.query("SWEEP?").await.unwrap(), "0");
        assert_eq!(osa.sweeps_triggered(), 1);
    }

    #[tokio::test]
    async fn failure_injection_is_one_shot() {
        let osa = SimulatedOsa::new();
        osa.fail_next_matching("REFL");
        assert!(osa.query("REFL-10.0").await.is_err());
        assert!(osa.query("REFL-10.0").await.is_ok());
    }

    #[tokio::test]
    async fn reads_of_inactive_trace_fail() {
        let osa = SimulatedOsa::new();
        osa.query("ACTVA").await.unwrap();
        assert!(osa.query("LDATC").await.is_err());
    }

    #[tokio::test]
    async fn count_skew_misreports_header() {
        let osa = SimulatedOsa::new().with_reported_count_skew(1);
        osa.query("SMPL50").await.unwrap();
        let dump = osa.query("WDATA").await.unwrap();
        let fields: Vec<&str> = dump.split(',').collect();
        assert_eq!(fields[0], "51");
        assert_eq!(fields.len() - 1, 50);
    }

    #[tokio::test]
    async fn lnw_header_reports_linear_watts() {
        let osa = SimulatedOsa::new().with_power_unit_code("LNW");
        osa.query("SMPL11").await.unwrap();
        let dump = osa.query("LDATA").await.unwrap();
        let header: Vec<&str> = dump.split(',').next().unwrap().split_whitespace().collect();
        assert_eq!(header, vec!["LNW", "11"]);
        // Linear watts are all positive; the dBm floor would be negative.
        let first: f64 = dump.split(',').nth(1).unwrap().parse().unwrap();
        assert!(first > 0.0);
    }
}
