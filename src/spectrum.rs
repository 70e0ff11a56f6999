//! Acquired spectrum result type.

use crate::acquisition::SweepRequest;
use crate::error::{AppResult, OsaError};
use crate::quantity::QuantityVec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One acquired spectrum: two equal-length channels plus the full parameter
/// set that produced them.
///
/// Carrying the complete request (not just the fields that changed on the
/// wire) gives downstream consumers such as display and export the
/// conditions of the measurement without consulting coordinator state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Spectrum {
    /// Wavelength axis, in nanometers.
    pub wavelength: QuantityVec,
    /// Power axis, in dBm or linear watts as reported by the instrument.
    pub power: QuantityVec,
    /// The parameter set this spectrum was acquired with.
    pub parameters: SweepRequest,
    /// UTC timestamp taken when both channels had been read.
    pub acquired_at: DateTime<Utc>,
}

impl Spectrum {
    /// Assemble a spectrum, enforcing the channel-length invariant.
    ///
    /// A length mismatch between the two channels is a data-integrity fault,
    /// never a silent truncation.
    pub fn new(
        wavelength: QuantityVec,
        power: QuantityVec,
        parameters: SweepRequest,
    ) -> AppResult<Self> {
        if wavelength.len() != power.len() {
            return Err(OsaError::DataIntegrity(format!(
                "channel length mismatch: {} wavelength points vs {} power points",
                wavelength.len(),
                power.len()
            )));
        }
        Ok(Self {
            wavelength,
            power,
            parameters,
            acquired_at: Utc::now(),
        })
    }

    /// Number of points in each channel.
    pub fn len(&self) -> usize {
        self.wavelength.len()
    }

    /// True when the spectrum holds no points.
    pub fn is_empty(&self) -> bool {
        self.wavelength.is_empty()
    }

    /// Wavelength and power of the strongest sample, if any.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.power
            .values()
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, &p)| (self.wavelength.values()[i], p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SweepRequest;
    use crate::instrument::aq6315::{Sensitivity, TraceSelector};
    use crate::quantity::{Quantity, Unit};

    fn request() -> SweepRequest {
        SweepRequest {
            trace: TraceSelector::A,
            start: Quantity::nanometers(1520.0),
            stop: Quantity::nanometers(1570.0),
            reference: Quantity::dbm(-10.0),
            resolution: Quantity::nanometers(0.1),
            sensitivity: Sensitivity::Auto,
            sample_points: None,
        }
    }

    #[test]
    fn mismatched_channel_lengths_are_rejected() {
        let wl = QuantityVec::new(vec![1520.0, 1545.0, 1570.0], Unit::Nanometer);
        let pw = QuantityVec::new(vec![-60.0, -20.0], Unit::Dbm);
        let err = Spectrum::new(wl, pw, request()).unwrap_err();
        assert!(matches!(err, OsaError::DataIntegrity(_)));
    }

    #[test]
    fn peak_finds_strongest_sample() {
        let wl = QuantityVec::new(vec![1520.0, 1545.0, 1570.0], Unit::Nanometer);
        let pw = QuantityVec::new(vec![-60.0, -12.5, -58.0], Unit::Dbm);
        let spectrum = Spectrum::new(wl, pw, request()).unwrap();
        assert_eq!(spectrum.len(), 3);
        let (wavelength, power) = spectrum.peak().unwrap();
        assert_eq!(wavelength, 1545.0);
        assert_eq!(power, -12.5);
    }
}
