//! Unit-tagged physical quantities.
//!
//! The instrument deals in exactly three units: nanometers for the wavelength
//! axis, and dBm or linear watts for optical power. A [`Quantity`] pairs a
//! scalar with its unit and only allows comparison after explicit conversion
//! to a common unit; relating a length to a power fails fast with
//! [`OsaError::IncompatibleUnit`] instead of silently producing a nonsense
//! number.
//!
//! The only non-linear conversion is dBm <-> watt, which is the power ratio
//! in dB relative to 1 mW: `dBm = 10 * log10(mW)`.

use crate::error::{AppResult, OsaError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical dimension of a unit. Conversion is only defined within one
/// dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dimension {
    /// Lengths (wavelengths).
    Length,
    /// Optical power levels, absolute or logarithmic.
    Power,
}

/// The fixed set of units this instrument reports or accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    /// Wavelength in nanometers.
    Nanometer,
    /// Power in dB relative to 1 mW.
    Dbm,
    /// Power in linear watts.
    Watt,
}

impl Unit {
    /// The physical dimension this unit measures.
    pub fn dimension(self) -> Dimension {
        match self {
            Unit::Nanometer => Dimension::Length,
            Unit::Dbm | Unit::Watt => Dimension::Power,
        }
    }

    /// Conventional symbol, used in display and plot labels.
    pub fn symbol(self) -> &'static str {
        match self {
            Unit::Nanometer => "nm",
            Unit::Dbm => "dBm",
            Unit::Watt => "W",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An immutable scalar tagged with its unit.
///
/// Constructed at the point a raw device value or user input enters the
/// system; converted (never mutated) when a different unit is needed
/// downstream.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Quantity {
    value: f64,
    unit: Unit,
}

impl Quantity {
    /// Tag `value` with `unit`.
    pub fn new(value: f64, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// A wavelength in nanometers.
    pub fn nanometers(value: f64) -> Self {
        Self::new(value, Unit::Nanometer)
    }

    /// A power level in dBm.
    pub fn dbm(value: f64) -> Self {
        Self::new(value, Unit::Dbm)
    }

    /// A power in linear watts.
    pub fn watts(value: f64) -> Self {
        Self::new(value, Unit::Watt)
    }

    /// The raw scalar, in this quantity's own unit.
    pub fn value(self) -> f64 {
        self.value
    }

    /// The unit tag.
    pub fn unit(self) -> Unit {
        self.unit
    }

    /// Convert to `target`, failing if the dimensions differ.
    pub fn to_unit(self, target: Unit) -> AppResult<Quantity> {
        if self.unit == target {
            return Ok(self);
        }
        if self.unit.dimension() != target.dimension() {
            return Err(OsaError::IncompatibleUnit {
                lhs: self.unit,
                rhs: target,
            });
        }
        let value = match (self.unit, target) {
            // dBm -> W: P = 1 mW * 10^(dBm / 10)
            (Unit::Dbm, Unit::Watt) => 1e-3 * 10f64.powf(self.value / 10.0),
            // W -> dBm: dBm = 10 * log10(P / 1 mW)
            (Unit::Watt, Unit::Dbm) => 10.0 * (self.value / 1e-3).log10(),
            // Same-unit case handled above; Length has a single unit.
            _ => self.value,
        };
        Ok(Quantity::new(value, target))
    }

    /// Unit-aware equality: `other` is converted to this quantity's unit and
    /// the scalars compared. Fails on incompatible dimensions.
    ///
    /// Comparison allows a tiny relative tolerance so values that round-trip
    /// through the non-linear dBm/watt conversion still compare equal.
    pub fn same_value(self, other: Quantity) -> AppResult<bool> {
        let other = other.to_unit(self.unit)?;
        if self.value == other.value {
            return Ok(true);
        }
        let scale = self.value.abs().max(other.value.abs());
        Ok((self.value - other.value).abs() <= scale * 1e-9)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// An immutable numeric vector sharing a single unit tag.
///
/// Used for the wavelength and power channels of a spectrum, where tagging
/// every sample individually would be wasteful.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuantityVec {
    values: Vec<f64>,
    unit: Unit,
}

impl QuantityVec {
    /// Tag `values` with `unit`.
    pub fn new(values: Vec<f64>, unit: Unit) -> Self {
        Self { values, unit }
    }

    /// The raw samples, in this vector's own unit.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// The shared unit tag.
    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when the vector holds no samples.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Convert every sample to `target`, failing if the dimensions differ.
    pub fn to_unit(&self, target: Unit) -> AppResult<QuantityVec> {
        if self.unit == target {
            return Ok(self.clone());
        }
        let converted = self
            .values
            .iter()
            .map(|&v| Quantity::new(v, self.unit).to_unit(target).map(Quantity::value))
            .collect::<AppResult<Vec<f64>>>()?;
        Ok(QuantityVec::new(converted, target))
    }
}
