//! Acquisition coordination: parameter diffing and sweep sequencing.
//!
//! The coordinator owns the "what changed since last time" decision so the
//! GPIB link only carries writes that actually alter device state. It holds
//! the last-applied parameter set as an explicit field (never ambient module
//! state), serializes acquisitions against the single non-reentrant
//! instrument link, and commits state all-or-nothing: a failed acquisition
//! can never leave the coordinator believing a parameter changed when the
//! sweep it was changed for never produced a spectrum.

use crate::error::{AppResult, OsaError};
use crate::instrument::aq6315::{DataChannel, OsaSession, Sensitivity, TraceSelector};
use crate::quantity::Quantity;
use crate::spectrum::Spectrum;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A complete requested parameter set, rebuilt by the caller for every
/// acquisition.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SweepRequest {
    /// Which display trace to acquire into.
    pub trace: TraceSelector,
    /// Start wavelength (a length quantity).
    pub start: Quantity,
    /// Stop wavelength (a length quantity).
    pub stop: Quantity,
    /// Reference level (a power quantity).
    pub reference: Quantity,
    /// Resolution bandwidth (a length quantity).
    pub resolution: Quantity,
    /// Detector sensitivity mode.
    pub sensitivity: Sensitivity,
    /// Sample point count; `None` leaves the device setting alone.
    pub sample_points: Option<u32>,
}

/// The last parameter values known to have been written to the device.
///
/// Every field starts out unknown and is only filled in after an acquisition
/// completes, so the first acquisition writes everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct AppliedSettings {
    /// Last selected trace, if any.
    pub trace: Option<TraceSelector>,
    /// Last written start wavelength.
    pub start: Option<Quantity>,
    /// Last written stop wavelength.
    pub stop: Option<Quantity>,
    /// Last written reference level.
    pub reference: Option<Quantity>,
    /// Last written resolution bandwidth.
    pub resolution: Option<Quantity>,
    /// Last written sensitivity mode.
    pub sensitivity: Option<Sensitivity>,
    /// Last written sample point count.
    pub sample_points: Option<u32>,
}

/// Which logical settings differ between the last-applied state and a
/// request, i.e. which device writes an acquisition must issue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SweepPlan {
    set_trace: bool,
    set_range: bool,
    set_reference: bool,
    set_resolution: bool,
    set_sensitivity: bool,
    set_sample_points: bool,
}

impl SweepPlan {
    /// Diff `request` against `applied`. Quantities compare unit-aware;
    /// enumerations and the point count compare exactly.
    fn diff(applied: &AppliedSettings, request: &SweepRequest) -> AppResult<SweepPlan> {
        fn quantity_changed(applied: Option<Quantity>, requested: Quantity) -> AppResult<bool> {
            match applied {
                None => Ok(true),
                Some(a) => Ok(!a.same_value(requested)?),
            }
        }

        Ok(SweepPlan {
            set_trace: applied.trace != Some(request.trace),
            set_range: quantity_changed(applied.start, request.start)?
                || quantity_changed(applied.stop, request.stop)?,
            set_reference: quantity_changed(applied.reference, request.reference)?,
            set_resolution: quantity_changed(applied.resolution, request.resolution)?,
            set_sensitivity: applied.sensitivity != Some(request.sensitivity),
            set_sample_points: match request.sample_points {
                None => false,
                Some(n) => applied.sample_points != Some(n),
            },
        })
    }
}

/// Sequences one acquisition at a time against an [`OsaSession`].
pub struct AcquisitionCoordinator {
    session: OsaSession,
    state: Mutex<AppliedSettings>,
}

impl AcquisitionCoordinator {
    /// Wrap `session` with an empty ("everything unknown") applied state.
    pub fn new(session: OsaSession) -> Self {
        Self {
            session,
            state: Mutex::new(AppliedSettings::default()),
        }
    }

    /// Read-only snapshot of the last-applied parameter set, for display.
    pub async fn last_applied(&self) -> AppliedSettings {
        *self.state.lock().await
    }

    /// Validate `request` as a pure precondition, with no device traffic.
    pub fn validate_request(&self, request: &SweepRequest) -> AppResult<()> {
        OsaSession::validate_wavelength_range(request.start, request.stop)?;
        OsaSession::validate_reference_level(request.reference)?;
        self.session.validate_resolution(request.resolution)?;
        if let Some(n) = request.sample_points {
            OsaSession::validate_sample_points(n)?;
        }
        Ok(())
    }

    /// Run one full acquisition: apply the changed parameters, sweep, fetch
    /// and decode both channels, and return the assembled spectrum.
    ///
    /// The instrument link is a single shared, non-reentrant resource; while
    /// one acquisition is outstanding, further requests fail with
    /// [`OsaError::AcquisitionInProgress`] rather than interleaving writes.
    ///
    /// On any failure the acquisition aborts and the last-applied state is
    /// left at its pre-acquisition value. The core never retries; a repeated
    /// sweep costs real time, so that decision belongs to the caller.
    pub async fn acquire(&self, request: SweepRequest) -> AppResult<Spectrum> {
        let mut applied = self
            .state
            .try_lock()
            .map_err(|_| OsaError::AcquisitionInProgress)?;

        // Reject out-of-range requests before anything reaches the wire.
        self.validate_request(&request)?;

        let plan = SweepPlan::diff(&applied, &request)?;
        debug!("Acquisition plan: {:?}", plan);

        // Active trace first: subsequent reads depend on the selection.
        if plan.set_trace {
            self.session.set_active_trace(request.trace).await?;
        }
        if plan.set_range {
            self.session
                .set_wavelength_range(request.start, request.stop)
                .await?;
        }
        if plan.set_reference {
            self.session.set_reference_level(request.reference).await?;
        }
        if plan.set_resolution {
            self.session.set_resolution(request.resolution).await?;
        }
        if plan.set_sensitivity {
            self.session.set_sensitivity(request.sensitivity).await?;
        }
        if let (true, Some(n)) = (plan.set_sample_points, request.sample_points) {
            self.session.set_sample_points(n).await?;
        }

        self.session.sweep_single().await?;

        let wavelength = self
            .session
            .read_channel(request.trace, DataChannel::Wavelength)
            .await?;
        let power = self
            .session
            .read_channel(request.trace, DataChannel::Power)
            .await?;

        let spectrum = Spectrum::new(wavelength, power, request)?;
        info!(
            "Acquired {} points on trace {} ({} .. {})",
            spectrum.len(),
            request.trace,
            request.start,
            request.stop
        );

        // Commit the full request, changed and unchanged fields alike, only
        // now that the whole acquisition has succeeded.
        let prior_points = applied.sample_points;
        *applied = AppliedSettings {
            trace: Some(request.trace),
            start: Some(request.start),
            stop: Some(request.stop),
            reference: Some(request.reference),
            resolution: Some(request.resolution),
            sensitivity: Some(request.sensitivity),
            sample_points: request.sample_points.or(prior_points),
        };

        Ok(spectrum)
    }
}
