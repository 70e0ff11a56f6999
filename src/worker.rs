//! Background execution contract.
//!
//! An acquisition blocks for device-dependent seconds in the sweep-wait
//! loop, so an interactive caller must never run it on its own thread. This
//! module is the whole contract: spawn the acquisition as one unit of work
//! on the runtime and deliver its outcome (spectrum or structured error)
//! back over a oneshot channel the caller can await or poll.
//!
//! Dropping the receiver abandons the *result* only; the acquisition itself
//! runs to completion (there is no mid-sweep cancellation) and the
//! coordinator's state stays consistent.

use crate::acquisition::{AcquisitionCoordinator, SweepRequest};
use crate::error::AppResult;
use crate::spectrum::Spectrum;
use log::warn;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Run `request` on the runtime and hand back a receiver for the outcome.
pub fn spawn_acquisition(
    coordinator: Arc<AcquisitionCoordinator>,
    request: SweepRequest,
) -> oneshot::Receiver<AppResult<Spectrum>> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = coordinator.acquire(request).await;
        if tx.send(result).is_err() {
            warn!("Acquisition result abandoned by caller");
        }
    });
    rx
}
