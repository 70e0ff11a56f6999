//! End-to-end acquisition tests against the simulated instrument.
//!
//! These exercise the coordinator's diffing, write ordering, failure
//! handling and state atomicity exactly as a GUI front-end would drive it.

use osa_daq::acquisition::{AcquisitionCoordinator, SweepRequest};
use osa_daq::config::Settings;
use osa_daq::error::OsaError;
use osa_daq::instrument::aq6315::{OsaSession, Sensitivity, TraceSelector};
use osa_daq::instrument::mock::SimulatedOsa;
use osa_daq::quantity::{Quantity, Unit};
use std::sync::Arc;
use std::time::Duration;

const SET_PREFIXES: [&str; 6] = ["ACTV", "STAWL", "STPWL", "REFL", "RESLN", "SMPL"];
const SENSITIVITY_CODES: [&str; 5] = ["SNHD", "SNAT", "SHI1", "SHI2", "SHI3"];

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.instrument.sweep.poll_interval = Duration::from_millis(1);
    settings.instrument.sweep.max_polls = 10;
    settings
}

fn coordinator_over(osa: Arc<SimulatedOsa>) -> AcquisitionCoordinator {
    AcquisitionCoordinator::new(OsaSession::new(osa, &fast_settings()))
}

fn standard_request() -> SweepRequest {
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

fn is_set_command(command: &str) -> bool {
    SET_PREFIXES.iter().any(|p| command.starts_with(p))
        || SENSITIVITY_CODES.contains(&command)
}

#[tokio::test]
async fn first_acquisition_writes_everything_in_order() {
    let osa = Arc::new(SimulatedOsa::new().with_polls_until_idle(1));
    let coordinator = coordinator_over(osa.clone());

    let spectrum = coordinator.acquire(standard_request()).await.unwrap();
    assert_eq!(spectrum.wavelength.len(), spectrum.power.len());
    assert!(!spectrum.is_empty());

    let log = osa.call_log();
    // Five logical "set" writes: trace, range (two boundary commands),
    // reference, resolution, sensitivity, then the sweep and both reads.
    assert_eq!(
        log,
        vec![
            "ACTVA",
            "STAWL1520.00",
            "STPWL1570.00",
            "REFL-10.0",
            "RESLN0.10",
            "SNAT",
            "SGL",
            "SWEEP?",
            "SWEEP?",
            "WDATA",
            "LDATA",
        ]
    );
}

#[tokio::test]
async fn identical_repeat_issues_no_set_writes() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa.clone());

    coordinator.acquire(standard_request()).await.unwrap();
    osa.clear_call_log();

    coordinator.acquire(standard_request()).await.unwrap();
    let log = osa.call_log();
    assert!(
        log.iter().all(|c| !is_set_command(c)),
        "unexpected set writes: {:?}",
        log
    );
    // Still exactly one sweep and one pair of reads.
    assert_eq!(log.iter().filter(|c| *c == "SGL").count(), 1);
    assert_eq!(log.iter().filter(|c| *c == "WDATA").count(), 1);
    assert_eq!(log.iter().filter(|c| *c == "LDATA").count(), 1);
}

#[tokio::test]
async fn reference_only_change_issues_one_set_write() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa.clone());

    coordinator.acquire(standard_request()).await.unwrap();
    osa.clear_call_log();

    let mut changed = standard_request();
    changed.reference = Quantity::dbm(-20.0);
    coordinator.acquire(changed).await.unwrap();

    let log = osa.call_log();
    let sets: Vec<&String> = log.iter().filter(|c| is_set_command(c)).collect();
    assert_eq!(sets, vec!["REFL-20.0"]);
    // The set write lands before the sweep trigger.
    let refl_idx = log.iter().position(|c| c == "REFL-20.0").unwrap();
    let sgl_idx = log.iter().position(|c| c == "SGL").unwrap();
    assert!(refl_idx < sgl_idx);
}

#[tokio::test]
async fn reference_restated_in_watts_is_not_a_change() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa.clone());

    coordinator.acquire(standard_request()).await.unwrap();
    osa.clear_call_log();

    // -10 dBm expressed as 0.1 mW: unit-aware diffing sees no change.
    let mut rephrased = standard_request();
    rephrased.reference = Quantity::new(1e-4, Unit::Watt);
    coordinator.acquire(rephrased).await.unwrap();
    assert!(osa.call_log().iter().all(|c| !is_set_command(c)));
}

#[tokio::test]
async fn sample_point_request_is_written_last() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa.clone());

    let mut request = standard_request();
    request.sample_points = Some(101);
    coordinator.acquire(request).await.unwrap();

    let log = osa.call_log();
    let smpl_idx = log.iter().position(|c| c == "SMPL101").unwrap();
    let snat_idx = log.iter().position(|c| c == "SNAT").unwrap();
    let sgl_idx = log.iter().position(|c| c == "SGL").unwrap();
    assert!(snat_idx < smpl_idx && smpl_idx < sgl_idx);

    // The dump honors the requested count.
    assert_eq!(coordinator.last_applied().await.sample_points, Some(101));
}

#[tokio::test]
async fn invalid_request_issues_no_device_traffic() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa.clone());

    let mut inverted = standard_request();
    inverted.start = Quantity::nanometers(1570.0);
    inverted.stop = Quantity::nanometers(1520.0);
    let err = coordinator.acquire(inverted).await.unwrap_err();
    assert!(matches!(err, OsaError::Validation { .. }));
    assert!(osa.call_log().is_empty());

    let mut bad_points = standard_request();
    bad_points.sample_points = Some(5);
    let err = coordinator.acquire(bad_points).await.unwrap_err();
    assert!(matches!(err, OsaError::Validation { .. }));
    assert!(osa.call_log().is_empty());
}

#[tokio::test]
async fn read_failure_leaves_applied_state_unchanged() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa.clone());

    osa.fail_next_matching("WDAT");
    let err = coordinator.acquire(standard_request()).await.unwrap_err();
    assert!(matches!(err, OsaError::DeviceCommunication { .. }));

    // Nothing was committed...
    let applied = coordinator.last_applied().await;
    assert!(applied.trace.is_none());
    assert!(applied.reference.is_none());

    // ...so the next acquisition re-applies every parameter.
    osa.clear_call_log();
    coordinator.acquire(standard_request()).await.unwrap();
    let log = osa.call_log();
    assert!(log.contains(&"ACTVA".to_string()));
    assert!(log.contains(&"REFL-10.0".to_string()));
}

#[tokio::test]
async fn set_failure_aborts_before_the_sweep() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa.clone());

    osa.fail_next_matching("RESLN");
    let err = coordinator.acquire(standard_request()).await.unwrap_err();
    match err {
        OsaError::DeviceCommunication { command, .. } => {
            assert!(command.starts_with("RESLN"))
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(osa.sweeps_triggered(), 0);
    assert!(coordinator.last_applied().await.resolution.is_none());
}

#[tokio::test]
async fn misreported_point_count_is_an_integrity_fault() {
    let osa = Arc::new(SimulatedOsa::new().with_reported_count_skew(1));
    let coordinator = coordinator_over(osa.clone());

    let err = coordinator.acquire(standard_request()).await.unwrap_err();
    assert!(matches!(err, OsaError::DataIntegrity(_)));
    assert!(coordinator.last_applied().await.trace.is_none());
}

#[tokio::test]
async fn concurrent_acquisition_is_rejected_not_queued() {
    // A slow sweep holds the link for several poll intervals.
    let osa = Arc::new(SimulatedOsa::new().with_polls_until_idle(8));
    let mut settings = fast_settings();
    settings.instrument.sweep.poll_interval = Duration::from_millis(20);
    let coordinator = Arc::new(AcquisitionCoordinator::new(OsaSession::new(
        osa.clone(),
        &settings,
    )));

    let first = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.acquire(standard_request()).await })
    };

    // Wait until the first acquisition has reached the device.
    let mut waited = Duration::ZERO;
    while osa.sweeps_triggered() == 0 && waited < Duration::from_secs(1) {
        tokio::time::sleep(Duration::from_millis(2)).await;
        waited += Duration::from_millis(2);
    }

    let err = coordinator.acquire(standard_request()).await.unwrap_err();
    assert!(matches!(err, OsaError::AcquisitionInProgress));

    // The outstanding acquisition is unaffected.
    let spectrum = first.await.unwrap().unwrap();
    assert!(!spectrum.is_empty());
    assert_eq!(osa.sweeps_triggered(), 1);
}

#[tokio::test]
async fn spectrum_carries_the_full_request_for_provenance() {
    let osa = Arc::new(SimulatedOsa::new());
    let coordinator = coordinator_over(osa);

    // Second acquisition changes nothing on the wire, yet its spectrum
    // still carries the complete parameter set.
    coordinator.acquire(standard_request()).await.unwrap();
    let spectrum = coordinator.acquire(standard_request()).await.unwrap();

    assert_eq!(spectrum.parameters.trace, TraceSelector::A);
    assert_eq!(spectrum.parameters.sensitivity, Sensitivity::Auto);
    assert!(spectrum
        .parameters
        .reference
        .same_value(Quantity::dbm(-10.0))
        .unwrap());
    assert_eq!(spectrum.wavelength.unit(), Unit::Nanometer);
    assert_eq!(spectrum.power.unit(), Unit::Dbm);
}

#[tokio::test]
async fn linear_watt_instrument_revision_is_supported_end_to_end() {
    let osa = Arc::new(SimulatedOsa::new().with_power_unit_code("LNW"));
    let coordinator = coordinator_over(osa);

    let spectrum = coordinator.acquire(standard_request()).await.unwrap();
    assert_eq!(spectrum.power.unit(), Unit::Watt);

    // Converting the channel back to dBm keeps the length and stays finite.
    let dbm = spectrum.power.to_unit(Unit::Dbm).unwrap();
    assert_eq!(dbm.len(), spectrum.len());
    assert!(dbm.values().iter().all(|v| v.is_finite()));
}
