//! Full-stack scans: orchestrator, motion controller, codec and the
//! simulated rack.

use std::time::Duration;

use alignment_bench::scan::{ScanOrchestrator, ScanRequest, CHANNELS};
use approx::assert_relative_eq;
use stage_hardware::apt::{
    msg_id, AxisId, ControllerConfig, MotionController, SimulatedController,
};

fn controller(sim: &SimulatedController) -> MotionController<SimulatedController> {
    let config = ControllerConfig {
        response_timeout: Duration::from_millis(200),
        ..ControllerConfig::immediate()
    };
    MotionController::new(sim.clone(), config)
}

/// Channel 0 follows `2 * position + 3` of the simulated axis.
fn linear_source(sim: &SimulatedController, axis: AxisId) -> impl FnMut() -> [f64; CHANNELS] {
    let sim = sim.clone();
    move || {
        let position = axis.raw_to_physical(sim.raw_position(axis));
        [2.0 * position + 3.0, 1.0, -position, 0.0]
    }
}

fn commanded_targets(sim: &SimulatedController) -> Vec<i32> {
    sim.received()
        .iter()
        .filter(|command| command.opcode == msg_id::MOVE_ABSOLUTE)
        .filter_map(|command| command.raw_target())
        .collect()
}

#[test]
fn test_five_stop_scan() {
    let sim = SimulatedController::new().with_moving_polls(2);
    let source = linear_source(&sim, AxisId::X);
    let mut scanner = ScanOrchestrator::new(controller(&sim), source, Duration::from_secs(5));

    let result = scanner
        .scan(&ScanRequest::new(AxisId::X, 0.0, 100.0, 5))
        .unwrap();

    assert_eq!(result.points.len(), 5);
    assert_eq!(result.commanded_positions(), vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    assert_eq!(result.actual_positions(), vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    assert_eq!(commanded_targets(&sim), vec![0, 50, 100, 150, 200]);

    assert_relative_eq!(result.slopes[0], 2.0, epsilon = 1e-9);
    assert_relative_eq!(result.slopes[2], -1.0, epsilon = 1e-9);
    assert_relative_eq!(result.fits[0].intercept, 3.0, epsilon = 1e-9);
    assert_eq!(scanner.history().latest(), Some(&result.slopes));
}

#[test]
fn test_scan_back_mirrors_sequence() {
    let sim = SimulatedController::new();
    let source = linear_source(&sim, AxisId::X);
    let mut scanner = ScanOrchestrator::new(controller(&sim), source, Duration::from_secs(5));

    let request = ScanRequest::new(AxisId::X, 0.0, 100.0, 5).with_scan_back(true);
    let result = scanner.scan(&request).unwrap();

    let positions = result.commanded_positions();
    assert_eq!(positions.len(), 10);
    let (forward, back) = positions.split_at(5);
    let mirrored: Vec<f64> = back.iter().rev().copied().collect();
    assert_eq!(forward, mirrored.as_slice());
}

#[test]
fn test_start_nearest_begins_at_far_end() {
    let sim = SimulatedController::new();
    sim.set_position(AxisId::X, 90.0);
    let source = linear_source(&sim, AxisId::X);
    let mut scanner = ScanOrchestrator::new(controller(&sim), source, Duration::from_secs(5));

    let request = ScanRequest::new(AxisId::X, 0.0, 100.0, 5).with_start_nearest(true);
    let result = scanner.scan(&request).unwrap();

    assert_eq!(result.points[0].commanded_position, 100.0);
    assert_eq!(commanded_targets(&sim)[0], 200);
    assert_relative_eq!(result.slopes[0], 2.0, epsilon = 1e-9);
}

#[test]
fn test_rotary_scan_reads_back_rounded_positions() {
    let sim = SimulatedController::new();
    let source = linear_source(&sim, AxisId::Rotary);
    let mut scanner = ScanOrchestrator::new(controller(&sim), source, Duration::from_secs(5));

    let result = scanner
        .scan(&ScanRequest::new(AxisId::Rotary, -0.5, 0.5, 4))
        .unwrap();

    for point in &result.points {
        assert!((point.actual_position - point.commanded_position).abs() <= 0.00006 + 1e-12);
    }
    assert_relative_eq!(result.slopes[0], 2.0, epsilon = 1e-9);
}

#[test]
fn test_scan_recovers_from_truncated_response() {
    let sim = SimulatedController::new().with_moving_polls(0);
    let source = linear_source(&sim, AxisId::Y);
    let mut scanner = ScanOrchestrator::new(controller(&sim), source, Duration::from_secs(5));

    sim.truncate_next_responses(1);
    let result = scanner
        .scan(&ScanRequest::new(AxisId::Y, 10.0, 20.0, 2))
        .unwrap();

    assert_eq!(result.actual_positions(), vec![10.0, 20.0]);
    // The first status query of the first settle wait was cut short and resent once
    assert_eq!(
        sim.count_received(msg_id::REQ_STATUS_UPDATE),
        2 * AxisId::ALL.len() + 1
    );
}
