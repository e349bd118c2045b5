//! Pipeline regression tests
//!
//! End-to-end coverage of the control pipeline's numeric behavior:
//! filter convergence, speed clamping, ramp snapping, per-line isolation,
//! and the manual-command cycle-time equivalence.

use chrono::Utc;
use linepace::config::ControlSettings;
use linepace::control::{ControlError, ControlPipeline};
use linepace::types::{ChainStateUpdate, ControlStatus, CycleTimeSample};

fn sample(line_id: &str, ct_minutes: f64) -> CycleTimeSample {
    CycleTimeSample {
        line_id: line_id.to_string(),
        cycle_time_minutes: ct_minutes,
        timestamp: Utc::now(),
    }
}

fn spec_settings() -> ControlSettings {
    ControlSettings {
        ct_filter_window_samples: 3,
        ct_to_speed_factor: 1.0,
        speed_min: 20.0,
        speed_max: 80.0,
        voltage_min: 0.0,
        voltage_max: 10.0,
        ramp_rate_v_per_sec: 1.0,
        ..ControlSettings::default()
    }
}

#[test]
fn filter_converges_to_value_once_window_full() {
    let pipeline = ControlPipeline::new(ControlSettings {
        ct_filter_window_samples: 4,
        ..ControlSettings::default()
    });

    // Before fill: running mean of samples seen so far
    let r1 = pipeline.process(&sample("L1", 2.0), None).unwrap();
    assert!((r1.filtered_ct_seconds - 120.0).abs() < 1e-9);
    let r2 = pipeline.process(&sample("L1", 4.0), None).unwrap();
    assert!((r2.filtered_ct_seconds - 180.0).abs() < 1e-9); // mean(2,4)=3 min

    // Fill the window with identical samples; the mean must converge on them
    let mut last = r2;
    for _ in 0..4 {
        last = pipeline.process(&sample("L1", 3.0), None).unwrap();
    }
    assert!((last.filtered_ct_seconds - 180.0).abs() < 1e-9);
}

#[test]
fn speed_saturates_at_band_edges() {
    let pipeline = ControlPipeline::new(spec_settings());

    // Tiny cycle time → speed pinned at speed_max
    let fast = pipeline.process(&sample("FAST", 1e-6), None).unwrap();
    assert!((fast.speed_used - 80.0).abs() < 1e-12);

    // Huge cycle time → speed pinned at speed_min
    let slow = pipeline.process(&sample("SLOW", 1e6), None).unwrap();
    assert!((slow.speed_used - 20.0).abs() < 1e-12);
}

#[test]
fn spec_scenario_immediate_resample_stays_at_floor() {
    // window=3, factor=1.0, speeds [20,80], voltages [0,10], ramp 1 V/s.
    // ct=1.0 min then immediately ct=0.5 min:
    //   filtered = (1.0+0.5)/2 = 0.75 min → raw speed ≈ 1.33 → clamped 20
    //   → mapped voltage 0 → first application snapped to 0.
    let pipeline = ControlPipeline::new(spec_settings());

    let first = pipeline.process(&sample("L1", 1.0), None).unwrap();
    assert_eq!(first.status, ControlStatus::Valid);
    assert!((first.speed_used - 20.0).abs() < 1e-12);
    assert!((first.voltage - 0.0).abs() < 1e-12);

    let second = pipeline.process(&sample("L1", 0.5), None).unwrap();
    assert!((second.filtered_ct_seconds - 45.0).abs() < 1e-9);
    assert!((second.speed_used - 20.0).abs() < 1e-12);
    assert!((second.voltage - 0.0).abs() < 1e-12);
}

#[test]
fn outputs_always_within_configured_ranges() {
    let pipeline = ControlPipeline::new(spec_settings());
    for (i, ct) in [0.001, 0.01, 0.0125, 0.05, 0.5, 1.0, 30.0, 1e5]
        .iter()
        .enumerate()
    {
        let result = pipeline
            .process(&sample(&format!("L{i}"), *ct), None)
            .unwrap();
        assert!(
            (20.0..=80.0).contains(&result.speed_used),
            "speed {} out of band for ct {}",
            result.speed_used,
            ct
        );
        assert!(
            (0.0..=10.0).contains(&result.voltage),
            "voltage {} out of range for ct {}",
            result.voltage,
            ct
        );
    }
}

#[test]
fn lines_are_isolated_from_each_other() {
    let pipeline = ControlPipeline::new(spec_settings());

    // Interleaved submission order across two lines
    pipeline.process(&sample("A", 1.0), None).unwrap();
    pipeline.process(&sample("B", 0.0125), None).unwrap(); // 80-speed territory
    pipeline.process(&sample("A", 1.0), None).unwrap();
    let b = pipeline.process(&sample("B", 0.0125), None).unwrap();
    let a = pipeline.process(&sample("A", 1.0), None).unwrap();

    // Each line's filter saw only its own samples
    assert!((a.filtered_ct_seconds - 60.0).abs() < 1e-9);
    assert!((b.filtered_ct_seconds - 0.75).abs() < 1e-9);
    assert!((a.speed_used - 20.0).abs() < 1e-12);
    assert!((b.speed_used - 80.0).abs() < 1e-12);
}

#[test]
fn manual_command_equivalent_cycle_time() {
    // The manual command path converts speed → CT with factor/speed
    // (60 min when speed <= 0) and feeds the same pipeline. Replicate the
    // conversion here against the pipeline directly.
    let settings = spec_settings();
    let pipeline = ControlPipeline::new(settings.clone());

    // speed = 0 → 60-minute CT → raw speed 1/60 → clamped to 20 → 0 V target
    let parked_ct = 60.0;
    let parked = pipeline.process(&sample("L1", parked_ct), None).unwrap();
    assert!((parked.speed_used - 20.0).abs() < 1e-12);
    assert!((parked.voltage - 0.0).abs() < 1e-12);

    // speed = 50 → CT = factor/50 = 0.02 min; a fresh line maps straight back
    let requested_speed = 50.0;
    let ct = settings.ct_to_speed_factor / requested_speed;
    let result = pipeline.process(&sample("L2", ct), None).unwrap();
    assert!((result.speed_used - requested_speed).abs() < 1e-9);
    // 50 in [20,80] → ratio 0.5 → 5 V, snapped on first application
    assert!((result.voltage - 5.0).abs() < 1e-9);
}

#[test]
fn validation_failures_are_synchronous_and_stateless() {
    let pipeline = ControlPipeline::new(spec_settings());

    for bad_ct in [0.0, -1.0, f64::NAN, f64::NEG_INFINITY] {
        let err = pipeline.process(&sample("L1", bad_ct), None).unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
    }

    // Rejected samples never touched the filter window
    let result = pipeline.process(&sample("L1", 2.0), None).unwrap();
    assert!((result.filtered_ct_seconds - 120.0).abs() < 1e-9);
}

#[test]
fn chain_state_rides_along_without_affecting_outputs() {
    let pipeline = ControlPipeline::new(spec_settings());

    let with_chain = pipeline
        .process(
            &sample("L1", 1.0),
            Some(&ChainStateUpdate {
                is_running: Some(serde_json::json!(true)),
                encoder_delta: Some(serde_json::json!(12.0)),
            }),
        )
        .unwrap();
    let without_chain = pipeline.process(&sample("L2", 1.0), None).unwrap();

    assert!((with_chain.speed_used - without_chain.speed_used).abs() < 1e-12);
    assert!((with_chain.voltage - without_chain.voltage).abs() < 1e-12);
    assert!(!with_chain.chain_stale);

    let snap = pipeline.snapshot("L1").unwrap();
    assert_eq!(snap.chain.unwrap().is_running, Some(true));
    assert!(pipeline.snapshot("L2").unwrap().chain.is_none());
}

#[test]
fn ramp_limits_voltage_rise_across_real_time() {
    // Drive a line from the floor to the ceiling of the band and verify the
    // wall-clock ramp bound between consecutive outputs.
    let pipeline = ControlPipeline::new(ControlSettings {
        ramp_rate_v_per_sec: 2.0,
        ct_filter_window_samples: 1,
        ..spec_settings()
    });

    // Establish a 0 V baseline
    pipeline.process(&sample("L1", 60.0), None).unwrap();

    let before = std::time::Instant::now();
    std::thread::sleep(std::time::Duration::from_millis(120));
    let result = pipeline.process(&sample("L1", 0.0125), None).unwrap();
    let elapsed = before.elapsed().as_secs_f64();

    // Target jumped to 10 V; allowed movement is ramp_rate × dt (with a
    // small cushion for scheduling jitter between `before` and `now`)
    let bound = 2.0 * (elapsed + 0.25);
    assert!(
        result.voltage <= bound + 1e-9,
        "voltage {} exceeded ramp bound {}",
        result.voltage,
        bound
    );
    assert!(result.voltage > 0.0);
}
