use drive_core::config::{HG_L1, HG_L2, HG_L3, LOOP_PERIOD_MS};
use drive_core::control::{DelaySpec, Identity, InternalModelPredictor, PiController};
use drive_core::delay_line::DelayLine;
use drive_core::lookup::LookupTable;
use drive_core::observer::HighGainObserver;

const TS: f32 = LOOP_PERIOD_MS as f32 / 1000.0;

/// Ticks until the velocity estimate stays within `tolerance` of `speed`.
fn settle_ticks(mut observer: HighGainObserver<3>, speed: f32, tolerance: f32) -> usize {
    let mut settled_at = 0;
    for k in 1..=4_000 {
        let velocity = observer.update(speed * k as f32 * TS);
        assert!(velocity.is_finite() && velocity.abs() < 10.0 * speed.abs());
        if (velocity - speed).abs() > tolerance {
            settled_at = k;
        }
    }
    settled_at
}

#[test]
fn observer_converges_faster_with_smaller_epsilon() {
    let speed = 25.0;
    let tolerance = 0.25;

    let slow = settle_ticks(
        HighGainObserver::<3>::new(HG_L1, HG_L2, HG_L3, 0.1, TS),
        speed,
        tolerance,
    );
    let fast = settle_ticks(
        HighGainObserver::<3>::new(HG_L1, HG_L2, HG_L3, 0.05, TS),
        speed,
        tolerance,
    );

    assert!(fast < 4_000, "observer never settled");
    assert!(fast < slow, "eps 0.05 settled at {fast}, eps 0.1 at {slow}");
}

#[test]
fn second_order_observer_tracks_a_ramp() {
    let mut observer = HighGainObserver::<2>::new(-2.0, -1.0, 0.05, TS);
    let speed = -7.5;
    let mut velocity = 0.0;
    for k in 1..=3_000 {
        velocity = observer.update(speed * k as f32 * TS);
    }
    assert!((velocity - speed).abs() < 1e-2, "velocity {velocity}");
}

#[test]
fn predictor_output_is_the_input_response_delayed() {
    const D: usize = 40;
    let delay = DelaySpec::new(80, 2);
    let mut predictor = InternalModelPredictor::<D, _>::new(6.0, delay, Identity)
        .expect("80ms over 2ms is 40 periods");
    let mut undelayed = Vec::new();
    let mut delayed = Vec::new();

    for k in 0..300 {
        let u = if k < 100 { 1.0 } else { 0.2 };
        delayed.push(predictor.state());
        predictor.update(u);
        undelayed.push(predictor.state_predict());
    }

    for k in D..300 {
        assert!(
            (delayed[k] - undelayed[k - D]).abs() < 1e-6,
            "tick {k}: delayed output must equal the prediction from {D} ticks earlier"
        );
    }
}

#[test]
fn pi_matches_the_discretized_recursion() {
    let (kp, ki, ts) = (0.5, 2.0, 0.25);
    let mut pi = PiController::new(kp, ki, ts);
    let errors = [1.0, -0.5, 0.25, 0.0, 2.0];

    let mut integral = 0.0;
    for e in errors {
        let expected = ki * integral + (kp + ts * ki) * e;
        assert_eq!(pi.update(e), expected);
        integral += ts * e;
    }
    assert_eq!(pi.integral(), integral);

    pi.reset(0.0);
    assert_eq!(pi.integral(), 0.0);
}

#[test]
fn lookup_is_monotonic_for_increasing_outputs() {
    let table = LookupTable::new([0.0_f32, 0.25, 0.5, 1.0], [7010.0, 7300.0, 7711.0, 8412.0]);
    assert!(table.is_valid());

    let mut previous = table.eval(-1.0);
    for step in -10..=120 {
        let value = table.eval(step as f32 / 100.0);
        assert!(value >= previous, "eval decreased at {step}");
        previous = value;
    }
    assert_eq!(table.eval(0.5), 7711.0);
}

#[test]
fn delay_line_replays_input_after_capacity_pushes() {
    let mut line = DelayLine::<u32, 8>::new(0);
    let mut seen = Vec::new();
    for value in 1..=20 {
        seen.push(line.front());
        line.push_back(value);
    }

    // The front lags the newest push by N - 1 slots.
    assert_eq!(line.front(), 13);
    assert_eq!(line.back(), 20);
    assert_eq!(&seen[8..], &(1..=12).collect::<Vec<_>>()[..]);
}
