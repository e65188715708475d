use std::time::Duration;

use approx::assert_relative_eq;

use route_dynamics::planner::passes::in_final_corridor;
use route_dynamics::route::cumulative_distance;
use route_dynamics::store::{read_json, write_atomic_json};
use route_dynamics::{
    CurrentRun, ExternalEngineSolver, InProcessSolver, PipelineConfig, Route, RoutePoint, TrajectoryPipeline,
};

fn in_process(config: PipelineConfig) -> TrajectoryPipeline {
    let solver = Box::new(InProcessSolver::new(config.vehicle.clone()));
    TrajectoryPipeline::with_solver(config, solver).unwrap()
}

/// `before` points heading east, then `after` points heading north, ~111 m apart.
fn corner_route(before: usize, after: usize, limit_kmh: f64) -> Route {
    let step = 0.001;
    let mut points: Vec<RoutePoint> = (0..=before)
        .map(|i| RoutePoint::new(0.0, step * i as f64))
        .collect();
    let corner_lon = step * before as f64;
    points.extend((1..=after).map(|j| RoutePoint::new(step * j as f64, corner_lon)));
    Route::new(
        points
            .into_iter()
            .map(|p| p.with_speed_limit(limit_kmh).with_elevation(0.0))
            .collect(),
    )
    .unwrap()
}

#[test]
fn three_point_route_is_capped_at_the_posted_limit() {
    let route = Route::new(
        (0..3)
            .map(|i| {
                RoutePoint::new(0.0, 0.001 * i as f64)
                    .with_elevation(0.0)
                    .with_speed_limit(50.0)
            })
            .collect(),
    )
    .unwrap();

    let out = in_process(PipelineConfig::default()).run_detailed(&route, 0.1).unwrap();
    let profile = out.plan.profile.as_slice();

    let cap = 50.0 / 3.6;
    for w in profile.windows(2) {
        assert!(w[1] >= w[0] - 1e-12, "profile dips: {profile:?}");
    }
    for &v in profile {
        assert!(v <= cap + 1e-9);
    }
    assert_relative_eq!(*profile.last().unwrap(), cap, epsilon = 1e-9);

    let run = &out.run;
    assert!(run.meta.distance_km > 0.0);
    assert_eq!(run.frames.len(), 3);
    assert_eq!(run.frames[0].t, 0.0);
    assert_relative_eq!(run.frames[2].t, 0.2, epsilon = 1e-12);
    assert_eq!(run.route.speed_limits.len(), 3);
}

#[test]
fn sharp_turn_dips_the_profile() {
    let route = corner_route(5, 5, 90.0);
    let out = in_process(PipelineConfig::default()).run_detailed(&route, 0.1).unwrap();
    let profile = out.plan.profile.as_slice();
    let legal = &out.plan.legal_caps_mps;

    assert!(out.plan.curvature[5] > 0.01);
    assert!(profile[5] < 0.6 * legal[5], "corner speed {}", profile[5]);
    assert!(profile[5] < profile[2] - 5.0);
    assert!(profile[5] <= (1.5 / out.plan.curvature[5]).sqrt() + 1e-9);
}

#[test]
fn final_corridor_is_not_braked() {
    // Corner one segment (~111 m) before the end
    let route = corner_route(9, 1, 80.0);
    let config = PipelineConfig::default();
    let corridor = config.planner.final_corridor_m;
    let out = in_process(config).run_detailed(&route, 0.1).unwrap();
    let plan = &out.plan;
    let profile = plan.profile.as_slice();

    let metrics = route_dynamics::route::segment_metrics(&route.positions_with_alt());
    let cumulative = cumulative_distance(&metrics);
    let mut checked = 0;
    for i in 0..route.len() {
        if in_final_corridor(&cumulative, i, corridor) {
            assert!(profile[i] >= plan.forward_mps[i] - 1e-12);
            checked += 1;
        }
    }
    assert!(checked >= 2);

    assert!(in_final_corridor(&cumulative, 8, corridor));
    assert!(!in_final_corridor(&cumulative, 7, corridor));
    // The forward pass still sees the corner
    assert!(plan.forward_mps[9] < plan.forward_mps[8] - 5.0);
    // No anticipatory braking ahead of it, and the dip itself is flattened
    assert_relative_eq!(profile[8], plan.forward_mps[8], epsilon = 1e-12);
    assert!(profile[9] >= profile[8] - 1e-12);
    assert!(profile[9] <= plan.legal_caps_mps[9] + 1e-12);
}

#[test]
fn profile_respects_band_and_realized_speed_is_bounded() {
    let route = corner_route(12, 12, 70.0);
    let config = PipelineConfig::default();
    let crawl = config.vehicle.min_crawl_mps();
    let vmax = config.vehicle.max_speed_mps();
    let accel = config.vehicle.accel_mps2;
    let brake = config.vehicle.brake_mps2;
    let dt = 0.5;
    let out = in_process(config).run_detailed(&route, dt).unwrap();

    for (i, &v) in out.plan.profile.iter().enumerate() {
        assert!(v >= crawl - 1e-12);
        assert!(v <= vmax.min(out.plan.legal_caps_mps[i]) + 1e-12);
    }
    for w in out.states.windows(2) {
        let dv = w[1].speed_mps - w[0].speed_mps;
        assert!(dv <= accel * dt + 1e-9 && dv >= -brake * dt - 1e-9);
    }
    for w in out.run.frames.windows(2) {
        assert_relative_eq!(w[1].t - w[0].t, dt, epsilon = 1e-9);
    }
}

#[test]
fn external_engine_matches_in_process_solver() {
    let route = corner_route(6, 6, 60.0);
    let config = PipelineConfig::default();

    let external = ExternalEngineSolver::new(
        env!("CARGO_BIN_EXE_physics_engine"),
        Duration::from_secs(30),
        InProcessSolver::new(config.vehicle.clone()),
    );
    let via_engine = TrajectoryPipeline::with_solver(config.clone(), Box::new(external))
        .unwrap()
        .run_detailed(&route, 0.1)
        .unwrap();
    let reference = in_process(config).run_detailed(&route, 0.1).unwrap();

    assert_eq!(via_engine.states.len(), reference.states.len());
    for (a, b) in via_engine.states.iter().zip(&reference.states) {
        assert_relative_eq!(a.speed_mps, b.speed_mps, epsilon = 1e-9);
        assert_relative_eq!(a.heading_deg, b.heading_deg, epsilon = 1e-9);
        assert_relative_eq!(a.accel_body_mps2.x, b.accel_body_mps2.x, epsilon = 1e-6);
    }
}

#[test]
fn external_engine_uses_configured_vehicle_limits() {
    let route = corner_route(39, 0, 100.0);
    let mut config = PipelineConfig::default();
    config.vehicle.accel_mps2 = 0.5;
    config.vehicle.brake_mps2 = 1.0;
    config.vehicle.initial_speed_mps = 2.0;
    let dt = 0.1;

    let external = ExternalEngineSolver::new(
        env!("CARGO_BIN_EXE_physics_engine"),
        Duration::from_secs(30),
        InProcessSolver::new(config.vehicle.clone()),
    );
    let via_engine = TrajectoryPipeline::with_solver(config.clone(), Box::new(external))
        .unwrap()
        .run_detailed(&route, dt)
        .unwrap();
    let reference = in_process(config.clone()).run_detailed(&route, dt).unwrap();

    assert_relative_eq!(via_engine.states[0].speed_mps, 2.0, epsilon = 1e-9);
    for w in via_engine.states.windows(2) {
        let dv = w[1].speed_mps - w[0].speed_mps;
        assert!(dv <= config.vehicle.accel_mps2 * dt + 1e-9, "gained {dv} in one frame");
        assert!(-dv <= config.vehicle.brake_mps2 * dt + 1e-9, "lost {dv} in one frame");
    }
    for (a, b) in via_engine.states.iter().zip(&reference.states) {
        assert_relative_eq!(a.speed_mps, b.speed_mps, epsilon = 1e-9);
    }
}

#[test]
fn run_document_survives_atomic_gzip_write() {
    let route = corner_route(3, 3, 50.0);
    let run = in_process(PipelineConfig::default()).run(&route, 0.1).unwrap();

    let dir = std::env::temp_dir().join(format!("route_dynamics-e2e-{}", uuid::Uuid::new_v4()));
    let path = dir.join("current_run.json.gz");
    write_atomic_json(&run, &path).unwrap();
    let back: CurrentRun = read_json(&path).unwrap();
    assert_eq!(back.frames.len(), run.frames.len());
    assert_eq!(back.meta.source, run.meta.source);
    for (a, b) in back.frames.iter().zip(&run.frames) {
        assert_relative_eq!(a.vehicle_speed_mps, b.vehicle_speed_mps, max_relative = 1e-12);
        assert_relative_eq!(a.lat, b.lat, max_relative = 1e-12);
    }

    let plain = dir.join("current_run.json");
    write_atomic_json(&run, &plain).unwrap();
    let json: serde_json::Value = read_json(&plain).unwrap();
    let frame = &json["frames"][1];
    for key in [
        "t", "lat", "lon", "altM", "enuM", "headingDeg", "pitchDeg", "rollDeg",
        "vehicleSpeedMps", "optimumSpeedMps", "accelBodyMps2", "gyroBodyRps", "ekf",
    ] {
        assert!(frame.get(key).is_some(), "frame missing {key}");
    }
    assert_eq!(json["route"]["polyline"][0].as_array().unwrap().len(), 3);

    std::fs::remove_dir_all(&dir).unwrap();
}
