//! Reference out-of-process engine: `physics_engine <input.json> <output.json>`.
//!
//! Reads `{route: [{lat, lon, speed_kmh, elevation, slope_deg, distance}], dt?, limits?}`
//! and writes `{enhanced_result: [...]}`. Exits non-zero on any failure.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use log::info;

use route_dynamics::geodesy::lla_to_enu_series;
use route_dynamics::solver::{EngineInput, EngineOutput, EngineResultPoint};
use route_dynamics::{LatLonAlt, VehicleLimits, VehicleSimulator};

const DEFAULT_DT_S: f64 = 0.1;

#[derive(Parser, Debug)]
#[command(name = "physics_engine")]
#[command(about = "Integrate a target speed field into a vehicle speed trace", long_about = None)]
struct Args {
    input: PathBuf,
    output: PathBuf,

    /// Vehicle limits JSON for inputs that carry none (missing fields use defaults)
    #[arg(long)]
    limits: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let input: EngineInput = serde_json::from_reader(BufReader::new(
        File::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?,
    ))
    .context("parsing engine input")?;
    ensure!(!input.route.is_empty(), "input route is empty");

    // Limits sent with the route win over a --limits file
    let limits: VehicleLimits = match (input.limits.clone(), &args.limits) {
        (Some(limits), _) => limits,
        (None, Some(path)) => serde_json::from_reader(BufReader::new(File::open(path)?))
            .with_context(|| format!("parsing limits {}", path.display()))?,
        (None, None) => VehicleLimits::default(),
    };
    let dt = input.dt.unwrap_or(DEFAULT_DT_S);
    let simulator = VehicleSimulator::new(&limits, dt)?;

    let positions: Vec<LatLonAlt> = input
        .route
        .iter()
        .map(|p| LatLonAlt::new(p.lat, p.lon, p.elevation))
        .collect();
    let targets: Vec<f64> = input.route.iter().map(|p| p.speed_kmh / 3.6).collect();
    ensure!(
        targets.iter().all(|v| v.is_finite() && *v >= 0.0),
        "target speeds must be finite and non-negative"
    );

    let states = simulator.run(&lla_to_enu_series(&positions), &targets);

    let enhanced_result: Vec<EngineResultPoint> = input
        .route
        .iter()
        .zip(&states)
        .enumerate()
        .map(|(i, (point, state))| EngineResultPoint {
            waypoint: i + 1,
            lat: point.lat,
            lon: point.lon,
            speed_kmh: state.speed_mps * 3.6,
            target_speed_kmh: point.speed_kmh,
            acceleration_ms2: state.accel_body_mps2.x,
            slope_deg: point.slope_deg,
            distance: point.distance,
            time_sec: i as f64 * dt,
        })
        .collect();

    let mut writer = BufWriter::new(
        File::create(&args.output).with_context(|| format!("creating {}", args.output.display()))?,
    );
    serde_json::to_writer(&mut writer, &EngineOutput { enhanced_result }).context("writing engine output")?;
    writer.flush()?;

    info!("Solved {} points at dt={}s", states.len(), dt);
    Ok(())
}
