//! Realizing a planned speed field as a vehicle trace.
//!
//! The pipeline only sees [`SpeedFieldSolver`]. Which implementation backs it
//! is decided once by [`solver_from_config`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, VehicleLimits};
use crate::error::{Result, TrajectoryError};
use crate::route::SegmentMetrics;
use crate::simulator::{heading_series, VehicleSimulator, VehicleState, GRAVITY_MPS2};
use crate::types::{Enu, LatLonAlt};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Slack on the per-frame speed change check, covering km/h round trips (m/s).
const SPEED_STEP_TOLERANCE_MPS: f64 = 1e-6;

/// Tail of engine stderr kept in error messages (bytes).
const MAX_STDERR_BYTES: usize = 2048;

/// Everything a solver needs for one route. All slices are index-aligned.
pub struct SpeedField<'a> {
    pub positions: &'a [LatLonAlt],
    pub enu: &'a [Vector3<f64>],
    pub targets_mps: &'a [f64],
    pub metrics: &'a [SegmentMetrics],
    pub dt: f64,
}

impl SpeedField<'_> {
    pub fn len(&self) -> usize {
        self.targets_mps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets_mps.is_empty()
    }
}

pub trait SpeedFieldSolver: Send + Sync {
    fn name(&self) -> &'static str;

    fn solve(&self, field: &SpeedField) -> Result<Vec<VehicleState>>;
}

/// Reference solver: the forward integrator in this process.
#[derive(Clone, Debug)]
pub struct InProcessSolver {
    limits: VehicleLimits,
}

impl InProcessSolver {
    pub fn new(limits: VehicleLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &VehicleLimits {
        &self.limits
    }
}

impl SpeedFieldSolver for InProcessSolver {
    fn name(&self) -> &'static str {
        "in-process"
    }

    fn solve(&self, field: &SpeedField) -> Result<Vec<VehicleState>> {
        let simulator = VehicleSimulator::new(&self.limits, field.dt)?;
        Ok(simulator.run(field.enu, field.targets_mps))
    }
}

// ---------------------------------------------------------------------------
// Engine file contract
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineInput {
    pub route: Vec<EngineRoutePoint>,
    /// Integration step; engines assume 0.1 s when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dt: Option<f64>,
    /// Vehicle limits to integrate with; engines use their own defaults when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<VehicleLimits>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineRoutePoint {
    pub lat: f64,
    pub lon: f64,
    #[serde(alias = "speedKmh")]
    pub speed_kmh: f64,
    #[serde(default)]
    pub elevation: f64,
    #[serde(default, alias = "slopeDeg")]
    pub slope_deg: f64,
    /// Length of the segment ending at this point (m)
    #[serde(default)]
    pub distance: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EngineOutput {
    pub enhanced_result: Vec<EngineResultPoint>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineResultPoint {
    #[serde(default)]
    pub waypoint: usize,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub lon: f64,
    pub speed_kmh: f64,
    #[serde(default)]
    pub target_speed_kmh: f64,
    #[serde(default)]
    pub acceleration_ms2: f64,
    #[serde(default)]
    pub slope_deg: f64,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub time_sec: f64,
}

impl EngineInput {
    pub fn from_field(field: &SpeedField, limits: &VehicleLimits) -> Self {
        let route = field
            .positions
            .iter()
            .zip(field.targets_mps)
            .zip(field.metrics)
            .map(|((p, &target), m)| EngineRoutePoint {
                lat: p.lat,
                lon: p.lon,
                speed_kmh: target * 3.6,
                elevation: p.alt,
                slope_deg: m.slope_deg,
                distance: m.distance_m,
            })
            .collect();
        Self {
            route,
            dt: Some(field.dt),
            limits: Some(limits.clone()),
        }
    }
}

/// Unique input/output file pair in the temp dir, removed on drop.
pub(crate) struct ScratchFiles {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ScratchFiles {
    pub(crate) fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        let dir = std::env::temp_dir();
        Self {
            input: dir.join(format!("route_dynamics-{id}-in.json")),
            output: dir.join(format!("route_dynamics-{id}-out.json")),
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in [&self.input, &self.output] {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove scratch file {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Delegates to an external engine binary, falling back to the in-process
/// solver on any failure.
pub struct ExternalEngineSolver {
    engine: PathBuf,
    timeout: Duration,
    fallback: InProcessSolver,
}

impl ExternalEngineSolver {
    pub fn new(engine: impl Into<PathBuf>, timeout: Duration, fallback: InProcessSolver) -> Self {
        Self {
            engine: engine.into(),
            timeout,
            fallback,
        }
    }

    pub fn engine(&self) -> &Path {
        &self.engine
    }

    fn run_engine(&self, field: &SpeedField) -> Result<Vec<VehicleState>> {
        let limits = self.fallback.limits();
        let scratch = ScratchFiles::new();

        let writer = BufWriter::new(File::create(&scratch.input)?);
        serde_json::to_writer(writer, &EngineInput::from_field(field, limits))?;

        let mut child = Command::new(&self.engine)
            .arg(&scratch.input)
            .arg(&scratch.output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TrajectoryError::Engine(format!("spawn {}: {e}", self.engine.display())))?;

        // Drained on its own thread so a chatty engine never blocks on a full pipe
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut text = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut text);
            }
            text
        });

        let status = wait_with_deadline(&mut child, self.timeout)?;
        if !status.success() {
            let stderr = stderr_reader.join().unwrap_or_default();
            return Err(TrajectoryError::Engine(exit_message(status, &stderr)));
        }

        let output: EngineOutput = serde_json::from_reader(BufReader::new(File::open(&scratch.output)?))?;
        states_from_engine(&output, field, limits)
    }
}

/// Poll `child` until it exits. On timeout or a polling error the child is
/// killed and reaped before returning.
fn wait_with_deadline(child: &mut Child, timeout: Duration) -> Result<ExitStatus> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {}
            Err(e) => {
                reap(child);
                return Err(e.into());
            }
        }
        if Instant::now() >= deadline {
            reap(child);
            return Err(TrajectoryError::Engine(format!(
                "timed out after {:.1}s",
                timeout.as_secs_f64()
            )));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!("Engine kill: {e}");
    }
    if let Err(e) = child.wait() {
        warn!("Could not reap engine process: {e}");
    }
}

fn exit_message(status: ExitStatus, stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        return format!("exited with {status}");
    }
    let mut start = stderr.len().saturating_sub(MAX_STDERR_BYTES);
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    format!("exited with {status}: {}", &stderr[start..])
}

impl SpeedFieldSolver for ExternalEngineSolver {
    fn name(&self) -> &'static str {
        "external-engine"
    }

    fn solve(&self, field: &SpeedField) -> Result<Vec<VehicleState>> {
        let started = Instant::now();
        match self.run_engine(field) {
            Ok(states) => {
                debug!(
                    "Engine {} solved {} points in {:?}",
                    self.engine.display(),
                    states.len(),
                    started.elapsed()
                );
                Ok(states)
            }
            Err(primary) => {
                warn!("Physics engine failed ({primary}); using in-process solver");
                self.fallback
                    .solve(field)
                    .map_err(|fallback| TrajectoryError::EngineExhausted {
                        primary: primary.to_string(),
                        fallback: fallback.to_string(),
                    })
            }
        }
    }
}

/// Validate engine output and rebuild vehicle states around it. Speed
/// changes between frames must respect `limits` at the field's timestep.
fn states_from_engine(output: &EngineOutput, field: &SpeedField, limits: &VehicleLimits) -> Result<Vec<VehicleState>> {
    let results = &output.enhanced_result;
    if results.len() != field.len() {
        return Err(TrajectoryError::Engine(format!(
            "returned {} points for a {}-point route",
            results.len(),
            field.len()
        )));
    }
    if let Some(i) = results
        .iter()
        .position(|r| !r.speed_kmh.is_finite() || r.speed_kmh < 0.0 || !r.acceleration_ms2.is_finite())
    {
        return Err(TrajectoryError::Engine(format!("non-finite or negative value at point {i}")));
    }

    let first_mps = results.first().map_or(limits.initial_speed_mps, |r| r.speed_kmh / 3.6);
    if (first_mps - limits.initial_speed_mps).abs() > SPEED_STEP_TOLERANCE_MPS {
        return Err(TrajectoryError::Engine(format!(
            "started at {first_mps:.3} m/s instead of {:.3} m/s",
            limits.initial_speed_mps
        )));
    }

    let max_gain = limits.accel_mps2 * field.dt + SPEED_STEP_TOLERANCE_MPS;
    let max_loss = limits.brake_mps2 * field.dt + SPEED_STEP_TOLERANCE_MPS;
    if let Some(i) = results.windows(2).position(|w| {
        let dv = (w[1].speed_kmh - w[0].speed_kmh) / 3.6;
        dv > max_gain || -dv > max_loss
    }) {
        return Err(TrajectoryError::Engine(format!(
            "speed change at point {} exceeds accel/brake limits",
            i + 1
        )));
    }

    let headings = heading_series(field.enu);
    Ok(results
        .iter()
        .zip(field.enu)
        .zip(headings)
        .map(|((r, p), heading_deg)| VehicleState {
            speed_mps: r.speed_kmh / 3.6,
            accel_body_mps2: Vector3::new(r.acceleration_ms2, 0.0, GRAVITY_MPS2),
            heading_deg,
            enu: Enu::from(*p),
        })
        .collect())
}

/// Pick the solver for a deployment.
pub fn solver_from_config(engine: &EngineConfig, vehicle: &VehicleLimits) -> Box<dyn SpeedFieldSolver> {
    let in_process = InProcessSolver::new(vehicle.clone());
    match (&engine.path, engine.enabled) {
        (Some(path), true) if path.is_file() => {
            info!("Using physics engine at {}", path.display());
            Box::new(ExternalEngineSolver::new(
                path.clone(),
                Duration::from_secs(engine.timeout_secs),
                in_process,
            ))
        }
        (Some(path), true) => {
            warn!("Physics engine {} not found; using in-process solver", path.display());
            Box::new(in_process)
        }
        _ => Box::new(in_process),
    }
}
