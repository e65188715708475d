//! End-to-end orchestration of one route:
//! metrics → advisory smoothing → speed plan → solver → IMU → run document.

use log::{debug, info};

use crate::assembler::{CurrentRun, RunAssembler, RunSignals};
use crate::config::PipelineConfig;
use crate::error::{Result, TrajectoryError};
use crate::filters::fixed_gain::smooth_advisory;
use crate::geodesy::lla_to_enu_series;
use crate::imu::{synthesize, ImuSample};
use crate::planner::{SpeedPlan, SpeedPlanner};
use crate::route::{segment_metrics, Route, RouteInput};
use crate::simulator::VehicleState;
use crate::solver::{solver_from_config, SpeedField, SpeedFieldSolver};
use crate::types::LatLon;

pub const DEFAULT_SOURCE: &str = "route_dynamics";

/// Everything one run produced, for callers that want more than the document.
pub struct PipelineOutput {
    pub plan: SpeedPlan,
    pub states: Vec<VehicleState>,
    pub imu: Vec<ImuSample>,
    pub run: CurrentRun,
}

pub struct TrajectoryPipeline {
    config: PipelineConfig,
    planner: SpeedPlanner,
    solver: Box<dyn SpeedFieldSolver>,
    assembler: RunAssembler,
    source: String,
}

impl TrajectoryPipeline {
    /// Validate the configuration and pick the solver it describes.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let solver = solver_from_config(&config.engine, &config.vehicle);
        Self::with_solver(config, solver)
    }

    pub fn with_solver(config: PipelineConfig, solver: Box<dyn SpeedFieldSolver>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            planner: SpeedPlanner::new(config.vehicle.clone(), config.planner.clone()),
            assembler: RunAssembler::new(config.filter.clone()),
            solver,
            config,
            source: DEFAULT_SOURCE.to_string(),
        })
    }

    /// Tag written to `meta.source`.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn solver_name(&self) -> &'static str {
        self.solver.name()
    }

    pub fn run(&self, route: &Route, dt: f64) -> Result<CurrentRun> {
        Ok(self.run_detailed(route, dt)?.run)
    }

    pub fn run_input(&self, input: RouteInput, dt: f64) -> Result<CurrentRun> {
        let route = input.into_route()?;
        self.run(&route, dt)
    }

    pub fn run_detailed(&self, route: &Route, dt: f64) -> Result<PipelineOutput> {
        if !dt.is_finite() || dt <= 0.0 {
            return Err(TrajectoryError::InvalidTimestep(dt));
        }

        let positions = route.positions_with_alt();
        let metrics = segment_metrics(&positions);

        let raw = route.positions();
        let advisory: Vec<LatLon> = if self.config.planner.advisory_smoothing {
            smooth_advisory(&self.config.filter, &raw)
                .iter()
                .map(|f| f.position())
                .collect()
        } else {
            raw
        };

        let plan = self.planner.plan(route, &metrics, &advisory);
        info!(
            "Planned {} points, {:.2} km, target {:.1}..{:.1} m/s, ETA {:.1} min",
            route.len(),
            plan.distance_m / 1000.0,
            plan.profile.min(),
            plan.profile.max(),
            plan.eta_min
        );

        let enu = lla_to_enu_series(&positions);
        let field = SpeedField {
            positions: &positions,
            enu: &enu,
            targets_mps: plan.profile.as_slice(),
            metrics: &metrics,
            dt,
        };
        let states = self.solver.solve(&field)?;
        debug!("Solver {} returned {} states", self.solver.name(), states.len());

        let imu = synthesize(&states, &metrics, dt)?;
        let run = self.assembler.assemble(&RunSignals {
            source: &self.source,
            dt,
            positions: &positions,
            enu: &enu,
            metrics: &metrics,
            legal_caps_mps: &plan.legal_caps_mps,
            optimum_mps: plan.profile.as_slice(),
            states: &states,
            imu: &imu,
            distance_m: plan.distance_m,
            eta_min_optimum: plan.eta_min,
        })?;

        info!(
            "Assembled {} frames, vehicle ETA {:.1} min",
            run.frames.len(),
            run.meta.eta_min_vehicle
        );
        Ok(PipelineOutput {
            plan,
            states,
            imu,
            run,
        })
    }
}
