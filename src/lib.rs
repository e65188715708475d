//! Vehicle trajectory planning and dynamics simulation along a GPS route.
//!
//! [`pipeline::TrajectoryPipeline`] ties the stages together; every stage is
//! also usable on its own.

pub mod assembler;
pub mod config;
pub mod error;
pub mod filters;
pub mod geodesy;
pub mod imu;
pub mod pipeline;
pub mod planner;
pub mod route;
pub mod simulator;
pub mod solver;
pub mod store;
pub mod types;

pub use assembler::{CurrentRun, Frame};
pub use config::{EngineConfig, FilterConfig, PipelineConfig, PlannerConfig, VehicleLimits};
pub use error::{Result, TrajectoryError};
pub use pipeline::TrajectoryPipeline;
pub use planner::{SpeedPlan, SpeedPlanner, SpeedProfile};
pub use route::{Route, RouteInput, RoutePoint, SegmentMetrics};
pub use simulator::{VehicleSimulator, VehicleState};
pub use solver::{ExternalEngineSolver, InProcessSolver, SpeedFieldSolver};
pub use types::{Enu, LatLon, LatLonAlt};
