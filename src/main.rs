use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use log::{error, info};
use serde::Deserialize;

use route_dynamics::store::{read_json, write_atomic_json};
use route_dynamics::{PipelineConfig, RouteInput, RoutePoint, TrajectoryPipeline};

#[derive(Parser, Debug)]
#[command(name = "route_dynamics")]
#[command(about = "Plan speed profiles and simulate vehicle trajectories along GPS routes", long_about = None)]
struct Args {
    /// Route file(s): {"points": [...], "speedLimitsMps": [...]} or a bare array of points
    #[arg(required = true, value_name = "ROUTE")]
    routes: Vec<PathBuf>,

    /// Frame timestep in seconds
    #[arg(long, default_value = "0.1")]
    dt: f64,

    /// Pipeline configuration JSON (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for run documents
    #[arg(long, default_value = "simulator")]
    output_dir: PathBuf,

    /// Exact output path (single route only)
    #[arg(long, conflicts_with = "output_dir")]
    output: Option<PathBuf>,

    /// Gzip run documents written to --output-dir
    #[arg(long, default_value_t = false)]
    gzip: bool,

    /// External physics engine binary
    #[arg(long, env = "PHYSICS_ENGINE_PATH")]
    engine: Option<PathBuf>,

    /// Use the external engine when one is configured
    #[arg(
        long,
        env = "USE_PHYSICS_ENGINE",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    use_engine: bool,

    /// Engine timeout in seconds
    #[arg(long)]
    engine_timeout: Option<u64>,

    /// Comfortable acceleration (m/s²)
    #[arg(long)]
    accel: Option<f64>,

    /// Comfortable braking (m/s², positive)
    #[arg(long)]
    brake: Option<f64>,

    /// Lateral comfort limit (m/s²)
    #[arg(long)]
    lateral_accel: Option<f64>,

    /// Vehicle top speed (km/h)
    #[arg(long)]
    max_speed_kmh: Option<f64>,

    /// Tag written to meta.source
    #[arg(long, default_value = "route_dynamics")]
    source: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RouteFile {
    Input(RouteInput),
    Points(Vec<RoutePoint>),
}

impl From<RouteFile> for RouteInput {
    fn from(file: RouteFile) -> Self {
        match file {
            RouteFile::Input(input) => input,
            RouteFile::Points(points) => RouteInput {
                points,
                speed_limits_mps: None,
            },
        }
    }
}

fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if let Some(accel) = args.accel {
        config.vehicle.accel_mps2 = accel;
    }
    if let Some(brake) = args.brake {
        config.vehicle.brake_mps2 = brake;
    }
    if let Some(lateral) = args.lateral_accel {
        config.vehicle.lateral_accel_mps2 = lateral;
    }
    if let Some(max_speed) = args.max_speed_kmh {
        config.vehicle.max_speed_kmh = max_speed;
    }
    if args.engine.is_some() {
        config.engine.path = args.engine.clone();
    }
    if let Some(timeout) = args.engine_timeout {
        config.engine.timeout_secs = timeout;
    }
    config.engine.enabled = args.use_engine;

    config.validate()?;
    Ok(config)
}

fn output_path(args: &Args, route: &Path) -> PathBuf {
    if let Some(output) = &args.output {
        return output.clone();
    }
    let stem = route
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "route".to_string());
    let ext = if args.gzip { "json.gz" } else { "json" };
    args.output_dir.join(format!("{stem}.current_run.{ext}"))
}

/// Pair every route with its output document, refusing batches where two
/// routes would write the same file.
fn output_plan(args: &Args) -> Result<Vec<(PathBuf, PathBuf)>> {
    if args.output.is_some() && args.routes.len() > 1 {
        bail!("--output takes a single route; use --output-dir for batches");
    }

    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut plan = Vec::with_capacity(args.routes.len());
    for route in &args.routes {
        let out = output_path(args, route);
        if let Some(previous) = claimed.insert(out.clone(), route) {
            bail!(
                "{} and {} would both write {}; rename one or run them separately",
                previous.display(),
                route.display(),
                out.display()
            );
        }
        plan.push((route.clone(), out));
    }
    Ok(plan)
}

fn process_route(pipeline: &TrajectoryPipeline, args: &Args, route_path: &Path, out: &Path) -> Result<PathBuf> {
    let started = Instant::now();
    let file: RouteFile =
        read_json(route_path).with_context(|| format!("reading route {}", route_path.display()))?;
    let run = pipeline
        .run_input(file.into(), args.dt)
        .with_context(|| format!("planning {}", route_path.display()))?;

    write_atomic_json(&run, out).with_context(|| format!("writing {}", out.display()))?;
    info!(
        "{} → {} ({} frames, {:.2} km, {:.1} min) in {:?}",
        route_path.display(),
        out.display(),
        run.frames.len(),
        run.meta.distance_km,
        run.meta.eta_min_vehicle,
        started.elapsed()
    );
    Ok(out.to_path_buf())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let plan = output_plan(&args)?;
    let config = build_config(&args)?;
    let pipeline = TrajectoryPipeline::new(config)?.with_source(args.source.clone());
    info!(
        "Planning {} route(s) at dt={}s with the {} solver",
        args.routes.len(),
        args.dt,
        pipeline.solver_name()
    );

    let results: Vec<(PathBuf, Result<PathBuf>)> = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = plan
            .iter()
            .map(|(route, out)| {
                let pipeline = &pipeline;
                let args = &args;
                (route.clone(), s.spawn(move |_| process_route(pipeline, args, route, out)))
            })
            .collect();

        handles
            .into_iter()
            .map(|(route, handle)| {
                let result = handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("worker panicked")));
                (route, result)
            })
            .collect()
    })
    .map_err(|_| anyhow!("route worker scope panicked"))?;

    let mut failed = 0;
    for (route, result) in &results {
        if let Err(e) = result {
            error!("{}: {:#}", route.display(), e);
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{failed} of {} route(s) failed", results.len());
    }
    Ok(())
}
