pub mod fixed_gain;
pub mod kalman;

pub use fixed_gain::{smooth_advisory, FixedGainSmoother, FusedPosition};
pub use kalman::{smooth_coordinates, smooth_trace, Correction, FilterEstimate, GpsKalman};
