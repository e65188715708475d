//! Linear algebra type system for the GPS fusion filter
//!
//! Fixed-size aliases give compile-time dimension checking for the
//! constant-velocity Kalman filter.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM_4: usize = 4; // (x, y, vx, vy)

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_POS: usize = 2; // (x, y)

// ===== 4-State Filter Types =====
pub type StateVec4 = SVector<f64, STATE_DIM_4>;
pub type StateMat4 = SMatrix<f64, STATE_DIM_4, STATE_DIM_4>;

// Measurement types
pub type PosVec2 = SVector<f64, MEASURE_DIM_POS>;
pub type PosNoise2 = SMatrix<f64, MEASURE_DIM_POS, MEASURE_DIM_POS>;

// Observation and gain
pub type ObservationPos = SMatrix<f64, MEASURE_DIM_POS, STATE_DIM_4>; // 2×4
pub type KalmanGainPos = SMatrix<f64, STATE_DIM_4, MEASURE_DIM_POS>; // 4×2
