// Shared constants for the fusion filter (defaults and numerical thresholds)

/// Dimension of the CTRV state [px, py, v, yaw, yaw_rate].
pub const N_X: usize = 5;

/// Dimension of the augmented state (state + longitudinal and yaw acceleration noise).
pub const N_AUG: usize = 7;

/// Number of sigma points in the augmented space.
pub const N_SIGMA: usize = 2 * N_AUG + 1;

/// Index of the heading angle in the state vector.
pub const YAW_INDEX: usize = 3;

/// Sigma point spreading parameter.
pub const LAMBDA: f64 = 3.0 - N_AUG as f64;

/// Timestamps in the input stream are microseconds.
pub const MICROS_PER_SECOND: f64 = 1e6;

// --- Process noise defaults (also the starting point of tuning) ---

/// Longitudinal acceleration noise standard deviation (m/s^2).
pub const DEFAULT_STD_A: f64 = 2.0;

/// Yaw acceleration noise standard deviation (rad/s^2).
pub const DEFAULT_STD_YAWDD: f64 = 1.0;

// --- Sensor noise, fixed by the sensor manufacturer ---

/// Lidar position noise standard deviation, x axis (m).
pub const DEFAULT_STD_LASPX: f64 = 0.15;

/// Lidar position noise standard deviation, y axis (m).
pub const DEFAULT_STD_LASPY: f64 = 0.15;

/// Radar range noise standard deviation (m).
pub const DEFAULT_STD_RADR: f64 = 0.3;

/// Radar bearing noise standard deviation (rad).
pub const DEFAULT_STD_RADPHI: f64 = 0.03;

/// Radar range-rate noise standard deviation (m/s).
pub const DEFAULT_STD_RADRD: f64 = 0.3;

// --- Initial uncertainty on the first measurement ---
// Position comes from the reading and starts loosest; the unobserved
// components start from zero with moderate variance.

pub const DEFAULT_INIT_POSITION_VARIANCE: f64 = 1.0;
pub const DEFAULT_INIT_SPEED_VARIANCE: f64 = 0.5;
pub const DEFAULT_INIT_YAW_VARIANCE: f64 = 0.5;
pub const DEFAULT_INIT_YAW_RATE_VARIANCE: f64 = 0.25;

// --- Numerical guards ---

/// Below this yaw rate (rad/s) the straight-line CTRV branch is used.
pub const YAW_RATE_EPSILON: f64 = 1e-3;

/// Radar range floor (m) used before dividing by the range.
pub const RANGE_EPSILON: f64 = 1e-4;

/// Smallest variance allowed on the covariance diagonal after an update.
pub const MIN_VARIANCE: f64 = 1e-12;

/// First diagonal jitter tried when the augmented covariance is not positive definite.
pub const CHOLESKY_JITTER: f64 = 1e-9;

/// Number of jitter escalations (x10 each) before falling back to the diagonal.
pub const CHOLESKY_MAX_ATTEMPTS: usize = 6;

// --- NIS consistency (95% chi-square bounds) ---

/// Chi-square 0.95 quantile, 2 degrees of freedom (lidar).
pub const CHI2_95_DOF2: f64 = 5.991;

/// Chi-square 0.95 quantile, 3 degrees of freedom (radar).
pub const CHI2_95_DOF3: f64 = 7.815;
