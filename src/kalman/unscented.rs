// Unscented transform core
//
// Sigma point generation, weighted recombination and the unscented
// correction shared by every measurement model. Any component listed as
// angular is wrapped into (-pi, pi] whenever it is differenced or averaged.

use nalgebra as na;
use na::{DMatrix, DVector};
use tracing::warn;

use crate::constants::{CHOLESKY_JITTER, CHOLESKY_MAX_ATTEMPTS, MIN_VARIANCE};
use crate::geometry::normalize_angle;

/// Represents mean and covariance of a multivariate normal distribution
#[derive(Debug, Clone)]
pub struct Moments {
    pub mean: DVector<f64>,
    pub covariance: DMatrix<f64>,
}

/// Fixed recombination weights for a given spread and augmented dimension
///
/// The center weight is `lambda / (lambda + n)`, every other weight is
/// `1 / (2 (lambda + n))`. They sum to one.
#[derive(Debug, Clone)]
pub struct SigmaWeights {
    lambda: f64,
    weights: DVector<f64>,
}

impl SigmaWeights {
    pub fn new(n_dim: usize, lambda: f64) -> Self {
        let c = n_dim as f64 + lambda;
        let n_points = 2 * n_dim + 1;
        let mut weights = DVector::from_element(n_points, 0.5 / c);
        weights[0] = lambda / c;
        SigmaWeights { lambda, weights }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn center(&self) -> f64 {
        self.weights[0]
    }

    pub fn as_vector(&self) -> &DVector<f64> {
        &self.weights
    }
}

impl std::ops::Index<usize> for SigmaWeights {
    type Output = f64;

    fn index(&self, i: usize) -> &f64 {
        &self.weights[i]
    }
}

/// A set of sigma points, one per row; row 0 is the center point
#[derive(Debug, Clone)]
pub struct SigmaPoints {
    pub points: DMatrix<f64>,
}

impl SigmaPoints {
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    pub fn point(&self, i: usize) -> DVector<f64> {
        self.points.row(i).transpose()
    }
}

/// Which reference point a covariance was accumulated about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CovarianceForm {
    /// Standard form, deviations from the weighted mean
    AboutMean,
    /// Deviations from the center sigma point, all weights except the center
    /// one; positive semi-definite even when the center weight is negative
    AboutCenter,
}

/// Difference `a - b` with the listed angular components wrapped
pub fn residual(a: &DVector<f64>, b: &DVector<f64>, angles: &[usize]) -> DVector<f64> {
    let mut diff = a - b;
    for &i in angles {
        diff[i] = normalize_angle(diff[i]);
    }
    diff
}

/// Lower-triangular square root of a covariance matrix
///
/// Falls back to symmetrizing plus growing diagonal jitter when the matrix is
/// not positive definite, and finally to the square root of the clamped
/// diagonal.
pub fn covariance_sqrt(covariance: &DMatrix<f64>) -> DMatrix<f64> {
    if let Some(chol) = covariance.clone().cholesky() {
        return chol.l();
    }

    let n = covariance.nrows();
    let symmetric = (covariance + covariance.transpose()) * 0.5;
    let mut jitter = CHOLESKY_JITTER;
    for _ in 0..CHOLESKY_MAX_ATTEMPTS {
        let regularized = &symmetric + DMatrix::identity(n, n) * jitter;
        if let Some(chol) = regularized.cholesky() {
            warn!(jitter, "covariance not positive definite, regularized");
            return chol.l();
        }
        jitter *= 10.0;
    }

    warn!("covariance regularization failed, using diagonal square root");
    DMatrix::from_diagonal(&symmetric.diagonal().map(|v| v.max(MIN_VARIANCE).sqrt()))
}

/// Calculate sigma points from mean and covariance
///
/// 2n+1 points: the mean, then the mean plus and minus each column of
/// `sqrt((lambda + n) * covariance)`.
pub fn moments2points(moments: &Moments, lambda: f64) -> SigmaPoints {
    let n_dim = moments.mean.len();
    let mu = &moments.mean;

    let sqrt_cov = covariance_sqrt(&moments.covariance);
    let scale = (lambda + n_dim as f64).sqrt();

    let n_points = 2 * n_dim + 1;
    let mut points = DMatrix::zeros(n_points, n_dim);

    points.row_mut(0).copy_from(&mu.transpose());
    for i in 0..n_dim {
        let offset = sqrt_cov.column(i) * scale;
        points.row_mut(i + 1).copy_from(&(mu + &offset).transpose());
        points.row_mut(n_dim + i + 1).copy_from(&(mu - &offset).transpose());
    }

    SigmaPoints { points }
}

/// Weighted mean of sigma points
///
/// Angular components are averaged as the center value plus the weighted
/// wrapped deviations, so points straddling the +/-pi seam average correctly.
pub fn weighted_mean(points: &SigmaPoints, weights: &SigmaWeights, angles: &[usize]) -> DVector<f64> {
    let n_dim = points.dim();
    let mut mean = DVector::zeros(n_dim);
    for i in 0..points.len() {
        mean += points.points.row(i).transpose() * weights[i];
    }

    let center = points.point(0);
    for &a in angles {
        let mut offset = 0.0;
        for i in 1..points.len() {
            offset += weights[i] * normalize_angle(points.points[(i, a)] - center[a]);
        }
        mean[a] = normalize_angle(center[a] + offset);
    }

    mean
}

/// Weighted sum of outer products between two sets of sigma points
///
/// Both sets must come from the same sigma points (same row order).
pub fn cross_covariance(
    x_points: &SigmaPoints,
    x_mean: &DVector<f64>,
    x_angles: &[usize],
    z_points: &SigmaPoints,
    z_mean: &DVector<f64>,
    z_angles: &[usize],
    weights: &SigmaWeights,
    form: CovarianceForm,
) -> DMatrix<f64> {
    let mut cross = DMatrix::zeros(x_points.dim(), z_points.dim());
    match form {
        CovarianceForm::AboutMean => {
            for i in 0..x_points.len() {
                let dx = residual(&x_points.point(i), x_mean, x_angles);
                let dz = residual(&z_points.point(i), z_mean, z_angles);
                cross += dx * dz.transpose() * weights[i];
            }
        }
        CovarianceForm::AboutCenter => {
            let x_center = x_points.point(0);
            let z_center = z_points.point(0);
            for i in 1..x_points.len() {
                let dx = residual(&x_points.point(i), &x_center, x_angles);
                let dz = residual(&z_points.point(i), &z_center, z_angles);
                cross += dx * dz.transpose() * weights[i];
            }
        }
    }
    cross
}

/// Calculate mean and covariance from sigma points
///
/// The covariance is accumulated about the mean; if that (plus the optional
/// additive noise) is not positive definite it is recomputed about the
/// center point instead. The form used is returned alongside, and any
/// cross-covariance paired with these moments must use the same form.
pub fn points2moments(
    points: &SigmaPoints,
    weights: &SigmaWeights,
    angles: &[usize],
    sigma_noise: Option<&DMatrix<f64>>,
) -> (Moments, CovarianceForm) {
    let mean = weighted_mean(points, weights, angles);

    let mut covariance = cross_covariance(
        points, &mean, angles, points, &mean, angles, weights, CovarianceForm::AboutMean,
    );
    if let Some(noise) = sigma_noise {
        covariance += noise;
    }

    if covariance.clone().cholesky().is_some() {
        return (Moments { mean, covariance }, CovarianceForm::AboutMean);
    }

    let mut covariance = cross_covariance(
        points, &mean, angles, points, &mean, angles, weights, CovarianceForm::AboutCenter,
    );
    if let Some(noise) = sigma_noise {
        covariance += noise;
    }
    (Moments { mean, covariance }, CovarianceForm::AboutCenter)
}

/// Apply `f` to every sigma point and recombine
///
/// # Returns
/// Transformed sigma points, their moments, and the covariance form used
pub fn unscented_transform<F>(
    points: &SigmaPoints,
    weights: &SigmaWeights,
    f: F,
    angles: &[usize],
    sigma_noise: Option<&DMatrix<f64>>,
) -> (SigmaPoints, Moments, CovarianceForm)
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let transformed: Vec<DVector<f64>> = (0..points.len()).map(|i| f(&points.point(i))).collect();

    let n_dim_out = transformed.first().map_or(0, |p| p.len());
    let mut out = DMatrix::zeros(points.len(), n_dim_out);
    for (i, point) in transformed.iter().enumerate() {
        out.row_mut(i).copy_from(&point.transpose());
    }

    let out = SigmaPoints { points: out };
    let (moments, form) = points2moments(&out, weights, angles, sigma_noise);
    (out, moments, form)
}

/// Symmetrize a covariance and lift any diagonal entry below `MIN_VARIANCE`
pub fn condition_covariance(covariance: &mut DMatrix<f64>) {
    let symmetric = (&*covariance + covariance.transpose()) * 0.5;
    *covariance = symmetric;
    for i in 0..covariance.nrows() {
        if !(covariance[(i, i)] >= MIN_VARIANCE) {
            covariance[(i, i)] = MIN_VARIANCE;
        }
    }
}

/// Result of fusing one observation
#[derive(Debug, Clone)]
pub struct Correction {
    pub moments: Moments,
    /// Normalized innovation squared of the observation
    pub nis: f64,
}

/// Correct predicted state moments with an observation
///
/// # Arguments
/// * `cross_sigma` - Cross-covariance between state and observation
/// * `moments_pred` - Predicted state mean and covariance
/// * `state_angles` - Angular state components
/// * `obs_moments_pred` - Predicted observation mean and innovation covariance
/// * `obs_angles` - Angular observation components
/// * `observation` - Actual observation
///
/// # Returns
/// Corrected moments and NIS, or `None` if the innovation covariance is not
/// positive definite
pub fn unscented_correct(
    cross_sigma: &DMatrix<f64>,
    moments_pred: &Moments,
    state_angles: &[usize],
    obs_moments_pred: &Moments,
    obs_angles: &[usize],
    observation: &DVector<f64>,
) -> Option<Correction> {
    let s = &obs_moments_pred.covariance;
    let chol = s.clone().cholesky()?;
    let s_inv = chol.inverse();

    let kalman_gain = cross_sigma * &s_inv;
    let innovation = residual(observation, &obs_moments_pred.mean, obs_angles);

    let mut mean = &moments_pred.mean + &kalman_gain * &innovation;
    for &a in state_angles {
        mean[a] = normalize_angle(mean[a]);
    }

    let mut covariance = &moments_pred.covariance - &kalman_gain * s * kalman_gain.transpose();
    condition_covariance(&mut covariance);

    let nis = innovation.dot(&chol.solve(&innovation)).max(0.0);

    Some(Correction {
        moments: Moments { mean, covariance },
        nis,
    })
}

/// Integrate a new observation into predicted sigma points
///
/// # Arguments
/// * `observation_function` - Maps a state sigma point into observation space
/// * `moments_pred` - Predicted state moments
/// * `points_pred` - Predicted state sigma points
/// * `weights` - Recombination weights
/// * `state_angles` - Angular state components
/// * `observation` - Actual observation
/// * `obs_angles` - Angular observation components
/// * `sigma_observation` - Observation noise covariance (additive)
pub fn unscented_filter_correct<F>(
    observation_function: F,
    moments_pred: &Moments,
    points_pred: &SigmaPoints,
    weights: &SigmaWeights,
    state_angles: &[usize],
    observation: &DVector<f64>,
    obs_angles: &[usize],
    sigma_observation: &DMatrix<f64>,
) -> Option<Correction>
where
    F: Fn(&DVector<f64>) -> DVector<f64>,
{
    let (obs_points, obs_moments, form) = unscented_transform(
        points_pred,
        weights,
        observation_function,
        obs_angles,
        Some(sigma_observation),
    );

    let cross_sigma = cross_covariance(
        points_pred,
        &moments_pred.mean,
        state_angles,
        &obs_points,
        &obs_moments.mean,
        obs_angles,
        weights,
        form,
    );

    unscented_correct(
        &cross_sigma,
        moments_pred,
        state_angles,
        &obs_moments,
        obs_angles,
        observation,
    )
}
