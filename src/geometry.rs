// Geometry helpers - angle wrapping and polar/Cartesian conversions
//
// The radar reports (range, bearing, range rate) relative to the sensor origin;
// lidar and the filter state use Cartesian x/y. Angles are in radians.

use std::f64::consts::{PI, TAU};

use crate::constants::RANGE_EPSILON;

/// Wrap an angle into (-pi, pi]
///
/// Closed form, no loop; non-finite input is returned unchanged.
#[inline]
pub fn normalize_angle(angle: f64) -> f64 {
    if !angle.is_finite() || (angle > -PI && angle <= PI) {
        return angle;
    }
    let wrapped = (angle + PI).rem_euclid(TAU);
    if wrapped == 0.0 {
        PI
    } else {
        wrapped - PI
    }
}

/// Converts a radar reading to Cartesian position and velocity
///
/// The range rate is assumed to be the full velocity along the line of sight,
/// which is how the radar return is drawn for display.
///
/// # Returns
/// (px, py, vx, vy)
pub fn polar_to_cartesian(rho: f64, phi: f64, rho_dot: f64) -> (f64, f64, f64, f64) {
    let (sin_phi, cos_phi) = phi.sin_cos();
    (
        rho * cos_phi,
        rho * sin_phi,
        rho_dot * cos_phi,
        rho_dot * sin_phi,
    )
}

/// Converts Cartesian position and velocity to radar coordinates
///
/// The range used as divisor for the range rate is floored at `RANGE_EPSILON`
/// so an object at the sensor origin yields a zero range rate instead of NaN.
///
/// # Returns
/// (rho, phi, rho_dot)
pub fn cartesian_to_polar(px: f64, py: f64, vx: f64, vy: f64) -> (f64, f64, f64) {
    let rho = px.hypot(py);
    let phi = normalize_angle(py.atan2(px));
    let rho_dot = (px * vx + py * vy) / rho.max(RANGE_EPSILON);
    (rho, phi, rho_dot)
}

/// Converts speed and heading to Cartesian velocity (vx, vy)
#[inline]
pub fn heading_to_velocity(speed: f64, yaw: f64) -> (f64, f64) {
    let (sin_yaw, cos_yaw) = yaw.sin_cos();
    (speed * cos_yaw, speed * sin_yaw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_angle_in_range_is_untouched() {
        assert_eq!(normalize_angle(0.0), 0.0);
        assert_eq!(normalize_angle(1.25), 1.25);
        assert_eq!(normalize_angle(PI), PI);
    }

    #[test]
    fn test_normalize_angle_wraps() {
        assert!((normalize_angle(-PI) - PI).abs() < 1e-12);
        assert!((normalize_angle(3.0 * PI - 0.25) - (PI - 0.25)).abs() < 1e-9);
        assert!((normalize_angle(TAU + 0.5) - 0.5).abs() < 1e-12);
        assert!((normalize_angle(-TAU - 0.5) + 0.5).abs() < 1e-12);
        assert!((normalize_angle(100.0) - (100.0 - 32.0 * PI)).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_angle_range_sweep() {
        let mut angle = -50.0;
        while angle < 50.0 {
            let n = normalize_angle(angle);
            assert!(n > -PI && n <= PI, "{} -> {}", angle, n);
            // Same direction
            assert!((n.sin() - angle.sin()).abs() < 1e-9);
            assert!((n.cos() - angle.cos()).abs() < 1e-9);
            angle += 0.137;
        }
    }

    #[test]
    fn test_polar_cartesian_roundtrip() {
        let cases = [
            (5.0, 0.0, 0.0),
            (1.0, 0.7, -2.0),
            (12.5, -2.9, 3.3),
            (0.3, PI, 1.0),
        ];
        for (rho, phi, rho_dot) in cases {
            let (px, py, vx, vy) = polar_to_cartesian(rho, phi, rho_dot);
            let (r, p, rd) = cartesian_to_polar(px, py, vx, vy);
            assert!((r - rho).abs() < 1e-9);
            assert!((normalize_angle(p - phi)).abs() < 1e-9);
            assert!((rd - rho_dot).abs() < 1e-9);
        }
    }

    #[test]
    fn test_radar_at_zero_bearing_maps_onto_x_axis() {
        let (px, py, _, _) = polar_to_cartesian(5.0, 0.0, 0.0);
        assert_eq!(px, 5.0);
        assert_eq!(py, 0.0);
    }

    #[test]
    fn test_cartesian_to_polar_at_origin_is_finite() {
        let (rho, phi, rho_dot) = cartesian_to_polar(0.0, 0.0, 3.0, -1.0);
        assert_eq!(rho, 0.0);
        assert!(phi.is_finite());
        assert_eq!(rho_dot, 0.0);
    }

    #[test]
    fn test_heading_to_velocity() {
        let (vx, vy) = heading_to_velocity(2.0, PI / 2.0);
        assert!(vx.abs() < 1e-12);
        assert!((vy - 2.0).abs() < 1e-12);
    }
}
