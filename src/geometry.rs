// src/geometry.rs
//
// Joint-angle and distance helpers. Everything here is pure; a NaN or a
// degenerate triangle yields None so one bad frame cannot take a session down.

/// Rays shorter than this are treated as degenerate.
const MIN_RAY_LENGTH: f32 = 1e-6;

/// Angle at vertex `b` between rays `b→a` and `b→c`, in degrees [0, 180].
pub fn angle_between(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Option<f32> {
    let ba = [a[0] - b[0], a[1] - b[1], a[2] - b[2]];
    let bc = [c[0] - b[0], c[1] - b[1], c[2] - b[2]];
    angle_from_rays(&ba, &bc)
}

/// Same as [`angle_between`] in the image plane (z ignored).
pub fn angle_between_2d(a: [f32; 3], b: [f32; 3], c: [f32; 3]) -> Option<f32> {
    let ba = [a[0] - b[0], a[1] - b[1]];
    let bc = [c[0] - b[0], c[1] - b[1]];
    angle_from_rays(&ba, &bc)
}

fn angle_from_rays(u: &[f32], v: &[f32]) -> Option<f32> {
    if u.iter().chain(v.iter()).any(|x| !x.is_finite()) {
        return None;
    }

    let dot: f32 = u.iter().zip(v).map(|(p, q)| p * q).sum();
    let norm_u = u.iter().map(|p| p * p).sum::<f32>().sqrt();
    let norm_v = v.iter().map(|q| q * q).sum::<f32>().sqrt();

    if norm_u < MIN_RAY_LENGTH || norm_v < MIN_RAY_LENGTH {
        return None;
    }

    // Huge finite coordinates overflow the products to inf
    let denom = norm_u * norm_v;
    let cosine = dot / denom;
    if !dot.is_finite() || !denom.is_finite() || !cosine.is_finite() {
        return None;
    }

    // Rounding can push |cos| slightly past 1 near 0° and 180°
    Some(cosine.clamp(-1.0, 1.0).acos().to_degrees())
}

pub fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

pub fn distance_2d(a: [f32; 3], b: [f32; 3]) -> f32 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

/// Image-plane distance between `a` and `b` divided by `reference`
/// (e.g. shoulder width), so bounds do not depend on how far the subject
/// stands from the camera.
pub fn normalized_distance(a: [f32; 3], b: [f32; 3], reference: f32) -> Option<f32> {
    if !reference.is_finite() || reference < MIN_RAY_LENGTH {
        return None;
    }
    let d = distance_2d(a, b);
    d.is_finite().then_some(d / reference)
}

pub fn midpoint(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0, (a[2] + b[2]) / 2.0]
}

/// Angle between the vector `from→to` and straight up in image coordinates
/// (y grows downwards). 0° is upright, 90° is horizontal.
pub fn inclination_from_vertical(from: [f32; 3], to: [f32; 3]) -> Option<f32> {
    let up = [from[0], from[1] - 1.0, from[2]];
    angle_between_2d(up, from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Option<f32>, expected: f32) {
        let value = actual.expect("angle should be defined");
        assert!(
            (value - expected).abs() < 0.05,
            "expected {expected}, got {value}"
        );
    }

    #[test]
    fn test_right_angle() {
        assert_close(
            angle_between([1.0, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            90.0,
        );
    }

    #[test]
    fn test_straight_and_folded_limits() {
        // Collinear points: clamping keeps acos in its domain
        assert_close(
            angle_between([0.0, 0.0, 0.0], [0.5, 0.5, 0.0], [1.0, 1.0, 0.0]),
            180.0,
        );
        assert_close(
            angle_between([1.0, 1.0, 0.0], [0.0, 0.0, 0.0], [2.0, 2.0, 0.0]),
            0.0,
        );
    }

    #[test]
    fn test_2d_ignores_depth() {
        let a = [1.0, 0.0, 5.0];
        let b = [0.0, 0.0, 0.0];
        let c = [0.0, 1.0, -3.0];
        assert_close(angle_between_2d(a, b, c), 90.0);
        let full = angle_between(a, b, c).unwrap();
        assert!((full - 90.0).abs() > 1.0);
    }

    #[test]
    fn test_nan_and_degenerate_are_undefined() {
        assert!(angle_between([f32::NAN, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]).is_none());
        assert!(angle_between([0.0, 0.0, 0.0], [0.0, 0.0, 0.0], [1.0, 0.0, 0.0]).is_none());
        assert!(normalized_distance([0.0; 3], [1.0, 0.0, 0.0], 0.0).is_none());
    }

    #[test]
    fn test_overflowing_coordinates_are_undefined() {
        let far = angle_between_2d([1e30, 1e30, 0.0], [0.0, 0.0, 0.0], [1e30, 0.0, 0.0]);
        assert!(far.is_none());
        assert!(angle_between([1e30, 0.0, 1e30], [0.0; 3], [0.0, 1e30, 0.0]).is_none());
        // Large but representable coordinates still work
        assert_close(
            angle_between_2d([1e10, 0.0, 0.0], [0.0, 0.0, 0.0], [0.0, 1e10, 0.0]),
            90.0,
        );
    }

    #[test]
    fn test_normalized_distance() {
        let d = normalized_distance([0.0, 0.0, 0.0], [0.3, 0.4, 9.0], 0.25).unwrap();
        assert!((d - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_inclination_from_vertical() {
        // hip at (0.5, 0.8), shoulder straight above
        assert_close(inclination_from_vertical([0.5, 0.8, 0.0], [0.5, 0.4, 0.0]), 0.0);
        // shoulder level with hip
        assert_close(inclination_from_vertical([0.5, 0.8, 0.0], [0.9, 0.8, 0.0]), 90.0);
    }
}
