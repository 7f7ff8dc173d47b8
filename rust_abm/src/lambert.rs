//! Principal branch of the Lambert W function.
//!
//! The household utility optimum has the form `W0(h * w * e^h / p)`, whose
//! argument overflows `f64` for large households, so the solver also accepts
//! the argument in log space.

const MAX_ITERATIONS: usize = 64;
const TOLERANCE: f64 = 1e-14;

/// Principal branch `W0(x)` for `x >= -1/e`. Returns `NaN` below the branch point.
pub fn lambert_w0(x: f64) -> f64 {
    let branch_point = -(-1.0_f64).exp();
    if x.is_nan() || x < branch_point {
        return f64::NAN;
    }
    if x == 0.0 {
        return 0.0;
    }
    if x == f64::INFINITY {
        return f64::INFINITY;
    }
    if x > 1e300 {
        return lambert_w0_ln(x.ln());
    }

    let mut w = if x < -0.25 {
        // Series around the branch point
        (2.0 * (1.0 + std::f64::consts::E * x)).max(0.0).sqrt() - 1.0
    } else {
        (1.0 + x).ln()
    };

    // Halley iteration on w * e^w - x
    for _ in 0..MAX_ITERATIONS {
        let ew = w.exp();
        let f = w * ew - x;
        let wp1 = w + 1.0;
        if wp1.abs() < f64::EPSILON {
            break;
        }
        let step = f / (ew * wp1 - (w + 2.0) * f / (2.0 * wp1));
        w -= step;
        if step.abs() <= TOLERANCE * (1.0 + w.abs()) {
            break;
        }
    }
    w
}

/// `W0(e^ln_x)`, for arguments too large to materialise.
pub fn lambert_w0_ln(ln_x: f64) -> f64 {
    if ln_x.is_nan() {
        return f64::NAN;
    }
    if ln_x <= 1.0 {
        return lambert_w0(ln_x.exp());
    }

    // Newton on w + ln(w) - ln_x, well conditioned for w > 1
    let mut w = ln_x - ln_x.ln();
    for _ in 0..MAX_ITERATIONS {
        let f = w + w.ln() - ln_x;
        let step = f / (1.0 + 1.0 / w);
        w -= step;
        if step.abs() <= TOLERANCE * w.abs() {
            break;
        }
    }
    w
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(lambert_w0(0.0), 0.0);
        assert_relative_eq!(lambert_w0(std::f64::consts::E), 1.0, max_relative = 1e-12);
        assert_relative_eq!(lambert_w0(1.0), 0.567_143_290_409_783_8, max_relative = 1e-12);
        assert_relative_eq!(lambert_w0(-(-1.0_f64).exp()), -1.0, epsilon = 1e-6);
    }

    #[test]
    fn inverts_w_exp_w() {
        for &x in &[1e-6, 0.1, 2.5, 10.0, 1e3, 1e8, 1e20] {
            let w = lambert_w0(x);
            assert_relative_eq!(w * w.exp(), x, max_relative = 1e-10);
        }
        let w = lambert_w0(-0.2);
        assert_relative_eq!(w * w.exp(), -0.2, max_relative = 1e-10);
    }

    #[test]
    fn log_space_matches_direct() {
        for &x in &[0.5, 3.0, 1e5, 1e50] {
            assert_relative_eq!(lambert_w0_ln(f64::ln(x)), lambert_w0(x), max_relative = 1e-10);
        }
    }

    #[test]
    fn log_space_handles_overflowing_arguments() {
        // W(x) for x = e^1000 satisfies w + ln(w) = 1000
        let w = lambert_w0_ln(1000.0);
        assert_relative_eq!(w + w.ln(), 1000.0, max_relative = 1e-12);
    }

    #[test]
    fn below_branch_point_is_nan() {
        assert!(lambert_w0(-1.0).is_nan());
    }
}
