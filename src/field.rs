use glam::Vec3A;

/// A scalar field whose zero level-set is the surface to extract.
///
/// Negative values are inside. Any `Fn(Vec3A) -> f32` is a field, so closures,
/// the functions in [`sdf_primitives`](crate::sdf_primitives), and compositions
/// of them can be passed directly.
pub trait ImplicitField {
    fn evaluate(&self, p: Vec3A) -> f32;

    /// Unnormalized gradient at `p`.
    ///
    /// Fields with an analytic gradient can override the central-difference
    /// estimate.
    fn gradient(&self, p: Vec3A, delta: f32) -> Vec3A {
        central_gradient(|q| self.evaluate(q), p, delta)
    }
}

impl<F> ImplicitField for F
where
    F: Fn(Vec3A) -> f32,
{
    #[inline]
    fn evaluate(&self, p: Vec3A) -> f32 {
        self(p)
    }
}

#[inline]
pub fn is_inside(sample: f32) -> bool {
    sample < 0.0
}

pub fn cell_is_bipolar(samples: &[f32; 8]) -> bool {
    let mut any_negative = false;
    let mut any_positive = false;
    for &sample in samples {
        any_negative |= is_inside(sample);
        any_positive |= !is_inside(sample);
    }
    any_negative && any_positive
}

/// True when all corner samples agree in sign.
#[inline]
pub fn cell_is_homogeneous(samples: &[f32; 8]) -> bool {
    !cell_is_bipolar(samples)
}

pub fn central_gradient(sdf: impl Fn(Vec3A) -> f32, p: Vec3A, delta: f32) -> Vec3A {
    let h = 0.5 * delta;
    let dx = Vec3A::new(h, 0.0, 0.0);
    let dy = Vec3A::new(0.0, h, 0.0);
    let dz = Vec3A::new(0.0, 0.0, h);
    Vec3A::new(
        sdf(p + dx) - sdf(p - dx),
        sdf(p + dy) - sdf(p - dy),
        sdf(p + dz) - sdf(p - dz),
    ) / delta
}

/// Locates the surface crossing on the edge `p0 -> p1`.
///
/// `s0` and `s1` are the (already sampled) field values at the endpoints.
/// The bracket is narrowed by `iterations` bisection steps and the final
/// position is linearly interpolated inside it. If the samples don't bracket a
/// sign change (or aren't finite), the edge midpoint is returned.
pub fn find_edge_crossing(
    field: &(impl ImplicitField + ?Sized),
    p0: Vec3A,
    p1: Vec3A,
    s0: f32,
    s1: f32,
    iterations: u32,
) -> Vec3A {
    if !(s0.is_finite() && s1.is_finite()) || is_inside(s0) == is_inside(s1) {
        log::debug!("unbracketed crossing on {p0} -> {p1} ({s0}, {s1}); using midpoint");
        return 0.5 * (p0 + p1);
    }

    let (mut a, mut b) = (p0, p1);
    let (mut sa, mut sb) = (s0, s1);
    for _ in 0..iterations {
        let m = 0.5 * (a + b);
        let sm = field.evaluate(m);
        if !sm.is_finite() {
            break;
        }
        if is_inside(sm) == is_inside(sa) {
            a = m;
            sa = sm;
        } else {
            b = m;
            sb = sm;
        }
    }

    let diff = sb - sa;
    if diff == 0.0 || !diff.is_finite() {
        return 0.5 * (a + b);
    }
    // Lerp the bracket endpoints.
    let t = (-sa / diff).clamp(0.0, 1.0);
    a + t * (b - a)
}
