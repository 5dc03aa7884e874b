use approx::assert_relative_eq;
use glam::Vec3A;
use sharp_contour::{
    contour, sdf_primitives::*, ContourConfig, Error, RootExtent, SolverStrategy,
};
use std::collections::HashMap;
use std::f32::consts::PI;

fn sphere_config() -> ContourConfig {
    // An 8x8x8 box.
    ContourConfig::new(RootExtent::new(Vec3A::ZERO, 4.0), 0.5)
}

#[test]
fn sphere_mesh_is_closed_and_close_to_analytic() {
    let field = |p: Vec3A| sphere(3.0, p);
    let config = sphere_config();
    let result = contour(&field, &config).unwrap();
    let mesh = &result.mesh;

    assert!(!mesh.is_empty());
    assert_eq!(result.stats.mesh.inconsistent_edges, 0);
    assert_eq!(result.stats.mesh.boundary_edges, 0);
    assert_eq!(result.stats.depth, 3);

    for p in &mesh.positions {
        assert!(p.abs().max_element() <= 4.0, "{p} is outside the box");
        assert!(field(*p).abs() < 0.25, "{p} is far from the sphere");
    }

    // Every directed edge appears once, and its reverse once: watertight and
    // consistently oriented.
    let mut directed = HashMap::new();
    for t in mesh.indices.chunks_exact(3) {
        for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
            *directed.entry((a, b)).or_insert(0) += 1;
        }
    }
    for (&(a, b), &count) in &directed {
        assert_eq!(count, 1);
        assert_eq!(directed.get(&(b, a)), Some(&1));
    }

    let area = 4.0 * PI * 9.0;
    assert_relative_eq!(mesh.surface_area(), area, max_relative = 0.1);
    let volume = 4.0 / 3.0 * PI * 27.0;
    assert_relative_eq!(mesh.signed_volume(), volume, max_relative = 0.1);
}

#[test]
fn extraction_is_deterministic() {
    let field = |p: Vec3A| union(sphere(2.0, p - Vec3A::X), cube(Vec3A::splat(1.5), p + Vec3A::Y));
    for solver in [
        SolverStrategy::SvdPseudoinverse,
        SolverStrategy::NormalEquations,
    ] {
        let config = sphere_config().with_solver(solver);
        let a = contour(&field, &config).unwrap();
        let b = contour(&field, &config).unwrap();
        assert!(!a.mesh.is_empty());
        assert_eq!(a, b);
    }
}

#[test]
fn parallel_matches_serial() {
    let field = |p: Vec3A| torus(glam::Vec2::new(2.5, 0.8), p);
    let config = sphere_config().with_min_depth(3);
    let serial = contour(&field, &config).unwrap();
    let parallel = contour(&field, &config.with_parallel(true)).unwrap();
    assert!(!serial.mesh.is_empty());
    assert_eq!(serial, parallel);
}

#[test]
fn cube_edges_and_corners_are_sharp() {
    let center = Vec3A::splat(0.1);
    let field = move |p: Vec3A| cube(Vec3A::splat(2.3), p - center);
    let result = contour(&field, &sphere_config()).unwrap();
    let mesh = &result.mesh;

    assert_eq!(result.stats.mesh.inconsistent_edges, 0);
    let side = 4.6f32;
    assert_relative_eq!(mesh.surface_area(), 6.0 * side * side, max_relative = 1e-2);
    assert_relative_eq!(mesh.signed_volume(), side * side * side, max_relative = 1e-2);

    // All 8 corners of the box appear as dual vertices.
    for corner in 0..8 {
        let sign = Vec3A::new(
            if corner & 1 == 0 { -1.0 } else { 1.0 },
            if corner & 2 == 0 { -1.0 } else { 1.0 },
            if corner & 4 == 0 { -1.0 } else { 1.0 },
        );
        let expected = center + 2.3 * sign;
        let nearest = mesh
            .positions
            .iter()
            .map(|p| (*p - expected).length())
            .fold(f32::INFINITY, f32::min);
        assert!(nearest < 1e-2, "corner {expected} is off by {nearest}");
    }
}

#[test]
fn planes_are_flat_under_both_strategies() {
    let field = |p: Vec3A| p.x - 0.3;
    for solver in [
        SolverStrategy::SvdPseudoinverse,
        SolverStrategy::NormalEquations,
    ] {
        let config = ContourConfig::new(RootExtent::new(Vec3A::ZERO, 1.0), 0.25).with_solver(solver);
        let result = contour(&field, &config).unwrap();
        assert!(!result.mesh.is_empty());
        // The plane leaves the domain, so its rim is open.
        assert!(result.stats.mesh.boundary_edges > 0);
        for p in &result.mesh.positions {
            assert_relative_eq!(p.x, 0.3, epsilon = 1e-4);
        }
        for [a, b, c] in result.mesh.triangles() {
            let n = (b - a).cross(c - a).normalize();
            assert!(n.x > 0.99, "{solver:?}: {n}");
        }
    }
}

#[test]
fn field_outside_the_box_gives_an_empty_mesh() {
    let field = |p: Vec3A| sphere(1.0, p - Vec3A::splat(20.0));
    let result = contour(&field, &sphere_config()).unwrap();
    assert!(result.mesh.is_empty());
    assert_eq!(result.stats.mesh.vertices, 0);
    // min_depth still splits the root twice.
    assert_eq!(result.stats.leaves, 64);
}

#[test]
fn invalid_config_is_rejected() {
    let field = |p: Vec3A| sphere(1.0, p);
    let config = ContourConfig::new(RootExtent::new(Vec3A::ZERO, 1.0), -0.5);
    assert_eq!(contour(&field, &config), Err(Error::InvalidMinHalfSize(-0.5)));
}
