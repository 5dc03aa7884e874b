//! Signed distance functions and CSG combinators for building fields.
//!
//! Every primitive takes the query point last, so a field is usually a short
//! closure: `|p| sphere(3.0, p)`.

use glam::{Vec2, Vec3A, Vec3Swizzles};

pub fn sphere(r: f32, p: Vec3A) -> f32 {
    p.length() - r
}

/// Half-space below the plane through `o` with unit normal `n`.
pub fn plane(o: Vec3A, n: Vec3A, p: Vec3A) -> f32 {
    (p - o).dot(n)
}

/// Axis-aligned box with half extents `b`.
pub fn cube(b: Vec3A, p: Vec3A) -> f32 {
    let q = p.abs() - b;
    q.max(Vec3A::ZERO).length() + q.max_element().min(0.0)
}

/// The octant `p <= corner` (componentwise): three axis-aligned planes
/// meeting in a sharp corner.
pub fn cube_corner(corner: Vec3A, p: Vec3A) -> f32 {
    (p - corner).max_element()
}

pub fn torus(t: Vec2, p: Vec3A) -> f32 {
    let q = Vec2::new(p.xz().length() - t.x, p.y);
    q.length() - t.y
}

pub fn octahedron(p: Vec3A, s: f32) -> f32 {
    let p = p.abs();
    (p.x + p.y + p.z - s) * 0.57735027
}

pub fn capped_cylinder(p: Vec3A, h: f32, r: f32) -> f32 {
    let d = Vec2::new(p.xz().length(), p.y).abs() - Vec2::new(h, r);
    d.x.max(d.y).min(0.0) + d.max(Vec2::ZERO).length()
}

#[inline]
pub fn union(a: f32, b: f32) -> f32 {
    a.min(b)
}

#[inline]
pub fn intersection(a: f32, b: f32) -> f32 {
    a.max(b)
}

/// `a` with `b` carved out.
#[inline]
pub fn difference(a: f32, b: f32) -> f32 {
    a.max(-b)
}
