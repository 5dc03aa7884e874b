use crate::{
    config::ContourConfig,
    field::{find_edge_crossing, is_inside, ImplicitField},
    CellId, CellOctree, OctreeCell,
};
use glam::Vec3A;
use ilattice::extent::Extent;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use std::ops::{Add, AddAssign};

/// How the QEF is minimized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SolverStrategy {
    /// Solve `(AᵀA) v = Aᵀd` in closed form. Fast, but falls back to the mass
    /// point when `AᵀA` is (near) singular, e.g. in flat regions.
    NormalEquations,
    /// `v = A⁺d` with a truncated SVD pseudoinverse. Robust to rank-deficient
    /// systems, and snaps to edges and corners when the normals allow it.
    #[default]
    SvdPseudoinverse,
}

/// Quadric Error Function
///
/// `x^T A x - 2 b^T x + c`, where `A = Σ n nᵀ`, `b = Σ n (n·p)` and
/// `c = Σ (n·p)²` over the accumulated tangent planes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Qef {
    a00: f32,
    a01: f32,
    a02: f32,
    a11: f32,
    a12: f32,
    a22: f32,

    b: Vec3A,

    c: f32,
}

impl Qef {
    pub fn from_coefficients(a_cols: [[f32; 3]; 3], b: Vec3A, c: f32) -> Self {
        Self {
            // Keep one triangle of the symmetric matrix.
            a00: a_cols[0][0],
            a01: a_cols[0][1],
            a02: a_cols[0][2],
            a11: a_cols[1][1],
            a12: a_cols[1][2],
            a22: a_cols[2][2],
            b,
            c,
        }
    }

    /// Tangent plane through `p` with unit normal `n`.
    pub fn plane(p: Vec3A, n: Vec3A) -> Self {
        let d = p.dot(n);
        Self::from_coefficients(self_outer_product(n.into()), d * n, d * d)
    }

    #[inline]
    fn mul_a(&self, p: Vec3A) -> Vec3A {
        Vec3A::new(
            self.a00 * p[0] + self.a01 * p[1] + self.a02 * p[2],
            self.a01 * p[0] + self.a11 * p[1] + self.a12 * p[2],
            self.a02 * p[0] + self.a12 * p[1] + self.a22 * p[2],
        )
    }

    /// Sum of squared distances from `p` to the accumulated planes.
    pub fn error(&self, p: Vec3A) -> f32 {
        (p.dot(self.mul_a(p)) - 2.0 * p.dot(self.b) + self.c).max(0.0)
    }

    /// Solves the normal equations `A x = b` for the offset from `origin`.
    ///
    /// Returns `None` when `A` is too close to singular for a closed-form
    /// inverse.
    pub fn minimizer_about(&self, origin: Vec3A) -> Option<Vec3A> {
        // Shift so the solve happens relative to `origin`.
        let rhs = self.b - self.mul_a(origin);

        let a = self.a00;
        let b = self.a01;
        let c = self.a02;
        let d = self.a11;
        let e = self.a12;
        let f = self.a22;

        let ad = a * d;
        let ae = a * e;
        let af = a * f;
        let bc = b * c;
        let be = b * e;
        let bf = b * f;
        let df = d * f;
        let ce = c * e;
        let cd = c * d;

        let be_cd = be - cd;
        let bc_ae = bc - ae;
        let ce_bf = ce - bf;

        let det = a * df + 2.0 * b * ce - ae * e - bf * b - cd * c;
        let trace = a + d + f;
        if !det.is_finite() || det.abs() <= SINGULAR_DETERMINANT * trace.powi(3) {
            return None;
        }
        let denom = 1.0 / det;

        let nom0 = rhs.dot(Vec3A::new(df - e * e, ce_bf, be_cd));
        let nom1 = rhs.dot(Vec3A::new(ce_bf, af - c * c, bc_ae));
        let nom2 = rhs.dot(Vec3A::new(be_cd, bc_ae, ad - b * b));

        let x = origin + denom * Vec3A::new(nom0, nom1, nom2);
        x.is_finite().then_some(x)
    }
}

/// Relative to `trace(A)^3`; below this `AᵀA` is treated as singular.
const SINGULAR_DETERMINANT: f32 = 1e-6;

impl Add for Qef {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            a00: self.a00 + rhs.a00,
            a01: self.a01 + rhs.a01,
            a02: self.a02 + rhs.a02,
            a11: self.a11 + rhs.a11,
            a12: self.a12 + rhs.a12,
            a22: self.a22 + rhs.a22,
            b: self.b + rhs.b,
            c: self.c + rhs.c,
        }
    }
}

impl AddAssign for Qef {
    fn add_assign(&mut self, rhs: Self) {
        *self = std::mem::take(self) + rhs;
    }
}

fn self_outer_product([a, b, c]: [f32; 3]) -> [[f32; 3]; 3] {
    [
        [a * a, a * b, a * c],
        [a * b, b * b, b * c],
        [a * c, b * c, c * c],
    ]
}

/// Surface crossings and normals gathered from one cell's edges.
#[derive(Clone, Debug, Default)]
pub struct HermiteData {
    points: Vec<Vec3A>,
    normals: Vec<Vec3A>,
    /// Crossings without a usable normal only pull the mass point.
    mass_point_sum: Vec3A,
    num_crossings: u32,
}

impl HermiteData {
    pub fn push(&mut self, point: Vec3A, normal: Vec3A) {
        self.mass_point_sum += point;
        self.num_crossings += 1;
        if normal != Vec3A::ZERO && normal.is_finite() {
            self.points.push(point);
            self.normals.push(normal);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.num_crossings == 0
    }

    pub fn num_crossings(&self) -> u32 {
        self.num_crossings
    }

    pub fn points(&self) -> &[Vec3A] {
        &self.points
    }

    pub fn normals(&self) -> &[Vec3A] {
        &self.normals
    }

    pub fn mass_point(&self) -> Vec3A {
        self.mass_point_sum / self.num_crossings.max(1) as f32
    }

    pub fn qef(&self) -> Qef {
        let mut qef = Qef::default();
        for (&p, &n) in self.points.iter().zip(&self.normals) {
            qef += Qef::plane(p, n);
        }
        qef
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QefSolution {
    pub vertex: Vec3A,
    pub error: f32,
}

/// Places one feature-preserving vertex in each non-homogeneous leaf.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QefSolver {
    pub strategy: SolverStrategy,
    pub singular_value_cutoff: f32,
    pub bisection_iterations: u32,
    pub gradient_delta: f32,
}

impl Default for QefSolver {
    fn default() -> Self {
        Self::from_config(&ContourConfig::default())
    }
}

impl QefSolver {
    pub fn new(strategy: SolverStrategy) -> Self {
        Self {
            strategy,
            ..Default::default()
        }
    }

    pub fn from_config(config: &ContourConfig) -> Self {
        Self {
            strategy: config.solver,
            singular_value_cutoff: config.singular_value_cutoff,
            bisection_iterations: config.bisection_iterations,
            gradient_delta: config.gradient_delta,
        }
    }

    /// Finds the crossing and surface normal on each bipolar edge of `cell`.
    pub fn gather(
        &self,
        cell: &OctreeCell,
        field: &(impl ImplicitField + ?Sized),
    ) -> HermiteData {
        let mut hermite = HermiteData::default();
        let corners = cell.extent().corners3();
        for [e1, e2] in Extent::<Vec3A>::EDGES3 {
            let s1 = cell.samples[e1];
            let s2 = cell.samples[e2];
            if is_inside(s1) == is_inside(s2) {
                continue;
            }
            let p = find_edge_crossing(
                field,
                corners[e1],
                corners[e2],
                s1,
                s2,
                self.bisection_iterations,
            );
            let normal = field.gradient(p, self.gradient_delta).normalize_or_zero();
            hermite.push(p, normal);
        }
        hermite
    }

    /// Minimizes the QEF of `hermite` and clamps the result into `cell`.
    pub fn solve(&self, hermite: &HermiteData, cell: &OctreeCell) -> QefSolution {
        let mass_point = hermite.mass_point();
        let qef = hermite.qef();

        let vertex = if hermite.normals().is_empty() {
            mass_point
        } else {
            match self.strategy {
                SolverStrategy::NormalEquations => {
                    qef.minimizer_about(mass_point).unwrap_or(mass_point)
                }
                SolverStrategy::SvdPseudoinverse => {
                    self.svd_minimizer(hermite, mass_point)
                }
            }
        };
        let vertex = if vertex.is_finite() { vertex } else { mass_point };

        // The mesher assumes every dual vertex lies inside its own cell.
        let vertex = vertex.clamp(cell.min(), cell.max());

        QefSolution {
            vertex,
            error: qef.error(vertex),
        }
    }

    fn svd_minimizer(&self, hermite: &HermiteData, mass_point: Vec3A) -> Vec3A {
        let normals = hermite.normals();
        let points = hermite.points();
        let n = normals.len();

        // Solve relative to the mass point, so that truncated directions
        // default to it rather than to the origin.
        let a = DMatrix::<f32>::from_fn(n, 3, |r, c| normals[r][c]);
        let d = DVector::<f32>::from_fn(n, |r, _| normals[r].dot(points[r] - mass_point));

        let svd = a.svd(true, true);
        let max_singular_value = svd.singular_values.iter().cloned().fold(0.0, f32::max);
        if max_singular_value.is_nan() || max_singular_value <= 0.0 {
            return mass_point;
        }
        let eps = max_singular_value * self.singular_value_cutoff;
        match svd.pseudo_inverse(eps) {
            Ok(pinv) => {
                let x = pinv * d;
                mass_point + Vec3A::new(x[0], x[1], x[2])
            }
            Err(e) => {
                log::debug!("pseudoinverse failed ({e}); using mass point");
                mass_point
            }
        }
    }

    /// Gathers and solves `cell`; `None` for homogeneous cells.
    pub fn solve_cell(
        &self,
        cell: &OctreeCell,
        field: &(impl ImplicitField + ?Sized),
    ) -> Option<QefSolution> {
        if cell.is_homogeneous() {
            return None;
        }
        let hermite = self.gather(cell, field);
        if hermite.is_empty() {
            return None;
        }
        Some(self.solve(&hermite, cell))
    }

    /// Places the vertex of a single leaf, writing `cell.vertex` and
    /// `cell.qef_error`.
    pub fn compute_vertex(
        &self,
        cell: &mut OctreeCell,
        field: &(impl ImplicitField + ?Sized),
    ) -> Option<Vec3A> {
        debug_assert!(cell.is_leaf());
        let solution = self.solve_cell(cell, field)?;
        cell.vertex = Some(solution.vertex);
        cell.qef_error = solution.error;
        Some(solution.vertex)
    }

    /// Places vertices in every non-homogeneous leaf of `octree`.
    ///
    /// Solves only read the tree; results are written back afterwards, so the
    /// parallel and serial paths give identical trees. Returns the number of
    /// placed vertices.
    pub fn resolve_vertices<F>(&self, octree: &mut CellOctree, field: &F, parallel: bool) -> usize
    where
        F: ImplicitField + Sync + ?Sized,
    {
        let candidates: Vec<CellId> = octree
            .leaf_ids()
            .filter(|&id| !octree.cell(id).is_homogeneous())
            .collect();

        let solve = |&id: &CellId| self.solve_cell(octree.cell(id), field);
        let solutions: Vec<Option<QefSolution>> = if parallel {
            candidates.par_iter().map(solve).collect()
        } else {
            candidates.iter().map(solve).collect()
        };

        let mut placed = 0;
        for (id, solution) in candidates.into_iter().zip(solutions) {
            if let Some(solution) = solution {
                let cell = octree.cell_mut(id);
                cell.vertex = Some(solution.vertex);
                cell.qef_error = solution.error;
                placed += 1;
            }
        }
        log::debug!("placed {placed} vertices ({:?})", self.strategy);
        placed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::RootExtent, sdf_primitives::*};
    use approx::assert_relative_eq;

    /// The unit cell `[0, 1]^3`, sampled from `field`.
    fn unit_cell(field: &impl ImplicitField) -> OctreeCell {
        let tree = CellOctree::new(RootExtent::new(Vec3A::splat(0.5), 0.5), field);
        tree.root().clone()
    }

    fn solve_with(strategy: SolverStrategy, field: &impl ImplicitField) -> QefSolution {
        let cell = unit_cell(field);
        QefSolver::new(strategy)
            .solve_cell(&cell, field)
            .expect("cell should be bipolar")
    }

    #[test]
    fn axis_plane_is_exact_under_both_strategies() {
        let field = |p: Vec3A| p.x - 0.5;
        let svd = solve_with(SolverStrategy::SvdPseudoinverse, &field);
        let direct = solve_with(SolverStrategy::NormalEquations, &field);
        assert_relative_eq!(svd.vertex.x, 0.5, epsilon = 1e-4);
        assert_relative_eq!(direct.vertex.x, 0.5, epsilon = 1e-4);
        assert!((svd.vertex - direct.vertex).length() < 1e-4);
        assert!(svd.error < 1e-6);
    }

    #[test]
    fn oblique_plane_is_exact_under_both_strategies() {
        let n = Vec3A::new(1.0, 2.0, 3.0).normalize();
        let o = Vec3A::new(0.4, 0.55, 0.5);
        let field = move |p: Vec3A| plane(o, n, p);
        for strategy in [
            SolverStrategy::SvdPseudoinverse,
            SolverStrategy::NormalEquations,
        ] {
            let solution = solve_with(strategy, &field);
            assert!(
                field(solution.vertex).abs() < 1e-3,
                "{strategy:?} vertex {} is off the plane",
                solution.vertex
            );
        }
    }

    #[test]
    fn sharp_corner_is_preserved() {
        let corner = Vec3A::new(0.3, 0.4, 0.2);
        let field = move |p: Vec3A| cube_corner(corner, p);

        let cell = unit_cell(&field);
        let solver = QefSolver::new(SolverStrategy::SvdPseudoinverse);
        let hermite = solver.gather(&cell, &field);
        assert_eq!(hermite.num_crossings(), 3);

        let solution = solver.solve(&hermite, &cell);
        assert!(
            (solution.vertex - corner).length() < 1e-3,
            "expected {corner}, got {}",
            solution.vertex
        );
        // Averaging the crossings would smooth the corner away.
        assert!((hermite.mass_point() - corner).length() > 0.1);
    }

    #[test]
    fn rank_deficient_systems_do_not_fail() {
        let cell = unit_cell(&|p: Vec3A| p.x - 0.5);
        let solver = QefSolver::default();

        let mut one = HermiteData::default();
        one.push(Vec3A::new(0.25, 0.5, 0.75), Vec3A::Z);
        let solution = solver.solve(&one, &cell);
        assert_relative_eq!(solution.vertex.z, 0.75, epsilon = 1e-5);

        // Two parallel planes: the edge direction is unconstrained.
        let mut two = HermiteData::default();
        two.push(Vec3A::new(0.5, 0.2, 0.0), Vec3A::Y);
        two.push(Vec3A::new(0.5, 0.4, 1.0), Vec3A::Y);
        for strategy in [
            SolverStrategy::SvdPseudoinverse,
            SolverStrategy::NormalEquations,
        ] {
            let solution = QefSolver::new(strategy).solve(&two, &cell);
            assert!((solution.vertex - Vec3A::new(0.5, 0.3, 0.5)).length() < 1e-5);
        }
    }

    #[test]
    fn out_of_cell_solutions_are_clamped() {
        let cell = unit_cell(&|p: Vec3A| p.x - 0.5);

        // Two steep planes meeting far below the cell, at y = -2.
        let mut hermite = HermiteData::default();
        hermite.push(
            Vec3A::new(0.0, 0.5, 0.5),
            Vec3A::new(1.0, 0.2, 0.0).normalize(),
        );
        hermite.push(
            Vec3A::new(1.0, 0.5, 0.5),
            Vec3A::new(1.0, -0.2, 0.0).normalize(),
        );

        for strategy in [
            SolverStrategy::SvdPseudoinverse,
            SolverStrategy::NormalEquations,
        ] {
            let solution = QefSolver::new(strategy).solve(&hermite, &cell);
            assert!(cell.contains(solution.vertex), "{strategy:?}");
        }

        let solution = QefSolver::new(SolverStrategy::SvdPseudoinverse).solve(&hermite, &cell);
        assert!((solution.vertex - Vec3A::new(0.5, 0.0, 0.5)).length() < 1e-4);
    }

    #[test]
    fn homogeneous_cells_get_no_vertex() {
        let field = |p: Vec3A| sphere(0.1, p - Vec3A::splat(5.0));
        let mut cell = unit_cell(&field);
        assert_eq!(QefSolver::default().compute_vertex(&mut cell, &field), None);
        assert_eq!(cell.vertex, None);
    }

    #[test]
    fn vertices_stay_in_their_cells() {
        let field = |p: Vec3A| sphere(3.0, p);
        let mut tree = CellOctree::build(
            RootExtent::new(Vec3A::ZERO, 4.0),
            crate::SubdivisionLimits {
                min_half_size: 0.5,
                min_depth: 2,
            },
            &field,
        );
        for strategy in [
            SolverStrategy::SvdPseudoinverse,
            SolverStrategy::NormalEquations,
        ] {
            let placed = QefSolver::new(strategy).resolve_vertices(&mut tree, &field, false);
            assert!(placed > 0);
            for leaf in tree.leaves() {
                match leaf.vertex {
                    Some(v) => {
                        assert!(!leaf.is_homogeneous());
                        assert!(leaf.contains(v));
                        // No farther from the surface than the cell diagonal.
                        assert!(field(v).abs() <= 2.0 * 3f32.sqrt() * leaf.half_size);
                    }
                    None => assert!(leaf.is_homogeneous()),
                }
            }
        }
    }

    #[test]
    fn parallel_resolve_matches_serial() {
        let field = |p: Vec3A| cube(Vec3A::splat(2.5), p);
        let build = || {
            CellOctree::build(
                RootExtent::new(Vec3A::ZERO, 4.0),
                crate::SubdivisionLimits {
                    min_half_size: 0.5,
                    min_depth: 2,
                },
                &field,
            )
        };
        let solver = QefSolver::default();
        let mut serial = build();
        let mut parallel = build();
        solver.resolve_vertices(&mut serial, &field, false);
        solver.resolve_vertices(&mut parallel, &field, true);
        let a: Vec<_> = serial.leaves().map(|c| c.vertex).collect();
        let b: Vec<_> = parallel.leaves().map(|c| c.vertex).collect();
        assert_eq!(a, b);
    }
}
