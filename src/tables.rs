//! Corner and edge numbering shared by the octree, the QEF solver and the
//! mesher.
//!
//! Corners (and child octants) are in Z order: bit 0 is +X, bit 1 is +Y,
//! bit 2 is +Z. This matches the order of `Extent::corners3` and
//! `Extent::split3`.

/// Unit offset of each corner from the cell minimum.
pub const CORNER_OFFSETS: [[i32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

/// For edge axis `t`, the axes `(u, v)` such that `(t, u, v)` is right-handed.
pub const AXIS_UV: [[usize; 2]; 3] = [[1, 2], [2, 0], [0, 1]];

/// Corner pairs `(min end, max end)` of the 4 cell edges parallel to each
/// axis. Edge `i` of axis `t` sits at offset `(i & 1)` along `u` and
/// `(i >> 1)` along `v`.
pub const CELL_EDGES: [[[usize; 2]; 4]; 3] = [
    [
        // X
        [0b000, 0b001],
        [0b010, 0b011],
        [0b100, 0b101],
        [0b110, 0b111],
    ],
    [
        // Y
        [0b000, 0b010],
        [0b100, 0b110],
        [0b001, 0b011],
        [0b101, 0b111],
    ],
    [
        // Z
        [0b000, 0b100],
        [0b001, 0b101],
        [0b010, 0b110],
        [0b011, 0b111],
    ],
];

/// Quadrants around an edge as `(u side, v side)` with 0 = minus and 1 =
/// plus, in counter-clockwise order when looking down the edge from its max
/// end.
pub const QUADRANTS_CCW: [[usize; 2]; 4] = [[0, 0], [1, 0], [1, 1], [0, 1]];

/// Quadrant slot (index into [`QUADRANTS_CCW`]) for a `(u side, v side)` pair.
#[inline]
pub fn quadrant_slot(u_side: usize, v_side: usize) -> usize {
    match (u_side, v_side) {
        (0, 0) => 0,
        (1, 0) => 1,
        (1, 1) => 2,
        _ => 3,
    }
}
