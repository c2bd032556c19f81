//! Basic procedural mesh generation routines.
use crate::mesh::{BoundaryId, ElementId, ElementMesh, SubdomainId};

pub const LINE_LEFT: BoundaryId = BoundaryId(0);
pub const LINE_RIGHT: BoundaryId = BoundaryId(1);

pub const QUAD_BOTTOM: BoundaryId = BoundaryId(0);
pub const QUAD_RIGHT: BoundaryId = BoundaryId(1);
pub const QUAD_TOP: BoundaryId = BoundaryId(2);
pub const QUAD_LEFT: BoundaryId = BoundaryId(3);

/// Generates a uniform mesh of the interval `[0, length]` with `num_cells` elements in subdomain 0.
///
/// Side 0 of each element faces left and side 1 faces right. The outer sides are labelled
/// [`LINE_LEFT`] and [`LINE_RIGHT`].
pub fn create_uniform_line_mesh(num_cells: usize, length: f64) -> ElementMesh {
    let mut mesh = ElementMesh::new();
    if num_cells == 0 {
        return mesh;
    }

    let h = length / num_cells as f64;
    for _ in 0..num_cells {
        let id = mesh.add_element(0, SubdomainId(0), 2);
        mesh.set_element_measure(id, h);
    }

    for i in 1..num_cells {
        mesh.connect(ElementId(i - 1), 1, ElementId(i), 0);
    }

    mesh.add_boundary_side(ElementId(0), 0, LINE_LEFT);
    mesh.add_boundary_side(ElementId(num_cells - 1), 1, LINE_RIGHT);
    mesh
}

/// Generates a uniform grid of `cells_x` by `cells_y` square elements with side length
/// `cell_size` in subdomain 0.
///
/// Element `(i, j)` has id `j * cells_x + i`. Sides are numbered bottom, right, top, left,
/// and the outer sides are labelled with the corresponding `QUAD_*` boundary.
pub fn create_uniform_quad_mesh_2d(cells_x: usize, cells_y: usize, cell_size: f64) -> ElementMesh {
    let mut mesh = ElementMesh::new();
    if cells_x == 0 || cells_y == 0 {
        return mesh;
    }

    let index = |i: usize, j: usize| ElementId(j * cells_x + i);

    for _ in 0..cells_x * cells_y {
        let id = mesh.add_element(0, SubdomainId(0), 4);
        mesh.set_element_measure(id, cell_size * cell_size);
        for side in 0..4 {
            mesh.set_side_measure(id, side, cell_size);
        }
    }

    for j in 0..cells_y {
        for i in 0..cells_x {
            if i + 1 < cells_x {
                mesh.connect(index(i, j), 1, index(i + 1, j), 3);
            }
            if j + 1 < cells_y {
                mesh.connect(index(i, j), 2, index(i, j + 1), 0);
            }
        }
    }

    for i in 0..cells_x {
        mesh.add_boundary_side(index(i, 0), 0, QUAD_BOTTOM);
        mesh.add_boundary_side(index(i, cells_y - 1), 2, QUAD_TOP);
    }
    for j in 0..cells_y {
        mesh.add_boundary_side(index(cells_x - 1, j), 1, QUAD_RIGHT);
        mesh.add_boundary_side(index(0, j), 3, QUAD_LEFT);
    }

    mesh
}
