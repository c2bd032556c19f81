use crate::mesh::procedural::{create_uniform_line_mesh, create_uniform_quad_mesh_2d};
use crate::mesh::{ElementId, ElementInfo, ElementMesh, SubdomainId};
use ::proptest::prelude::*;

impl Arbitrary for ElementInfo {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        (0..1000usize, 0..5u32, any::<bool>(), 0..4u32)
            .prop_map(|(id, level, active, subdomain)| ElementInfo {
                id: ElementId(id),
                level,
                active,
                subdomain: SubdomainId(subdomain),
            })
            .boxed()
    }
}

/// Pairs of distinct elements, as found on the two sides of an internal face.
pub fn element_pair() -> impl Strategy<Value = (ElementInfo, ElementInfo)> {
    (any::<ElementInfo>(), any::<ElementInfo>()).prop_filter("Elements must be distinct", |(a, b)| a.id != b.id)
}

/// Line meshes with up to `max_cells` elements, where each element is put in one of
/// `num_subdomains` subdomains.
pub fn line_mesh_strategy(max_cells: usize, num_subdomains: u32) -> impl Strategy<Value = ElementMesh> {
    assert!(num_subdomains > 0, "Need at least one subdomain");
    (1..=max_cells)
        .prop_flat_map(move |num_cells| prop::collection::vec(0..num_subdomains, num_cells))
        .prop_map(|subdomains| {
            let mut mesh = create_uniform_line_mesh(subdomains.len(), 1.0);
            for (i, subdomain) in subdomains.into_iter().enumerate() {
                mesh.set_subdomain(ElementId(i), SubdomainId(subdomain));
            }
            mesh
        })
}

/// Uniform quad grids with up to `max_cells` cells in each direction.
pub fn quad_mesh_strategy(max_cells: usize) -> impl Strategy<Value = ElementMesh> {
    (1..=max_cells, 1..=max_cells).prop_map(|(cells_x, cells_y)| create_uniform_quad_mesh_2d(cells_x, cells_y, 1.0))
}
