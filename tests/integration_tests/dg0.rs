use femloop::assembly::JacobianAssembler;
use femloop::config::AssemblyConfig;
use femloop::fields::piecewise_constant::PiecewiseConstantFields;
use femloop::fields::VariableId;
use femloop::kernels::{InteriorPenalty, ReactionKernel, RobinBoundary};
use femloop::matrix::SparseJacobian;
use femloop::mesh::procedural::{create_uniform_line_mesh, LINE_LEFT, LINE_RIGHT};
use femloop::mesh::{ElementId, SubdomainId};
use femloop::nalgebra::DMatrix;
use femloop::physics::PhysicsContribution;
use femloop::registry::{KernelWarehouse, Restriction};
use matrixcompare::assert_matrix_eq;
use std::sync::Arc;

const U: VariableId = VariableId(0);

/// Reaction `k = 2`, interior penalty `σ = 3` and Robin `α = 5` on both ends.
fn reaction_penalty_robin(reaction: ReactionKernel<f64>) -> (KernelWarehouse<f64>, Arc<RobinBoundary<f64>>) {
    let robin = Arc::new(RobinBoundary::new("robin", U, 5.0));
    let mut warehouse = KernelWarehouse::<f64>::new();
    warehouse
        .add(PhysicsContribution::volume(reaction), Restriction::Everywhere)
        .unwrap();
    warehouse
        .add(
            PhysicsContribution::face(InteriorPenalty::new("penalty", U, 3.0)),
            Restriction::Everywhere,
        )
        .unwrap();
    warehouse
        .add(
            PhysicsContribution::Boundary(robin.clone()),
            Restriction::boundaries([LINE_LEFT, LINE_RIGHT]),
        )
        .unwrap();
    (warehouse, robin)
}

#[rustfmt::skip]
fn expected_chain_jacobian() -> DMatrix<f64> {
    DMatrix::from_row_slice(4, 4, &[
         9.0, -3.0,  0.0,  0.0,
        -3.0,  7.0, -3.0,  0.0,
         0.0, -3.0,  7.0, -3.0,
         0.0,  0.0, -3.0,  9.0,
    ])
}

#[test]
fn dg0_chain_jacobian() {
    // Four cells of length 0.5
    let mesh = create_uniform_line_mesh(4, 2.0);
    let fields = PiecewiseConstantFields::<f64>::new(&mesh, 1);
    let (warehouse, _) = reaction_penalty_robin(ReactionKernel::new("reaction", U, 2.0));

    let mut jacobian = SparseJacobian::new(fields.num_dofs(), fields.num_dofs());
    let report = JacobianAssembler::<f64, _, _, _>::new(&mesh, &warehouse, &fields)
        .assemble_into(&mut jacobian)
        .unwrap();

    assert_eq!(report.elements, 4);
    assert_eq!(report.internal_faces, 3);
    assert_eq!(report.boundary_faces, 2);
    assert_matrix_eq!(DMatrix::from(&jacobian.to_csr()), expected_chain_jacobian(), comp = abs, tol = 1e-12);
}

#[test]
fn dg0_chain_jacobian_with_material_properties() {
    let mut mesh = create_uniform_line_mesh(4, 2.0);
    mesh.set_subdomain(ElementId(3), SubdomainId(1));
    let fields = PiecewiseConstantFields::<f64>::new(&mesh, 1)
        .with_subdomain_material(SubdomainId(0), "k", 2.0)
        .with_subdomain_material(SubdomainId(1), "k", 4.0);
    let (warehouse, _) = reaction_penalty_robin(ReactionKernel::new("reaction", U, 1.0).with_material("k"));

    let mut jacobian = SparseJacobian::new(4, 4);
    let report = JacobianAssembler::<f64, _, _, _>::new(&mesh, &warehouse, &fields)
        .with_config(AssemblyConfig::default().with_num_threads(2))
        .assemble_into(&mut jacobian)
        .unwrap();

    let mut expected = expected_chain_jacobian();
    expected[(3, 3)] += 1.0;
    assert_matrix_eq!(DMatrix::from(&jacobian.to_csr()), expected, comp = abs, tol = 1e-12);
    // Worker 0 visits subdomain 0, worker 1 visits subdomains 0 and 1
    assert_eq!(report.subdomain_changes, 3);
}

#[test]
fn disabled_boundary_conditions_are_skipped() {
    let mesh = create_uniform_line_mesh(4, 2.0);
    let fields = PiecewiseConstantFields::<f64>::new(&mesh, 1);
    let (warehouse, robin) = reaction_penalty_robin(ReactionKernel::new("reaction", U, 2.0));
    robin.set_enabled(false);

    let mut jacobian = SparseJacobian::new(4, 4);
    JacobianAssembler::<f64, _, _, _>::new(&mesh, &warehouse, &fields)
        .assemble_into(&mut jacobian)
        .unwrap();

    let mut expected = expected_chain_jacobian();
    expected[(0, 0)] -= 5.0;
    expected[(3, 3)] -= 5.0;
    assert_matrix_eq!(DMatrix::from(&jacobian.to_csr()), expected, comp = abs, tol = 1e-12);
}

#[test]
fn explicit_kernels_do_not_enter_the_jacobian() {
    let mesh = create_uniform_line_mesh(4, 2.0);
    let fields = PiecewiseConstantFields::<f64>::new(&mesh, 1);
    let (mut warehouse, _) = reaction_penalty_robin(ReactionKernel::new("reaction", U, 2.0));
    warehouse
        .add(
            PhysicsContribution::volume(ReactionKernel::new("source", U, 100.0).explicit()),
            Restriction::Everywhere,
        )
        .unwrap();

    let mut jacobian = SparseJacobian::new(4, 4);
    JacobianAssembler::<f64, _, _, _>::new(&mesh, &warehouse, &fields)
        .assemble_into(&mut jacobian)
        .unwrap();
    assert_matrix_eq!(DMatrix::from(&jacobian.to_csr()), expected_chain_jacobian(), comp = abs, tol = 1e-12);
}

#[test]
fn two_variable_system_couples_through_the_reaction() {
    let mesh = create_uniform_line_mesh(2, 1.0);
    let fields = PiecewiseConstantFields::<f64>::new(&mesh, 2);
    let v = VariableId(1);
    let mut warehouse = KernelWarehouse::<f64>::new();
    warehouse
        .add(
            PhysicsContribution::volume(ReactionKernel::new("u", U, 2.0)),
            Restriction::Everywhere,
        )
        .unwrap();
    warehouse
        .add(
            PhysicsContribution::volume(ReactionKernel::new("v_from_u", v, -1.0).with_coupled_variable(U)),
            Restriction::Everywhere,
        )
        .unwrap();
    warehouse
        .add(
            PhysicsContribution::volume(ReactionKernel::new("v", v, 4.0)),
            Restriction::Everywhere,
        )
        .unwrap();

    let mut jacobian = SparseJacobian::new(fields.num_dofs(), fields.num_dofs());
    JacobianAssembler::<f64, _, _, _>::new(&mesh, &warehouse, &fields)
        .with_config(AssemblyConfig::default().with_num_threads(2))
        .assemble_into(&mut jacobian)
        .unwrap();

    // Unknowns are ordered [u0, v0, u1, v1], cells have length 0.5
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(4, 4, &[
         1.0, 0.0, 0.0, 0.0,
        -0.5, 2.0, 0.0, 0.0,
         0.0, 0.0, 1.0, 0.0,
         0.0, 0.0,-0.5, 2.0,
    ]);
    assert_matrix_eq!(DMatrix::from(&jacobian.to_csr()), expected, comp = abs, tol = 1e-12);
}
