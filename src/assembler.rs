use indicatif::ProgressBar;
use nalgebra::{matrix, Matrix2, Matrix2x3, Vector3};
use rayon::prelude::*;
use tracing::info;

use crate::{
    datatypes::{Element, ElementContribution, ElementNodes, GlobalSystem, Mesh, Vertex},
    error::LodestoneError,
};

/// Area of the reference triangle `(0,0), (1,0), (0,1)`.
pub const REFERENCE_AREA: f64 = 0.5;

/// Gradients of the three linear shape functions on the reference triangle,
/// one column per shape function.
pub fn reference_gradient() -> Matrix2x3<f64> {
    matrix![
        -1.0, 1.0, 0.0;
        -1.0, 0.0, 1.0;
    ]
}

/// Reference shape functions evaluated at the centroid `(1/3, 1/3)`.
pub fn centroid_shape_values() -> Vector3<f64> {
    Vector3::new(1.0 - 1.0 / 3.0 - 1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0)
}

/// Calculates the jacobian of the affine map from the reference triangle
///
/// # Arguments
/// * `vertices` - The three corners of the element, in stored order
///
/// # Returns
/// A 2x2 matrix whose rows are the edge vectors `v1 - v0` and `v2 - v0`
pub fn compute_jacobian(vertices: [&Vertex; 3]) -> Matrix2<f64> {
    let [v0, v1, v2] = vertices;

    matrix![
        v1.x - v0.x, v1.y - v0.y;
        v2.x - v0.x, v2.y - v0.y;
    ]
}

fn element_vertices<'a>(
    element: &Element,
    nodes: [usize; 3],
    mesh: &'a Mesh,
) -> Result<[&'a Vertex; 3], LodestoneError> {
    let vertex = |n: usize| {
        mesh.node(n)
            .map(|node| &node.vertex)
            .ok_or(LodestoneError::Index {
                element: Some(element.index),
                node: n,
                node_count: mesh.node_count(),
            })
    };

    Ok([vertex(nodes[0])?, vertex(nodes[1])?, vertex(nodes[2])?])
}

/// Computes the local stiffness matrix and load vector of one triangle
///
/// Only reads the mesh, so it may run concurrently for distinct elements.
///
/// # Arguments
/// * `element` - The triangle to integrate
/// * `mesh` - The mesh the element belongs to
///
/// # Returns
/// The 3x3 stiffness, the length-3 load and the global node indices they
/// refer to, or a geometry error if the triangle is inverted or degenerate
pub fn compute_element_contribution(
    element: &Element,
    mesh: &Mesh,
) -> Result<ElementContribution, LodestoneError> {
    let nodes = match element.nodes {
        ElementNodes::Triangle(nodes) => nodes,
        ElementNodes::Line(_) => {
            return Err(LodestoneError::Input(format!(
                "Element {} is a line and has no stiffness contribution",
                element.index
            )))
        }
    };

    let jacobian = compute_jacobian(element_vertices(element, nodes, mesh)?);
    let jacobian_determinant = jacobian.determinant();

    let geometry_error = LodestoneError::Geometry {
        element: element.index,
        determinant: jacobian_determinant,
    };
    // Also rejects NaN coordinates.
    if !(jacobian_determinant > 0.0) {
        return Err(geometry_error);
    }
    let inverse_jacobian = jacobian.try_inverse().ok_or(geometry_error)?;

    let physical_gradient = inverse_jacobian * reference_gradient();
    let physical_area = jacobian_determinant * REFERENCE_AREA;

    let stiffness = physical_gradient.transpose()
        * physical_gradient
        * physical_area
        * element.material_coefficient;
    let load = centroid_shape_values() * physical_area * element.source_density;

    Ok(ElementContribution {
        nodes,
        stiffness,
        load,
        jacobian_determinant,
    })
}

/// Computes the contribution of every triangle in mesh order, in parallel.
///
/// When several triangles fail, the error of the first one in mesh order is
/// returned.
pub fn compute_element_contributions(
    mesh: &Mesh,
) -> Result<Vec<ElementContribution>, LodestoneError> {
    let results: Vec<Result<ElementContribution, LodestoneError>> = mesh
        .elements()
        .par_iter()
        .filter(|element| element.dimension() == 2)
        .map(|element| compute_element_contribution(element, mesh))
        .collect();

    results.into_iter().collect()
}

/// Adds one element's local contribution into the global system
///
/// # Arguments
/// * `system` - The global system being accumulated
/// * `contribution` - The local stiffness and load of one triangle
pub fn scatter_add(system: &mut GlobalSystem, contribution: &ElementContribution) {
    for (local_row, &global_row) in contribution.nodes.iter().enumerate() {
        system.load[global_row] += contribution.load[local_row];

        for (local_col, &global_col) in contribution.nodes.iter().enumerate() {
            system.stiffness[(global_row, global_col)] +=
                contribution.stiffness[(local_row, local_col)];
        }
    }
}

/// Compiles the element contributions into the global system
///
/// Local matrices are computed in parallel; the accumulation itself is a
/// single-owner pass in element order, so the result does not depend on
/// scheduling.
///
/// # Arguments
/// * `mesh` - The mesh, with region coefficients already applied
///
/// # Returns
/// A `node_count` square stiffness matrix and load vector
pub fn build_global_system(mesh: &Mesh) -> Result<GlobalSystem, LodestoneError> {
    info!("building element stiffness matrices...");
    let contributions = compute_element_contributions(mesh)?;

    info!("building global stiffness matrix...");
    let mut system = GlobalSystem::zeros(mesh.node_count());

    let bar = ProgressBar::new(contributions.len() as u64);
    for contribution in &contributions {
        scatter_add(&mut system, contribution);
        bar.inc(1);
    }
    bar.finish_and_clear();

    info!(
        "assembled {} triangles into a {n}x{n} system",
        contributions.len(),
        n = system.size()
    );

    Ok(system)
}
