use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use tracing::info;

use crate::{datatypes::Mesh, error::LodestoneError};

/// Writes the nodal potentials as `index,x,y,potential` rows.
pub fn write_nodes<W: Write>(
    writer: &mut W,
    mesh: &Mesh,
    potentials: &[f64],
) -> Result<(), LodestoneError> {
    if potentials.len() != mesh.node_count() {
        return Err(LodestoneError::Input(format!(
            "Got {} potentials for {} nodes",
            potentials.len(),
            mesh.node_count()
        )));
    }

    writeln!(writer, "index,x,y,potential")?;
    for (node, potential) in mesh.nodes().iter().zip(potentials) {
        writeln!(
            writer,
            "{},{},{},{}",
            node.index, node.vertex.x, node.vertex.y, potential
        )?;
    }

    Ok(())
}

/// Writes the triangles as `index,n0,n1,n2,material,source` rows.
pub fn write_elements<W: Write>(writer: &mut W, mesh: &Mesh) -> Result<(), LodestoneError> {
    writeln!(writer, "index,n0,n1,n2,material,source")?;
    for (element, [n0, n1, n2]) in mesh.triangles() {
        writeln!(
            writer,
            "{},{n0},{n1},{n2},{},{}",
            element.index, element.material_coefficient, element.source_density
        )?;
    }

    Ok(())
}

/// Writes simulation results to two CSV files
///
/// # Arguments
/// * `mesh` - The solved mesh
/// * `potentials` - One potential per node
/// * `nodes_output` - The filename of the output nodes csv
/// * `elements_output` - The filename of the output elements csv
pub fn csv_output(
    mesh: &Mesh,
    potentials: &[f64],
    nodes_output: &Path,
    elements_output: &Path,
) -> Result<(), LodestoneError> {
    let mut nodes_file = BufWriter::new(File::create(nodes_output)?);
    write_nodes(&mut nodes_file, mesh, potentials)?;
    nodes_file.flush()?;

    let mut elements_file = BufWriter::new(File::create(elements_output)?);
    write_elements(&mut elements_file, mesh)?;
    elements_file.flush()?;

    info!(
        "wrote output to {} and {}",
        nodes_output.display(),
        elements_output.display()
    );

    Ok(())
}
