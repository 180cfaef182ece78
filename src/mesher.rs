use std::{path::Path, str::FromStr};

use tracing::{debug, info};

use crate::{
    datatypes::{BoundaryRule, Element, ElementNodes, Mesh, Node, PhysicalTag},
    error::LodestoneError,
};

/// Gmsh element type numbers understood by the parser.
const GMSH_LINE: u32 = 1;
const GMSH_TRIANGLE: u32 = 2;
const GMSH_POINT: u32 = 15;

/// A mesh together with the fixed-value pairs some formats carry inline.
#[derive(Debug, Clone)]
pub struct ParsedMesh {
    pub mesh: Mesh,
    pub boundary: Vec<BoundaryRule>,
}

/// A textual mesh grammar. Every implementation produces the same `Mesh`
/// shape, so nothing downstream depends on which one was used.
pub trait MeshParser {
    fn parse(&self, contents: &str) -> Result<ParsedMesh, LodestoneError>;
}

/// Gmsh ASCII `.msh`, format version 2.
#[derive(Debug, Default, Clone, Copy)]
pub struct GmshParser;

/// GilgaMesh `.malha`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MalhaParser;

enum MeshParseState {
    Format,
    Nodes,
    Elements,
    Skipped,
    Limbo,
}

/// Parses one whitespace separated field, naming it in the error.
fn parse_field<T: FromStr>(
    token: Option<&str>,
    line_number: usize,
    field: &str,
) -> Result<T, LodestoneError> {
    let token =
        token.ok_or_else(|| LodestoneError::parse(line_number, format!("missing {field}")))?;
    token
        .parse()
        .map_err(|_| LodestoneError::parse(line_number, format!("bad {field} '{token}'")))
}

/// Converts a 1-based node number from a mesh file into a node index.
fn node_index(number: usize, line_number: usize) -> Result<usize, LodestoneError> {
    number
        .checked_sub(1)
        .ok_or_else(|| LodestoneError::parse(line_number, "node numbers start at 1"))
}

impl GmshParser {
    fn parse_format(line: &str, line_number: usize) -> Result<(), LodestoneError> {
        let mut fields = line.split_whitespace();
        let version: String = parse_field(fields.next(), line_number, "format version")?;
        let file_type: u32 = parse_field(fields.next(), line_number, "file type")?;

        if !version.starts_with("2.") && version != "2" {
            return Err(LodestoneError::Input(format!(
                "Unsupported msh version {version}; export the mesh as msh 2"
            )));
        }
        if file_type != 0 {
            return Err(LodestoneError::Input(
                "Binary msh files are not supported".to_owned(),
            ));
        }

        Ok(())
    }

    fn parse_node(
        line: &str,
        line_number: usize,
        nodes: &mut [Option<Node>],
    ) -> Result<(), LodestoneError> {
        let mut fields = line.split_whitespace();
        let number: usize = parse_field(fields.next(), line_number, "node number")?;
        let x: f64 = parse_field(fields.next(), line_number, "x coordinate")?;
        let y: f64 = parse_field(fields.next(), line_number, "y coordinate")?;

        let index = node_index(number, line_number)?;
        let slot = nodes.get_mut(index).ok_or_else(|| {
            LodestoneError::parse(
                line_number,
                format!("node number {number} exceeds declared node count"),
            )
        })?;
        if slot.is_some() {
            return Err(LodestoneError::parse(
                line_number,
                format!("duplicate node number {number}"),
            ));
        }
        *slot = Some(Node::new(index, x, y));

        Ok(())
    }

    fn parse_element(
        line: &str,
        line_number: usize,
        elements: &mut Vec<Element>,
    ) -> Result<(), LodestoneError> {
        let mut fields = line.split_whitespace();
        let _number: usize = parse_field(fields.next(), line_number, "element number")?;
        let element_type: u32 = parse_field(fields.next(), line_number, "element type")?;
        let num_tags: usize = parse_field(fields.next(), line_number, "tag count")?;

        let mut tags: Vec<PhysicalTag> = Vec::with_capacity(num_tags);
        for _ in 0..num_tags {
            tags.push(parse_field(fields.next(), line_number, "element tag")?);
        }

        let node_numbers = fields
            .map(|f| parse_field::<usize>(Some(f), line_number, "element node"))
            .collect::<Result<Vec<usize>, LodestoneError>>()?;
        let mut node_indices = Vec::with_capacity(node_numbers.len());
        for number in node_numbers {
            node_indices.push(node_index(number, line_number)?);
        }

        let expected = match element_type {
            GMSH_LINE => 2,
            GMSH_TRIANGLE => 3,
            GMSH_POINT => {
                debug!("skipping point element on line {line_number}");
                return Ok(());
            }
            other => {
                return Err(LodestoneError::parse(
                    line_number,
                    format!("unsupported element type {other}; only lines and triangles are read"),
                ))
            }
        };
        if node_indices.len() != expected {
            return Err(LodestoneError::parse(
                line_number,
                format!(
                    "element type {element_type} needs {expected} nodes, found {}",
                    node_indices.len()
                ),
            ));
        }

        // Only the first tag is the physical group; the rest name the
        // elementary entity and partitions. Zero means "no physical group".
        let physical_tags: Vec<PhysicalTag> =
            tags.first().copied().filter(|&t| t != 0).into_iter().collect();

        let nodes = match node_indices[..] {
            [n0, n1] => ElementNodes::Line([n0, n1]),
            [n0, n1, n2] => ElementNodes::Triangle([n0, n1, n2]),
            _ => unreachable!("node count checked above"),
        };
        elements.push(Element::new(elements.len(), physical_tags, nodes));

        Ok(())
    }
}

impl MeshParser for GmshParser {
    fn parse(&self, contents: &str) -> Result<ParsedMesh, LodestoneError> {
        let mut parser_state = MeshParseState::Limbo;
        let mut parsed_section_metadata = false;
        let mut seen_format = false;

        let mut nodes: Vec<Option<Node>> = Vec::new();
        let mut elements: Vec<Element> = Vec::new();
        let mut declared_elements: usize = 0;

        for (i, raw_line) in contents.lines().enumerate() {
            let line_number = i + 1;
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with("$End") {
                parser_state = MeshParseState::Limbo;
                continue;
            }

            match parser_state {
                MeshParseState::Limbo => {
                    parsed_section_metadata = false;

                    parser_state = match line {
                        "$MeshFormat" => MeshParseState::Format,
                        "$Nodes" => MeshParseState::Nodes,
                        "$Elements" => MeshParseState::Elements,
                        _ if line.starts_with('$') => {
                            debug!("skipping section {line}");
                            MeshParseState::Skipped
                        }
                        _ => {
                            return Err(LodestoneError::parse(
                                line_number,
                                "data outside of a section",
                            ))
                        }
                    };
                }
                MeshParseState::Format => {
                    if !parsed_section_metadata {
                        parsed_section_metadata = true;
                        Self::parse_format(line, line_number)?;
                        seen_format = true;
                    }
                }
                MeshParseState::Nodes => {
                    if !parsed_section_metadata {
                        parsed_section_metadata = true;
                        let count: usize = parse_field(Some(line), line_number, "node count")?;
                        nodes = vec![None; count];
                        continue;
                    }
                    Self::parse_node(line, line_number, &mut nodes)?;
                }
                MeshParseState::Elements => {
                    if !parsed_section_metadata {
                        parsed_section_metadata = true;
                        declared_elements = parse_field(Some(line), line_number, "element count")?;
                        continue;
                    }
                    Self::parse_element(line, line_number, &mut elements)?;
                }
                MeshParseState::Skipped => continue,
            }
        }

        if !seen_format {
            return Err(LodestoneError::Input(
                "Missing $MeshFormat section in msh file".to_owned(),
            ));
        }

        let node_count = nodes.len();
        let nodes: Vec<Node> = nodes.into_iter().flatten().collect();
        if nodes.len() != node_count {
            return Err(LodestoneError::Input(format!(
                "Declared {node_count} nodes but found {}",
                nodes.len()
            )));
        }
        if elements.len() > declared_elements {
            return Err(LodestoneError::Input(format!(
                "Declared {declared_elements} elements but found more"
            )));
        }

        let mesh = Mesh::new(nodes, elements)?;
        info!(
            "loaded {} nodes and {} elements from msh",
            mesh.node_count(),
            mesh.element_count()
        );

        Ok(ParsedMesh {
            mesh,
            boundary: Vec::new(),
        })
    }
}

impl MeshParser for MalhaParser {
    fn parse(&self, contents: &str) -> Result<ParsedMesh, LodestoneError> {
        let mut lines = contents
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty());

        let (header_line, header) = lines
            .next()
            .ok_or_else(|| LodestoneError::Input("Empty malha file".to_owned()))?;
        let mut fields = header.split_whitespace();
        let num_nodes: usize = parse_field(fields.next(), header_line, "node count")?;
        let num_elements: usize = parse_field(fields.next(), header_line, "element count")?;
        let num_boundaries: usize = parse_field(fields.next(), header_line, "boundary count")?;

        let mut next_line = |what: &str| {
            lines.next().ok_or_else(|| {
                LodestoneError::Input(format!("malha file ended while reading {what}"))
            })
        };

        let mut nodes = Vec::with_capacity(num_nodes);
        for index in 0..num_nodes {
            let (line_number, line) = next_line("nodes")?;
            let mut fields = line.split_whitespace();
            let x: f64 = parse_field(fields.next(), line_number, "x coordinate")?;
            let y: f64 = parse_field(fields.next(), line_number, "y coordinate")?;
            nodes.push(Node::new(index, x, y));
        }

        let mut elements = Vec::with_capacity(num_elements);
        for index in 0..num_elements {
            let (line_number, line) = next_line("elements")?;
            let mut fields = line.split_whitespace();
            let mut corners = [0usize; 3];
            for corner in corners.iter_mut() {
                let number: usize = parse_field(fields.next(), line_number, "element node")?;
                *corner = node_index(number, line_number)?;
            }
            let tag: PhysicalTag = parse_field(fields.next(), line_number, "element tag")?;
            let source: f64 = parse_field(fields.next(), line_number, "source density")?;

            let mut element = Element::new(index, vec![tag], ElementNodes::Triangle(corners));
            element.source_density = source;
            elements.push(element);
        }

        let mut boundary = Vec::with_capacity(num_boundaries);
        for _ in 0..num_boundaries {
            let (line_number, line) = next_line("boundary values")?;
            let mut fields = line.split_whitespace();
            let number: usize = parse_field(fields.next(), line_number, "boundary node")?;
            let value: f64 = parse_field(fields.next(), line_number, "boundary value")?;
            let node = node_index(number, line_number)?;
            if node >= num_nodes {
                return Err(LodestoneError::Index {
                    element: None,
                    node,
                    node_count: num_nodes,
                });
            }
            boundary.push(BoundaryRule::node(node, value));
        }

        let mesh = Mesh::new(nodes, elements)?;
        info!(
            "loaded {} nodes, {} elements and {} fixed values from malha",
            mesh.node_count(),
            mesh.element_count(),
            boundary.len()
        );

        Ok(ParsedMesh { mesh, boundary })
    }
}

/// Reads a mesh file, choosing the parser from its extension.
pub fn load_mesh(mesh_file: &Path) -> Result<ParsedMesh, LodestoneError> {
    let parser: Box<dyn MeshParser> = match mesh_file.extension().and_then(|e| e.to_str()) {
        Some("msh") => Box::new(GmshParser),
        Some("malha") => Box::new(MalhaParser),
        _ => {
            return Err(LodestoneError::Input(format!(
                "Unrecognized mesh filetype {}",
                mesh_file.display()
            )))
        }
    };

    let contents = std::fs::read_to_string(mesh_file)?;
    parser.parse(&contents)
}
