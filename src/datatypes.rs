use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use crate::error::LodestoneError;

/// Integer label attached to an element by the mesher.
pub type PhysicalTag = i64;

pub const DEFAULT_MATERIAL_COEFFICIENT: f64 = 1.0;
pub const DEFAULT_SOURCE_DENSITY: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub index: usize,
    pub vertex: Vertex,
}

impl Node {
    pub fn new(index: usize, x: f64, y: f64) -> Node {
        Node {
            index,
            vertex: Vertex { x, y },
        }
    }
}

/// Node indices of an element, in stored order. Only linear elements exist.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementNodes {
    Line([usize; 2]),
    Triangle([usize; 3]),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub index: usize,
    pub tags: Vec<PhysicalTag>,
    pub nodes: ElementNodes,
    pub material_coefficient: f64,
    pub source_density: f64,
}

impl Element {
    /// Creates an element carrying the neutral material and zero source.
    pub fn new(index: usize, tags: Vec<PhysicalTag>, nodes: ElementNodes) -> Element {
        let mut tags = tags;
        tags.sort_unstable();
        tags.dedup();

        Element {
            index,
            tags,
            nodes,
            material_coefficient: DEFAULT_MATERIAL_COEFFICIENT,
            source_density: DEFAULT_SOURCE_DENSITY,
        }
    }

    pub fn dimension(&self) -> usize {
        match self.nodes {
            ElementNodes::Line(_) => 1,
            ElementNodes::Triangle(_) => 2,
        }
    }

    pub fn node_indices(&self) -> &[usize] {
        match &self.nodes {
            ElementNodes::Line(n) => &n[..],
            ElementNodes::Triangle(n) => &n[..],
        }
    }

    pub fn has_tag(&self, tag: PhysicalTag) -> bool {
        self.tags.binary_search(&tag).is_ok()
    }
}

/// Nodes and elements of a triangulated domain. Node geometry and element
/// connectivity are fixed at construction; only the region configurator
/// touches element coefficients afterwards.
#[derive(Debug, Clone)]
pub struct Mesh {
    nodes: Vec<Node>,
    elements: Vec<Element>,
}

impl Mesh {
    /// Builds a mesh after checking that node indices are dense and that
    /// every element references an existing node.
    pub fn new(nodes: Vec<Node>, elements: Vec<Element>) -> Result<Mesh, LodestoneError> {
        for (position, node) in nodes.iter().enumerate() {
            if node.index != position {
                return Err(LodestoneError::Input(format!(
                    "Node at position {position} carries index {}; indices must be dense",
                    node.index
                )));
            }
        }

        for (position, element) in elements.iter().enumerate() {
            if element.index != position {
                return Err(LodestoneError::Input(format!(
                    "Element at position {position} carries index {}",
                    element.index
                )));
            }
            if let Some(&node) = element
                .node_indices()
                .iter()
                .find(|&&n| n >= nodes.len())
            {
                return Err(LodestoneError::Index {
                    element: Some(element.index),
                    node,
                    node_count: nodes.len(),
                });
            }
        }

        Ok(Mesh { nodes, elements })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub(crate) fn element_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.elements.get_mut(index)
    }

    /// Iterates over the dimension-2 elements in mesh order.
    pub fn triangles(&self) -> impl Iterator<Item = (&Element, [usize; 3])> {
        self.elements.iter().filter_map(|e| match e.nodes {
            ElementNodes::Triangle(n) => Some((e, n)),
            ElementNodes::Line(_) => None,
        })
    }

    /// Union of the nodes of every line element carrying `tag`.
    pub fn nodes_on_boundary_tag(&self, tag: PhysicalTag) -> BTreeSet<usize> {
        self.elements
            .iter()
            .filter(|e| e.dimension() == 1 && e.has_tag(tag))
            .flat_map(|e| e.node_indices().iter().copied())
            .collect()
    }

    /// Indices of every triangle carrying `tag`.
    pub fn elements_with_surface_tag(&self, tag: PhysicalTag) -> BTreeSet<usize> {
        self.elements
            .iter()
            .filter(|e| e.dimension() == 2 && e.has_tag(tag))
            .map(|e| e.index)
            .collect()
    }
}

/// What a boundary rule fixes: every node of the line elements carrying a
/// physical tag, or a single node by index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BoundaryTarget {
    Tag(PhysicalTag),
    Node(usize),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryRule {
    pub target: BoundaryTarget,
    pub value: f64,
}

impl BoundaryRule {
    pub fn tag(tag: PhysicalTag, value: f64) -> BoundaryRule {
        BoundaryRule {
            target: BoundaryTarget::Tag(tag),
            value,
        }
    }

    pub fn node(node: usize, value: f64) -> BoundaryRule {
        BoundaryRule {
            target: BoundaryTarget::Node(node),
            value,
        }
    }
}

/// Local contribution of one triangle, indexed by `nodes`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementContribution {
    pub nodes: [usize; 3],
    pub stiffness: Matrix3<f64>,
    pub load: Vector3<f64>,
    pub jacobian_determinant: f64,
}

/// The assembled linear system `stiffness * potential = load`.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalSystem {
    pub stiffness: DMatrix<f64>,
    pub load: DVector<f64>,
}

impl GlobalSystem {
    pub fn zeros(node_count: usize) -> GlobalSystem {
        GlobalSystem {
            stiffness: DMatrix::zeros(node_count, node_count),
            load: DVector::zeros(node_count),
        }
    }

    pub fn size(&self) -> usize {
        self.load.len()
    }
}
