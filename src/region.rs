use tracing::{debug, warn};

use crate::{
    config::RegionConfig,
    datatypes::{Element, Mesh, PhysicalTag},
    error::LodestoneError,
};

/// Reports a configured tag that selects no element, failing in strict mode.
pub(crate) fn unmatched_tag(
    kind: &'static str,
    tag: PhysicalTag,
    strict: bool,
) -> Result<(), LodestoneError> {
    if strict {
        return Err(LodestoneError::ConfigurationMismatch { kind, tag });
    }
    warn!("{kind} tag {tag} matches nothing in the mesh");
    Ok(())
}

/// Writes `value` through `apply` on every triangle carrying one of the tags,
/// visiting the pairs in the given order.
fn apply_tagged<F>(
    mesh: &mut Mesh,
    pairs: &[(PhysicalTag, f64)],
    kind: &'static str,
    strict: bool,
    apply: F,
) -> Result<(), LodestoneError>
where
    F: Fn(&mut Element, f64),
{
    for &(tag, value) in pairs {
        let targets = mesh.elements_with_surface_tag(tag);
        if targets.is_empty() {
            unmatched_tag(kind, tag, strict)?;
            continue;
        }

        debug!("setting {kind} {value} on {} elements with tag {tag}", targets.len());
        for index in targets {
            if let Some(element) = mesh.element_mut(index) {
                apply(element, value);
            }
        }
    }

    Ok(())
}

/// Overwrites the material coefficient and source density of the triangles
/// named by `regions`.
///
/// The default coefficient, when given, is written onto every triangle
/// first. Material and source lists are then applied in list order; where
/// tags overlap on an element the last listed entry wins. Elements matching
/// no entry keep their current values, so applying the same configuration
/// twice gives the same result as applying it once.
pub fn apply_regions(
    mesh: &mut Mesh,
    regions: &RegionConfig,
    strict: bool,
) -> Result<(), LodestoneError> {
    if let Some(coefficient) = regions.default_coefficient {
        let triangles: Vec<usize> = mesh.triangles().map(|(e, _)| e.index).collect();
        for index in triangles {
            if let Some(element) = mesh.element_mut(index) {
                element.material_coefficient = coefficient;
            }
        }
    }

    apply_tagged(mesh, &regions.materials, "material", strict, |e, v| {
        e.material_coefficient = v
    })?;
    apply_tagged(mesh, &regions.sources, "source", strict, |e, v| {
        e.source_density = v
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{ElementNodes, Node};

    fn tagged_mesh() -> Mesh {
        let nodes = vec![
            Node::new(0, 0.0, 0.0),
            Node::new(1, 1.0, 0.0),
            Node::new(2, 1.0, 1.0),
            Node::new(3, 0.0, 1.0),
        ];
        let elements = vec![
            Element::new(0, vec![1], ElementNodes::Triangle([0, 1, 2])),
            Element::new(1, vec![1, 2], ElementNodes::Triangle([0, 2, 3])),
            Element::new(2, vec![2], ElementNodes::Line([0, 1])),
        ];
        Mesh::new(nodes, elements).unwrap()
    }

    fn coefficients(mesh: &Mesh) -> Vec<(f64, f64)> {
        mesh.elements()
            .iter()
            .map(|e| (e.material_coefficient, e.source_density))
            .collect()
    }

    #[test]
    fn last_listed_tag_wins() {
        let mut mesh = tagged_mesh();
        let regions = RegionConfig {
            default_coefficient: None,
            materials: vec![(1, 10.0), (2, 20.0)],
            sources: vec![(2, 3.0)],
        };
        apply_regions(&mut mesh, &regions, false).unwrap();
        assert_eq!(coefficients(&mesh), vec![(10.0, 0.0), (20.0, 3.0), (1.0, 0.0)]);

        let mut reversed = tagged_mesh();
        let regions = RegionConfig {
            default_coefficient: None,
            materials: vec![(2, 20.0), (1, 10.0)],
            sources: vec![],
        };
        apply_regions(&mut reversed, &regions, false).unwrap();
        assert_eq!(reversed.element(1).unwrap().material_coefficient, 10.0);
    }

    #[test]
    fn default_coefficient_skips_lines() {
        let mut mesh = tagged_mesh();
        let regions = RegionConfig {
            default_coefficient: Some(4.0),
            materials: vec![(2, 8.0)],
            sources: vec![],
        };
        apply_regions(&mut mesh, &regions, false).unwrap();
        assert_eq!(coefficients(&mesh), vec![(4.0, 0.0), (8.0, 0.0), (1.0, 0.0)]);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let regions = RegionConfig {
            default_coefficient: Some(2.0),
            materials: vec![(1, 10.0), (2, 20.0)],
            sources: vec![(1, 5.0)],
        };
        let mut once = tagged_mesh();
        apply_regions(&mut once, &regions, false).unwrap();
        let mut twice = tagged_mesh();
        apply_regions(&mut twice, &regions, false).unwrap();
        apply_regions(&mut twice, &regions, false).unwrap();
        assert_eq!(coefficients(&once), coefficients(&twice));
    }

    #[test]
    fn unmatched_tag_is_inert_unless_strict() {
        let regions = RegionConfig {
            default_coefficient: None,
            materials: vec![(42, 10.0)],
            sources: vec![],
        };
        let mut mesh = tagged_mesh();
        apply_regions(&mut mesh, &regions, false).unwrap();
        assert_eq!(coefficients(&mesh), coefficients(&tagged_mesh()));

        match apply_regions(&mut mesh, &regions, true) {
            Err(LodestoneError::ConfigurationMismatch { kind, tag }) => {
                assert_eq!((kind, tag), ("material", 42));
            }
            other => panic!("expected configuration mismatch, got {other:?}"),
        }
    }

    #[test]
    fn line_tags_do_not_select_surfaces() {
        // Tag 2 is on a line and a triangle; only the triangle is a surface.
        let mut mesh = tagged_mesh();
        let regions = RegionConfig {
            default_coefficient: None,
            materials: vec![],
            sources: vec![(2, 1.5)],
        };
        apply_regions(&mut mesh, &regions, true).unwrap();
        assert_eq!(mesh.element(2).unwrap().source_density, 0.0);
        assert_eq!(mesh.element(1).unwrap().source_density, 1.5);
    }
}
