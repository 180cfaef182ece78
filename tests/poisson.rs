use approx::assert_relative_eq;

use lodestone::{
    assembler::build_global_system,
    boundary::apply_boundary_conditions,
    config::{parse_config, ModelConfig, RegionConfig, SolverSettings},
    datatypes::BoundaryRule,
    mesher::{load_mesh, GmshParser, MalhaParser, MeshParser},
    solver::{run, solver_for, ConjugateGradient, DenseLu},
    LodestoneError,
};

/// Unit square split into four triangles around its centre node.
const SQUARE_MSH: &str = "\
$MeshFormat
2.2 0 8
$EndMeshFormat
$Nodes
5
1 0 0 0
2 1 0 0
3 1 1 0
4 0 1 0
5 0.5 0.5 0
$EndNodes
$Elements
8
1 1 2 1 1 1 2
2 1 2 2 2 2 3
3 1 2 3 3 3 4
4 1 2 4 4 4 1
5 2 2 10 1 1 2 5
6 2 2 10 1 2 3 5
7 2 2 10 1 3 4 5
8 2 2 10 1 4 1 5
$EndElements
";

fn all_sides(value: f64) -> Vec<BoundaryRule> {
    (1..=4).map(|tag| BoundaryRule::tag(tag, value)).collect()
}

fn solvers() -> Vec<SolverSettings> {
    vec![
        SolverSettings::Lu,
        SolverSettings::ConjugateGradient {
            tolerance: 1e-12,
            max_iterations: 1000,
        },
    ]
}

#[test]
fn grounded_square_without_source_is_zero() {
    for settings in solvers() {
        let mut mesh = GmshParser.parse(SQUARE_MSH).unwrap().mesh;
        let config = ModelConfig {
            boundary: all_sides(0.0),
            solver: settings,
            ..ModelConfig::default()
        };

        let potentials = run(&mut mesh, &config, &[], solver_for(&settings).as_ref()).unwrap();
        assert_eq!(potentials.len(), 5);
        for v in potentials {
            assert_relative_eq!(v, 0.0);
        }
    }
}

#[test]
fn grounded_square_with_source() {
    // Each quarter has area 1/4 and a centre stiffness of 1, so the centre
    // sees 4 * V = 4 * (1/4) * f / 3.
    let config = parse_config(
        r#"{
            "sources": [ { "tag": 10, "density": 1.0 } ],
            "boundary_conditions": [
                { "tag": 1, "value": 0.0 }, { "tag": 2, "value": 0.0 },
                { "tag": 3, "value": 0.0 }, { "tag": 4, "value": 0.0 }
            ],
            "strict": true
        }"#,
    )
    .unwrap();

    for settings in solvers() {
        let mut mesh = GmshParser.parse(SQUARE_MSH).unwrap().mesh;
        let potentials = run(&mut mesh, &config, &[], solver_for(&settings).as_ref()).unwrap();

        assert_relative_eq!(potentials[4], 1.0 / 12.0, epsilon = 1e-10);
        for v in &potentials[..4] {
            assert_relative_eq!(*v, 0.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn material_scales_the_response() {
    let config = ModelConfig {
        regions: RegionConfig {
            default_coefficient: None,
            materials: vec![(10, 4.0)],
            sources: vec![(10, 1.0)],
        },
        boundary: all_sides(0.0),
        ..ModelConfig::default()
    };
    let mut mesh = GmshParser.parse(SQUARE_MSH).unwrap().mesh;
    let potentials = run(&mut mesh, &config, &[], &DenseLu).unwrap();
    assert_relative_eq!(potentials[4], 1.0 / 48.0, epsilon = 1e-12);
}

#[test]
fn linear_field_is_reproduced() {
    let parsed = GmshParser.parse(SQUARE_MSH).unwrap();
    let mut mesh = parsed.mesh;
    let corners: Vec<BoundaryRule> = (0..4)
        .map(|n| BoundaryRule::node(n, 2.0 * mesh.node(n).unwrap().vertex.x + 1.0))
        .collect();

    let potentials = run(&mut mesh, &ModelConfig::default(), &corners, &DenseLu).unwrap();
    assert_relative_eq!(potentials[4], 2.0, epsilon = 1e-12);
}

#[test]
fn single_element_fixed_by_tag() {
    let contents = "\
$MeshFormat
2.2 0 8
$EndMeshFormat
$Nodes
3
1 0 0 0
2 1 0 0
3 0 1 0
$EndNodes
$Elements
2
1 1 2 7 1 1 2
2 2 2 1 1 1 2 3
$EndElements
";
    let mut mesh = GmshParser.parse(contents).unwrap().mesh;
    let config = ModelConfig {
        boundary: vec![BoundaryRule::tag(7, 5.0)],
        ..ModelConfig::default()
    };

    let potentials = run(&mut mesh, &config, &[], &DenseLu).unwrap();
    assert_eq!(potentials[0], 5.0);
    assert_eq!(potentials[1], 5.0);
    assert_relative_eq!(potentials[2], 5.0, epsilon = 1e-12);
}

#[test]
fn single_element_fixed_by_embedded_value() {
    let contents = "\
3 1 1
0.0 0.0
1.0 0.0
0.0 1.0
1 2 3 1 0.0
1 5.0
";
    let parsed = MalhaParser.parse(contents).unwrap();
    let mut mesh = parsed.mesh;

    let potentials = run(&mut mesh, &ModelConfig::default(), &parsed.boundary, &DenseLu).unwrap();
    assert_relative_eq!(potentials[0], 5.0, epsilon = 1e-12);
    assert_relative_eq!(potentials[1], 5.0, epsilon = 1e-12);
    assert_relative_eq!(potentials[2], 5.0, epsilon = 1e-12);
}

#[test]
fn embedded_values_apply_after_configuration() {
    let contents = "\
3 1 1
0.0 0.0
1.0 0.0
0.0 1.0
1 2 3 1 0.0
1 5.0
";
    let parsed = MalhaParser.parse(contents).unwrap();
    let mut mesh = parsed.mesh;
    let config = ModelConfig {
        boundary: vec![BoundaryRule::node(0, -3.0), BoundaryRule::node(1, 1.0)],
        ..ModelConfig::default()
    };

    let potentials = run(&mut mesh, &config, &parsed.boundary, &DenseLu).unwrap();
    assert_relative_eq!(potentials[0], 5.0, epsilon = 1e-12);
    assert_relative_eq!(potentials[1], 1.0, epsilon = 1e-12);
}

#[test]
fn enforced_rows_are_one_hot() {
    let mesh = GmshParser.parse(SQUARE_MSH).unwrap().mesh;
    let mut system = build_global_system(&mesh).unwrap();
    assert_relative_eq!(system.stiffness, system.stiffness.transpose(), epsilon = 1e-12);

    let fixed = apply_boundary_conditions(&mut system, &mesh, &all_sides(2.0), true).unwrap();
    assert_eq!(fixed.len(), 4);
    for k in fixed {
        for j in 0..system.size() {
            let expected = if j == k { 1.0 } else { 0.0 };
            assert_eq!(system.stiffness[(k, j)], expected);
        }
        assert_eq!(system.load[k], 2.0);
    }
}

#[test]
fn strict_mode_rejects_unknown_boundary_tag() {
    let mut mesh = GmshParser.parse(SQUARE_MSH).unwrap().mesh;
    let mut config = ModelConfig {
        boundary: vec![BoundaryRule::tag(1, 0.0), BoundaryRule::tag(99, 1.0)],
        ..ModelConfig::default()
    };

    assert!(run(&mut mesh, &config, &[], &DenseLu).is_ok());

    config.strict = true;
    assert!(matches!(
        run(&mut mesh, &config, &[], &DenseLu),
        Err(LodestoneError::ConfigurationMismatch {
            kind: "boundary",
            tag: 99
        })
    ));
}

#[test]
fn inverted_triangle_aborts_the_run() {
    let contents = SQUARE_MSH.replace("6 2 2 10 1 2 3 5", "6 2 2 10 1 3 2 5");
    let mut mesh = GmshParser.parse(&contents).unwrap().mesh;
    let config = ModelConfig {
        boundary: all_sides(0.0),
        ..ModelConfig::default()
    };

    assert!(matches!(
        run(&mut mesh, &config, &[], &DenseLu),
        Err(LodestoneError::Geometry { element: 5, .. })
    ));
}

#[test]
fn floating_system_is_a_solve_failure() {
    // Two disconnected triangles, only one of them grounded.
    let contents = "\
$MeshFormat
2.2 0 8
$EndMeshFormat
$Nodes
6
1 0 0 0
2 1 0 0
3 0 1 0
4 5 0 0
5 6 0 0
6 5 1 0
$EndNodes
$Elements
3
1 1 2 1 1 1 2
2 2 2 10 1 1 2 3
3 2 2 10 1 4 5 6
$EndElements
";
    let mut mesh = GmshParser.parse(contents).unwrap().mesh;
    // The floating triangle carries a source, so its block is inconsistent.
    let config = ModelConfig {
        regions: RegionConfig {
            default_coefficient: None,
            materials: vec![],
            sources: vec![(10, 1.0)],
        },
        boundary: vec![BoundaryRule::tag(1, 0.0)],
        ..ModelConfig::default()
    };
    let iterative = ConjugateGradient {
        tolerance: 1e-12,
        max_iterations: 50,
    };

    assert!(matches!(
        run(&mut mesh, &config, &[], &DenseLu),
        Err(LodestoneError::Solve(_))
    ));
    assert!(matches!(
        run(&mut mesh, &config, &[], &iterative),
        Err(LodestoneError::Solve(_))
    ));
}

#[test]
fn load_mesh_from_disk() {
    let path = std::env::temp_dir().join(format!("lodestone-square-{}.msh", std::process::id()));
    std::fs::write(&path, SQUARE_MSH).unwrap();

    let parsed = load_mesh(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(parsed.mesh.node_count(), 5);
    assert_eq!(parsed.mesh.element_count(), 8);
    assert_eq!(parsed.mesh.nodes_on_boundary_tag(2).len(), 2);
    assert_eq!(parsed.mesh.elements_with_surface_tag(10).len(), 4);
}

#[test]
fn missing_mesh_file_is_io_error() {
    let path = std::env::temp_dir().join("lodestone-does-not-exist.malha");
    assert!(matches!(load_mesh(&path), Err(LodestoneError::Io(_))));
}
