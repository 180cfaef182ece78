use std::path::Path;

use json::JsonValue;
use tracing::info;

use crate::{
    datatypes::{BoundaryRule, PhysicalTag},
    error::LodestoneError,
};

/// Vacuum permeability, H/m.
pub const MU_0: f64 = 4.0 * std::f64::consts::PI * 1e-7;

pub const DEFAULT_CG_TOLERANCE: f64 = 1e-10;
pub const DEFAULT_CG_MAX_ITER: u64 = 1e7 as u64;

/// Per-tag material coefficients and source densities. Each list is applied
/// in order, so a later entry overrides an earlier one on shared elements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionConfig {
    pub default_coefficient: Option<f64>,
    pub materials: Vec<(PhysicalTag, f64)>,
    pub sources: Vec<(PhysicalTag, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SolverSettings {
    Lu,
    ConjugateGradient { tolerance: f64, max_iterations: u64 },
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings::Lu
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelConfig {
    pub regions: RegionConfig,
    pub boundary: Vec<BoundaryRule>,
    pub solver: SolverSettings,
    /// Fail on configuration tags that match nothing instead of warning.
    pub strict: bool,
}

/// Converts a relative permeability into the reluctivity used as the
/// material coefficient of the magnetic scalar potential problem.
pub fn reluctivity(relative_permeability: f64) -> f64 {
    1.0 / (relative_permeability * MU_0)
}

fn require_positive(value: f64, context: &str) -> Result<f64, LodestoneError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(LodestoneError::Input(format!(
            "{context} must be positive and finite, got {value}"
        )))
    }
}

fn parse_tag(entry: &JsonValue, context: &str) -> Result<PhysicalTag, LodestoneError> {
    entry["tag"]
        .as_i64()
        .ok_or_else(|| LodestoneError::Input(format!("{context} is missing an integer tag")))
}

fn array_members<'a>(
    input_json: &'a JsonValue,
    key: &str,
) -> Result<Vec<&'a JsonValue>, LodestoneError> {
    let value = &input_json[key];
    if value.is_null() {
        return Ok(Vec::new());
    }
    if !value.is_array() {
        return Err(LodestoneError::Input(format!(
            "Input json field {key} must be an array"
        )));
    }
    Ok(value.members().collect())
}

/// Reads the material coefficient of a material entry, which must give
/// exactly one of `coefficient` or `relative_permeability`.
fn parse_material(entry: &JsonValue, context: &str) -> Result<f64, LodestoneError> {
    let coefficient = entry["coefficient"].as_f64();
    let relative_permeability = entry["relative_permeability"].as_f64();

    match (coefficient, relative_permeability) {
        (Some(_), Some(_)) => Err(LodestoneError::Input(format!(
            "{context} is over-constrained: give coefficient or relative_permeability, not both"
        ))),
        (None, None) => Err(LodestoneError::Input(format!(
            "{context} is missing coefficient or relative_permeability"
        ))),
        (Some(c), None) => require_positive(c, &format!("{context} coefficient")),
        (None, Some(mu_r)) => Ok(reluctivity(require_positive(
            mu_r,
            &format!("{context} relative_permeability"),
        )?)),
    }
}

fn parse_regions(input_json: &JsonValue) -> Result<RegionConfig, LodestoneError> {
    let default_coefficient = if input_json["default_material"].is_null() {
        None
    } else {
        Some(parse_material(
            &input_json["default_material"],
            "default_material",
        )?)
    };

    let mut materials = Vec::new();
    for (i, entry) in array_members(input_json, "materials")?.into_iter().enumerate() {
        let context = format!("materials[{i}]");
        materials.push((parse_tag(entry, &context)?, parse_material(entry, &context)?));
    }

    let mut sources = Vec::new();
    for (i, entry) in array_members(input_json, "sources")?.into_iter().enumerate() {
        let context = format!("sources[{i}]");
        let density = entry["density"]
            .as_f64()
            .ok_or_else(|| LodestoneError::Input(format!("{context} is missing density")))?;
        sources.push((parse_tag(entry, &context)?, density));
    }

    Ok(RegionConfig {
        default_coefficient,
        materials,
        sources,
    })
}

fn parse_boundary_conditions(input_json: &JsonValue) -> Result<Vec<BoundaryRule>, LodestoneError> {
    let mut rules = Vec::new();

    for (i, entry) in array_members(input_json, "boundary_conditions")?
        .into_iter()
        .enumerate()
    {
        let context = format!("boundary_conditions[{i}]");
        let value = entry["value"]
            .as_f64()
            .ok_or_else(|| LodestoneError::Input(format!("{context} is missing value")))?;

        let rule = match (entry.has_key("tag"), entry.has_key("node")) {
            (true, false) => BoundaryRule::tag(parse_tag(entry, &context)?, value),
            (false, true) => {
                let node = entry["node"].as_usize().ok_or_else(|| {
                    LodestoneError::Input(format!("{context} node must be a non-negative integer"))
                })?;
                BoundaryRule::node(node, value)
            }
            _ => {
                return Err(LodestoneError::Input(format!(
                    "{context} needs exactly one of tag or node"
                )))
            }
        };
        rules.push(rule);
    }

    Ok(rules)
}

fn parse_solver(input_json: &JsonValue) -> Result<SolverSettings, LodestoneError> {
    let solver_json = &input_json["solver"];
    if solver_json.is_null() {
        return Ok(SolverSettings::default());
    }

    match solver_json["method"].as_str() {
        None | Some("lu") => Ok(SolverSettings::Lu),
        Some("conjugate_gradient") | Some("cg") => {
            let tolerance = match solver_json["tolerance"].as_f64() {
                Some(t) => require_positive(t, "solver tolerance")?,
                None => DEFAULT_CG_TOLERANCE,
            };
            let max_iterations = solver_json["max_iterations"]
                .as_u64()
                .unwrap_or(DEFAULT_CG_MAX_ITER);
            Ok(SolverSettings::ConjugateGradient {
                tolerance,
                max_iterations,
            })
        }
        Some(other) => Err(LodestoneError::Input(format!(
            "Unknown solver method {other}"
        ))),
    }
}

/// Parses the model configuration from JSON text.
pub fn parse_config(contents: &str) -> Result<ModelConfig, LodestoneError> {
    let input_json = json::parse(contents)
        .map_err(|err| LodestoneError::Input(format!("Error in input file json: {err}")))?;

    if !input_json.is_object() {
        return Err(LodestoneError::Input(
            "Input json must be an object".to_owned(),
        ));
    }

    let strict = match &input_json["strict"] {
        JsonValue::Null => false,
        value => value
            .as_bool()
            .ok_or_else(|| LodestoneError::Input("strict must be a boolean".to_owned()))?,
    };

    let config = ModelConfig {
        regions: parse_regions(&input_json)?,
        boundary: parse_boundary_conditions(&input_json)?,
        solver: parse_solver(&input_json)?,
        strict,
    };

    info!(
        "loaded {} materials, {} sources and {} boundary rules from input file",
        config.regions.materials.len(),
        config.regions.sources.len(),
        config.boundary.len()
    );

    Ok(config)
}

/// Reads and parses the input file.
pub fn load_input_file(input_file: &Path) -> Result<ModelConfig, LodestoneError> {
    let contents = std::fs::read_to_string(input_file).map_err(|err| {
        LodestoneError::Input(format!(
            "Unable to open input file {}: {err}",
            input_file.display()
        ))
    })?;
    parse_config(&contents)
}
