//! Static description of the simulated surface model.
//!
//! The model names every labelled quantity the rest of the system deals
//! with: adsorbate species and their atom lists, lattice site types, the
//! reaction channels whose turnover frequencies are tracked, the numeric
//! parameters (with bounds), and the site-local processes used by the
//! demonstration engine. Geometry is given as explicit atom lists so that
//! nothing has to be evaluated from text at runtime.
//!
//! [`ObservableLayout`] fixes the order in which engines report
//! observables and in which frames store them.

use std::collections::BTreeSet;

use catalyst_types::ParameterScale;
use serde::Deserialize;

/// Errors raised by [`ModelDefinition::validate`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ModelError {
    /// The model has no species, sites, or lattice cells.
    #[error("model is empty: {what}")]
    Empty {
        /// Which part of the model is missing.
        what: &'static str,
    },

    /// Two entries of the same kind share a name.
    #[error("duplicate {kind} name: {name}")]
    Duplicate {
        /// Entry kind (species, site, parameter, TOF channel).
        kind: &'static str,
        /// The repeated name.
        name: String,
    },

    /// A process or setting references an undeclared name.
    #[error("{context} references unknown {kind} '{name}'")]
    UnknownReference {
        /// Where the reference appears.
        context: String,
        /// Kind of the missing entry.
        kind: &'static str,
        /// The missing name.
        name: String,
    },

    /// A parameter's default value or bounds are inconsistent.
    #[error("parameter '{label}' has invalid bounds: {reason}")]
    InvalidBounds {
        /// Parameter label.
        label: String,
        /// What is wrong with the bounds.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// One atom of a surface or adsorbate representation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AtomDefinition {
    /// Element symbol.
    pub element: String,
    /// Position in Angstrom (relative to the cell origin for surface atoms,
    /// relative to the binding site for adsorbates).
    #[serde(default)]
    pub position: [f64; 3],
}

impl AtomDefinition {
    fn new(element: &str, position: [f64; 3]) -> Self {
        Self {
            element: element.to_owned(),
            position,
        }
    }
}

/// Edge lengths of the orthorhombic unit cell in Angstrom.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct UnitCell {
    /// Length along x.
    pub a: f64,
    /// Length along y.
    pub b: f64,
    /// Length along z.
    pub c: f64,
}

/// Number of unit cells simulated along each surface direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LatticeSize {
    /// Cells along x.
    pub x: u32,
    /// Cells along y.
    pub y: u32,
}

impl LatticeSize {
    /// Number of unit cells in the lattice.
    pub fn cell_count(self) -> usize {
        let x = usize::try_from(self.x).unwrap_or(usize::MAX);
        let y = usize::try_from(self.y).unwrap_or(usize::MAX);
        x.saturating_mul(y)
    }
}

/// A site type inside the unit cell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SiteDefinition {
    /// Short name (e.g. `s` for step, `t` for terrace).
    pub name: String,
    /// Fractional position inside the unit cell.
    pub position: [f64; 3],
}

/// An adsorbate species.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeciesDefinition {
    /// Species name (e.g. `CO`, `CH3`).
    pub name: String,
    /// Atom list used by the 3D view. Empty means a single atom tagged
    /// with the species name.
    #[serde(default)]
    pub atoms: Vec<AtomDefinition>,
    /// Optional display color (`#rrggbb`).
    #[serde(default)]
    pub color: Option<String>,
}

// ---------------------------------------------------------------------------
// Parameters and processes
// ---------------------------------------------------------------------------

/// A numeric model parameter.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParameterDefinition {
    /// Parameter label.
    pub label: String,
    /// Default value.
    pub value: f64,
    /// Lower bound (defaults to `value` for fixed parameters).
    #[serde(default)]
    pub min: Option<f64>,
    /// Upper bound (defaults to `value` for fixed parameters).
    #[serde(default)]
    pub max: Option<f64>,
    /// Whether clients may change this parameter.
    #[serde(default)]
    pub adjustable: bool,
    /// Slider scale hint.
    #[serde(default)]
    pub scale: ParameterScale,
}

impl ParameterDefinition {
    fn adjustable(label: &str, value: f64, min: f64, max: f64, scale: ParameterScale) -> Self {
        Self {
            label: label.to_owned(),
            value,
            min: Some(min),
            max: Some(max),
            adjustable: true,
            scale,
        }
    }

    fn fixed(label: &str, value: f64) -> Self {
        Self {
            label: label.to_owned(),
            value,
            min: None,
            max: None,
            adjustable: false,
            scale: ParameterScale::Linear,
        }
    }

    /// Effective lower bound.
    pub fn lower(&self) -> f64 {
        self.min.unwrap_or(self.value)
    }

    /// Effective upper bound.
    pub fn upper(&self) -> f64 {
        self.max.unwrap_or(self.value)
    }
}

/// A site-local elementary process: one species on one site becomes another.
///
/// The rate is `prefactor * pressure^order * exp(-barrier / (kB * T))`
/// where `barrier = barrier + barrier_coefficient * <barrier_parameter>`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProcessDefinition {
    /// Process name, used in logs.
    pub name: String,
    /// Site types the process can occur on. Empty means every site type.
    #[serde(default)]
    pub sites: Vec<String>,
    /// Species required on the site (`None` for an empty site).
    #[serde(default)]
    pub from: Option<String>,
    /// Species left on the site (`None` for an empty site).
    #[serde(default)]
    pub to: Option<String>,
    /// Attempt frequency in 1/s.
    pub prefactor: f64,
    /// Activation barrier in eV.
    #[serde(default)]
    pub barrier: f64,
    /// Parameter whose value shifts the barrier.
    #[serde(default)]
    pub barrier_parameter: Option<String>,
    /// Scaling of `barrier_parameter` onto the barrier.
    #[serde(default)]
    pub barrier_coefficient: f64,
    /// Partial pressure parameter multiplying the rate.
    #[serde(default)]
    pub pressure: Option<String>,
    /// Reaction order in `pressure`.
    #[serde(default = "default_order")]
    pub order: f64,
    /// TOF channel incremented when the process fires.
    #[serde(default)]
    pub tof: Option<String>,
    /// Increment applied to `tof` (negative for reverse channels).
    #[serde(default = "default_tof_count")]
    pub tof_count: i32,
}

const fn default_order() -> f64 {
    1.0
}

const fn default_tof_count() -> i32 {
    1
}

// ---------------------------------------------------------------------------
// Model definition
// ---------------------------------------------------------------------------

/// The full static model description.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelDefinition {
    /// Human-readable model name.
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Unit cell dimensions.
    pub cell: UnitCell,
    /// Number of simulated cells.
    pub size: LatticeSize,
    /// Fixed surface atoms of one unit cell.
    #[serde(default)]
    pub surface: Vec<AtomDefinition>,
    /// Site types of one unit cell, in configuration order.
    pub sites: Vec<SiteDefinition>,
    /// Adsorbate species.
    pub species: Vec<SpeciesDefinition>,
    /// TOF channel names, in frame order.
    #[serde(default)]
    pub tof_channels: Vec<String>,
    /// Numeric parameters.
    #[serde(default)]
    pub parameters: Vec<ParameterDefinition>,
    /// Parameter holding the temperature in Kelvin.
    #[serde(default = "default_temperature_parameter")]
    pub temperature_parameter: String,
    /// Site-local processes for the demonstration engine.
    #[serde(default)]
    pub processes: Vec<ProcessDefinition>,
}

fn default_model_name() -> String {
    String::from("kmc_model")
}

fn default_temperature_parameter() -> String {
    String::from("T")
}

impl ModelDefinition {
    /// Check internal consistency: unique names, resolvable references,
    /// and parameter defaults within their bounds.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.species.is_empty() {
            return Err(ModelError::Empty { what: "species" });
        }
        if self.sites.is_empty() {
            return Err(ModelError::Empty { what: "sites" });
        }
        if self.size.cell_count() == 0 {
            return Err(ModelError::Empty { what: "lattice" });
        }

        let species = unique_names("species", self.species.iter().map(|s| s.name.as_str()))?;
        let sites = unique_names("site", self.sites.iter().map(|s| s.name.as_str()))?;
        let tofs = unique_names("TOF channel", self.tof_channels.iter().map(String::as_str))?;
        let params = unique_names("parameter", self.parameters.iter().map(|p| p.label.as_str()))?;

        for param in &self.parameters {
            let (lower, upper) = (param.lower(), param.upper());
            if !(param.value.is_finite() && lower.is_finite() && upper.is_finite()) {
                return Err(ModelError::InvalidBounds {
                    label: param.label.clone(),
                    reason: String::from("values must be finite"),
                });
            }
            if lower > upper {
                return Err(ModelError::InvalidBounds {
                    label: param.label.clone(),
                    reason: format!("min {lower} is greater than max {upper}"),
                });
            }
            if param.value < lower || param.value > upper {
                return Err(ModelError::InvalidBounds {
                    label: param.label.clone(),
                    reason: format!("default {} lies outside [{lower}, {upper}]", param.value),
                });
            }
        }

        if !params.contains(self.temperature_parameter.as_str()) {
            return Err(ModelError::UnknownReference {
                context: String::from("temperature_parameter"),
                kind: "parameter",
                name: self.temperature_parameter.clone(),
            });
        }

        for process in &self.processes {
            let context = format!("process '{}'", process.name);
            let check = |set: &BTreeSet<&str>, kind: &'static str, name: &str| {
                if set.contains(name) {
                    Ok(())
                } else {
                    Err(ModelError::UnknownReference {
                        context: context.clone(),
                        kind,
                        name: name.to_owned(),
                    })
                }
            };
            for site in &process.sites {
                check(&sites, "site", site)?;
            }
            for name in process.from.iter().chain(process.to.iter()) {
                check(&species, "species", name)?;
            }
            for name in process.pressure.iter().chain(process.barrier_parameter.iter()) {
                check(&params, "parameter", name)?;
            }
            if let Some(tof) = &process.tof {
                check(&tofs, "TOF channel", tof)?;
            }
        }

        Ok(())
    }

    /// Total number of lattice sites.
    pub fn site_count(&self) -> usize {
        self.size.cell_count().saturating_mul(self.sites.len())
    }

    /// The built-in demonstration model: CO methanation on a stepped
    /// Rh(211) surface with step (`s`), terrace (`t`) and fourfold (`f`)
    /// sites.
    #[allow(clippy::too_many_lines)]
    pub fn methanation() -> Self {
        let species = |name: &str, color: &str, atoms: Vec<AtomDefinition>| SpeciesDefinition {
            name: name.to_owned(),
            atoms,
            color: Some(color.to_owned()),
        };
        let site = |name: &str, position: [f64; 3]| SiteDefinition {
            name: name.to_owned(),
            position,
        };
        let step_and_terrace = || vec![String::from("s"), String::from("t")];

        Self {
            name: String::from("Methanation"),
            cell: UnitCell {
                a: 6.582,
                b: 2.686,
                c: 20.0,
            },
            size: LatticeSize { x: 20, y: 20 },
            surface: vec![
                AtomDefinition::new("Rh", [0.0, 0.0, 10.776]),
                AtomDefinition::new("Rh", [2.195, 1.344, 10.0]),
                AtomDefinition::new("Rh", [4.389, 0.0, 9.224]),
            ],
            sites: vec![
                site("s", [0.121, 0.5, 0.6]),
                site("t", [0.5, 0.0, 0.545]),
                site("f", [0.774, 0.5, 0.53]),
            ],
            species: vec![
                species(
                    "CO",
                    "#00ff00",
                    vec![
                        AtomDefinition::new("C", [0.0, 0.0, 0.0]),
                        AtomDefinition::new("O", [0.0, 0.0, 1.2]),
                    ],
                ),
                species(
                    "OH",
                    "#0065bd",
                    vec![
                        AtomDefinition::new("O", [0.0, 0.0, 0.0]),
                        AtomDefinition::new("H", [0.0, 0.0, 0.96]),
                    ],
                ),
                species("O", "#ff0000", vec![AtomDefinition::new("O", [0.0, 0.0, 0.0])]),
                species("C", "#d3d3d3", vec![AtomDefinition::new("C", [0.0, 0.0, 0.0])]),
                species(
                    "CH",
                    "#ffff00",
                    vec![
                        AtomDefinition::new("C", [0.0, 0.0, 0.0]),
                        AtomDefinition::new("H", [0.0, 0.0, 1.09]),
                    ],
                ),
                species(
                    "CH2",
                    "#ffa500",
                    vec![
                        AtomDefinition::new("C", [0.0, 0.0, 0.0]),
                        AtomDefinition::new("H", [0.0, 0.7, 0.8]),
                        AtomDefinition::new("H", [0.0, -0.7, 0.8]),
                    ],
                ),
                species(
                    "CH3",
                    "#551a8b",
                    vec![
                        AtomDefinition::new("C", [0.0, 0.0, 0.0]),
                        AtomDefinition::new("H", [-0.3, 0.5, 0.8]),
                        AtomDefinition::new("H", [-0.3, -0.5, 0.8]),
                        AtomDefinition::new("H", [0.7, 0.0, 0.8]),
                    ],
                ),
            ],
            tof_channels: vec![String::from("CH4_formation"), String::from("H2O_formation")],
            parameters: vec![
                ParameterDefinition::adjustable("T", 523.0, 400.0, 800.0, ParameterScale::Linear),
                ParameterDefinition::adjustable("p_COgas", 0.01, 1e-10, 1e2, ParameterScale::Log),
                ParameterDefinition::adjustable("p_CH4gas", 0.01, 1e-20, 1e2, ParameterScale::Log),
                ParameterDefinition::adjustable("p_H2Ogas", 0.01, 1e-20, 1e2, ParameterScale::Log),
                ParameterDefinition::adjustable("p_H2gas", 0.97, 1e-10, 1e2, ParameterScale::Log),
                ParameterDefinition::adjustable("E_C", 1.40, 0.0, 3.4, ParameterScale::Linear),
                ParameterDefinition::adjustable("E_O", -1.05, -1.8, 1.4, ParameterScale::Linear),
                ParameterDefinition::fixed("A", 17.679_252),
                ParameterDefinition::fixed("alpha", 0.5),
            ],
            temperature_parameter: String::from("T"),
            processes: vec![
                ProcessDefinition {
                    sites: step_and_terrace(),
                    to: Some(String::from("CO")),
                    prefactor: 1.0e5,
                    pressure: Some(String::from("p_COgas")),
                    ..ProcessDefinition::named("CO_adsorption")
                },
                ProcessDefinition {
                    sites: step_and_terrace(),
                    from: Some(String::from("CO")),
                    prefactor: 1.0e13,
                    barrier: 1.45,
                    ..ProcessDefinition::named("CO_desorption")
                },
                ProcessDefinition {
                    sites: vec![String::from("t")],
                    from: Some(String::from("CO")),
                    to: Some(String::from("C")),
                    prefactor: 1.0e13,
                    barrier: 0.75,
                    barrier_parameter: Some(String::from("E_C")),
                    barrier_coefficient: 0.35,
                    pressure: Some(String::from("p_H2gas")),
                    order: 0.5,
                    ..ProcessDefinition::named("CO_dissociation")
                },
                ProcessDefinition {
                    sites: vec![String::from("t")],
                    from: Some(String::from("C")),
                    to: Some(String::from("CH")),
                    prefactor: 1.0e13,
                    barrier: 0.85,
                    pressure: Some(String::from("p_H2gas")),
                    order: 0.5,
                    ..ProcessDefinition::named("C_hydrogenation")
                },
                ProcessDefinition {
                    sites: vec![String::from("t")],
                    from: Some(String::from("CH")),
                    to: Some(String::from("CH2")),
                    prefactor: 1.0e13,
                    barrier: 0.8,
                    pressure: Some(String::from("p_H2gas")),
                    order: 0.5,
                    ..ProcessDefinition::named("CH_hydrogenation")
                },
                ProcessDefinition {
                    sites: vec![String::from("t")],
                    from: Some(String::from("CH2")),
                    to: Some(String::from("CH3")),
                    prefactor: 1.0e13,
                    barrier: 0.7,
                    pressure: Some(String::from("p_H2gas")),
                    order: 0.5,
                    ..ProcessDefinition::named("CH2_hydrogenation")
                },
                ProcessDefinition {
                    sites: vec![String::from("t"), String::from("f")],
                    from: Some(String::from("CH3")),
                    prefactor: 1.0e13,
                    barrier: 0.9,
                    pressure: Some(String::from("p_H2gas")),
                    order: 0.5,
                    tof: Some(String::from("CH4_formation")),
                    ..ProcessDefinition::named("CH4_formation")
                },
                ProcessDefinition {
                    sites: vec![String::from("f")],
                    to: Some(String::from("CH3")),
                    prefactor: 1.0e5,
                    barrier: 0.4,
                    pressure: Some(String::from("p_CH4gas")),
                    tof: Some(String::from("CH4_formation")),
                    tof_count: -1,
                    ..ProcessDefinition::named("CH4_dissociative_adsorption")
                },
                ProcessDefinition {
                    sites: vec![String::from("s")],
                    to: Some(String::from("OH")),
                    prefactor: 1.0e5,
                    barrier: 0.3,
                    pressure: Some(String::from("p_H2Ogas")),
                    tof: Some(String::from("H2O_formation")),
                    tof_count: -1,
                    ..ProcessDefinition::named("H2O_adsorption")
                },
                ProcessDefinition {
                    sites: vec![String::from("s")],
                    from: Some(String::from("OH")),
                    prefactor: 1.0e13,
                    barrier: 0.95,
                    pressure: Some(String::from("p_H2gas")),
                    order: 0.5,
                    tof: Some(String::from("H2O_formation")),
                    ..ProcessDefinition::named("OH_hydrogenation")
                },
                ProcessDefinition {
                    sites: vec![String::from("s")],
                    from: Some(String::from("OH")),
                    to: Some(String::from("O")),
                    prefactor: 1.0e13,
                    barrier: 1.05,
                    tof: Some(String::from("H2O_formation")),
                    ..ProcessDefinition::named("OH_disproportionation")
                },
                ProcessDefinition {
                    sites: vec![String::from("s")],
                    from: Some(String::from("O")),
                    to: Some(String::from("OH")),
                    prefactor: 1.0e13,
                    barrier: 1.2,
                    barrier_parameter: Some(String::from("E_O")),
                    barrier_coefficient: -0.25,
                    pressure: Some(String::from("p_H2gas")),
                    order: 0.5,
                    ..ProcessDefinition::named("O_hydrogenation")
                },
            ],
        }
    }
}

impl Default for ModelDefinition {
    fn default() -> Self {
        Self::methanation()
    }
}

impl ProcessDefinition {
    /// A process with the given name and neutral defaults, for struct update syntax.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            sites: Vec::new(),
            from: None,
            to: None,
            prefactor: 0.0,
            barrier: 0.0,
            barrier_parameter: None,
            barrier_coefficient: 0.0,
            pressure: None,
            order: default_order(),
            tof: None,
            tof_count: default_tof_count(),
        }
    }
}

fn unique_names<'a>(
    kind: &'static str,
    names: impl Iterator<Item = &'a str>,
) -> Result<BTreeSet<&'a str>, ModelError> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(ModelError::Duplicate {
                kind,
                name: name.to_owned(),
            });
        }
    }
    Ok(seen)
}

// ---------------------------------------------------------------------------
// Observable layout
// ---------------------------------------------------------------------------

/// The fixed ordering of every observable series.
///
/// Engines report occupation rows in [`species`](Self::species) order (sorted
/// by name) with one column per entry of [`sites`](Self::sites) (declaration
/// order), and TOF values in [`tof_channels`](Self::tof_channels) order.
/// Frames flatten coverage row by row, so label `i` of
/// [`coverage_labels`](Self::coverage_labels) describes value `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservableLayout {
    /// Species names, sorted.
    pub species: Vec<String>,
    /// Site type names, in declaration order.
    pub sites: Vec<String>,
    /// TOF channel names, in declaration order.
    pub tof_channels: Vec<String>,
    /// Number of lattice sites in a configuration vector.
    pub site_count: usize,
}

impl ObservableLayout {
    /// Derive the layout from a model.
    pub fn from_model(model: &ModelDefinition) -> Self {
        let mut species: Vec<String> = model.species.iter().map(|s| s.name.clone()).collect();
        species.sort();
        Self {
            species,
            sites: model.sites.iter().map(|s| s.name.clone()).collect(),
            tof_channels: model.tof_channels.clone(),
            site_count: model.site_count(),
        }
    }

    /// Position of a species in occupation rows.
    pub fn species_index(&self, name: &str) -> Option<usize> {
        self.species.iter().position(|s| s == name)
    }

    /// Position of a site type in occupation columns.
    pub fn site_index(&self, name: &str) -> Option<usize> {
        self.sites.iter().position(|s| s == name)
    }

    /// Position of a TOF channel.
    pub fn tof_index(&self, name: &str) -> Option<usize> {
        self.tof_channels.iter().position(|s| s == name)
    }

    /// Number of coverage values per frame.
    pub fn coverage_len(&self) -> usize {
        self.species.len().saturating_mul(self.sites.len())
    }

    /// Coverage labels (`<species>_<site>`) in frame order.
    pub fn coverage_labels(&self) -> Vec<String> {
        self.species
            .iter()
            .flat_map(|sp| self.sites.iter().map(move |site| format!("{sp}_{site}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methanation_model_is_valid() {
        let model = ModelDefinition::methanation();
        assert_eq!(model.validate(), Ok(()));
        assert_eq!(model.site_count(), 20 * 20 * 3);
    }

    #[test]
    fn layout_sorts_species_and_keeps_site_order() {
        let layout = ObservableLayout::from_model(&ModelDefinition::methanation());
        assert_eq!(layout.species.first().map(String::as_str), Some("C"));
        assert_eq!(layout.sites, vec!["s", "t", "f"]);
        assert_eq!(layout.coverage_len(), 7 * 3);
        let labels = layout.coverage_labels();
        assert_eq!(labels.first().map(String::as_str), Some("C_s"));
        assert_eq!(labels.get(1).map(String::as_str), Some("C_t"));
        assert_eq!(labels.len(), layout.coverage_len());
    }

    #[test]
    fn duplicate_species_rejected() {
        let mut model = ModelDefinition::methanation();
        model.species.push(SpeciesDefinition {
            name: String::from("CO"),
            atoms: Vec::new(),
            color: None,
        });
        assert!(matches!(
            model.validate(),
            Err(ModelError::Duplicate { kind: "species", .. })
        ));
    }

    #[test]
    fn default_outside_bounds_rejected() {
        let mut model = ModelDefinition::methanation();
        if let Some(param) = model.parameters.iter_mut().find(|p| p.label == "T") {
            param.value = 1000.0;
        }
        assert!(matches!(
            model.validate(),
            Err(ModelError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn process_with_unknown_species_rejected() {
        let mut model = ModelDefinition::methanation();
        model.processes.push(ProcessDefinition {
            from: Some(String::from("N2")),
            prefactor: 1.0,
            ..ProcessDefinition::named("bogus")
        });
        assert!(matches!(
            model.validate(),
            Err(ModelError::UnknownReference { kind: "species", .. })
        ));
    }

    #[test]
    fn parse_model_from_yaml() {
        let yaml = r"
name: Toy
cell: { a: 3.0, b: 3.0, c: 10.0 }
size: { x: 2, y: 2 }
sites:
  - { name: hollow, position: [0.5, 0.5, 0.5] }
species:
  - name: A
tof_channels: [A_desorption]
parameters:
  - { label: T, value: 500.0, min: 300.0, max: 900.0, adjustable: true }
  - { label: p_A, value: 1.0, min: 0.0, max: 10.0, adjustable: true, scale: log }
processes:
  - { name: A_ads, to: A, prefactor: 10.0, pressure: p_A }
  - { name: A_des, from: A, prefactor: 1.0e13, barrier: 1.0, tof: A_desorption }
";
        let model: Result<ModelDefinition, _> = serde_yml::from_str(yaml);
        assert!(model.is_ok(), "{model:?}");
        let model = model.ok().unwrap_or_default();
        assert_eq!(model.name, "Toy");
        assert_eq!(model.site_count(), 4);
        assert_eq!(model.validate(), Ok(()));
        let des = model.processes.get(1);
        assert_eq!(des.map(|p| p.tof_count), Some(1));
        assert_eq!(
            model.parameters.get(1).map(|p| p.scale),
            Some(ParameterScale::Log)
        );
    }
}
