//! Builders for the `GET /initial` document.
//!
//! The static part ([`InitialMetadata`]) is derived from the model and the
//! current parameter catalog. The dynamic part has the same layout as a
//! live frame (lattice configuration plus plot values) and comes from the
//! latest bundle, or an all-zero frame before the first one. The two are
//! combined with [`merge_maps`].

use std::collections::{BTreeMap, BTreeSet};

use catalyst_types::{
    Coordinate, CoverageLabel, DataBundle, InitialMetadata, PlotMetadata, SliderSpec,
    TaggedCoordinate, TofLabel, TofValue, TypeDefinition, VisualizationMetadata,
};
use serde_json::{Map, Value, json};

use crate::catalog::ParameterCatalog;
use crate::error::ControlError;
use crate::merge::merge_maps;
use crate::model::{AtomDefinition, ModelDefinition, ObservableLayout};

// ---------------------------------------------------------------------------
// Element styling
// ---------------------------------------------------------------------------

/// (symbol, covalent radius, jmol RGB, name)
const ELEMENTS: &[(&str, f64, [f64; 3], &str)] = &[
    ("H", 0.31, [1.0, 1.0, 1.0], "Hydrogen"),
    ("C", 0.76, [0.565, 0.565, 0.565], "Carbon"),
    ("N", 0.71, [0.188, 0.314, 0.973], "Nitrogen"),
    ("O", 0.66, [1.0, 0.051, 0.051], "Oxygen"),
    ("Fe", 1.32, [0.878, 0.4, 0.2], "Iron"),
    ("Co", 1.26, [0.941, 0.565, 0.627], "Cobalt"),
    ("Ni", 1.24, [0.314, 0.816, 0.314], "Nickel"),
    ("Cu", 1.32, [0.784, 0.502, 0.2], "Copper"),
    ("Ru", 1.46, [0.141, 0.561, 0.561], "Ruthenium"),
    ("Rh", 1.42, [0.039, 0.49, 0.549], "Rhodium"),
    ("Pd", 1.39, [0.0, 0.412, 0.522], "Palladium"),
    ("Ag", 1.45, [0.753, 0.753, 0.753], "Silver"),
    ("Pt", 1.36, [0.816, 0.816, 0.878], "Platinum"),
    ("Au", 1.36, [1.0, 0.82, 0.137], "Gold"),
];

/// Styling for an element symbol. Unknown symbols render as black points
/// named `empty`.
pub fn type_definition(symbol: &str) -> TypeDefinition {
    ELEMENTS
        .iter()
        .find(|(s, ..)| *s == symbol)
        .map_or_else(
            || TypeDefinition {
                radius: 0.0,
                color: vec![0.0; 3],
                name: String::from("empty"),
                info: None,
            },
            |(_, radius, color, name)| TypeDefinition {
                radius: *radius,
                color: color.to_vec(),
                name: (*name).to_owned(),
                info: None,
            },
        )
}

// ---------------------------------------------------------------------------
// Static metadata
// ---------------------------------------------------------------------------

/// Build the static part of the initial document.
///
/// Slider defaults report the catalog's current values, so a client
/// connecting mid-run sees the parameters actually in effect.
pub fn static_metadata(model: &ModelDefinition, catalog: &ParameterCatalog) -> InitialMetadata {
    let layout = ObservableLayout::from_model(model);

    let mut symbols: BTreeSet<String> = model.surface.iter().map(|a| a.element.clone()).collect();
    let mut species_shapes = Vec::with_capacity(layout.species.len());
    let mut coverage = Vec::with_capacity(layout.species.len());

    for name in &layout.species {
        let definition = model.species.iter().find(|s| &s.name == name);
        let atoms = definition.map(|d| d.atoms.as_slice()).unwrap_or_default();
        let shape: Vec<TaggedCoordinate> = if atoms.is_empty() {
            vec![TaggedCoordinate {
                x: 0.0,
                y: 0.0,
                z: 0.0,
                element: name.clone(),
            }]
        } else {
            atoms.iter().map(|a| tagged(a, [0.0; 3])).collect()
        };
        symbols.extend(shape.iter().map(|a| a.element.clone()));
        species_shapes.push(shape);

        let single_labels: Vec<String> = layout
            .sites
            .iter()
            .map(|site| format!("{name}_{site}"))
            .collect();
        coverage.push(CoverageLabel {
            average_label: name.clone(),
            average_color: definition.and_then(|d| d.color.clone()),
            single_colors: vec![None; single_labels.len()],
            single_labels,
        });
    }

    let type_definitions: BTreeMap<String, TypeDefinition> = symbols
        .into_iter()
        .map(|symbol| {
            let definition = type_definition(&symbol);
            (symbol, definition)
        })
        .collect();

    let slider = catalog
        .specs()
        .iter()
        .filter(|(_, spec)| spec.adjustable)
        .map(|(label, spec)| SliderSpec {
            label: label.clone(),
            min: spec.min,
            max: spec.max,
            default: spec.value,
            scale: spec.scale,
            info: None,
        })
        .collect();

    let tof = layout
        .tof_channels
        .iter()
        .map(|label| TofLabel {
            label: label.clone(),
            color: None,
        })
        .collect();

    InitialMetadata {
        visualization: VisualizationMetadata {
            type_definitions,
            fixed_species: fixed_species(model),
            species: species_shapes,
            sites: site_positions(model),
        },
        slider,
        plots: PlotMetadata { tof, coverage },
    }
}

/// Cell origins in configuration order (x outer, y inner).
fn cell_offsets(model: &ModelDefinition) -> impl Iterator<Item = [f64; 3]> + '_ {
    (0..model.size.x).flat_map(move |i| {
        (0..model.size.y).map(move |j| {
            [
                f64::from(i) * model.cell.a,
                f64::from(j) * model.cell.b,
                0.0,
            ]
        })
    })
}

fn tagged(atom: &AtomDefinition, offset: [f64; 3]) -> TaggedCoordinate {
    let [x, y, z] = atom.position;
    let [ox, oy, oz] = offset;
    TaggedCoordinate {
        x: x + ox,
        y: y + oy,
        z: z + oz,
        element: atom.element.clone(),
    }
}

/// Surface atoms repeated over every cell.
fn fixed_species(model: &ModelDefinition) -> Vec<TaggedCoordinate> {
    cell_offsets(model)
        .flat_map(|offset| model.surface.iter().map(move |atom| tagged(atom, offset)))
        .collect()
}

/// Absolute site positions, one per configuration entry.
fn site_positions(model: &ModelDefinition) -> Vec<Coordinate> {
    cell_offsets(model)
        .flat_map(|[ox, oy, oz]| {
            model.sites.iter().map(move |site| {
                let [fx, fy, fz] = site.position;
                Coordinate {
                    x: fx.mul_add(model.cell.a, ox),
                    y: fy.mul_add(model.cell.b, oy),
                    z: fz.mul_add(model.cell.c, oz),
                }
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Dynamic fragment
// ---------------------------------------------------------------------------

/// The per-frame fragment: lattice configuration and plot values.
///
/// Coverage values are regrouped per species so each entry lines up with
/// one [`CoverageLabel`].
pub fn dynamic_fragment(bundle: Option<&DataBundle>, layout: &ObservableLayout) -> Value {
    let sites = layout.sites.len().max(1);
    let (time, tof, coverage, config) = bundle.map_or_else(
        || {
            (
                0.0,
                vec![TofValue::default(); layout.tof_channels.len()],
                vec![0.0; layout.coverage_len()],
                vec![-1; layout.site_count],
            )
        },
        |b| {
            (
                b.frame.time,
                b.frame.tof_values.clone(),
                b.frame.coverage_values.clone(),
                b.config.clone(),
            )
        },
    );

    let tof: Vec<Value> = tof
        .iter()
        .map(|t| json!({ "values": [t.instant, t.integrated] }))
        .collect();
    let coverage: Vec<Value> = coverage
        .chunks(sites)
        .map(|values| json!({ "values": values }))
        .collect();

    json!({
        "visualization": { "config": config },
        "plots": {
            "plotData": {
                "kmcTime": time,
                "tof": tof,
                "coverage": coverage,
            }
        }
    })
}

/// The complete `GET /initial` document.
///
/// # Errors
///
/// Returns [`ControlError::Serialization`] if the metadata cannot be
/// serialized and [`ControlError::Merge`] if the static and dynamic parts
/// overlap with different values.
pub fn initial_document(
    model: &ModelDefinition,
    catalog: &ParameterCatalog,
    bundle: Option<&DataBundle>,
) -> Result<Value, ControlError> {
    let layout = ObservableLayout::from_model(model);
    let metadata = as_object(serde_json::to_value(static_metadata(model, catalog))?);
    let dynamic = as_object(dynamic_fragment(bundle, &layout));
    Ok(Value::Object(merge_maps(metadata, dynamic)?))
}

fn as_object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use catalyst_types::{Frame, RunId};

    use super::*;
    use crate::model::LatticeSize;

    fn small_model() -> ModelDefinition {
        let mut model = ModelDefinition::methanation();
        model.size = LatticeSize { x: 2, y: 3 };
        model
    }

    #[test]
    fn unknown_element_is_empty() {
        let def = type_definition("Xx");
        assert_eq!(def.name, "empty");
        assert!(def.radius.abs() < f64::EPSILON);
        assert_eq!(def.color, vec![0.0, 0.0, 0.0]);
        assert_eq!(type_definition("Rh").name, "Rhodium");
    }

    #[test]
    fn static_metadata_shapes() {
        let model = small_model();
        let meta = static_metadata(&model, &ParameterCatalog::from_model(&model));

        assert_eq!(meta.visualization.sites.len(), 2 * 3 * 3);
        assert_eq!(meta.visualization.fixed_species.len(), 2 * 3 * 3);
        assert_eq!(meta.visualization.species.len(), 7);
        let keys: Vec<&str> = meta
            .visualization
            .type_definitions
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["C", "H", "O", "Rh"]);

        // First species by name is C, a single carbon atom.
        assert_eq!(meta.visualization.species[0].len(), 1);
        assert_eq!(meta.plots.coverage[0].average_label, "C");
        assert_eq!(meta.plots.coverage[0].single_labels, vec!["C_s", "C_t", "C_f"]);
        assert_eq!(meta.plots.tof.len(), 2);
        assert_eq!(meta.slider.len(), 7);
        assert!(meta.slider.iter().all(|s| s.label != "A" && s.label != "alpha"));
    }

    #[test]
    fn site_positions_follow_cells() {
        let model = small_model();
        let sites = site_positions(&model);
        // Second cell along y, first site type.
        let site = sites[3];
        assert!((site.x - 0.121 * 6.582).abs() < 1e-9);
        assert!((site.y - (0.5 * 2.686 + 2.686)).abs() < 1e-9);
        assert!((site.z - 0.6 * 20.0).abs() < 1e-9);
    }

    #[test]
    fn zero_fragment_before_first_frame() {
        let model = small_model();
        let layout = ObservableLayout::from_model(&model);
        let fragment = dynamic_fragment(None, &layout);
        assert_eq!(fragment["visualization"]["config"].as_array().unwrap().len(), 18);
        assert_eq!(fragment["plots"]["plotData"]["kmcTime"], json!(0.0));
        assert_eq!(fragment["plots"]["plotData"]["coverage"].as_array().unwrap().len(), 7);
        assert_eq!(fragment["plots"]["plotData"]["tof"][0], json!({"values": [0.0, 0.0]}));
    }

    #[test]
    fn document_merges_static_and_dynamic() {
        let model = small_model();
        let catalog = ParameterCatalog::from_model(&model);
        let frame = Frame {
            time: 2.5,
            tof_values: vec![TofValue { instant: 1.0, integrated: 0.5 }; 2],
            coverage_values: (0..21_u32).map(f64::from).collect(),
        };
        let bundle = DataBundle {
            run_id: RunId::new(),
            iteration: 4,
            frame: frame.clone(),
            history: vec![frame],
            config: vec![0; 18],
        };
        let doc = initial_document(&model, &catalog, Some(&bundle)).unwrap();

        assert!(doc["visualization"]["typeDefinitions"].is_object());
        assert_eq!(doc["visualization"]["config"].as_array().unwrap().len(), 18);
        assert_eq!(doc["plots"]["plotData"]["kmcTime"], json!(2.5));
        assert_eq!(
            doc["plots"]["plotData"]["coverage"][1],
            json!({"values": [3.0, 4.0, 5.0]})
        );
        assert_eq!(doc["plots"]["tof"][0]["label"], json!("CH4_formation"));
        assert_eq!(doc["slider"][0]["label"], json!("E_C"));
    }
}
