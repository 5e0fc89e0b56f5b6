//! Static metadata sent once to a client by `GET /initial`.
//!
//! The metadata describes what the client is about to plot and render:
//! element styling, the fixed surface atoms, the shape of each adsorbate,
//! the lattice site positions, the slider catalog, and the labels of the
//! TOF and coverage series. Per-frame values are merged into the same
//! document by the core crate.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::ParameterScale;

/// A Cartesian position in Angstrom.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Coordinate {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

/// A positioned atom tagged with its element symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TaggedCoordinate {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
    /// Element symbol (e.g. `Rh`, `C`).
    #[serde(rename = "type")]
    pub element: String,
}

/// Rendering attributes of one element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TypeDefinition {
    /// Covalent radius in Angstrom.
    pub radius: f64,
    /// RGB color with components in `[0, 1]`.
    pub color: Vec<f64>,
    /// Full element name (`empty` for unknown symbols).
    pub name: String,
    /// Free-form description shown in the legend.
    pub info: Option<String>,
}

/// One slider shown by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SliderSpec {
    /// Parameter label submitted back through `POST /slider`.
    pub label: String,
    /// Lowest accepted value.
    pub min: f64,
    /// Highest accepted value.
    pub max: f64,
    /// Value currently applied to the engine.
    pub default: f64,
    /// Slider scale hint.
    pub scale: ParameterScale,
    /// Free-form description.
    pub info: Option<String>,
}

/// Label of one TOF series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TofLabel {
    /// Reaction channel name.
    pub label: String,
    /// Optional plot color.
    pub color: Option<String>,
}

/// Labels of the coverage series belonging to one adsorbate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct CoverageLabel {
    /// Species name used for the averaged series.
    pub average_label: String,
    /// Optional color of the averaged series.
    pub average_color: Option<String>,
    /// Per-site-type labels (`<species>_<site>`), in frame order.
    pub single_labels: Vec<String>,
    /// Optional colors of the per-site series.
    pub single_colors: Vec<Option<String>>,
}

/// Geometry and styling section of the initial payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export, export_to = "bindings/")]
pub struct VisualizationMetadata {
    /// Styling per element symbol.
    pub type_definitions: std::collections::BTreeMap<String, TypeDefinition>,
    /// Surface atoms, repeated over the simulated lattice.
    pub fixed_species: Vec<TaggedCoordinate>,
    /// Atom list per adsorbate, in species order.
    pub species: Vec<Vec<TaggedCoordinate>>,
    /// Absolute position of every lattice site, in configuration order.
    pub sites: Vec<Coordinate>,
}

/// Plot label section of the initial payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct PlotMetadata {
    /// TOF series labels, in frame order.
    pub tof: Vec<TofLabel>,
    /// Coverage series labels grouped per species.
    pub coverage: Vec<CoverageLabel>,
}

/// Static part of the `GET /initial` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct InitialMetadata {
    /// Geometry and styling.
    pub visualization: VisualizationMetadata,
    /// Adjustable parameter catalog.
    pub slider: Vec<SliderSpec>,
    /// Series labels.
    pub plots: PlotMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_coordinate_serializes_element_as_type() {
        let atom = TaggedCoordinate {
            x: 0.0,
            y: 0.0,
            z: 1.2,
            element: String::from("O"),
        };
        let json = serde_json::to_value(&atom).ok().unwrap_or_default();
        assert_eq!(json["type"], serde_json::Value::from("O"));
    }

    #[test]
    fn coverage_label_uses_camel_case() {
        let label = CoverageLabel {
            average_label: String::from("CO"),
            average_color: None,
            single_labels: vec![String::from("CO_s")],
            single_colors: vec![None],
        };
        let json = serde_json::to_value(&label).ok().unwrap_or_default();
        assert!(json.get("averageLabel").is_some());
        assert!(json.get("singleLabels").is_some());
    }
}
