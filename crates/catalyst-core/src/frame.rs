//! Frame snapshot builder.
//!
//! Turns the raw [`EngineSnapshot`] of one step batch into an immutable
//! [`Frame`]. Shapes are checked against the [`ObservableLayout`] so a
//! misbehaving engine is caught here rather than by the browser.

use catalyst_types::{Frame, TofValue};

use crate::engine::EngineSnapshot;
use crate::model::ObservableLayout;

/// Errors raised while building a frame.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// An observable vector does not match the layout.
    #[error("{what} has length {actual}, expected {expected}")]
    Shape {
        /// Which observable is malformed.
        what: &'static str,
        /// Length from the layout.
        expected: usize,
        /// Length reported by the engine.
        actual: usize,
    },

    /// The engine reported a time that is not a finite non-negative number.
    #[error("invalid simulated time: {0}")]
    InvalidTime(String),
}

/// Build a frame from an engine snapshot.
///
/// Undefined TOF values (NaN, typically from a zero-length batch) are
/// reported as `0.0`. Coverage values are copied unchanged, flattened
/// species-major.
///
/// # Errors
///
/// Returns [`FrameError`] if the snapshot's shapes disagree with `layout`
/// or its time is not a finite non-negative value.
pub fn build_frame(
    snapshot: &EngineSnapshot,
    layout: &ObservableLayout,
) -> Result<Frame, FrameError> {
    if !snapshot.time.is_finite() || snapshot.time < 0.0 {
        return Err(FrameError::InvalidTime(snapshot.time.to_string()));
    }

    let channels = layout.tof_channels.len();
    expect_len("tof_instant", channels, snapshot.tof_instant.len())?;
    expect_len("tof_integrated", channels, snapshot.tof_integrated.len())?;
    expect_len("occupation", layout.species.len(), snapshot.occupation.len())?;
    for row in &snapshot.occupation {
        expect_len("occupation row", layout.sites.len(), row.len())?;
    }

    let tof_values = snapshot
        .tof_instant
        .iter()
        .zip(&snapshot.tof_integrated)
        .map(|(&instant, &integrated)| TofValue {
            instant: nan_to_zero(instant),
            integrated: nan_to_zero(integrated),
        })
        .collect();

    let coverage_values = snapshot.occupation.iter().flatten().copied().collect();

    Ok(Frame {
        time: snapshot.time,
        tof_values,
        coverage_values,
    })
}

const fn expect_len(what: &'static str, expected: usize, actual: usize) -> Result<(), FrameError> {
    if expected == actual {
        Ok(())
    } else {
        Err(FrameError::Shape {
            what,
            expected,
            actual,
        })
    }
}

const fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn layout() -> ObservableLayout {
        ObservableLayout {
            species: vec![String::from("A"), String::from("B")],
            sites: vec![String::from("s"), String::from("t")],
            tof_channels: vec![String::from("A_formation")],
            site_count: 4,
        }
    }

    fn snapshot() -> EngineSnapshot {
        EngineSnapshot {
            time: 1.5e-3,
            occupation: vec![vec![0.1, 0.2], vec![0.3, 0.4]],
            tof_instant: vec![2.0],
            tof_integrated: vec![1.5],
            config: vec![0, 1, -1, 0],
        }
    }

    #[test]
    fn flattens_coverage_species_major() {
        let frame = build_frame(&snapshot(), &layout()).unwrap();
        assert!((frame.time - 1.5e-3).abs() < f64::EPSILON);
        assert_eq!(frame.coverage_values.len(), 4);
        assert!((frame.coverage_values[1] - 0.2).abs() < f64::EPSILON);
        assert!((frame.coverage_values[2] - 0.3).abs() < f64::EPSILON);
        assert_eq!(frame.tof_values.len(), 1);
        assert!((frame.tof_values[0].instant - 2.0).abs() < f64::EPSILON);
        assert!((frame.tof_values[0].integrated - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn nan_tof_reported_as_zero() {
        let mut snap = snapshot();
        snap.tof_instant = vec![f64::NAN];
        snap.tof_integrated = vec![f64::NAN];
        let frame = build_frame(&snap, &layout()).unwrap();
        assert!(frame.tof_values[0].instant.abs() < f64::EPSILON);
        assert!(frame.tof_values[0].integrated.abs() < f64::EPSILON);
    }

    #[test]
    fn infinite_tof_kept() {
        let mut snap = snapshot();
        snap.tof_instant = vec![f64::INFINITY];
        let frame = build_frame(&snap, &layout()).unwrap();
        assert!(frame.tof_values[0].instant.is_infinite());
    }

    #[test]
    fn wrong_tof_length_rejected() {
        let mut snap = snapshot();
        snap.tof_instant = vec![1.0, 2.0];
        assert_eq!(
            build_frame(&snap, &layout()),
            Err(FrameError::Shape {
                what: "tof_instant",
                expected: 1,
                actual: 2,
            })
        );
    }

    #[test]
    fn ragged_occupation_rejected() {
        let mut snap = snapshot();
        snap.occupation = vec![vec![0.1], vec![0.3, 0.4]];
        assert!(matches!(
            build_frame(&snap, &layout()),
            Err(FrameError::Shape {
                what: "occupation row",
                ..
            })
        ));
    }

    #[test]
    fn nan_time_rejected() {
        let mut snap = snapshot();
        snap.time = f64::NAN;
        assert!(matches!(
            build_frame(&snap, &layout()),
            Err(FrameError::InvalidTime(_))
        ));
    }
}
