//! Site-local kinetic Monte Carlo on a periodic lattice.
//!
//! Every process turns one occupant of one site into another (or empties
//! the site). Sites are grouped into classes by `(site type, occupant)`;
//! all sites of a class share the same set of enabled processes and rates,
//! so a step picks a class and process by cumulative rate, a uniformly
//! random member site, and advances time by an exponential waiting time
//! (rejection-free selection).
//!
//! Rates follow an Arrhenius form:
//!
//! ```text
//! k = prefactor * p^order * exp(-(barrier + coefficient * E) / (kB * T))
//! ```
//!
//! where `p` and `E` are optional parameter references and `T` is the
//! model's temperature parameter.

use std::collections::BTreeMap;

use catalyst_core::engine::{EngineError, EngineFactory, EngineSnapshot, SimulationEngine};
use catalyst_core::model::{ModelDefinition, ObservableLayout, ProcessDefinition};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Boltzmann constant in eV/K.
pub const BOLTZMANN_EV: f64 = 8.617_333_262e-5;

/// Creates [`LatticeEngine`]s, seeded from `seed` when set and from the OS
/// otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatticeFactory {
    seed: Option<u64>,
}

impl LatticeFactory {
    /// A factory whose engines all start from the same seed, if given.
    pub const fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }
}

impl EngineFactory for LatticeFactory {
    fn allocate(
        &self,
        model: &ModelDefinition,
        parameters: &BTreeMap<String, f64>,
    ) -> Result<Box<dyn SimulationEngine>, EngineError> {
        let rng = self
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let engine = LatticeEngine::new(model, parameters, rng)?;
        debug!(
            sites = engine.occupant.len(),
            processes = engine.processes.len(),
            seeded = self.seed.is_some(),
            "Lattice engine allocated"
        );
        Ok(Box::new(engine))
    }
}

// ---------------------------------------------------------------------------
// Processes
// ---------------------------------------------------------------------------

/// A process resolved against the observable layout.
#[derive(Debug, Clone)]
struct Process {
    definition: ProcessDefinition,
    /// Occupant left behind (0 = empty, `i + 1` = species `i`).
    to: usize,
    /// TOF channel and signed increment.
    tof: Option<(usize, f64)>,
    /// Current rate per site in 1/s.
    rate: f64,
}

fn occupant_index(
    layout: &ObservableLayout,
    species: Option<&String>,
) -> Result<usize, EngineError> {
    species.map_or(Ok(0), |name| {
        layout
            .species_index(name)
            .map(|i| i.saturating_add(1))
            .ok_or_else(|| EngineError::Allocation(format!("unknown species {name}")))
    })
}

fn resolve_sites(
    layout: &ObservableLayout,
    definition: &ProcessDefinition,
) -> Result<Vec<usize>, EngineError> {
    if definition.sites.is_empty() {
        return Ok((0..layout.sites.len()).collect());
    }
    definition
        .sites
        .iter()
        .map(|name| {
            layout.site_index(name).ok_or_else(|| {
                EngineError::Allocation(format!(
                    "process {} references unknown site {name}",
                    definition.name
                ))
            })
        })
        .collect()
}

fn thermal_energy(values: &BTreeMap<String, f64>, label: &str) -> Result<f64, EngineError> {
    let temperature = values
        .get(label)
        .copied()
        .ok_or_else(|| EngineError::Parameters(format!("missing temperature parameter {label}")))?;
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(EngineError::Parameters(format!(
            "temperature {label} must be positive, got {temperature}"
        )));
    }
    Ok(BOLTZMANN_EV * temperature)
}

fn arrhenius(
    definition: &ProcessDefinition,
    values: &BTreeMap<String, f64>,
    kt: f64,
) -> Result<f64, EngineError> {
    let lookup = |label: &str| {
        values.get(label).copied().ok_or_else(|| {
            EngineError::Parameters(format!(
                "process {} references unknown parameter {label}",
                definition.name
            ))
        })
    };

    let mut barrier = definition.barrier;
    if let Some(label) = &definition.barrier_parameter {
        barrier += definition.barrier_coefficient * lookup(label)?;
    }
    let pressure = match &definition.pressure {
        Some(label) => lookup(label)?.powf(definition.order),
        None => 1.0,
    };

    let rate = definition.prefactor * pressure * (-barrier / kt).exp();
    if rate.is_finite() && rate >= 0.0 {
        Ok(rate)
    } else {
        Err(EngineError::Parameters(format!(
            "process {} has invalid rate {rate}",
            definition.name
        )))
    }
}

/// Lossless for every lattice this engine can hold in memory.
fn count_as_f64(n: usize) -> f64 {
    u32::try_from(n).map_or(f64::from(u32::MAX), f64::from)
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// A rejection-free site-local kMC engine.
#[derive(Debug)]
pub struct LatticeEngine {
    layout: ObservableLayout,
    /// Occupant states per site: empty plus one per species.
    states: usize,
    cells: usize,
    temperature_label: String,
    values: BTreeMap<String, f64>,
    processes: Vec<Process>,
    /// Process indices enabled in each class.
    class_processes: Vec<Vec<usize>>,
    /// Sites in each class.
    members: Vec<Vec<usize>>,
    /// Position of each site inside its class member list.
    slot: Vec<usize>,
    /// Occupant of each site.
    occupant: Vec<usize>,
    time: f64,
    events: Vec<f64>,
    batch_events: Vec<f64>,
    batch_time: f64,
    rng: StdRng,
}

impl LatticeEngine {
    /// Build an empty lattice for `model` at time zero.
    ///
    /// # Errors
    ///
    /// [`EngineError::Allocation`] if a process references an unknown
    /// species, site or TOF channel, and [`EngineError::Parameters`] if a
    /// rate cannot be evaluated with `parameters`.
    pub fn new(
        model: &ModelDefinition,
        parameters: &BTreeMap<String, f64>,
        rng: StdRng,
    ) -> Result<Self, EngineError> {
        let layout = ObservableLayout::from_model(model);
        let site_types = layout.sites.len();
        if site_types == 0 || layout.site_count == 0 {
            return Err(EngineError::Allocation(String::from("lattice has no sites")));
        }
        let states = layout.species.len().saturating_add(1);
        let classes = site_types.saturating_mul(states);

        let mut processes = Vec::with_capacity(model.processes.len());
        let mut class_processes = vec![Vec::new(); classes];
        for definition in &model.processes {
            let from = occupant_index(&layout, definition.from.as_ref())?;
            let to = occupant_index(&layout, definition.to.as_ref())?;
            let tof = match &definition.tof {
                Some(channel) => {
                    let index = layout.tof_index(channel).ok_or_else(|| {
                        EngineError::Allocation(format!("unknown TOF channel {channel}"))
                    })?;
                    Some((index, f64::from(definition.tof_count)))
                }
                None => None,
            };
            let id = processes.len();
            for site_type in resolve_sites(&layout, definition)? {
                let class = site_type.saturating_mul(states).saturating_add(from);
                if let Some(list) = class_processes.get_mut(class) {
                    list.push(id);
                }
            }
            processes.push(Process {
                definition: definition.clone(),
                to,
                tof,
                rate: 0.0,
            });
        }

        // Every site starts empty.
        let mut members = vec![Vec::new(); classes];
        let mut slot = Vec::with_capacity(layout.site_count);
        for site in 0..layout.site_count {
            let class = site.checked_rem(site_types).unwrap_or(0).saturating_mul(states);
            let list = members
                .get_mut(class)
                .ok_or_else(|| EngineError::Allocation(format!("no class for site {site}")))?;
            slot.push(list.len());
            list.push(site);
        }

        let channels = layout.tof_channels.len();
        let mut engine = Self {
            occupant: vec![0; layout.site_count],
            cells: model.size.cell_count(),
            layout,
            states,
            temperature_label: model.temperature_parameter.clone(),
            values: BTreeMap::new(),
            processes,
            class_processes,
            members,
            slot,
            time: 0.0,
            events: vec![0.0; channels],
            batch_events: vec![0.0; channels],
            batch_time: 0.0,
            rng,
        };
        engine.apply_parameters(parameters)?;
        Ok(engine)
    }

    fn site_type(&self, site: usize) -> usize {
        site.checked_rem(self.layout.sites.len()).unwrap_or(0)
    }

    fn class_of(&self, site_type: usize, occupant: usize) -> usize {
        site_type.saturating_mul(self.states).saturating_add(occupant)
    }

    fn class_weight(&self, class: usize) -> f64 {
        let count = self.members.get(class).map_or(0, Vec::len);
        if count == 0 {
            return 0.0;
        }
        let per_site: f64 = self
            .class_processes
            .get(class)
            .into_iter()
            .flatten()
            .filter_map(|&p| self.processes.get(p))
            .map(|p| p.rate)
            .sum();
        count_as_f64(count) * per_site
    }

    fn total_rate(&self) -> f64 {
        (0..self.members.len()).map(|c| self.class_weight(c)).sum()
    }

    /// Pick `(class, process)` with probability proportional to its total
    /// rate. `target` is uniform in `[0, total)`.
    fn select(&self, mut target: f64) -> Option<(usize, usize)> {
        let mut last = None;
        for (class, enabled) in self.class_processes.iter().enumerate() {
            let count = count_as_f64(self.members.get(class).map_or(0, Vec::len));
            for &p in enabled {
                let weight = count * self.processes.get(p).map_or(0.0, |p| p.rate);
                if weight <= 0.0 {
                    continue;
                }
                if target < weight {
                    return Some((class, p));
                }
                target -= weight;
                last = Some((class, p));
            }
        }
        // Rounding can leave `target` just past the final weight.
        last
    }

    /// Move `site` from its current class to the one for `occupant`.
    fn relocate(&mut self, site: usize, occupant: usize) -> Result<(), EngineError> {
        let missing = || EngineError::Step(format!("lattice bookkeeping lost site {site}"));
        let site_type = self.site_type(site);
        let current = *self.occupant.get(site).ok_or_else(missing)?;
        if current == occupant {
            return Ok(());
        }

        let old_class = self.class_of(site_type, current);
        let position = *self.slot.get(site).ok_or_else(missing)?;
        let list = self.members.get_mut(old_class).ok_or_else(missing)?;
        if position >= list.len() {
            return Err(missing());
        }
        list.swap_remove(position);
        if let Some(&moved) = list.get(position) {
            if let Some(s) = self.slot.get_mut(moved) {
                *s = position;
            }
        }

        let new_class = self.class_of(site_type, occupant);
        let list = self.members.get_mut(new_class).ok_or_else(missing)?;
        let new_position = list.len();
        list.push(site);
        if let Some(s) = self.slot.get_mut(site) {
            *s = new_position;
        }
        if let Some(o) = self.occupant.get_mut(site) {
            *o = occupant;
        }
        Ok(())
    }

    /// Execute one event. Returns `false` when no process is enabled.
    fn step(&mut self) -> Result<bool, EngineError> {
        let total = self.total_rate();
        if total <= 0.0 {
            return Ok(false);
        }

        // 1 - U is in (0, 1], so the logarithm is finite.
        let waiting: f64 = 1.0 - self.rng.random::<f64>();
        let target = self.rng.random::<f64>() * total;
        let Some((class, process)) = self.select(target) else {
            return Ok(false);
        };
        let candidates = self.members.get(class).map_or(0, Vec::len);
        if candidates == 0 {
            return Ok(false);
        }
        let pick = self.rng.random_range(0..candidates);
        let site = self
            .members
            .get(class)
            .and_then(|list| list.get(pick))
            .copied()
            .ok_or_else(|| EngineError::Step(format!("class {class} has no member {pick}")))?;

        let (to, tof) = self
            .processes
            .get(process)
            .map(|p| (p.to, p.tof))
            .ok_or_else(|| EngineError::Step(format!("unknown process {process}")))?;
        self.relocate(site, to)?;
        if let Some((channel, increment)) = tof {
            if let Some(sum) = self.events.get_mut(channel) {
                *sum += increment;
            }
            if let Some(batch) = self.batch_events.get_mut(channel) {
                *batch += increment;
            }
        }

        self.time += -waiting.ln() / total;
        Ok(true)
    }

    /// Fraction of sites of `site_type` holding `species`.
    fn coverage(&self, species: usize, site_type: usize) -> f64 {
        let class = self.class_of(site_type, species.saturating_add(1));
        let count = self.members.get(class).map_or(0, Vec::len);
        if self.cells == 0 {
            return 0.0;
        }
        count_as_f64(count) / count_as_f64(self.cells)
    }
}

impl SimulationEngine for LatticeEngine {
    fn advance(&mut self, steps: u64) -> Result<(), EngineError> {
        let start = self.time;
        self.batch_events.fill(0.0);
        for _ in 0..steps {
            if !self.step()? {
                break;
            }
        }
        self.batch_time = self.time - start;
        Ok(())
    }

    fn snapshot(&self) -> EngineSnapshot {
        let site_types = self.layout.sites.len();
        let occupation = (0..self.layout.species.len())
            .map(|species| {
                (0..site_types)
                    .map(|site_type| self.coverage(species, site_type))
                    .collect()
            })
            .collect();

        // 0 / 0 is NaN before any time has passed; frames report it as 0.
        let tof_instant = self
            .batch_events
            .iter()
            .map(|events| events / self.batch_time)
            .collect();
        let tof_integrated = self.events.iter().map(|events| events / self.time).collect();

        let config = self
            .occupant
            .iter()
            .map(|&o| {
                i32::try_from(o)
                    .ok()
                    .and_then(|o| o.checked_sub(1))
                    .unwrap_or(-1)
            })
            .collect();

        EngineSnapshot {
            time: self.time,
            occupation,
            tof_instant,
            tof_integrated,
            config,
        }
    }

    fn apply_parameters(&mut self, values: &BTreeMap<String, f64>) -> Result<(), EngineError> {
        let mut merged = self.values.clone();
        merged.extend(values.iter().map(|(k, v)| (k.clone(), *v)));
        let kt = thermal_energy(&merged, &self.temperature_label)?;

        let rates = self
            .processes
            .iter()
            .map(|p| arrhenius(&p.definition, &merged, kt))
            .collect::<Result<Vec<_>, _>>()?;
        for (process, rate) in self.processes.iter_mut().zip(rates) {
            process.rate = rate;
        }
        self.values = merged;
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::arithmetic_side_effects
)]
mod tests {
    use catalyst_core::catalog::ParameterCatalog;
    use catalyst_core::model::{
        LatticeSize, ParameterDefinition, SiteDefinition, SpeciesDefinition, UnitCell,
    };
    use catalyst_types::ParameterScale;

    use super::*;

    /// X adsorbs on empty `a` sites with rate `p_X` and never leaves.
    fn adsorption_model() -> ModelDefinition {
        ModelDefinition {
            name: String::from("adsorption"),
            cell: UnitCell { a: 1.0, b: 1.0, c: 1.0 },
            size: LatticeSize { x: 4, y: 5 },
            surface: Vec::new(),
            sites: vec![
                SiteDefinition {
                    name: String::from("a"),
                    position: [0.0; 3],
                },
                SiteDefinition {
                    name: String::from("b"),
                    position: [0.5, 0.5, 0.0],
                },
            ],
            species: vec![SpeciesDefinition {
                name: String::from("X"),
                atoms: Vec::new(),
                color: None,
            }],
            tof_channels: vec![String::from("X_uptake")],
            parameters: vec![
                ParameterDefinition {
                    label: String::from("T"),
                    value: 500.0,
                    min: Some(300.0),
                    max: Some(900.0),
                    adjustable: true,
                    scale: ParameterScale::Linear,
                },
                ParameterDefinition {
                    label: String::from("p_X"),
                    value: 1.0,
                    min: Some(0.0),
                    max: Some(10.0),
                    adjustable: true,
                    scale: ParameterScale::Log,
                },
            ],
            temperature_parameter: String::from("T"),
            processes: vec![ProcessDefinition {
                sites: vec![String::from("a")],
                to: Some(String::from("X")),
                prefactor: 1.0e3,
                pressure: Some(String::from("p_X")),
                tof: Some(String::from("X_uptake")),
                ..ProcessDefinition::named("X_adsorption")
            }],
        }
    }

    fn engine(model: &ModelDefinition, seed: u64) -> LatticeEngine {
        let values = ParameterCatalog::from_model(model).values();
        LatticeEngine::new(model, &values, StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn fresh_engine_is_empty_at_time_zero() {
        let model = adsorption_model();
        let snapshot = engine(&model, 1).snapshot();

        assert_eq!(snapshot.time, 0.0);
        assert_eq!(snapshot.config, vec![-1; 40]);
        assert_eq!(snapshot.occupation, vec![vec![0.0, 0.0]]);
        assert!(snapshot.tof_integrated[0].is_nan());
    }

    #[test]
    fn adsorption_fills_only_enabled_sites_then_stops() {
        let model = adsorption_model();
        let mut engine = engine(&model, 7);

        engine.advance(5).unwrap();
        let partial = engine.snapshot();
        assert!(partial.time > 0.0);
        assert_eq!(partial.config.iter().filter(|&&c| c == 0).count(), 5);
        assert_eq!(partial.tof_instant[0], 5.0 / partial.time);

        // 20 `a` sites in total; extra steps find nothing to do.
        engine.advance(100).unwrap();
        let full = engine.snapshot();
        assert_eq!(full.occupation, vec![vec![1.0, 0.0]]);
        for (site, &c) in full.config.iter().enumerate() {
            let expected = if site % 2 == 0 { 0 } else { -1 };
            assert_eq!(c, expected, "site {site}");
        }
        assert!((full.tof_integrated[0] - 20.0 / full.time).abs() < 1e-9);

        let time = full.time;
        engine.advance(10).unwrap();
        assert_eq!(engine.snapshot().time, time);
        assert!(engine.snapshot().tof_instant[0].is_nan());
    }

    #[test]
    fn same_seed_reproduces_trajectory() {
        let model = ModelDefinition::methanation();
        let mut first = engine(&model, 42);
        let mut second = engine(&model, 42);

        first.advance(2000).unwrap();
        second.advance(2000).unwrap();
        assert_eq!(first.snapshot(), second.snapshot());
    }

    #[test]
    fn methanation_produces_consistent_snapshots() {
        let model = ModelDefinition::methanation();
        let layout = ObservableLayout::from_model(&model);
        let mut engine = engine(&model, 3);

        let mut previous = 0.0;
        for _ in 0..5 {
            engine.advance(5000).unwrap();
            let snapshot = engine.snapshot();
            assert!(snapshot.time > previous);
            previous = snapshot.time;

            assert_eq!(snapshot.config.len(), layout.site_count);
            let species = i32::try_from(layout.species.len()).unwrap();
            assert!(snapshot.config.iter().all(|&c| (-1..species).contains(&c)));
            for site_type in 0..layout.sites.len() {
                let covered: f64 = snapshot.occupation.iter().map(|row| row[site_type]).sum();
                assert!((0.0..=1.0 + 1e-12).contains(&covered));
            }
        }
    }

    #[test]
    fn zero_pressure_disables_adsorption() {
        let model = adsorption_model();
        let mut engine = engine(&model, 5);
        let mut values = BTreeMap::new();
        values.insert(String::from("p_X"), 0.0);
        engine.apply_parameters(&values).unwrap();

        engine.advance(50).unwrap();
        assert_eq!(engine.snapshot().time, 0.0);
    }

    #[test]
    fn invalid_temperature_is_rejected() {
        let model = adsorption_model();
        let mut engine = engine(&model, 5);
        let mut values = BTreeMap::new();
        values.insert(String::from("T"), 0.0);

        assert!(matches!(
            engine.apply_parameters(&values),
            Err(EngineError::Parameters(_))
        ));
    }

    #[test]
    fn unknown_site_fails_allocation() {
        let mut model = adsorption_model();
        model.processes[0].sites = vec![String::from("bridge")];

        let result = LatticeFactory::new(Some(1)).allocate(&model, &BTreeMap::new());
        assert!(matches!(result, Err(EngineError::Allocation(_))));
    }

    #[test]
    fn temperature_raises_activated_rates() {
        let definition = ProcessDefinition {
            prefactor: 1.0e13,
            barrier: 1.0,
            ..ProcessDefinition::named("activated")
        };
        let values = BTreeMap::new();
        let cold = arrhenius(&definition, &values, BOLTZMANN_EV * 400.0).unwrap();
        let hot = arrhenius(&definition, &values, BOLTZMANN_EV * 800.0).unwrap();
        assert!(hot > cold);
        assert!((cold - 1.0e13 * (-1.0 / (BOLTZMANN_EV * 400.0)).exp()).abs() < 1e-6);
    }
}
