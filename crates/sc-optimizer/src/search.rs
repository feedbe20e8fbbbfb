//! Search space definitions and parameter sweep strategies.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use sc_types::{ConfigError, ScResult};

use crate::distribution::{Distribution, DistributionKind, DistributionSpec, Reparameterize};

/// A concrete parameter assignment: parameter name → external value.
pub type ParameterSet = BTreeMap<String, f64>;

/// One entry of the search-space config fragment: `["truncnorm", [mu, sigma, lo, hi]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDistribution(pub String, pub Vec<f64>);

/// The declarative search-space fragment as it appears in config files.
pub type RawSearchSpace = HashMap<String, RawDistribution>;

/// The full search space: parameter name → distribution.
///
/// Read-only once built; strategies and workers share it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSpace {
    parameters: BTreeMap<String, Distribution>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: BTreeMap::new(),
        }
    }

    pub fn add(mut self, name: impl Into<String>, distribution: Distribution) -> Self {
        self.parameters.insert(name.into(), distribution);
        self
    }

    /// Build a search space from its config fragment.
    ///
    /// Kinds are matched case-insensitively; an unknown kind or a bad shape
    /// fails the whole space.
    pub fn from_raw(raw: &RawSearchSpace) -> ScResult<Self> {
        let mut names: Vec<&String> = raw.keys().collect();
        names.sort();

        let mut space = Self::new();
        for name in names {
            let RawDistribution(kind_name, shape_params) = &raw[name];
            let kind = DistributionKind::from_name(kind_name).ok_or_else(|| {
                ConfigError::UnknownDistribution {
                    parameter: name.clone(),
                    kind: kind_name.clone(),
                }
            })?;
            let spec = DistributionSpec {
                kind,
                shape_params: shape_params.clone(),
            };
            let distribution = spec.build(name)?;
            debug!("Search space: {} ~ {} {:?}", name, kind.name(), shape_params);
            space.parameters.insert(name.clone(), distribution);
        }
        Ok(space)
    }

    /// Parse the search-space fragment from JSON.
    pub fn from_json(value: &serde_json::Value) -> ScResult<Self> {
        let raw: RawSearchSpace = serde_json::from_value(value.clone())?;
        Self::from_raw(&raw)
    }

    pub fn get(&self, name: &str) -> Option<&Distribution> {
        self.parameters.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Distribution)> {
        self.parameters.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.parameters.keys()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Draw one value per parameter.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParameterSet {
        self.parameters
            .iter()
            .map(|(name, dist)| (name.clone(), dist.sample(rng)))
            .collect()
    }

    /// Whether every parameter of the space is present and in its domain.
    pub fn contains(&self, params: &ParameterSet) -> bool {
        self.parameters
            .iter()
            .all(|(name, dist)| params.get(name).is_some_and(|v| dist.contains(*v)))
    }
}

// ---------------------------------------------------------------------------
// Search strategies
// ---------------------------------------------------------------------------

/// Common trait for all search strategies.
pub trait SearchStrategy: Send {
    /// Generate the next batch of parameter combinations to evaluate.
    fn suggest(&mut self, count: usize) -> Vec<ParameterSet>;

    /// Report a finished trial so adaptive strategies can learn.
    ///
    /// `objectives` holds one value per metric, oriented so lower is better.
    fn report(&mut self, _params: &ParameterSet, _objectives: &[f64]) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Strategy selector used in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StrategyKind {
    Random,
    Bayesian,
}

impl StrategyKind {
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.to_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "bayesian" => Ok(Self::Bayesian),
            _ => Err(ConfigError::UnknownStrategy {
                name: name.to_string(),
            }),
        }
    }

    /// Instantiate the strategy over `space`.
    pub fn build(
        &self,
        space: Arc<SearchSpace>,
        seed: u64,
        exploration_weight: f64,
    ) -> Box<dyn SearchStrategy> {
        match self {
            Self::Random => Box::new(RandomSearch::new(space, seed)),
            Self::Bayesian => Box::new(BayesianSearch::new(space, seed, exploration_weight)),
        }
    }
}

// ---- Random search ----

/// Independent random sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: Arc<SearchSpace>,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: Arc<SearchSpace>, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterSet> {
        (0..count).map(|_| self.space.sample(&mut self.rng)).collect()
    }

    fn name(&self) -> &str {
        "random"
    }
}

// ---- Bayesian search ----

/// Explore/exploit search working in internal coordinates.
///
/// Exploration draws from the priors. Exploitation picks one objective at
/// random, takes the best observation for it and perturbs each parameter by
/// up to ±10% of its internal interval, so perturbations of normal priors
/// follow the prior's own probability scale rather than raw units.
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: Arc<SearchSpace>,
    rng: StdRng,
    observations: Vec<(ParameterSet, Vec<f64>)>,
    exploration_weight: f64,
}

impl BayesianSearch {
    pub fn new(space: Arc<SearchSpace>, seed: u64, exploration_weight: f64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
            observations: Vec::new(),
            exploration_weight,
        }
    }

    pub fn num_observations(&self) -> usize {
        self.observations.len()
    }

    /// Pure exploration sample (same as random).
    fn explore(&mut self) -> ParameterSet {
        self.space.sample(&mut self.rng)
    }

    /// Exploitation: perturb the best-known point for one objective.
    fn exploit(&mut self) -> ParameterSet {
        let num_objectives = self
            .observations
            .first()
            .map(|(_, objectives)| objectives.len())
            .unwrap_or(0);
        if num_objectives == 0 {
            return self.explore();
        }

        let k = self.rng.random_range(0..num_objectives);
        let best = self
            .observations
            .iter()
            .filter(|(_, objectives)| objectives.get(k).is_some_and(|v| !v.is_nan()))
            .min_by(|a, b| a.1[k].total_cmp(&b.1[k]));

        let base = match best {
            Some((params, _)) => params.clone(),
            None => return self.explore(),
        };

        let mut perturbed = ParameterSet::new();
        for (name, dist) in self.space.iter() {
            let value = match base.get(name) {
                Some(&v) if dist.contains(v) => {
                    let (low, high) = dist.internal_bounds();
                    let noise = self.rng.random_range(-0.1..0.1) * (high - low);
                    dist.to_external((dist.to_internal(v) + noise).clamp(low, high))
                }
                // Missing or out-of-domain base value: draw fresh.
                _ => dist.sample(&mut self.rng),
            };
            perturbed.insert(name.clone(), value);
        }
        perturbed
    }
}

impl SearchStrategy for BayesianSearch {
    fn suggest(&mut self, count: usize) -> Vec<ParameterSet> {
        (0..count)
            .map(|_| {
                if self.observations.is_empty()
                    || self.rng.random::<f64>() < self.exploration_weight
                {
                    self.explore()
                } else {
                    self.exploit()
                }
            })
            .collect()
    }

    fn report(&mut self, params: &ParameterSet, objectives: &[f64]) {
        self.observations.push((params.clone(), objectives.to_vec()));
    }

    fn name(&self) -> &str {
        "bayesian"
    }
}
