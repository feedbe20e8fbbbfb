//! Parameter distributions and their internal (uniform) representation.
//!
//! Search strategies work on bounded intervals. Normal and truncated-normal
//! priors are exposed to them through a probability transform: the internal
//! coordinate is the CDF value of the external parameter, confined to
//! `[EPSILON, 1 - EPSILON]`, and the quantile function maps it back.

use rand::Rng;
use serde::{Deserialize, Serialize};

use sc_types::{ConfigError, ScResult};

/// Margin keeping internal coordinates away from 0 and 1, where the
/// quantile function diverges.
pub const EPSILON: f64 = 1e-8;

/// Default lower truncation bound for truncated normals.
pub const DEFAULT_LOWER_BOUND: f64 = 1.0;

/// Default upper truncation bound for truncated normals (practically unbounded).
pub const DEFAULT_UPPER_BOUND: f64 = 1e12;

/// A continuous distribution presented to samplers as a bounded interval.
pub trait Reparameterize {
    /// Interval of valid internal coordinates.
    fn internal_bounds(&self) -> (f64, f64);

    /// Map an external value to its internal coordinate.
    fn to_internal(&self, value: f64) -> f64;

    /// Map an internal coordinate to an external value.
    fn to_external(&self, internal: f64) -> f64;

    /// Whether an external value belongs to the distribution's domain.
    fn contains(&self, value: f64) -> bool;

    /// Draw an external value: uniform in internal space, then mapped out.
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let (low, high) = self.internal_bounds();
        self.to_external(rng.random_range(low..=high))
    }
}

/// Uniform distribution over `[low, high]`; internal and external coincide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformDistribution {
    pub low: f64,
    pub high: f64,
}

impl UniformDistribution {
    pub fn new(low: f64, high: f64) -> Result<Self, String> {
        if !(low.is_finite() && high.is_finite()) {
            return Err(format!("bounds must be finite, got [{low}, {high}]"));
        }
        if low >= high {
            return Err(format!("low ({low}) must be below high ({high})"));
        }
        Ok(Self { low, high })
    }
}

impl Reparameterize for UniformDistribution {
    fn internal_bounds(&self) -> (f64, f64) {
        (self.low, self.high)
    }

    fn to_internal(&self, value: f64) -> f64 {
        value
    }

    fn to_external(&self, internal: f64) -> f64 {
        internal
    }

    fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// Normal distribution `N(mu, sigma²)` over the whole real line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalDistribution {
    pub mu: f64,
    pub sigma: f64,
}

impl NormalDistribution {
    pub fn new(mu: f64, sigma: f64) -> Result<Self, String> {
        check_location_scale(mu, sigma)?;
        Ok(Self { mu, sigma })
    }
}

impl Reparameterize for NormalDistribution {
    fn internal_bounds(&self) -> (f64, f64) {
        (EPSILON, 1.0 - EPSILON)
    }

    fn to_internal(&self, value: f64) -> f64 {
        norm_cdf((value - self.mu) / self.sigma)
    }

    fn to_external(&self, internal: f64) -> f64 {
        self.mu + self.sigma * norm_ppf(internal)
    }

    fn contains(&self, value: f64) -> bool {
        let p = self.to_internal(value);
        EPSILON <= p && p <= 1.0 - EPSILON
    }
}

/// Normal distribution restricted to `[lower_bound, upper_bound]` and
/// renormalized over that interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncatedNormalDistribution {
    pub mu: f64,
    pub sigma: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    a_std: f64,
    b_std: f64,
}

impl TruncatedNormalDistribution {
    pub fn new(mu: f64, sigma: f64, lower_bound: f64, upper_bound: f64) -> Result<Self, String> {
        check_location_scale(mu, sigma)?;
        if lower_bound.is_nan() || upper_bound.is_nan() || lower_bound >= upper_bound {
            return Err(format!(
                "lower bound ({lower_bound}) must be below upper bound ({upper_bound})"
            ));
        }

        let a_std = (lower_bound - mu) / sigma;
        let b_std = (upper_bound - mu) / sigma;
        let dist = Self {
            mu,
            sigma,
            lower_bound,
            upper_bound,
            a_std,
            b_std,
        };
        if dist.mass() <= 0.0 {
            return Err(format!(
                "[{lower_bound}, {upper_bound}] holds no probability mass for N({mu}, {sigma})"
            ));
        }
        Ok(dist)
    }

    /// Truncation with the default bounds `[1, 1e12]`.
    pub fn with_default_bounds(mu: f64, sigma: f64) -> Result<Self, String> {
        Self::new(mu, sigma, DEFAULT_LOWER_BOUND, DEFAULT_UPPER_BOUND)
    }

    /// Standardized truncation bounds.
    pub fn standardized_bounds(&self) -> (f64, f64) {
        (self.a_std, self.b_std)
    }

    /// Whether to work in the upper tail, where survival values keep precision.
    fn upper_tail(&self) -> bool {
        self.a_std > 0.0
    }

    fn mass(&self) -> f64 {
        if self.upper_tail() {
            norm_sf(self.a_std) - norm_sf(self.b_std)
        } else {
            norm_cdf(self.b_std) - norm_cdf(self.a_std)
        }
    }
}

impl Reparameterize for TruncatedNormalDistribution {
    fn internal_bounds(&self) -> (f64, f64) {
        (EPSILON, 1.0 - EPSILON)
    }

    fn to_internal(&self, value: f64) -> f64 {
        let z = ((value - self.mu) / self.sigma).clamp(self.a_std, self.b_std);
        let p = if self.upper_tail() {
            (norm_sf(self.a_std) - norm_sf(z)) / self.mass()
        } else {
            (norm_cdf(z) - norm_cdf(self.a_std)) / self.mass()
        };
        p.clamp(EPSILON, 1.0 - EPSILON)
    }

    fn to_external(&self, internal: f64) -> f64 {
        let z = if self.upper_tail() {
            -norm_ppf(norm_sf(self.a_std) - internal * self.mass())
        } else {
            norm_ppf(norm_cdf(self.a_std) + internal * self.mass())
        };
        (self.mu + self.sigma * z).clamp(self.lower_bound, self.upper_bound)
    }

    fn contains(&self, value: f64) -> bool {
        self.lower_bound <= value && value <= self.upper_bound
    }
}

fn check_location_scale(mu: f64, sigma: f64) -> Result<(), String> {
    if !mu.is_finite() {
        return Err(format!("mu must be finite, got {mu}"));
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(format!("sigma must be positive and finite, got {sigma}"));
    }
    Ok(())
}

/// Supported distribution kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionKind {
    Uniform,
    Normal,
    TruncatedNormal,
}

impl DistributionKind {
    /// Case-insensitive lookup of a config kind name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "uniform" => Some(Self::Uniform),
            "norm" => Some(Self::Normal),
            "truncnorm" => Some(Self::TruncatedNormal),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Uniform => "uniform",
            Self::Normal => "norm",
            Self::TruncatedNormal => "truncnorm",
        }
    }

    /// Accepted number of positional shape parameters.
    fn arity(&self) -> std::ops::RangeInclusive<usize> {
        match self {
            Self::Uniform | Self::Normal => 2..=2,
            Self::TruncatedNormal => 2..=4,
        }
    }
}

/// A parsed distribution: kind plus its shape parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionSpec {
    pub kind: DistributionKind,
    pub shape_params: Vec<f64>,
}

impl DistributionSpec {
    /// Validate the shape parameters and build the concrete distribution.
    ///
    /// `parameter` only labels errors.
    pub fn build(&self, parameter: &str) -> ScResult<Distribution> {
        let invalid = |message: String| ConfigError::InvalidShape {
            parameter: parameter.to_string(),
            kind: self.kind.name().to_string(),
            message,
        };

        let arity = self.kind.arity();
        if !arity.contains(&self.shape_params.len()) {
            return Err(invalid(format!(
                "expected {} to {} shape parameters, got {}",
                arity.start(),
                arity.end(),
                self.shape_params.len()
            ))
            .into());
        }

        let p = &self.shape_params;
        let dist = match self.kind {
            DistributionKind::Uniform => {
                UniformDistribution::new(p[0], p[1]).map(Distribution::Uniform)
            }
            DistributionKind::Normal => {
                NormalDistribution::new(p[0], p[1]).map(Distribution::Normal)
            }
            DistributionKind::TruncatedNormal => TruncatedNormalDistribution::new(
                p[0],
                p[1],
                p.get(2).copied().unwrap_or(DEFAULT_LOWER_BOUND),
                p.get(3).copied().unwrap_or(DEFAULT_UPPER_BOUND),
            )
            .map(Distribution::TruncatedNormal),
        };
        dist.map_err(|message| invalid(message).into())
    }
}

/// Closed set of distributions a search space can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    Uniform(UniformDistribution),
    Normal(NormalDistribution),
    TruncatedNormal(TruncatedNormalDistribution),
}

impl Distribution {
    pub fn kind(&self) -> DistributionKind {
        match self {
            Self::Uniform(_) => DistributionKind::Uniform,
            Self::Normal(_) => DistributionKind::Normal,
            Self::TruncatedNormal(_) => DistributionKind::TruncatedNormal,
        }
    }
}

impl Reparameterize for Distribution {
    fn internal_bounds(&self) -> (f64, f64) {
        match self {
            Self::Uniform(d) => d.internal_bounds(),
            Self::Normal(d) => d.internal_bounds(),
            Self::TruncatedNormal(d) => d.internal_bounds(),
        }
    }

    fn to_internal(&self, value: f64) -> f64 {
        match self {
            Self::Uniform(d) => d.to_internal(value),
            Self::Normal(d) => d.to_internal(value),
            Self::TruncatedNormal(d) => d.to_internal(value),
        }
    }

    fn to_external(&self, internal: f64) -> f64 {
        match self {
            Self::Uniform(d) => d.to_external(internal),
            Self::Normal(d) => d.to_external(internal),
            Self::TruncatedNormal(d) => d.to_external(internal),
        }
    }

    fn contains(&self, value: f64) -> bool {
        match self {
            Self::Uniform(d) => d.contains(value),
            Self::Normal(d) => d.contains(value),
            Self::TruncatedNormal(d) => d.contains(value),
        }
    }
}

// ---- Standard normal helpers ----

const SQRT_2: f64 = std::f64::consts::SQRT_2;
const SQRT_2PI: f64 = 2.506_628_274_631_000_5;

/// Complementary error function, Chebyshev fit with fractional error below
/// 1.2e-7 everywhere, including the tails.
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * (-z * z + poly).exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal cumulative distribution function.
fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal survival function, `1 - cdf(x)` without cancellation.
fn norm_sf(x: f64) -> f64 {
    0.5 * erfc(x / SQRT_2)
}

/// Standard normal quantile function.
///
/// Acklam's rational approximation, refined with Halley steps against
/// [`norm_cdf`] so that `norm_cdf(norm_ppf(p))` reproduces `p`.
fn norm_ppf(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }

    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_690e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };

    let mut x = if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    };

    for _ in 0..2 {
        let e = norm_cdf(x) - p;
        let u = e * SQRT_2PI * (0.5 * x * x).exp();
        x -= u / (1.0 + 0.5 * x * u);
    }
    x
}
