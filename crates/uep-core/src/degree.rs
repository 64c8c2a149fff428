//! Robust Soliton Degree Distribution
//!
//! Degree distribution used by LT-style rateless codes: an ideal soliton
//! envelope plus a probability spike whose position and mass are tuned by
//! the shape parameters `c` and `delta`.
//!
//! ```text
//! rho(d) = 1/K               d = 1
//!        = 1/(d(d-1))        2 <= d <= K
//! S      = c ln(K/delta) sqrt(K)
//! K_S    = round(K/S)
//! tau(d) = 1/(K_S d)         1 <= d <= K_S - 1
//!        = ln(S/delta)/K_S   d = K_S
//! mu(d)  = (rho(d) + tau(d)) / beta,   beta = sum_{d=1..K} rho(d) + tau(d)
//! ```
//!
//! The sampler keeps the cumulative distribution (`K + 1` entries, `cdf[0] = 0`,
//! `cdf[K] = 1` exactly) and draws degrees by binary search. CDFs for large `K`
//! are expensive to build, so [`DegreeSampler::cached`] memoizes them on disk
//! through a [`CdfCache`].
//!
//! ## Example
//!
//! ```rust
//! use rand::{rngs::StdRng, SeedableRng};
//! use uep_core::degree::DegreeSampler;
//!
//! let sampler = DegreeSampler::new(1000, 0.1, 0.5).unwrap();
//! let mut rng = StdRng::seed_from_u64(7);
//! let d = sampler.sample(&mut rng).unwrap();
//! assert!((1..=1000).contains(&d));
//! ```

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cdf_cache::CdfCache;
use crate::error::{UepError, UepResult};

/// Ideal soliton mass `rho(d)` for `K` input symbols.
pub fn soliton_pmd(k: usize, d: usize) -> f64 {
    if d == 1 {
        1.0 / k as f64
    } else if d >= 2 && d <= k {
        1.0 / (d as f64 * (d as f64 - 1.0))
    } else {
        0.0
    }
}

/// Spike width `S = c ln(K/delta) sqrt(K)`.
pub fn robust_spread(k: usize, c: f64, delta: f64) -> f64 {
    let k = k as f64;
    c * (k / delta).ln() * k.sqrt()
}

/// Spike position `round(K/S)`, the degree that receives the extra mass.
pub fn robust_spike(k: usize, c: f64, delta: f64) -> usize {
    let s = robust_spread(k, c, delta);
    let spike = (k as f64 / s).round();
    if spike.is_finite() && spike > 0.0 {
        spike as usize
    } else {
        0
    }
}

/// Robust soliton mass `mu(d)`.
///
/// Returns 0 outside `[1, K]`, and also for parameter sets that
/// [`RobustSoliton::new`] would reject.
pub fn robust_pmd(k: usize, c: f64, delta: f64, d: usize) -> f64 {
    match RobustSoliton::new(k, c, delta) {
        Ok(dist) => dist.pmd(d),
        Err(_) => 0.0,
    }
}

/// Identifies one robust soliton CDF: `(K, c, delta)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CdfKey {
    /// Number of degree positions (`Kdeg` when used by the row generator).
    pub k: usize,
    /// Robust soliton `c` parameter.
    pub c: f64,
    /// Robust soliton `delta` parameter.
    pub delta: f64,
}

impl CdfKey {
    /// Create a key.
    pub fn new(k: usize, c: f64, delta: f64) -> Self {
        Self { k, c, delta }
    }
}

impl fmt::Display for CdfKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(K={}, c={}, delta={})", self.k, self.c, self.delta)
    }
}

/// Fully evaluated robust soliton parameters for one `(K, c, delta)`.
#[derive(Debug, Clone)]
pub struct RobustSoliton {
    key: CdfKey,
    /// Spike width `S`.
    spread: f64,
    /// Spike position `K_S`.
    spike: usize,
    /// Normalizer `beta`.
    beta: f64,
}

impl RobustSoliton {
    /// Validate the parameters and compute `S`, `K_S` and `beta`.
    ///
    /// Fails with [`UepError::SpikeOutOfRange`] when `round(K/S)` is larger
    /// than `K`. A spike of 0 adds no mass and leaves the ideal soliton.
    pub fn new(k: usize, c: f64, delta: f64) -> UepResult<Self> {
        if k == 0 {
            return Err(UepError::invalid("K must be positive"));
        }
        if !(c.is_finite() && c > 0.0) {
            return Err(UepError::invalid(format!("c must be positive, got {c}")));
        }
        if !(delta.is_finite() && delta > 0.0) {
            return Err(UepError::invalid(format!(
                "delta must be positive, got {delta}"
            )));
        }

        let spread = robust_spread(k, c, delta);
        if !(spread.is_finite() && spread > 0.0) {
            return Err(UepError::invalid(format!(
                "spike width S = {spread} must be positive (K/delta must exceed 1)"
            )));
        }
        if spread < delta {
            return Err(UepError::invalid(format!(
                "S/delta = {} < 1 gives a negative spike mass",
                spread / delta
            )));
        }

        let spike = robust_spike(k, c, delta);
        if spike > k {
            return Err(UepError::SpikeOutOfRange { spike, limit: k });
        }

        let mut dist = Self {
            key: CdfKey::new(k, c, delta),
            spread,
            spike,
            beta: 1.0,
        };
        dist.beta = (1..=k).map(|d| dist.unnormalized(d)).sum();
        Ok(dist)
    }

    /// Parameters this distribution was built from.
    pub fn key(&self) -> CdfKey {
        self.key
    }

    /// Spike width `S`.
    pub fn spread(&self) -> f64 {
        self.spread
    }

    /// Spike position `K_S`.
    pub fn spike(&self) -> usize {
        self.spike
    }

    /// Normalizer `beta`.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Spike mass `tau(d)`; zero everywhere when `K_S = 0`.
    pub fn tau(&self, d: usize) -> f64 {
        let k_s = self.spike as f64;
        if self.spike == 0 || d == 0 {
            0.0
        } else if d < self.spike {
            1.0 / (k_s * d as f64)
        } else if d == self.spike {
            (self.spread / self.key.delta).ln() / k_s
        } else {
            0.0
        }
    }

    fn unnormalized(&self, d: usize) -> f64 {
        soliton_pmd(self.key.k, d) + self.tau(d)
    }

    /// Probability mass `mu(d)`; zero outside `[1, K]`.
    pub fn pmd(&self, d: usize) -> f64 {
        if d < 1 || d > self.key.k {
            0.0
        } else {
            self.unnormalized(d) / self.beta
        }
    }

    /// Cumulative distribution over `d = 0..=K`.
    ///
    /// `cdf[0] = 0` and the last entry is clamped to exactly 1.0 so that any
    /// draw in `[0, 1)` lands inside the table.
    pub fn cdf(&self) -> Vec<f64> {
        let k = self.key.k;
        let mut cdf = Vec::with_capacity(k + 1);
        let mut cumsum = 0.0;
        cdf.push(cumsum);
        for d in 1..=k {
            cumsum += self.pmd(d);
            cdf.push(cumsum);
        }

        if let Some(last) = cdf.last_mut() {
            *last = 1.0;
        }

        cdf
    }
}

/// Check that `cdf` is a well-formed degree CDF for `k` positions.
pub(crate) fn check_cdf(cdf: &[f64], k: usize) -> Result<(), String> {
    if cdf.len() != k + 1 {
        return Err(format!("expected {} entries, found {}", k + 1, cdf.len()));
    }
    if cdf[0] != 0.0 {
        return Err(format!("cdf[0] = {} instead of 0", cdf[0]));
    }
    if cdf[k] != 1.0 {
        return Err(format!("cdf[K] = {} instead of 1", cdf[k]));
    }
    if let Some(i) = cdf.windows(2).position(|w| !(w[1] >= w[0])) {
        return Err(format!("cdf decreases at index {}", i + 1));
    }
    Ok(())
}

/// Where a sampler's CDF came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdfOrigin {
    /// Computed in this process.
    Computed,
    /// Read back from the disk cache.
    Loaded,
}

/// Draws degrees from a robust soliton CDF.
///
/// The CDF is immutable and shared, so cloning a sampler is cheap.
#[derive(Debug, Clone)]
pub struct DegreeSampler {
    key: CdfKey,
    cdf: Arc<[f64]>,
    origin: CdfOrigin,
}

impl DegreeSampler {
    /// Build the CDF in memory, without touching any cache.
    pub fn new(k: usize, c: f64, delta: f64) -> UepResult<Self> {
        let dist = RobustSoliton::new(k, c, delta)?;
        Ok(Self {
            key: dist.key(),
            cdf: dist.cdf().into(),
            origin: CdfOrigin::Computed,
        })
    }

    /// Load the CDF from `cache`, or compute and store it if absent.
    pub fn cached(k: usize, c: f64, delta: f64, cache: &CdfCache) -> UepResult<Self> {
        // Fail on bad parameters before touching the filesystem.
        RobustSoliton::new(k, c, delta)?;
        let key = CdfKey::new(k, c, delta);
        let (cdf, origin) = cache.load_or_build(&key)?;
        Ok(Self { key, cdf, origin })
    }

    /// Parameters of the distribution.
    pub fn key(&self) -> CdfKey {
        self.key
    }

    /// Number of degree positions `K`.
    pub fn k(&self) -> usize {
        self.key.k
    }

    /// The cumulative table, `K + 1` entries.
    pub fn cdf(&self) -> &[f64] {
        &self.cdf
    }

    /// Whether the CDF was computed here or loaded from the cache.
    pub fn origin(&self) -> CdfOrigin {
        self.origin
    }

    /// Sampling probability of degree `d`, read back from the CDF.
    pub fn pmd(&self, d: usize) -> f64 {
        if d < 1 || d > self.key.k {
            0.0
        } else {
            self.cdf[d] - self.cdf[d - 1]
        }
    }

    /// Expected degree.
    pub fn mean_degree(&self) -> f64 {
        (1..=self.key.k).map(|d| d as f64 * self.pmd(d)).sum()
    }

    /// Draw one degree in `[1, K]`.
    ///
    /// Returns the smallest `d` with `cdf[d] > u` for a uniform `u` in `[0, 1)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> UepResult<usize> {
        let u: f64 = rng.gen();
        self.degree_for(u)
    }

    fn degree_for(&self, u: f64) -> UepResult<usize> {
        let d = self.cdf.partition_point(|&p| p <= u);
        if d < self.cdf.len() {
            Ok(d)
        } else {
            Err(UepError::CdfExhausted {
                draw: u,
                last: self.cdf[self.cdf.len() - 1],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_ideal_soliton_sums_to_one() {
        let sum: f64 = (1..=100).map(|d| soliton_pmd(100, d)).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-10);
        assert_relative_eq!(soliton_pmd(100, 1), 0.01);
        assert_eq!(soliton_pmd(100, 0), 0.0);
        assert_eq!(soliton_pmd(100, 101), 0.0);
    }

    #[test]
    fn test_robust_soliton_shape() {
        let dist = RobustSoliton::new(1000, 0.1, 0.5).unwrap();
        // S = 0.1 ln(2000) sqrt(1000) ~ 24.04, K/S ~ 41.6
        assert_relative_eq!(dist.spread(), 24.036, epsilon = 1e-3);
        assert_eq!(dist.spike(), 42);

        let sum: f64 = (1..=1000).map(|d| dist.pmd(d)).sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-10);

        // The spike stands out from its neighbours
        assert!(dist.pmd(42) > dist.pmd(41));
        assert!(dist.pmd(42) > dist.pmd(43));
    }

    #[test]
    fn test_pmd_nonnegative_and_zero_outside() {
        for &(k, c, delta) in &[(10, 0.3, 0.5), (1000, 0.1, 0.5), (4800, 0.1, 0.5), (500, 0.05, 0.01)] {
            let dist = RobustSoliton::new(k, c, delta).unwrap();
            assert_eq!(dist.pmd(0), 0.0);
            assert_eq!(dist.pmd(k + 1), 0.0);
            assert!((1..=k).all(|d| dist.pmd(d) >= 0.0));
            assert_eq!(robust_pmd(k, c, delta, k + 5), 0.0);
        }
    }

    #[test]
    fn test_cdf_properties() {
        for &(k, c, delta) in &[(10, 0.3, 0.5), (1000, 0.1, 0.5), (4800, 0.1, 0.5), (2000, 0.03, 0.1)] {
            let cdf = RobustSoliton::new(k, c, delta).unwrap().cdf();
            assert_eq!(cdf.len(), k + 1);
            assert_eq!(cdf[0], 0.0);
            assert_eq!(cdf[k], 1.0);
            assert!(cdf.windows(2).all(|w| w[1] >= w[0]), "cdf not monotone for K={k}");
            assert!(check_cdf(&cdf, k).is_ok());
        }
    }

    #[test]
    fn test_spike_out_of_range() {
        // S = 0.05 ln(400) 2 ~ 0.6, so round(K/S) = 7 > K
        let err = RobustSoliton::new(4, 0.05, 0.01).unwrap_err();
        assert!(matches!(err, UepError::SpikeOutOfRange { spike: 7, limit: 4 }));
    }

    #[test]
    fn test_zero_spike_is_ideal_soliton() {
        // S ~ 28.4 > 2K so round(K/S) = 0
        assert_eq!(robust_spike(10, 3.0, 0.5), 0);
        let dist = RobustSoliton::new(10, 3.0, 0.5).unwrap();
        assert_eq!(dist.spike(), 0);
        assert!((0..=11).all(|d| dist.tau(d) == 0.0));
        assert_relative_eq!(dist.beta(), 1.0, epsilon = 1e-12);
        for d in 1..=10 {
            assert_relative_eq!(dist.pmd(d), soliton_pmd(10, d), epsilon = 1e-12);
        }

        let sampler = DegreeSampler::new(10, 3.0, 0.5).unwrap();
        assert!(check_cdf(sampler.cdf(), 10).is_ok());
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            assert!((1..=10).contains(&sampler.sample(&mut rng).unwrap()));
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            RobustSoliton::new(0, 0.1, 0.5),
            Err(UepError::InvalidParameter(_))
        ));
        assert!(matches!(
            RobustSoliton::new(100, -0.1, 0.5),
            Err(UepError::InvalidParameter(_))
        ));
        assert!(matches!(
            RobustSoliton::new(100, 0.1, 0.0),
            Err(UepError::InvalidParameter(_))
        ));
        assert!(matches!(
            RobustSoliton::new(100, 0.1, f64::NAN),
            Err(UepError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_check_cdf_rejects_malformed() {
        assert!(check_cdf(&[0.0, 0.5, 1.0], 2).is_ok());
        assert!(check_cdf(&[0.0, 0.5, 1.0], 3).is_err());
        assert!(check_cdf(&[0.1, 0.5, 1.0], 2).is_err());
        assert!(check_cdf(&[0.0, 0.5, 0.9], 2).is_err());
        assert!(check_cdf(&[0.0, 0.6, 0.5, 1.0], 3).is_err());
    }

    #[test]
    fn test_degree_lookup_edges() {
        let sampler = DegreeSampler::new(1000, 0.1, 0.5).unwrap();
        // u = 0 must not yield degree 0
        assert_eq!(sampler.degree_for(0.0).unwrap(), 1);
        assert_eq!(sampler.degree_for(0.999_999_999_999).unwrap(), 1000);
        assert!(matches!(
            sampler.degree_for(1.0),
            Err(UepError::CdfExhausted { .. })
        ));
    }

    #[test]
    fn test_samples_in_range() {
        let sampler = DegreeSampler::new(100, 0.1, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..10_000 {
            let d = sampler.sample(&mut rng).unwrap();
            assert!((1..=100).contains(&d));
        }
    }

    #[test]
    fn test_empirical_histogram_matches_pmd() {
        let sampler = DegreeSampler::new(1000, 0.1, 0.5).unwrap();
        let dist = RobustSoliton::new(1000, 0.1, 0.5).unwrap();
        let mut rng = StdRng::seed_from_u64(2024);

        let n = 100_000;
        let mut counts = vec![0u64; 1001];
        for _ in 0..n {
            counts[sampler.sample(&mut rng).unwrap()] += 1;
        }

        // Pearson chi-square; degrees with expected count < 5 pooled into one bin
        let mut chi2 = 0.0;
        let mut bins = 0usize;
        let mut pooled_obs = 0.0;
        let mut pooled_exp = 0.0;
        for d in 1..=1000 {
            let expected = n as f64 * dist.pmd(d);
            let observed = counts[d] as f64;
            if expected >= 5.0 {
                chi2 += (observed - expected).powi(2) / expected;
                bins += 1;
            } else {
                pooled_obs += observed;
                pooled_exp += expected;
            }
        }
        if pooled_exp > 0.0 {
            chi2 += (pooled_obs - pooled_exp).powi(2) / pooled_exp;
            bins += 1;
        }

        let df = (bins - 1) as f64;
        let limit = df + 5.0 * (2.0 * df).sqrt();
        assert!(chi2 < limit, "chi2 = {chi2:.1} over {bins} bins (limit {limit:.1})");
        assert_eq!(counts[0], 0);
    }

    #[test]
    fn test_sampler_pmd_matches_distribution() {
        let sampler = DegreeSampler::new(500, 0.1, 0.5).unwrap();
        let dist = RobustSoliton::new(500, 0.1, 0.5).unwrap();
        for d in [1, 2, 3, 10, dist.spike(), 499, 500] {
            assert_relative_eq!(sampler.pmd(d), dist.pmd(d), epsilon = 1e-12);
        }
        assert_eq!(sampler.pmd(0), 0.0);
        assert_eq!(sampler.pmd(501), 0.0);
        assert_eq!(sampler.origin(), CdfOrigin::Computed);
        assert!(sampler.mean_degree() > 1.0);
    }
}
