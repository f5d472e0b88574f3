//! Empirical Bayes moderation of per-gene residual variances.
//!
//! The per-gene variances are modelled as samples from a scaled
//! inverse-chi-square prior. The prior's degrees of freedom and scale
//! are estimated by moment matching on the log variances
//! (digamma/trigamma identities), each gene's variance is shrunk toward
//! the prior, and moderated t-statistics are referred to a t
//! distribution with the pooled degrees of freedom.

use crate::error::{Result, StatsError};
use crate::lm::ContrastFit;

use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::gamma::digamma;

/// Variance prior estimated from all genes.
#[derive(Debug, Clone, Copy)]
pub struct VariancePrior {
    /// prior degrees of freedom; infinite when gene variances carry no
    /// excess spread beyond the chi-square sampling noise
    pub df_prior: f64,
    /// prior variance scale
    pub var_prior: f64,
}

/// Moderated test statistics for one contrast.
#[derive(Debug, Clone)]
pub struct ModeratedStats {
    pub t: Vec<f64>,
    pub p_value: Vec<f64>,
    pub posterior_var: Vec<f64>,
    pub df_total: f64,
    pub prior: VariancePrior,
}

/// Estimate the variance prior by moment matching of `log(s^2)`.
pub fn fit_variance_prior(sigma2: &[f64], df: f64) -> Result<VariancePrior> {
    let usable: Vec<f64> = sigma2
        .iter()
        .copied()
        .filter(|s| s.is_finite() && *s > 0.0)
        .collect();
    if usable.is_empty() {
        return Err(StatsError::EmptyInput {
            reason: "no positive residual variances to pool".into(),
        });
    }
    if df <= 0.0 {
        return Err(StatsError::Numerical {
            operation: "variance prior".into(),
            details: "residual degrees of freedom must be positive".into(),
        });
    }

    // e_g = log(s_g^2) corrected for the chi-square sampling bias
    let offset = digamma(df / 2.0) - (df / 2.0).ln();
    let e: Vec<f64> = usable.iter().map(|s| s.ln() - offset).collect();
    let n = e.len() as f64;
    let e_mean = e.iter().sum::<f64>() / n;

    if usable.len() < 2 {
        return Ok(VariancePrior {
            df_prior: f64::INFINITY,
            var_prior: e_mean.exp(),
        });
    }

    let e_var = e.iter().map(|&x| (x - e_mean) * (x - e_mean)).sum::<f64>() / (n - 1.0);
    let excess = e_var - trigamma(df / 2.0);

    if excess > 0.0 {
        let df_prior = 2.0 * trigamma_inverse(excess);
        let var_prior = (e_mean + digamma(df_prior / 2.0) - (df_prior / 2.0).ln()).exp();
        Ok(VariancePrior {
            df_prior,
            var_prior,
        })
    } else {
        Ok(VariancePrior {
            df_prior: f64::INFINITY,
            var_prior: e_mean.exp(),
        })
    }
}

/// Shrink each gene's variance toward the prior and compute moderated
/// t-statistics and two-sided p-values for the contrast.
pub fn moderate(contrast: &ContrastFit) -> Result<ModeratedStats> {
    let prior = fit_variance_prior(&contrast.sigma2, contrast.df_residual)?;
    let df = contrast.df_residual;

    let posterior_var: Vec<f64> = contrast
        .sigma2
        .iter()
        .map(|&s2| {
            if prior.df_prior.is_finite() {
                (prior.df_prior * prior.var_prior + df * s2) / (prior.df_prior + df)
            } else {
                prior.var_prior
            }
        })
        .collect();

    let df_total = if prior.df_prior.is_finite() {
        df + prior.df_prior
    } else {
        // effectively normal; a huge df keeps the t distribution usable
        1e6
    };

    let t_dist = StudentsT::new(0.0, 1.0, df_total).map_err(|e| StatsError::Numerical {
        operation: "moderated t distribution".into(),
        details: e.to_string(),
    })?;

    let mut t = Vec::with_capacity(contrast.estimate.len());
    let mut p_value = Vec::with_capacity(contrast.estimate.len());
    for ((&est, &se_u), &pv) in contrast
        .estimate
        .iter()
        .zip(contrast.se_unscaled.iter())
        .zip(posterior_var.iter())
    {
        let se = se_u * pv.sqrt();
        let stat = if se > 0.0 {
            est / se
        } else if est == 0.0 {
            0.0
        } else {
            // a nonzero effect with no residual noise is maximal evidence
            f64::INFINITY.copysign(est)
        };
        t.push(stat);
        let p = if stat.is_infinite() {
            0.0
        } else {
            (2.0 * t_dist.sf(stat.abs())).min(1.0)
        };
        p_value.push(p);
    }

    Ok(ModeratedStats {
        t,
        p_value,
        posterior_var,
        df_total,
        prior,
    })
}

/// Trigamma function via the reflection/recurrence relations and the
/// asymptotic series for large arguments.
pub(crate) fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }

    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }

    let z2 = z * z;
    result
        + 1.0 / z
        + 0.5 / z2
        + 1.0 / (6.0 * z2 * z)
        - 1.0 / (30.0 * z2 * z2 * z)
}

/// Solve `trigamma(x) = y` for `x > 0`. Trigamma is strictly decreasing
/// on the positive axis, so a bisection over a wide bracket converges
/// deterministically.
pub(crate) fn trigamma_inverse(y: f64) -> f64 {
    debug_assert!(y > 0.0);
    let mut lo = 1e-6;
    let mut hi = 1e7;
    // expand the bracket in the unlikely case y is outside it
    while trigamma(lo) < y {
        lo /= 10.0;
    }
    while trigamma(hi) > y {
        hi *= 10.0;
    }
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if trigamma(mid) > y {
            lo = mid;
        } else {
            hi = mid;
        }
        if (hi - lo) < 1e-12 * hi {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn trigamma_known_values() {
        // trigamma(1) = pi^2 / 6
        assert_abs_diff_eq!(
            trigamma(1.0),
            std::f64::consts::PI * std::f64::consts::PI / 6.0,
            epsilon = 1e-10
        );
        // recurrence: trigamma(x+1) = trigamma(x) - 1/x^2
        assert_abs_diff_eq!(
            trigamma(3.5),
            trigamma(2.5) - 1.0 / (2.5 * 2.5),
            epsilon = 1e-10
        );
    }

    #[test]
    fn trigamma_inverse_round_trips() {
        for &x in &[0.05, 0.5, 2.0, 17.0, 400.0] {
            let y = trigamma(x);
            assert_abs_diff_eq!(trigamma_inverse(y), x, epsilon = 1e-6);
        }
    }

    #[test]
    fn constant_variances_give_infinite_prior_df() {
        let sigma2 = vec![2.0; 50];
        let prior = fit_variance_prior(&sigma2, 4.0).unwrap();
        assert!(prior.df_prior.is_infinite());
        assert!(prior.var_prior > 0.0);
    }

    #[test]
    fn spread_variances_give_finite_prior_df() {
        // variances spanning two orders of magnitude cannot be explained
        // by chi-square noise at df = 50
        let sigma2: Vec<f64> = (1..=60).map(|i| 0.1 * 1.1f64.powi(i)).collect();
        let prior = fit_variance_prior(&sigma2, 50.0).unwrap();
        assert!(prior.df_prior.is_finite());
        assert!(prior.df_prior > 0.0);
    }

    #[test]
    fn moderation_shrinks_toward_the_prior() {
        let contrast = ContrastFit {
            estimate: vec![1.0, 1.0, 1.0],
            se_unscaled: vec![1.0, 1.0, 1.0],
            sigma2: vec![0.5, 1.0, 8.0],
            df_residual: 2.0,
        };
        let stats = moderate(&contrast).unwrap();

        let plain: Vec<f64> = contrast.sigma2.clone();
        // posterior variances sit between the raw variance and the prior
        for (&post, &raw) in stats.posterior_var.iter().zip(plain.iter()) {
            let lo = raw.min(stats.prior.var_prior);
            let hi = raw.max(stats.prior.var_prior);
            assert!(post >= lo - 1e-12 && post <= hi + 1e-12);
        }
        assert!(stats.df_total > contrast.df_residual);
        assert!(stats.p_value.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn zero_standard_error_with_an_effect_is_not_null() {
        // gene 0 has an effect but no uncertainty at all; it must come
        // out as maximally significant, not p = 1
        let contrast = ContrastFit {
            estimate: vec![-2.0, 0.0, 1.0],
            se_unscaled: vec![0.0, 0.0, 1.0],
            sigma2: vec![1.0, 1.0, 1.0],
            df_residual: 4.0,
        };
        let stats = moderate(&contrast).unwrap();

        assert!(stats.t[0].is_infinite() && stats.t[0] < 0.0);
        assert_abs_diff_eq!(stats.p_value[0], 0.0);
        // no effect and no uncertainty stays null
        assert_abs_diff_eq!(stats.t[1], 0.0);
        assert_abs_diff_eq!(stats.p_value[1], 1.0);
        assert!(stats.t[2].is_finite());
    }

    #[test]
    fn big_effects_get_small_p_values() {
        let n = 20;
        let mut sigma2 = vec![1.0; n];
        sigma2[0] = 1.0;
        let mut estimate = vec![0.1; n];
        estimate[0] = 30.0;
        let contrast = ContrastFit {
            estimate,
            se_unscaled: vec![1.0; n],
            sigma2,
            df_residual: 10.0,
        };
        let stats = moderate(&contrast).unwrap();
        assert!(stats.p_value[0] < 1e-4);
        assert!(stats.p_value[5] > 0.5);
    }
}
