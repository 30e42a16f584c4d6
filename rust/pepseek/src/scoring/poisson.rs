//! Poisson significance model for ladder/peak matches.
//!
//! The number of random matches between a ladder of `h` ions and `v`
//! peaks, each within a half-width `tol` window over a peptide of
//! neutral mass `m` daltons, is modelled as Poisson with mean
//! 2·tol·h·v/m. The p-value of a candidate is the upper tail at its
//! observed hit count.

use statrs::distribution::{
    ContinuousCDF,
    Discrete,
    DiscreteCDF,
    Normal,
    Poisson,
};

/// Probabilities below this are indistinguishable noise-wise and are
/// clamped so e-values stay ordered and finite.
const MIN_PROB: f64 = 1e-30;

/// Mean number of random matches for `ladder_ions` searched positions
/// against `peaks` retained peaks, over a peptide of `mass_da`.
pub fn poisson_mean(tol_da: f64, ladder_ions: u32, peaks: u32, mass_da: f64) -> f64 {
    if mass_da <= 0.0 {
        return 0.0;
    }
    2.0 * tol_da * f64::from(ladder_ions) * f64::from(peaks) / mass_da
}

/// Upper-tail probability of `hits` or more random matches.
pub fn pvalue(mean: f64, hits: u32) -> f64 {
    if hits == 0 {
        return 1.0;
    }
    if !(mean > 0.0) || !mean.is_finite() {
        return MIN_PROB;
    }
    let Ok(pois) = Poisson::new(mean) else {
        return 1.0;
    };
    let p = 1.0 - pois.cdf(u64::from(hits - 1));
    clamp_prob(p)
}

/// Upper-tail probability conditioned on at least one match landing
/// on a top-intensity peak.
///
/// Each Poisson term at count `i` is weighted by the chance that one
/// of `i` random matches hits a top peak, 1 − (1 − q)^i, and the
/// weighted tail is normalized by the weighted total. `q` is the
/// per-match top-peak probability.
pub fn pvalue_top_hit(mean: f64, hits: u32, top_hit_prob: f64) -> f64 {
    if hits == 0 {
        return 1.0;
    }
    if !(mean > 0.0) || !mean.is_finite() {
        return MIN_PROB;
    }
    let q = top_hit_prob.clamp(0.0, 1.0);
    if q <= 0.0 {
        return pvalue(mean, hits);
    }
    let Ok(pois) = Poisson::new(mean) else {
        return 1.0;
    };

    let mut tail = 0.0;
    let mut total = 0.0;
    let mut i = 1u64;
    loop {
        let term = pois.pmf(i) * (1.0 - (1.0 - q).powi(i as i32));
        total += term;
        if i >= u64::from(hits) {
            tail += term;
        }
        // Terms decay geometrically once past the mode.
        if (i as f64) > mean && term < total * 1e-16 {
            break;
        }
        i += 1;
        if i > u64::from(hits) + 10_000 {
            break;
        }
    }
    if total <= 0.0 {
        return MIN_PROB;
    }
    clamp_prob(tail / total)
}

/// Wilcoxon rank-sum correction. Matched peaks of a true hit carry
/// better (lower) intensity ranks than random matches; the normal
/// approximation of the rank-sum statistic turns that into a factor
/// in [0, 1] that the p-value is multiplied by.
pub fn rank_score_factor(rank_sum: u64, hits: u32, total_peaks: u32) -> f64 {
    let n = f64::from(hits);
    let big_n = f64::from(total_peaks);
    let m = big_n - n;
    if hits == 0 || m <= 0.0 {
        return 1.0;
    }
    let mean = n * (big_n + 1.0) / 2.0;
    let var = n * m * (big_n + 1.0) / 12.0;
    if var <= 0.0 {
        return 1.0;
    }
    let z = (rank_sum as f64 - mean) / var.sqrt();
    let Ok(normal) = Normal::new(0.0, 1.0) else {
        return 1.0;
    };
    clamp_prob(normal.cdf(z))
}

/// Expectation value: p-value scaled by the number of candidates that
/// were compared against this spectrum.
pub fn evalue(pvalue: f64, examined: usize, pseudocount: usize) -> f64 {
    let e = pvalue * (examined + pseudocount) as f64;
    if e.is_finite() {
        e
    } else {
        f64::MAX
    }
}

fn clamp_prob(p: f64) -> f64 {
    if !p.is_finite() {
        return 1.0;
    }
    p.clamp(MIN_PROB, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_formula() {
        // 2 * 0.8 * 10 * 50 / 400
        let mean = poisson_mean(0.8, 10, 50, 400.0);
        assert!((mean - 2.0).abs() < 1e-12);
        assert_eq!(poisson_mean(0.8, 10, 50, 0.0), 0.0);
    }

    #[test]
    fn test_pvalue_monotone_in_hits() {
        let mean = 2.0;
        let mut last = 1.0;
        for hits in 1..12 {
            let p = pvalue(mean, hits);
            assert!(p > 0.0 && p <= 1.0);
            assert!(p < last, "p-value must shrink as hits grow");
            last = p;
        }
    }

    #[test]
    fn test_pvalue_monotone_in_mean() {
        let lo = pvalue(0.5, 5);
        let hi = pvalue(3.0, 5);
        assert!(lo < hi, "denser random background raises the p-value");
    }

    #[test]
    fn test_pvalue_edge_cases() {
        assert_eq!(pvalue(2.0, 0), 1.0);
        assert_eq!(pvalue(0.0, 5), MIN_PROB);
        assert_eq!(pvalue(-1.0, 5), MIN_PROB);
        assert_eq!(pvalue(f64::NAN, 5), MIN_PROB);
        // Huge hit counts at tiny means bottom out at the clamp.
        assert_eq!(pvalue(1e-6, 100), MIN_PROB);
    }

    #[test]
    fn test_top_hit_variant_is_valid_probability() {
        for hits in 1..10 {
            let p = pvalue_top_hit(2.0, hits, 0.1);
            assert!(p > 0.0 && p <= 1.0);
        }
        // q = 0 falls back to the plain tail.
        assert_eq!(pvalue_top_hit(2.0, 4, 0.0), pvalue(2.0, 4));
    }

    #[test]
    fn test_top_hit_monotone_in_hits() {
        let mut last = 1.0 + 1e-12;
        for hits in 1..12 {
            let p = pvalue_top_hit(2.0, hits, 0.12);
            assert!(p < last);
            last = p;
        }
    }

    #[test]
    fn test_rank_factor_rewards_intense_matches() {
        // 5 matches among 100 peaks. Best possible rank sum is
        // 1+2+3+4+5 = 15, random expectation is 5 * 101 / 2 = 252.5.
        let good = rank_score_factor(15, 5, 100);
        let random = rank_score_factor(253, 5, 100);
        let bad = rank_score_factor(480, 5, 100);
        assert!(good < random);
        assert!(random < bad);
        assert!((random - 0.5).abs() < 0.05);
    }

    #[test]
    fn test_rank_factor_degenerate_inputs() {
        assert_eq!(rank_score_factor(0, 0, 100), 1.0);
        assert_eq!(rank_score_factor(15, 5, 5), 1.0);
    }

    #[test]
    fn test_evalue_scales_with_examined() {
        let p = 1e-4;
        assert!((evalue(p, 999, 1) - 0.1).abs() < 1e-12);
        assert!(evalue(p, 0, 1) > 0.0);
        assert_eq!(evalue(f64::INFINITY, 10, 1), f64::MAX);
    }
}
