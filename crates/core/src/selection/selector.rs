use crate::domain::instrument::Instrument;
use crate::selection::candidates::{cmp_desc, rank_order, whole_shares, RankedCandidate, TrendSignal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DEFAULT_TARGET_COUNT: usize = 10;

/// Below this many entries a second pass tops the portfolio up with leftover budget.
const MIN_ENTRIES: usize = 8;
const MAX_ENTRIES: usize = 12;
const TOP_UP_LIMIT: usize = 10;

const BASE_SHARE: f64 = 0.6;
const PERFORMANCE_SHARE: f64 = 0.4;

const NEW_SECTOR_BONUS: f64 = 0.8;
const NEW_COUNTRY_BONUS: f64 = 0.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub instrument: Instrument,
    pub final_score: f64,
    pub trend: TrendSignal,
    pub profitability_score: f64,
    pub diversity_bonus: f64,
    /// `final_score + diversity_bonus`; the output is ordered by this.
    pub ranking_score: f64,
    /// Budget set aside for this entry.
    pub allocated_amount: f64,
    pub shares: u64,
    /// `shares * price`, never above `allocated_amount`.
    pub invested_amount: f64,
}

#[derive(Debug, Default)]
struct DiversityTracker {
    sectors: BTreeSet<String>,
    countries: BTreeSet<String>,
}

impl DiversityTracker {
    fn bonus(&self, instrument: &Instrument) -> f64 {
        let mut bonus = 0.0;
        if !self.sectors.contains(&instrument.sector) {
            bonus += NEW_SECTOR_BONUS;
        }
        if !self.countries.contains(&instrument.country) {
            bonus += NEW_COUNTRY_BONUS;
        }
        bonus
    }

    fn record(&mut self, instrument: &Instrument) {
        self.sectors.insert(instrument.sector.clone());
        self.countries.insert(instrument.country.clone());
    }
}

/// Greedily spread `budget` over the ranked candidates.
///
/// Candidates with a negative trend or profitability score are never selected,
/// and each ticker is taken at most once. Returns an empty
/// list when nothing is affordable; callers should present that as
/// "no affordable instruments" rather than as a failure.
pub fn select_portfolio(
    candidates: &[RankedCandidate],
    budget: f64,
    target_count: usize,
) -> Vec<PortfolioEntry> {
    if !budget.is_finite() || budget <= 0.0 {
        return Vec::new();
    }
    let target_count = target_count.max(1);

    let mut pool: Vec<&RankedCandidate> = candidates.iter().filter(|c| c.is_eligible()).collect();
    pool.sort_by(|a, b| rank_order(a, b));

    // One entry per ticker; the best-ranked duplicate wins.
    let mut tickers = BTreeSet::new();
    let eligible = pool.len();
    pool.retain(|c| tickers.insert(c.instrument.ticker.clone()));
    if pool.len() < eligible {
        tracing::warn!(
            dropped = eligible - pool.len(),
            "duplicate tickers in selection input"
        );
    }

    let per_slot = budget / target_count as f64;
    let min_allocation = budget / (target_count as f64 * 3.0);
    let max_profitability = pool
        .iter()
        .map(|c| c.profitability_score)
        .fold(0.0, f64::max);

    let mut diversity = DiversityTracker::default();
    let mut selected: Vec<PortfolioEntry> = Vec::new();
    let mut taken = vec![false; pool.len()];
    let mut remaining = budget;

    for (idx, candidate) in pool.iter().enumerate() {
        if idx >= target_count * 2 {
            break;
        }

        let performance = if max_profitability > 0.0 {
            candidate.profitability_score / max_profitability
        } else {
            0.0
        };
        let allocation = (per_slot * BASE_SHARE + per_slot * PERFORMANCE_SHARE * performance)
            .max(min_allocation)
            .min(remaining);

        let shares = whole_shares(allocation, candidate.instrument.price);
        if shares == 0 {
            continue;
        }

        let entry = make_entry(candidate, diversity.bonus(&candidate.instrument), allocation, shares);
        diversity.record(&candidate.instrument);
        remaining -= entry.invested_amount;
        selected.push(entry);
        taken[idx] = true;

        if remaining < min_allocation {
            break;
        }
    }

    if selected.len() < MIN_ENTRIES && remaining > 0.0 {
        let first_pass = selected.len();
        for (candidate, _) in pool.iter().zip(&taken).filter(|(_, taken)| !**taken) {
            if selected.len() >= TOP_UP_LIMIT || remaining <= 0.0 {
                break;
            }

            let shares = whole_shares(remaining, candidate.instrument.price);
            if shares == 0 {
                continue;
            }

            let entry = make_entry(candidate, diversity.bonus(&candidate.instrument), remaining, shares);
            diversity.record(&candidate.instrument);
            remaining -= entry.invested_amount;
            selected.push(entry);
        }
        tracing::debug!(
            first_pass,
            topped_up = selected.len() - first_pass,
            remaining,
            "portfolio top-up pass finished"
        );
    }

    selected.sort_by(|a, b| {
        cmp_desc(a.ranking_score, b.ranking_score)
            .then_with(|| cmp_desc(a.trend.sort_key(), b.trend.sort_key()))
            .then_with(|| a.instrument.ticker.cmp(&b.instrument.ticker))
    });
    selected.truncate(MAX_ENTRIES);
    selected
}

fn make_entry(
    candidate: &RankedCandidate,
    diversity_bonus: f64,
    allocated_amount: f64,
    shares: u64,
) -> PortfolioEntry {
    PortfolioEntry {
        instrument: candidate.instrument.clone(),
        final_score: candidate.final_score,
        trend: candidate.trend,
        profitability_score: candidate.profitability_score,
        diversity_bonus,
        ranking_score: candidate.final_score + diversity_bonus,
        allocated_amount,
        shares,
        invested_amount: shares as f64 * candidate.instrument.price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::composite::score_candidates;
    use crate::scoring::composite::tests::instrument;
    use crate::selection::candidates::rank_candidates;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    const SECTORS: [&str; 5] = ["반도체", "금융", "자동차", "바이오", "통신"];

    fn ranked(specs: &[(&str, &str, &str, f64, Option<f64>)]) -> Vec<RankedCandidate> {
        let batch: Vec<_> = specs
            .iter()
            .map(|(t, sector, country, price, _)| instrument(t, sector, country, *price))
            .collect();
        let trends: BTreeMap<_, _> = specs
            .iter()
            .filter_map(|(t, _, _, _, pct)| {
                pct.map(|p| (t.to_string(), TrendSignal::Estimated { percent_change: p }))
            })
            .collect();
        rank_candidates(score_candidates(&batch, 50.0).1, &trends)
    }

    #[test]
    fn diversified_scenario_selects_between_eight_and_twelve() {
        let tickers: Vec<String> = (0..30).map(|i| format!("T{i:02}")).collect();
        let specs: Vec<_> = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| {
                (
                    t.as_str(),
                    SECTORS[i % 5],
                    if i % 2 == 0 { "한국" } else { "미국" },
                    50_000.0 + 15_000.0 * i as f64,
                    Some(16.0),
                )
            })
            .collect();

        let budget = 10_000_000.0;
        let entries = select_portfolio(&ranked(&specs), budget, 10);

        assert!((8..=12).contains(&entries.len()), "got {}", entries.len());
        let sectors: BTreeSet<_> = entries.iter().map(|e| e.instrument.sector.as_str()).collect();
        assert_eq!(sectors.len(), 5);

        let total: f64 = entries.iter().map(|e| e.invested_amount).sum();
        assert!(total <= budget);
        for e in &entries {
            assert!(e.shares >= 1);
            assert!(e.invested_amount <= e.allocated_amount);
        }
    }

    #[test]
    fn diversity_bonus_rewards_new_sector_and_country() {
        let specs = [
            ("A", "반도체", "한국", 10_000.0, Some(16.0)),
            ("B", "반도체", "한국", 10_000.0, Some(15.5)),
            ("C", "반도체", "미국", 10_000.0, Some(15.2)),
            ("D", "금융", "한국", 10_000.0, Some(15.1)),
        ];
        let entries = select_portfolio(&ranked(&specs), 1_000_000.0, 4);
        let bonus: BTreeMap<_, _> = entries
            .iter()
            .map(|e| (e.instrument.ticker.as_str(), e.diversity_bonus))
            .collect();
        assert_eq!(bonus["A"], 1.3);
        assert_eq!(bonus["B"], 0.0);
        assert_eq!(bonus["C"], 0.5);
        assert_eq!(bonus["D"], 0.8);
        assert_eq!(entries[0].instrument.ticker, "A");
        assert_eq!(entries[3].instrument.ticker, "B");
    }

    #[test]
    fn candidate_priced_above_budget_yields_empty_result() {
        let specs = [("DEAR", "바이오", "한국", 2_000_000.0, Some(12.0))];
        assert!(select_portfolio(&ranked(&specs), 1_000_000.0, 10).is_empty());
    }

    #[test]
    fn falling_candidates_are_never_selected() {
        let specs = [
            ("UP", "금융", "한국", 10_000.0, Some(4.0)),
            ("DOWN", "통신", "미국", 10_000.0, Some(-2.0)),
            ("FLAT", "자동차", "한국", 10_000.0, Some(0.0)),
        ];
        let entries = select_portfolio(&ranked(&specs), 1_000_000.0, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].instrument.ticker, "UP");
    }

    #[test]
    fn top_up_pass_spends_leftover_budget() {
        // The first 20 candidates cost more than one 100k slot and are skipped,
        // exhausting the first pass. The top-up pass then buys with the full remainder.
        let tickers: Vec<String> = (0..22).map(|i| format!("T{i:02}")).collect();
        let specs: Vec<_> = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let price = if i < 20 { 150_000.0 } else { 40_000.0 };
                (t.as_str(), SECTORS[i % 5], "한국", price, Some(16.0))
            })
            .collect();

        let entries = select_portfolio(&ranked(&specs), 1_000_000.0, 10);
        assert_eq!(entries.len(), 2);

        let by_ticker: BTreeMap<_, _> = entries
            .iter()
            .map(|e| (e.instrument.ticker.as_str(), e))
            .collect();
        assert_eq!(by_ticker["T00"].shares, 6);
        assert_eq!(by_ticker["T00"].allocated_amount, 1_000_000.0);
        assert_eq!(by_ticker["T20"].shares, 2);
        assert_eq!(by_ticker["T20"].allocated_amount, 100_000.0);
        // Both are bought in the top-up pass; T20 repeats T00's sector and country.
        assert_eq!(by_ticker["T00"].diversity_bonus, 1.3);
        assert_eq!(by_ticker["T20"].diversity_bonus, 0.0);
    }

    /// One candidate with identical metrics; every field derived from the trend is
    /// consistent unless a test overrides it.
    fn candidate(ticker: &str, sector: &str, country: &str, price: f64, pct: f64) -> RankedCandidate {
        let batch = [instrument(ticker, sector, country, price)];
        let scored = score_candidates(&batch, 50.0).1.remove(0);
        RankedCandidate::from_scored(scored, TrendSignal::Estimated { percent_change: pct })
    }

    #[test]
    fn inconsistent_negative_profitability_is_not_selected() {
        let mut neg = candidate("NEG", "금융", "한국", 10_000.0, 5.0);
        neg.trend_score = 1.0;
        neg.profitability_score = -10.0;
        let ok = candidate("OK", "통신", "한국", 10_000.0, 5.0);

        let entries = select_portfolio(&[neg, ok], 1_000_000.0, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].instrument.ticker, "OK");
        assert!(entries.iter().all(|e| e.profitability_score >= 0.0));
    }

    #[test]
    fn duplicate_tickers_are_selected_once() {
        let dup = candidate("DUP", "금융", "한국", 10_000.0, 5.0);
        let entries = select_portfolio(&[dup.clone(), dup], 1_000_000.0, 10);

        let tickers: Vec<_> = entries.iter().map(|e| e.instrument.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["DUP"]);
        assert_eq!(entries[0].diversity_bonus, 1.3);
    }

    #[test]
    fn equal_ranking_scores_order_by_trend_then_ticker() {
        // A and B tie on final score and both earn the full bonus, so only the
        // trend separates them. The ticker order alone would put A first.
        let mut a = candidate("A", "금융", "한국", 10_000.0, 5.0);
        let mut b = candidate("B", "통신", "미국", 10_000.0, 9.0);
        a.final_score = 3.0;
        b.final_score = 3.0;

        let entries = select_portfolio(&[a, b], 1_000_000.0, 10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ranking_score, entries[1].ranking_score);
        let tickers: Vec<_> = entries.iter().map(|e| e.instrument.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["B", "A"]);
    }

    #[test]
    fn top_up_bonus_counts_first_pass_selections() {
        // Target 1 caps the first pass at two candidates: A is bought, B is too
        // dear for what is left. C is only reached by the top-up pass, where its
        // sector is already held and only its country is new.
        let a = candidate("A", "반도체", "한국", 60_000.0, 16.0);
        let b = candidate("B", "금융", "한국", 50_000.0, 16.0);
        let c = candidate("C", "반도체", "미국", 20_000.0, 16.0);

        let entries = select_portfolio(&[a, b, c], 100_000.0, 1);
        let tickers: Vec<_> = entries.iter().map(|e| e.instrument.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["A", "C"]);

        assert_eq!(entries[0].diversity_bonus, 1.3);
        assert_eq!(entries[0].shares, 1);
        assert_eq!(entries[1].diversity_bonus, 0.5);
        assert_eq!(entries[1].allocated_amount, 40_000.0);
        assert_eq!(entries[1].shares, 2);
    }

    #[test]
    fn non_positive_budget_selects_nothing() {
        let specs = [("A", "금융", "한국", 10_000.0, Some(4.0))];
        assert!(select_portfolio(&ranked(&specs), 0.0, 10).is_empty());
        assert!(select_portfolio(&ranked(&specs), f64::NAN, 10).is_empty());
    }

    proptest! {
        #[test]
        fn selection_respects_budget_and_exclusions(
            specs in prop::collection::vec(
                (1_000.0f64..600_000.0, -10.0f64..20.0, 0usize..5, any::<bool>()),
                1..40,
            ),
            budget in 10_000.0f64..20_000_000.0,
            target in 1usize..15,
        ) {
            let tickers: Vec<String> = (0..specs.len()).map(|i| format!("T{i:02}")).collect();
            let rows: Vec<_> = specs
                .iter()
                .zip(&tickers)
                .map(|((price, pct, sector, kr), t)| {
                    (t.as_str(), SECTORS[*sector], if *kr { "한국" } else { "미국" }, *price, Some(*pct))
                })
                .collect();

            let entries = select_portfolio(&ranked(&rows), budget, target);

            prop_assert!(entries.len() <= 12);
            let mut total = 0.0;
            let mut seen = BTreeSet::new();
            for e in &entries {
                prop_assert!(e.shares >= 1);
                prop_assert!(e.invested_amount <= e.allocated_amount);
                prop_assert!(e.profitability_score >= 0.0);
                prop_assert!(e.trend.percent_change().map_or(true, |p| p > 0.0));
                prop_assert!(seen.insert(e.instrument.ticker.clone()));
                total += e.invested_amount;
            }
            prop_assert!(total <= budget * (1.0 + 1e-9));
        }
    }
}
