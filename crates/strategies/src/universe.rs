use core_types::Ticker;
use rust_decimal::Decimal;

/// Keeps the instruments whose 24h change is strictly below `max_pump_pct`.
///
/// Names that already pumped past the threshold are never shorted.
pub fn select_universe(tickers: &[Ticker], max_pump_pct: Decimal) -> Vec<Ticker> {
    tickers
        .iter()
        .filter(|t| t.change_24h < max_pump_pct)
        .cloned()
        .collect()
}

/// Sorts by 24h change, highest first, and keeps the first `n`.
///
/// `sort_by` is stable, so ties keep their input order and the result is deterministic.
pub fn rank_top_n(mut universe: Vec<Ticker>, n: usize) -> Vec<Ticker> {
    universe.sort_by(|a, b| b.change_24h.cmp(&a.change_24h));
    universe.truncate(n);
    universe
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker(symbol: &str, change: Decimal) -> Ticker {
        Ticker { symbol: symbol.into(), last_price: dec!(10), mark_price: None, change_24h: change }
    }

    #[test]
    fn universe_excludes_pumped_names_at_the_threshold() {
        let tickers = vec![
            ticker("A", dec!(0.20)),
            ticker("B", dec!(0.18)),
            ticker("C", dec!(0.10)),
            ticker("D", dec!(0.15)),
            ticker("E", dec!(-0.05)),
        ];
        let universe = select_universe(&tickers, dec!(0.15));
        let symbols: Vec<&str> = universe.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["C", "E"]);
        assert!(universe.iter().all(|t| t.change_24h < dec!(0.15)));
    }

    #[test]
    fn ranking_is_descending_and_stable_under_ties() {
        let universe = vec![
            ticker("X", dec!(0.05)),
            ticker("Y", dec!(0.10)),
            ticker("Z", dec!(0.05)),
            ticker("W", dec!(0.01)),
        ];
        let ranked = rank_top_n(universe.clone(), 3);
        let symbols: Vec<&str> = ranked.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["Y", "X", "Z"]);
        assert_eq!(rank_top_n(universe.clone(), 3), ranked);
        assert!(ranked.iter().all(|t| universe.contains(t)));
    }

    #[test]
    fn ranking_more_than_available_returns_everything() {
        let ranked = rank_top_n(vec![ticker("A", dec!(0.01))], 10);
        assert_eq!(ranked.len(), 1);
        assert!(rank_top_n(Vec::new(), 10).is_empty());
    }
}
