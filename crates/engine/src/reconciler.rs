use core_types::{ExchangePosition, Ticker};
use executor::{LegBook, Observation, PositionSource};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};

/// A leg the controller tracks but the exchange no longer reports open.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalClose {
    pub symbol: String,
    /// Best known price at the time the disappearance was noticed.
    pub exit_price: Decimal,
}

/// The outcome of aligning the local leg book with one tick's observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Mark price per tracked leg that could be priced this tick.
    pub marks: BTreeMap<String, Decimal>,
    /// Legs whose entry, quantity or margin were replaced by the exchange's figures.
    pub resynced: Vec<String>,
    pub external_closes: Vec<ExternalClose>,
    /// Exchange shorts the run does not track. They are reported, never adopted.
    pub untracked: Vec<String>,
    /// Tracked legs with no usable price this tick.
    pub unpriced: Vec<String>,
}

/// Reference prices keyed by symbol, skipping non-positive ones.
pub fn price_map(tickers: &[Ticker]) -> HashMap<String, Decimal> {
    tickers
        .iter()
        .map(|t| (t.symbol.clone(), t.reference_price()))
        .filter(|(_, price)| *price > Decimal::ZERO)
        .collect()
}

/// The "Source of Truth Auditor".
///
/// In paper mode the book is the only position state and every leg is marked from the
/// ticker snapshot. In live mode the exchange's open shorts are authoritative: each
/// tracked leg takes the exchange's entry, quantity and margin, and a tracked leg the
/// exchange no longer reports is treated as closed externally. The book is only synced
/// here; closing is left to the caller so it can persist the exit.
pub fn reconcile(
    book: &mut LegBook,
    observation: &Observation,
    prices: &HashMap<String, Decimal>,
) -> Reconciliation {
    let mut out = Reconciliation::default();

    match &observation.positions {
        PositionSource::Simulated => {
            for leg in book.legs() {
                match prices.get(&leg.symbol) {
                    Some(price) => {
                        out.marks.insert(leg.symbol.clone(), *price);
                    }
                    None => out.unpriced.push(leg.symbol.clone()),
                }
            }
        }
        PositionSource::Exchange(positions) => {
            let by_symbol: HashMap<&str, &ExchangePosition> =
                positions.iter().map(|p| (p.symbol.as_str(), p)).collect();

            for symbol in book.symbols() {
                let Some(position) = by_symbol.get(symbol.as_str()) else {
                    let exit_price = prices
                        .get(&symbol)
                        .copied()
                        .or_else(|| book.get(&symbol).map(|leg| leg.entry_price))
                        .unwrap_or(Decimal::ZERO);
                    out.external_closes.push(ExternalClose { symbol, exit_price });
                    continue;
                };

                let differs = book.get(&symbol).is_some_and(|leg| {
                    position.entry_price.is_some_and(|entry| entry != leg.entry_price)
                        || leg.qty != position.qty
                        || (position.margin > Decimal::ZERO && leg.margin_usdt != position.margin)
                });
                if differs && book.sync_with_exchange(position).is_ok() {
                    out.resynced.push(symbol.clone());
                }

                let mark = position.mark_price.or_else(|| prices.get(&symbol).copied());
                match mark {
                    Some(price) => {
                        out.marks.insert(symbol, price);
                    }
                    None => out.unpriced.push(symbol),
                }
            }

            let mut untracked: Vec<String> = positions
                .iter()
                .filter(|p| !book.contains(&p.symbol))
                .map(|p| p.symbol.clone())
                .collect();
            untracked.sort();
            untracked.dedup();
            out.untracked = untracked;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use executor::TrackedLeg;
    use rust_decimal_macros::dec;

    fn book() -> LegBook {
        let mut book = LegBook::new();
        for symbol in ["AUSDT", "BUSDT"] {
            book.open(TrackedLeg::new(symbol, dec!(10), Utc::now(), dec!(30), dec!(100), dec!(3)))
                .unwrap();
        }
        book
    }

    fn position(symbol: &str, qty: Decimal, mark: Decimal) -> ExchangePosition {
        ExchangePosition {
            symbol: symbol.into(),
            entry_price: Some(dec!(10)),
            qty,
            margin: dec!(100),
            leverage: dec!(3),
            mark_price: Some(mark),
            unrealized_pnl: Decimal::ZERO,
        }
    }

    #[test]
    fn paper_marks_from_tickers() {
        let mut book = book();
        let prices = HashMap::from([("AUSDT".to_string(), dec!(9))]);
        let observation = Observation { positions: PositionSource::Simulated, account_equity: None };

        let out = reconcile(&mut book, &observation, &prices);
        assert_eq!(out.marks.get("AUSDT"), Some(&dec!(9)));
        assert_eq!(out.unpriced, vec!["BUSDT".to_string()]);
        assert!(out.external_closes.is_empty());
    }

    #[test]
    fn exchange_is_authoritative_in_live_mode() {
        let mut book = book();
        let prices = HashMap::from([("BUSDT".to_string(), dec!(8))]);
        let observation = Observation {
            positions: PositionSource::Exchange(vec![
                position("AUSDT", dec!(20), dec!(9.5)),
                position("ZUSDT", dec!(5), dec!(1)),
            ]),
            account_equity: Some(dec!(990)),
        };

        let out = reconcile(&mut book, &observation, &prices);

        assert_eq!(out.resynced, vec!["AUSDT".to_string()]);
        assert_eq!(book.get("AUSDT").unwrap().qty, dec!(20));
        assert_eq!(out.marks.get("AUSDT"), Some(&dec!(9.5)));
        assert_eq!(
            out.external_closes,
            vec![ExternalClose { symbol: "BUSDT".into(), exit_price: dec!(8) }]
        );
        assert_eq!(out.untracked, vec!["ZUSDT".to_string()]);
    }

    #[test]
    fn unreadable_exchange_prices_keep_the_leg_open() {
        let mut book = book();
        let mut unpriced = position("AUSDT", dec!(30), dec!(1));
        unpriced.entry_price = None;
        unpriced.mark_price = None;
        let mut ticker_marked = position("BUSDT", dec!(30), dec!(1));
        ticker_marked.mark_price = None;
        let observation = Observation {
            positions: PositionSource::Exchange(vec![unpriced, ticker_marked]),
            account_equity: None,
        };
        let prices = HashMap::from([("BUSDT".to_string(), dec!(9))]);

        let out = reconcile(&mut book, &observation, &prices);
        assert!(out.external_closes.is_empty());
        assert!(out.resynced.is_empty());
        assert_eq!(out.unpriced, vec!["AUSDT".to_string()]);
        assert_eq!(out.marks.get("BUSDT"), Some(&dec!(9)));
        assert_eq!(book.get("AUSDT").unwrap().entry_price, dec!(10));
        assert_eq!(book.len(), 2);
    }

    #[test]
    fn external_close_without_price_uses_entry() {
        let mut book = book();
        let observation =
            Observation { positions: PositionSource::Exchange(Vec::new()), account_equity: None };
        let out = reconcile(&mut book, &observation, &HashMap::new());
        assert_eq!(out.external_closes.len(), 2);
        assert!(out.external_closes.iter().all(|c| c.exit_price == dec!(10)));
    }
}
