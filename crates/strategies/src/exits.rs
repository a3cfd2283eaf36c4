use core_types::{ExitDecision, ExitReason, StrategyTag};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Return on margin a leg must reach once before its trailing stop arms.
pub const LEG_TRAIL_ARM_PCT: Decimal = dec!(1.0);
/// Retracement from the leg's high-water mark that closes it.
pub const LEG_TRAIL_RETRACE_PCT: Decimal = dec!(0.05);
/// Symmetric portfolio take-profit / stop-loss band against total margin.
pub const PORTFOLIO_BAND_PCT: Decimal = dec!(0.30);

/// Per-leg trailing stop, only for strategies that use it.
pub fn evaluate_leg_exit(
    leg_pnl_pct: Decimal,
    max_leg_pnl_pct_ever: Decimal,
    strategy_tag: &StrategyTag,
) -> ExitDecision {
    if strategy_tag.uses_leg_trailing_stop()
        && max_leg_pnl_pct_ever >= LEG_TRAIL_ARM_PCT
        && leg_pnl_pct <= max_leg_pnl_pct_ever - LEG_TRAIL_RETRACE_PCT
    {
        return ExitDecision::Exit(ExitReason::LegTrailingSl);
    }
    ExitDecision::Hold
}

/// Portfolio rules, first match wins: kill switch, hold limit, then the flat band.
pub fn evaluate_portfolio_exit(
    portfolio_pnl_pct: Decimal,
    hours_elapsed: Decimal,
    strategy_tag: &StrategyTag,
    kill_dd_pct: Decimal,
    hold_hours: Decimal,
) -> ExitDecision {
    if !strategy_tag.kill_switch_exempt() && portfolio_pnl_pct <= -kill_dd_pct {
        return ExitDecision::Exit(ExitReason::KillSwitch);
    }
    if hours_elapsed >= hold_hours {
        return ExitDecision::Exit(ExitReason::HoldLimit);
    }
    if strategy_tag.uses_flat_band() {
        if portfolio_pnl_pct >= PORTFOLIO_BAND_PCT {
            return ExitDecision::Exit(ExitReason::PortfolioTp);
        }
        if portfolio_pnl_pct <= -PORTFOLIO_BAND_PCT {
            return ExitDecision::Exit(ExitReason::PortfolioSl);
        }
    }
    ExitDecision::Hold
}

#[cfg(test)]
mod tests {
    use super::*;

    const KILL: Decimal = dec!(0.30);
    const HOLD: Decimal = dec!(24);

    #[test]
    fn trailing_stop_fires_on_retrace_from_high_water() {
        let d = evaluate_leg_exit(dec!(1.10), dec!(1.20), &StrategyTag::S3);
        assert_eq!(d, ExitDecision::Exit(ExitReason::LegTrailingSl));
        // Exactly at the boundary.
        assert!(evaluate_leg_exit(dec!(1.15), dec!(1.20), &StrategyTag::S3).is_exit());
        assert!(!evaluate_leg_exit(dec!(1.16), dec!(1.20), &StrategyTag::S3).is_exit());
    }

    #[test]
    fn trailing_stop_never_fires_before_arming() {
        for max in [dec!(0), dec!(0.5), dec!(0.99)] {
            assert!(!evaluate_leg_exit(dec!(-2), max, &StrategyTag::S3).is_exit());
        }
        assert!(evaluate_leg_exit(dec!(0.95), dec!(1.0), &StrategyTag::S3).is_exit());
    }

    #[test]
    fn strategies_without_trailing_stop_never_exit_a_leg() {
        for tag in [StrategyTag::S1, StrategyTag::S2, StrategyTag::Other("x".into())] {
            assert_eq!(evaluate_leg_exit(dec!(0), dec!(5), &tag), ExitDecision::Hold);
        }
    }

    #[test]
    fn kill_switch_takes_precedence_over_hold_limit() {
        let d = evaluate_portfolio_exit(-KILL, dec!(30), &StrategyTag::S1, KILL, HOLD);
        assert_eq!(d, ExitDecision::Exit(ExitReason::KillSwitch));
    }

    #[test]
    fn exempt_strategy_falls_through_to_hold_limit() {
        let d = evaluate_portfolio_exit(dec!(-0.9), dec!(30), &StrategyTag::S2, KILL, HOLD);
        assert_eq!(d, ExitDecision::Exit(ExitReason::HoldLimit));
        let early = evaluate_portfolio_exit(dec!(-0.9), dec!(2), &StrategyTag::S2, KILL, HOLD);
        assert_eq!(early, ExitDecision::Hold);
    }

    #[test]
    fn flat_band_only_for_band_strategies() {
        let tp = evaluate_portfolio_exit(dec!(0.30), dec!(1), &StrategyTag::S1, dec!(0.5), HOLD);
        assert_eq!(tp, ExitDecision::Exit(ExitReason::PortfolioTp));
        let sl = evaluate_portfolio_exit(dec!(-0.30), dec!(1), &StrategyTag::S3, dec!(0.5), HOLD);
        assert_eq!(sl, ExitDecision::Exit(ExitReason::PortfolioSl));
        let other = evaluate_portfolio_exit(dec!(0.40), dec!(1), &StrategyTag::Other("x".into()), KILL, HOLD);
        assert_eq!(other, ExitDecision::Hold);
    }

    #[test]
    fn hold_limit_uses_configured_hours() {
        assert!(evaluate_portfolio_exit(dec!(0), dec!(12), &StrategyTag::S1, KILL, dec!(12)).is_exit());
        assert!(!evaluate_portfolio_exit(dec!(0), dec!(11.9), &StrategyTag::S1, KILL, dec!(12)).is_exit());
    }
}
