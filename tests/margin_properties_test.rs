use levsim::domain::{Decimal, Side};
use levsim::engine::margin::{is_liquidated, liquidation_price, roi, unrealized_pnl};
use levsim::engine::{EngineError, PositionManager};

fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

const LEVERAGES: [u32; 7] = [1, 2, 5, 10, 25, 50, 100];
const MARGIN_PCTS: [&str; 3] = ["10", "50", "100"];
const ENTRIES: [&str; 3] = ["1", "100", "25000.5"];

#[test]
fn test_liquidation_boundary_is_inclusive_and_never_early() {
    let balance = d("1000");
    let tolerance = d("0.000001");

    for side in [Side::Long, Side::Short] {
        for leverage in LEVERAGES {
            for pct in MARGIN_PCTS {
                for entry in ENTRIES {
                    let entry = d(entry);
                    let notional = balance * d(pct).percent_to_fraction() * Decimal::from(leverage);
                    let liq = liquidation_price(entry, leverage, side, balance, notional).unwrap();

                    assert!(is_liquidated(liq, liq, side), "boundary itself liquidates");

                    let safer = match side {
                        Side::Long => liq * d("1.001") + d("0.0000001"),
                        Side::Short => liq * d("0.999"),
                    };
                    assert!(
                        !is_liquidated(safer, liq, side),
                        "{side} lev={leverage} pct={pct} entry={entry}: liquidated before boundary"
                    );

                    let worse = match side {
                        Side::Long => liq * d("0.999"),
                        Side::Short => liq * d("1.001"),
                    };
                    assert!(is_liquidated(worse, liq, side));

                    // the loss at the boundary is the whole balance, unless a long was clamped
                    if liq.is_positive() {
                        let pnl = unrealized_pnl(entry, liq, side, notional).unwrap();
                        assert!((pnl + balance).abs() < tolerance, "pnl at boundary was {pnl}");
                    }
                }
            }
        }
    }
}

#[test]
fn test_long_liquidation_price_never_negative() {
    for leverage in LEVERAGES {
        for pct in ["1", "10", "100"] {
            let balance = d("1000");
            let notional = balance * d(pct).percent_to_fraction() * Decimal::from(leverage);
            let liq = liquidation_price(d("100"), leverage, Side::Long, balance, notional).unwrap();
            assert!(!liq.is_negative());
        }
    }
}

#[test]
fn test_ten_x_long_five_percent_drop() {
    let notional = d("1000");
    let pnl = unrealized_pnl(d("100"), d("95"), Side::Long, notional).unwrap();
    assert_eq!(pnl, d("-0.05") * notional);
    assert_eq!(roi(d("100"), d("95"), Side::Long, 10).unwrap(), d("-50"));
    assert_eq!(roi(d("100"), d("95"), Side::Short, 10).unwrap(), d("50"));
}

#[test]
fn test_invalid_calculator_inputs() {
    assert!(matches!(
        roi(d("100"), d("95"), Side::Long, 0),
        Err(EngineError::InvalidParameter(_))
    ));
    assert!(matches!(
        unrealized_pnl(Decimal::ZERO, d("95"), Side::Long, d("10")),
        Err(EngineError::InvalidParameter(_))
    ));
}

#[test]
fn test_open_then_close_at_same_price_realizes_nothing() {
    for side in [Side::Long, Side::Short] {
        for leverage in LEVERAGES {
            for pct in MARGIN_PCTS {
                let mut pm = PositionManager::new(100);
                pm.open(side, leverage, d(pct), d("250.75"), d("1000")).unwrap();
                let outcome = pm.close(Decimal::HUNDRED, d("250.75"), d("1000")).unwrap();
                assert!(outcome.realized_pnl.is_zero());
                assert!(outcome.remaining.is_none());
                assert!(!pm.is_open());
            }
        }
    }
}

#[test]
fn test_scale_in_rejected_unless_in_profit() {
    for leverage in LEVERAGES {
        for (side, losing, winning) in [
            (Side::Long, ["90", "99.99", "100"], "101"),
            (Side::Short, ["110", "100.01", "100"], "99"),
        ] {
            for price in losing {
                let mut pm = PositionManager::new(100);
                pm.open(side, leverage, d("10"), d("100"), d("1000")).unwrap();
                let before = pm.clone();
                let err = pm.scale_in(side, d("10"), d(price), d("1000")).unwrap_err();
                assert!(
                    matches!(err, EngineError::NotInProfit { .. }),
                    "{side} lev={leverage} price={price}: got {err:?}"
                );
                assert_eq!(pm, before);
            }

            let mut pm = PositionManager::new(100);
            pm.open(side, leverage, d("10"), d("100"), d("1000")).unwrap();
            let scaled = pm.scale_in(side, d("10"), d(winning), d("1000")).unwrap();
            assert_eq!(scaled.notional_size, d("200") * Decimal::from(leverage));
            assert!(scaled.unrealized_pnl.is_positive());
        }
    }
}

#[test]
fn test_scale_in_averages_entry_by_notional() {
    let mut pm = PositionManager::new(100);
    pm.open(Side::Long, 10, d("10"), d("100"), d("1000")).unwrap();
    // 1000 notional at 100 plus 1000 notional at 120
    let scaled = pm.scale_in(Side::Long, d("10"), d("120"), d("1000")).unwrap();
    assert_eq!(scaled.entry_price, d("110"));
    assert_eq!(scaled.notional_size, d("2000"));
    assert_eq!(scaled.liquidation_price, d("55"));
}

#[test]
fn test_scale_in_direction_and_margin_checks() {
    let mut pm = PositionManager::new(100);
    pm.open(Side::Long, 2, d("90"), d("100"), d("1000")).unwrap();

    assert_eq!(
        pm.scale_in(Side::Short, d("10"), d("110"), d("1000")),
        Err(EngineError::DirectionMismatch {
            open: Side::Long,
            requested: Side::Short
        })
    );

    // used margin 900, pnl +180 at 110: available 280
    let err = pm.scale_in(Side::Long, d("50"), d("110"), d("1000")).unwrap_err();
    assert_eq!(
        err,
        EngineError::InsufficientMargin {
            required: d("500"),
            available: d("280")
        }
    );
}

#[test]
fn test_partial_close_keeps_entry_and_shrinks_size() {
    let mut pm = PositionManager::new(100);
    pm.open(Side::Short, 5, d("20"), d("200"), d("1000")).unwrap();
    let outcome = pm.close(d("25"), d("180"), d("1000")).unwrap();

    // 1000 notional, 10% favourable move on the closed quarter
    assert_eq!(outcome.closed_notional, d("250"));
    assert_eq!(outcome.realized_pnl, d("25"));
    let rest = outcome.remaining.unwrap();
    assert_eq!(rest.entry_price, d("200"));
    assert_eq!(rest.notional_size, d("750"));
    assert_eq!(rest.unrealized_pnl, d("75"));
    assert_eq!(pm.position(), Some(&rest));
}
