//! Bar loop for a single column.

use crate::domain::PriceSeries;
use crate::exits::EndOfData;
use crate::grid::TpSlPair;

use super::{ClosedTrade, ColumnRun, EngineSettings, ExitReason, PositionSide};

/// Borrowed view of one column's signals and stops.
#[derive(Debug, Clone, Copy)]
pub struct ColumnInput<'a> {
    pub long_entries: &'a [bool],
    pub short_entries: &'a [bool],
    pub long_exits: Option<&'a [bool]>,
    pub short_exits: Option<&'a [bool]>,
    pub stops: Option<TpSlPair>,
}

#[derive(Debug, Clone, Copy)]
struct OpenPosition {
    side: PositionSide,
    entry_bar: usize,
    entry_price: f64,
    quantity: f64,
    entry_fee: f64,
}

impl OpenPosition {
    fn gross_at(&self, price: f64) -> f64 {
        match self.side {
            PositionSide::Long => self.quantity * (price - self.entry_price),
            PositionSide::Short => self.quantity * (self.entry_price - price),
        }
    }

    /// Stop level hit on this bar, take-profit first. Gaps through a level
    /// fill at the open.
    fn stop_hit(&self, stops: TpSlPair, open: f64, high: f64, low: f64) -> Option<(f64, ExitReason)> {
        let e = self.entry_price;
        match self.side {
            PositionSide::Long => {
                let tp = e * (1.0 + stops.tp);
                let sl = e * (1.0 - stops.sl);
                if high >= tp {
                    Some((if open >= tp { open } else { tp }, ExitReason::TakeProfit))
                } else if low <= sl {
                    Some((if open <= sl { open } else { sl }, ExitReason::StopLoss))
                } else {
                    None
                }
            }
            PositionSide::Short => {
                let tp = e * (1.0 - stops.tp);
                let sl = e * (1.0 + stops.sl);
                if low <= tp {
                    Some((if open <= tp { open } else { tp }, ExitReason::TakeProfit))
                } else if high >= sl {
                    Some((if open >= sl { open } else { sl }, ExitReason::StopLoss))
                } else {
                    None
                }
            }
        }
    }
}

struct Book<'s> {
    settings: &'s EngineSettings,
    realized: f64,
    position: Option<OpenPosition>,
    trades: Vec<ClosedTrade>,
}

impl Book<'_> {
    fn open(&mut self, side: PositionSide, bar: usize, price: f64) {
        let quantity = self.settings.size / price;
        self.position = Some(OpenPosition {
            side,
            entry_bar: bar,
            entry_price: price,
            quantity,
            entry_fee: self.settings.size * self.settings.fees,
        });
    }

    fn close(&mut self, bar: usize, price: f64, reason: ExitReason) {
        let Some(p) = self.position.take() else {
            return;
        };
        let exit_fee = p.quantity * price * self.settings.fees;
        let net_pnl = p.gross_at(price) - p.entry_fee - exit_fee;
        self.realized += net_pnl;
        self.trades.push(ClosedTrade {
            side: p.side,
            entry_bar: p.entry_bar,
            entry_price: p.entry_price,
            exit_bar: bar,
            exit_price: price,
            quantity: p.quantity,
            net_pnl,
            reason,
        });
    }

    fn mark(&self, price: f64) -> f64 {
        let open = self
            .position
            .map_or(0.0, |p| p.gross_at(price) - p.entry_fee);
        self.settings.init_cash + self.realized + open
    }
}

/// Simulate one column. Inputs are assumed shape-checked by the caller.
pub fn run_column(prices: &PriceSeries, input: &ColumnInput<'_>, settings: &EngineSettings) -> ColumnRun {
    let n = prices.len();
    let mut book = Book {
        settings,
        realized: 0.0,
        position: None,
        trades: Vec::new(),
    };
    let mut equity = Vec::with_capacity(n);
    let mut last_mark = settings.init_cash;

    for i in 0..n {
        let close = prices.close[i];
        let mut exited = false;

        // 1. intrabar stops
        if let (Some(p), Some(stops)) = (book.position, input.stops) {
            if i > p.entry_bar {
                if let Some((price, reason)) = p.stop_hit(stops, prices.open[i], prices.high[i], prices.low[i]) {
                    book.close(i, price, reason);
                    exited = true;
                }
            }
        }

        if close.is_finite() {
            // 2. signal exits
            if let Some(p) = book.position {
                let exits = match p.side {
                    PositionSide::Long => input.long_exits,
                    PositionSide::Short => input.short_exits,
                };
                if i > p.entry_bar && exits.is_some_and(|e| e[i]) {
                    book.close(i, close, ExitReason::Signal);
                    exited = true;
                }
            }

            // 3-4. entries
            let want_long = input.long_entries[i] && settings.direction.allows_long();
            let want_short = input.short_entries[i] && settings.direction.allows_short();
            match book.position {
                Some(p) if (p.side == PositionSide::Long && want_short) || (p.side == PositionSide::Short && want_long) => {
                    book.close(i, close, ExitReason::OppositeEntry);
                }
                None if !exited && want_long != want_short => {
                    let side = if want_long {
                        PositionSide::Long
                    } else {
                        PositionSide::Short
                    };
                    book.open(side, i, close);
                }
                _ => {}
            }

            // 5. mark
            last_mark = book.mark(close);
        }
        equity.push(last_mark);
    }

    let mut open_at_end = false;
    if let Some(p) = book.position {
        let last = n - 1;
        let price = prices.close[last];
        if settings.end_of_data == EndOfData::ForceClose && p.entry_bar < last && price.is_finite() {
            book.close(last, price, ExitReason::EndOfData);
            equity[last] = book.mark(price);
        } else {
            open_at_end = true;
        }
    }

    ColumnRun {
        trades: book.trades,
        equity,
        open_at_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Direction;

    fn series(close: &[f64], high: &[f64], low: &[f64]) -> PriceSeries {
        let mut s = PriceSeries::empty("TEST");
        s.close = close.to_vec();
        s.open = close.to_vec();
        s.high = high.to_vec();
        s.low = low.to_vec();
        s.volume = vec![0.0; close.len()];
        s
    }

    fn flags(n: usize, on: &[usize]) -> Vec<bool> {
        let mut v = vec![false; n];
        for &i in on {
            v[i] = true;
        }
        v
    }

    fn no_fees() -> EngineSettings {
        EngineSettings {
            fees: 0.0,
            ..EngineSettings::default()
        }
    }

    #[test]
    fn take_profit_fills_at_level() {
        let close = [100.0, 100.0, 100.0];
        let high = [100.0, 106.0, 100.0];
        let low = [100.0, 99.0, 100.0];
        let p = series(&close, &high, &low);
        let le = flags(3, &[0]);
        let none = flags(3, &[]);
        let input = ColumnInput {
            long_entries: &le,
            short_entries: &none,
            long_exits: None,
            short_exits: None,
            stops: Some(TpSlPair::new(0.03, 0.05)),
        };
        let run = run_column(&p, &input, &no_fees());
        assert_eq!(run.trades.len(), 1);
        let t = &run.trades[0];
        assert_eq!(t.reason, ExitReason::TakeProfit);
        assert_eq!(t.exit_bar, 1);
        assert!((t.exit_price - 105.0).abs() < 1e-9);
        assert!((t.net_pnl - 5.0).abs() < 1e-9);
        assert!((run.equity[2] - 10_005.0).abs() < 1e-9);
    }

    #[test]
    fn fees_are_charged_on_both_legs() {
        let close = [100.0, 110.0];
        let p = series(&close, &close, &close);
        let le = flags(2, &[0]);
        let lx = flags(2, &[1]);
        let none = flags(2, &[]);
        let input = ColumnInput {
            long_entries: &le,
            short_entries: &none,
            long_exits: Some(&lx),
            short_exits: None,
            stops: None,
        };
        let settings = EngineSettings {
            fees: 0.01,
            ..EngineSettings::default()
        };
        let run = run_column(&p, &input, &settings);
        // gross 10, entry fee 1.0, exit fee 1.1
        assert!((run.trades[0].net_pnl - 7.9).abs() < 1e-9);
        assert_eq!(run.trades[0].reason, ExitReason::Signal);
    }

    #[test]
    fn opposite_entry_closes_without_reversing() {
        let close = [100.0, 90.0, 95.0];
        let p = series(&close, &close, &close);
        let le = flags(3, &[0]);
        let se = flags(3, &[1]);
        let input = ColumnInput {
            long_entries: &le,
            short_entries: &se,
            long_exits: None,
            short_exits: None,
            stops: None,
        };
        let run = run_column(&p, &input, &no_fees());
        assert_eq!(run.trades.len(), 1);
        assert_eq!(run.trades[0].reason, ExitReason::OppositeEntry);
        assert!(!run.open_at_end);
    }

    #[test]
    fn short_profits_when_price_falls() {
        let close = [100.0, 90.0];
        let p = series(&close, &close, &close);
        let none = flags(2, &[]);
        let se = flags(2, &[0]);
        let sx = flags(2, &[1]);
        let input = ColumnInput {
            long_entries: &none,
            short_entries: &se,
            long_exits: None,
            short_exits: Some(&sx),
            stops: None,
        };
        let run = run_column(&p, &input, &no_fees());
        assert!((run.trades[0].net_pnl - 10.0).abs() < 1e-9);
        assert!(run.trades[0].is_win());
    }

    #[test]
    fn direction_filters_entries() {
        let close = [100.0, 90.0];
        let p = series(&close, &close, &close);
        let none = flags(2, &[]);
        let se = flags(2, &[0]);
        let input = ColumnInput {
            long_entries: &none,
            short_entries: &se,
            long_exits: None,
            short_exits: None,
            stops: None,
        };
        let settings = EngineSettings {
            direction: Direction::LongOnly,
            ..no_fees()
        };
        let run = run_column(&p, &input, &settings);
        assert!(run.trades.is_empty());
        assert!(!run.open_at_end);
    }

    #[test]
    fn end_of_data_policy() {
        let close = [100.0, 102.0, 104.0];
        let p = series(&close, &close, &close);
        let le = flags(3, &[0]);
        let none = flags(3, &[]);
        let input = ColumnInput {
            long_entries: &le,
            short_entries: &none,
            long_exits: None,
            short_exits: None,
            stops: None,
        };
        let open = run_column(&p, &input, &no_fees());
        assert!(open.trades.is_empty());
        assert!(open.open_at_end);
        assert!((open.equity[2] - 10_004.0).abs() < 1e-9);

        let settings = EngineSettings {
            end_of_data: EndOfData::ForceClose,
            ..no_fees()
        };
        let closed = run_column(&p, &input, &settings);
        assert_eq!(closed.trades.len(), 1);
        assert_eq!(closed.trades[0].reason, ExitReason::EndOfData);
        assert!((closed.equity[2] - 10_004.0).abs() < 1e-9);
    }

    #[test]
    fn no_reentry_on_exit_bar() {
        let close = [100.0, 100.0, 100.0, 100.0];
        let high = [100.0, 106.0, 100.0, 106.0];
        let p = series(&close, &high, &close);
        let le = flags(4, &[0, 1, 2]);
        let none = flags(4, &[]);
        let input = ColumnInput {
            long_entries: &le,
            short_entries: &none,
            long_exits: None,
            short_exits: None,
            stops: Some(TpSlPair::new(0.05, 0.05)),
        };
        let run = run_column(&p, &input, &no_fees());
        let exits: Vec<usize> = run.trades.iter().map(|t| t.exit_bar).collect();
        assert_eq!(exits, vec![1, 3]);
    }
}
