//! Run summary statistics over closed trades.

use super::position::Trade;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_trades: usize,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub win_rate: f64,
    pub total_fees: f64,
    pub net_pnl: f64,
    pub total_return: f64,
    /// Largest peak-to-trough fall of the realized equity curve, as a
    /// fraction of the peak.
    pub max_drawdown: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub profit_factor: f64,
}

impl Metrics {
    pub fn compute(initial_capital: f64, trades: &[Trade]) -> Self {
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut largest_win = 0.0_f64;
        let mut largest_loss = 0.0_f64;
        let mut total_fees = 0.0_f64;
        let mut equity_curve = Vec::with_capacity(trades.len() + 1);
        equity_curve.push(initial_capital);

        for trade in trades {
            let pnl = trade.pnl;
            total_fees += trade.fee;
            if trade.is_win() {
                trades_won += 1;
                total_wins += pnl;
                largest_win = largest_win.max(pnl);
            } else if pnl < 0.0 {
                trades_lost += 1;
                total_losses += pnl.abs();
                largest_loss = largest_loss.max(pnl.abs());
            }
            let last = equity_curve.last().copied().unwrap_or(initial_capital);
            equity_curve.push(last + pnl);
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            trades_won as f64 / total_trades as f64
        } else {
            0.0
        };

        let net_pnl = total_wins - total_losses;
        let total_return = if initial_capital > 0.0 {
            net_pnl / initial_capital
        } else {
            0.0
        };

        let profit_factor = if total_losses > 0.0 {
            total_wins / total_losses
        } else if total_wins > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Metrics {
            total_trades,
            trades_won,
            trades_lost,
            win_rate,
            total_fees,
            net_pnl,
            total_return,
            max_drawdown: compute_drawdown(&equity_curve),
            largest_win,
            largest_loss,
            profit_factor,
        }
    }
}

fn compute_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - equity) / peak);
        }
    }
    max_dd
}
