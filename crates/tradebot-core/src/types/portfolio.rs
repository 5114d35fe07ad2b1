//! Position and portfolio accounting.

use num_traits::Signed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Fill, MarketEvent, Side};

/// A position in a single symbol.
///
/// Mutated only by applying fills inside the engine's event loop; the
/// strategy never writes to it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Symbol
    pub symbol: String,
    /// Signed quantity (positive long, negative short)
    pub quantity: Decimal,
    /// Average entry price
    pub avg_entry_price: Decimal,
    /// Realized profit/loss from closed portions
    pub realized_pnl: Decimal,
}

impl Position {
    /// Create an empty position.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            avg_entry_price: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Check if the position holds no quantity.
    pub fn is_flat(&self) -> bool {
        self.quantity == Decimal::ZERO
    }

    /// Apply an execution to the position.
    /// Returns the realized P&L when the position is being reduced.
    pub fn apply(&mut self, side: Side, quantity: Decimal, price: Decimal) -> Decimal {
        let fill_qty = side.sign() * quantity;
        let mut realized = Decimal::ZERO;

        let same_direction = (self.quantity > Decimal::ZERO && fill_qty > Decimal::ZERO)
            || (self.quantity < Decimal::ZERO && fill_qty < Decimal::ZERO);

        if same_direction || self.quantity == Decimal::ZERO {
            // Adding to the position: blend the entry price.
            let total_cost = self.quantity * self.avg_entry_price + fill_qty * price;
            let new_quantity = self.quantity + fill_qty;
            if new_quantity != Decimal::ZERO {
                self.avg_entry_price = total_cost / new_quantity;
            }
            self.quantity = new_quantity;
        } else {
            // Reducing or reversing.
            let close_qty = fill_qty.abs().min(self.quantity.abs());
            realized = if self.quantity > Decimal::ZERO {
                close_qty * (price - self.avg_entry_price)
            } else {
                close_qty * (self.avg_entry_price - price)
            };
            self.realized_pnl += realized;

            let remaining = fill_qty.abs() - close_qty;
            if remaining > Decimal::ZERO {
                // Position reversed through zero.
                self.quantity = fill_qty.signum() * remaining;
                self.avg_entry_price = price;
            } else {
                self.quantity += fill_qty;
            }
        }

        realized
    }
}

/// Portfolio state: cash plus open positions, with the latest mark per
/// symbol. Owned exclusively by the engine; strategies receive a
/// read-only reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    /// Available cash
    pub cash: Decimal,
    /// Map of symbol to position
    pub positions: HashMap<String, Position>,
    /// Last observed close per symbol
    marks: HashMap<String, Decimal>,
    /// Total realized P&L
    pub realized_pnl: Decimal,
}

impl Portfolio {
    /// Create a portfolio with initial cash.
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash,
            positions: HashMap::new(),
            marks: HashMap::new(),
            realized_pnl: Decimal::ZERO,
        }
    }

    /// Get a position by symbol.
    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// Signed quantity held in a symbol (zero when flat).
    pub fn quantity(&self, symbol: &str) -> Decimal {
        self.positions
            .get(symbol)
            .map(|p| p.quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Last observed close for a symbol.
    pub fn mark(&self, symbol: &str) -> Option<Decimal> {
        self.marks.get(symbol).copied()
    }

    /// Record the latest market observation.
    pub fn mark_to_market(&mut self, event: &MarketEvent) {
        self.marks.insert(event.symbol.clone(), event.close);
    }

    /// Apply a fill for the given side and symbol.
    pub fn apply_fill(&mut self, symbol: &str, side: Side, fill: &Fill) {
        let value = fill.price * fill.quantity;
        match side {
            Side::Buy => self.cash -= value,
            Side::Sell => self.cash += value,
        }

        let position = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::new(symbol));
        let realized = position.apply(side, fill.quantity, fill.price);
        self.realized_pnl += realized;

        if position.is_flat() {
            self.positions.remove(symbol);
        }
    }

    /// Cash plus the marked value of all open positions.
    pub fn equity(&self) -> Decimal {
        let marked: Decimal = self
            .positions
            .values()
            .map(|p| {
                let mark = self.marks.get(&p.symbol).copied().unwrap_or(p.avg_entry_price);
                p.quantity * mark
            })
            .sum();
        self.cash + marked
    }
}
