//! Single-asset position: signed quantity, volume-weighted entry price and
//! entry time.

use chrono::NaiveDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionSide {
    Flat,
    Long,
    Short,
}

/// Positive quantity is long, negative is short, zero is flat. A flat
/// position always has `entry_price == 0.0` and no entry time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_time: Option<NaiveDateTime>,
}

impl Position {
    pub fn flat() -> Self {
        Position::default()
    }

    pub fn side(&self) -> PositionSide {
        match self.quantity {
            q if q > 0 => PositionSide::Long,
            q if q < 0 => PositionSide::Short,
            _ => PositionSide::Flat,
        }
    }

    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Signed market value: negative while short.
    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// Opens or extends a long, re-averaging the entry price.
    /// Callers must not invoke this while short.
    pub fn add_long(&mut self, quantity: i64, price: f64, time: NaiveDateTime) {
        let held = self.quantity.max(0);
        let new_quantity = held + quantity;
        self.entry_price = if new_quantity > 0 {
            (self.entry_price * held as f64 + price * quantity as f64) / new_quantity as f64
        } else {
            price
        };
        self.quantity = new_quantity;
        self.entry_time = Some(time);
    }

    /// Opens or extends a short, re-averaging the short entry price.
    /// Callers must not invoke this while long.
    pub fn add_short(&mut self, quantity: i64, price: f64, time: NaiveDateTime) {
        let held = self.quantity.min(0).unsigned_abs() as i64;
        let new_held = held + quantity;
        self.entry_price = if new_held > 0 {
            (self.entry_price * held as f64 + price * quantity as f64) / new_held as f64
        } else {
            price
        };
        self.quantity = -new_held;
        self.entry_time = Some(time);
    }

    /// Reduces the absolute quantity by up to `quantity` and returns the
    /// amount actually closed. Entry state resets when the position goes flat.
    pub fn reduce(&mut self, quantity: i64) -> i64 {
        let closed = quantity.max(0).min(self.quantity.abs());
        if self.quantity > 0 {
            self.quantity -= closed;
        } else {
            self.quantity += closed;
        }
        if self.quantity == 0 {
            self.entry_price = 0.0;
            self.entry_time = None;
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn flat_by_default() {
        let pos = Position::flat();
        assert_eq!(pos.side(), PositionSide::Flat);
        assert!(pos.is_flat());
        assert_eq!(pos.entry_time, None);
    }

    #[test]
    fn add_long_averages_entry() {
        let mut pos = Position::flat();
        pos.add_long(10, 100.0, t(9));
        pos.add_long(30, 120.0, t(10));
        assert_eq!(pos.quantity, 40);
        assert!((pos.entry_price - 115.0).abs() < 1e-12);
        assert_eq!(pos.entry_time, Some(t(10)));
        assert_eq!(pos.side(), PositionSide::Long);
    }

    #[test]
    fn add_short_averages_entry() {
        let mut pos = Position::flat();
        pos.add_short(20, 50.0, t(9));
        pos.add_short(20, 40.0, t(11));
        assert_eq!(pos.quantity, -40);
        assert!((pos.entry_price - 45.0).abs() < 1e-12);
        assert!(pos.is_short());
    }

    #[test]
    fn market_value_is_signed() {
        let mut pos = Position::flat();
        pos.add_short(10, 100.0, t(9));
        assert!((pos.market_value(95.0) + 950.0).abs() < f64::EPSILON);
    }

    #[test]
    fn reduce_clamps_and_resets() {
        let mut pos = Position::flat();
        pos.add_long(10, 100.0, t(9));
        assert_eq!(pos.reduce(4), 4);
        assert_eq!(pos.quantity, 6);
        assert!((pos.entry_price - 100.0).abs() < f64::EPSILON);

        assert_eq!(pos.reduce(50), 6);
        assert!(pos.is_flat());
        assert_eq!(pos.entry_price, 0.0);
        assert_eq!(pos.entry_time, None);
    }

    #[test]
    fn reduce_short_towards_zero() {
        let mut pos = Position::flat();
        pos.add_short(8, 30.0, t(9));
        assert_eq!(pos.reduce(3), 3);
        assert_eq!(pos.quantity, -5);
        assert_eq!(pos.reduce(5), 5);
        assert_eq!(pos.entry_time, None);
    }

    #[test]
    fn reduce_flat_is_noop() {
        let mut pos = Position::flat();
        assert_eq!(pos.reduce(10), 0);
        assert!(pos.is_flat());
    }
}
