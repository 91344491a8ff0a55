//! Reservable item type.

use crate::types::ItemKey;

/// A stock-counted resource: a flight's seat block, or the car/room pool at a
/// location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservableItem {
    /// Canonical key of the item.
    pub key: ItemKey,
    /// Units currently available.
    pub count: u32,
    /// Units currently reserved by customers.
    pub reserved: u32,
    /// Unit price in whole dollars.
    pub price: i64,
}

impl ReservableItem {
    /// Creates a new item with no reservations.
    #[must_use]
    pub fn new(key: ItemKey, count: u32, price: i64) -> Self {
        Self {
            key,
            count,
            reserved: 0,
            price,
        }
    }

    /// Adds stock, updating the price only when the new price is positive.
    ///
    /// A non-positive price on a top-up keeps the existing price.
    pub fn add_stock(&mut self, count: u32, price: i64) {
        self.count += count;
        if price > 0 {
            self.price = price;
        }
    }

    /// Moves one unit from available to reserved; returns the unit price, or
    /// `None` when nothing is available.
    pub fn reserve_one(&mut self) -> Option<i64> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        self.reserved += 1;
        Some(self.price)
    }

    /// Returns `quantity` units from reserved back to available.
    ///
    /// Quantities beyond what is actually reserved are clamped; accounting
    /// never goes negative.
    pub fn cancel(&mut self, quantity: u32) {
        let returned = quantity.min(self.reserved);
        self.reserved -= returned;
        self.count += returned;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight() -> ReservableItem {
        ReservableItem::new(ItemKey::flight(100), 5, 200)
    }

    #[test]
    fn add_stock_keeps_price_unless_positive() {
        let mut item = flight();
        item.add_stock(3, 0);
        assert_eq!(item.count, 8);
        assert_eq!(item.price, 200);

        item.add_stock(0, 250);
        assert_eq!(item.price, 250);
    }

    #[test]
    fn reserve_moves_one_unit() {
        let mut item = flight();
        assert_eq!(item.reserve_one(), Some(200));
        assert_eq!(item.count, 4);
        assert_eq!(item.reserved, 1);
    }

    #[test]
    fn reserve_fails_when_sold_out() {
        let mut item = ReservableItem::new(ItemKey::car("NYC"), 1, 40);
        assert_eq!(item.reserve_one(), Some(40));
        assert_eq!(item.reserve_one(), None);
        assert_eq!(item.reserved, 1);
    }

    #[test]
    fn cancel_restores_and_clamps() {
        let mut item = flight();
        item.reserve_one();
        item.reserve_one();

        item.cancel(1);
        assert_eq!(item.count, 4);
        assert_eq!(item.reserved, 1);

        // Over-cancel clamps to what is reserved.
        item.cancel(10);
        assert_eq!(item.count, 5);
        assert_eq!(item.reserved, 0);
    }

    #[test]
    fn conservation_under_reserve_and_cancel() {
        let mut item = flight();
        let total = item.count + item.reserved;

        item.reserve_one();
        item.reserve_one();
        item.cancel(1);
        item.reserve_one();

        assert_eq!(item.count + item.reserved, total);
    }
}
