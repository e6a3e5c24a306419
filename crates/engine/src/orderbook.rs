use hashmark_state::Order;
use hashmark_types::{AccountId, MarketId, OrderId, OrderSide, OrderStatus, Tinybars};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// One match against a resting order. The fill price is always the
/// resting order's price; the incoming order's account and side are
/// known to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub maker_order_id: OrderId,
    pub maker_account: AccountId,
    pub maker_side: OrderSide,
    /// Resting order's limit price
    pub price_cents: u8,
    pub quantity: Tinybars,
}

/// Orderbook depth: (bids, asks), each as Vec<(price_cents, total_size)>
pub type BookDepth = (Vec<(u8, Tinybars)>, Vec<(u8, Tinybars)>);

/// Price level: FIFO queue of order ids for price-time priority
#[derive(Debug, Clone, Default)]
struct PriceLevel {
    orders: VecDeque<OrderId>,
    total_size: Tinybars,
}

impl PriceLevel {
    fn add(&mut self, order_id: OrderId, size: Tinybars) {
        self.orders.push_back(order_id);
        self.total_size += size;
    }

    fn remove(&mut self, order_id: OrderId, size: Tinybars) {
        if let Some(pos) = self.orders.iter().position(|&id| id == order_id) {
            self.orders.remove(pos);
            self.total_size -= size;
        }
    }

    fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Both sides of one (market, outcome) book
#[derive(Debug, Clone, Default)]
struct BookSides {
    /// Highest price matches first
    bids: BTreeMap<u8, PriceLevel>,
    /// Lowest price matches first
    asks: BTreeMap<u8, PriceLevel>,
}

/// Price-time-priority matcher over all (market, outcome) books.
#[derive(Debug, Clone, Default)]
pub struct OrderBookManager {
    /// All orders ever seen, indexed by id
    orders: HashMap<OrderId, Order>,
    books: HashMap<(MarketId, u16), BookSides>,
}

impl OrderBookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    pub fn get_mut(&mut self, order_id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&order_id)
    }

    /// Record an order and, if it has remaining size, rest it on its book.
    pub fn insert(&mut self, order: Order) {
        if order.status == OrderStatus::Open && order.remaining() > 0 {
            let book = self
                .books
                .entry((order.market_id, order.outcome))
                .or_default();
            let side = match order.side {
                OrderSide::Bid => &mut book.bids,
                OrderSide::Ask => &mut book.asks,
            };
            side.entry(order.price_cents)
                .or_default()
                .add(order.id, order.remaining());
        }
        self.orders.insert(order.id, order);
    }

    /// Take a resting order off its book (cancellation). Returns the
    /// updated order record.
    pub fn remove_resting(&mut self, order_id: OrderId) -> Option<&Order> {
        let order = self.orders.get_mut(&order_id)?;
        let remaining = order.remaining();
        if let Some(book) = self.books.get_mut(&(order.market_id, order.outcome)) {
            let side = match order.side {
                OrderSide::Bid => &mut book.bids,
                OrderSide::Ask => &mut book.asks,
            };
            if let Some(level) = side.get_mut(&order.price_cents) {
                level.remove(order_id, remaining);
                if level.is_empty() {
                    side.remove(&order.price_cents);
                }
            }
        }
        Some(order)
    }

    /// Match an incoming order against the opposite side while it
    /// crosses. Maker orders are updated in place; fully-filled makers
    /// leave the book. The incoming order is NOT inserted here.
    pub fn match_incoming(&mut self, incoming: &Order, allow_self_cross: bool) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut remaining = incoming.remaining();

        let Some(book) = self.books.get_mut(&(incoming.market_id, incoming.outcome)) else {
            return matches;
        };

        let (opposite, crosses): (_, fn(u8, u8) -> bool) = match incoming.side {
            // Incoming bid takes asks from the lowest price up
            OrderSide::Bid => (&mut book.asks, |incoming, resting| incoming >= resting),
            // Incoming ask takes bids from the highest price down
            OrderSide::Ask => (&mut book.bids, |incoming, resting| incoming <= resting),
        };

        let prices: Vec<u8> = match incoming.side {
            OrderSide::Bid => opposite.keys().copied().collect(),
            OrderSide::Ask => opposite.keys().rev().copied().collect(),
        };

        for price in prices {
            if remaining <= 0 || !crosses(incoming.price_cents, price) {
                break;
            }

            let Some(level) = opposite.get_mut(&price) else {
                continue;
            };
            let level_orders: Vec<OrderId> = level.orders.iter().copied().collect();

            for maker_order_id in level_orders {
                if remaining <= 0 {
                    break;
                }

                let Some(maker) = self.orders.get_mut(&maker_order_id) else {
                    continue;
                };

                if !allow_self_cross && maker.account == incoming.account {
                    continue;
                }

                let quantity = remaining.min(maker.remaining());
                maker.filled_quantity += quantity;
                remaining -= quantity;

                matches.push(Match {
                    maker_order_id,
                    maker_account: maker.account.clone(),
                    maker_side: maker.side,
                    price_cents: price,
                    quantity,
                });

                if maker.remaining() == 0 {
                    maker.status = OrderStatus::Filled;
                    level.remove(maker_order_id, quantity);
                } else {
                    level.total_size -= quantity;
                }
            }

            if level.is_empty() {
                opposite.remove(&price);
            }
        }

        matches
    }

    pub fn best_bid(&self, market_id: MarketId, outcome: u16) -> Option<u8> {
        self.books
            .get(&(market_id, outcome))?
            .bids
            .keys()
            .next_back()
            .copied()
    }

    pub fn best_ask(&self, market_id: MarketId, outcome: u16) -> Option<u8> {
        self.books
            .get(&(market_id, outcome))?
            .asks
            .keys()
            .next()
            .copied()
    }

    /// Top-of-book depth, best levels first.
    pub fn depth(&self, market_id: MarketId, outcome: u16, levels: usize) -> BookDepth {
        let Some(book) = self.books.get(&(market_id, outcome)) else {
            return (Vec::new(), Vec::new());
        };

        let bids = book
            .bids
            .iter()
            .rev()
            .take(levels)
            .map(|(price, level)| (*price, level.total_size))
            .collect();
        let asks = book
            .asks
            .iter()
            .take(levels)
            .map(|(price, level)| (*price, level.total_size))
            .collect();
        (bids, asks)
    }

    /// Every order, for snapshots.
    pub fn all_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.values().cloned().collect();
        orders.sort_by_key(|o| (o.created_at_ms, o.id));
        orders
    }

    pub fn orders_for_account(&self, account: &AccountId) -> Vec<&Order> {
        let mut orders: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| &o.account == account)
            .collect();
        orders.sort_by_key(|o| (o.created_at_ms, o.id));
        orders
    }

    /// Rebuild all books from a flat order list (snapshot restore).
    pub fn restore(orders: Vec<Order>) -> Self {
        let mut manager = Self::new();
        for order in orders {
            manager.insert(order);
        }
        manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(
        market_id: MarketId,
        account: &str,
        side: OrderSide,
        price_cents: u8,
        quantity_hbar: i128,
        created_at_ms: i64,
    ) -> Order {
        Order {
            id: OrderId::generate(),
            market_id,
            outcome: 0,
            account: AccountId::from(account),
            side,
            quantity: quantity_hbar * 100_000_000,
            price_cents,
            filled_quantity: 0,
            status: OrderStatus::Open,
            created_at_ms,
        }
    }

    #[test]
    fn test_price_time_priority_within_level() {
        let market_id = MarketId::generate();
        let mut book = OrderBookManager::new();

        let first = order(market_id, "0.0.1001", OrderSide::Ask, 60, 10, 0);
        let second = order(market_id, "0.0.1002", OrderSide::Ask, 60, 10, 1);
        let first_id = first.id;
        book.insert(first);
        book.insert(second);

        let incoming = order(market_id, "0.0.1003", OrderSide::Bid, 60, 5, 2);
        let matches = book.match_incoming(&incoming, true);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].maker_order_id, first_id);
    }

    #[test]
    fn test_fill_at_resting_price() {
        let market_id = MarketId::generate();
        let mut book = OrderBookManager::new();
        book.insert(order(market_id, "0.0.1001", OrderSide::Ask, 58, 5, 0));

        let incoming = order(market_id, "0.0.1002", OrderSide::Bid, 59, 5, 1);
        let matches = book.match_incoming(&incoming, true);

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].price_cents, 58);
    }

    #[test]
    fn test_stops_when_book_no_longer_crosses() {
        let market_id = MarketId::generate();
        let mut book = OrderBookManager::new();
        book.insert(order(market_id, "0.0.1001", OrderSide::Ask, 60, 10, 0));
        book.insert(order(market_id, "0.0.1002", OrderSide::Ask, 58, 5, 1));

        let incoming = order(market_id, "0.0.1003", OrderSide::Bid, 59, 8, 2);
        let matches = book.match_incoming(&incoming, true);

        // Takes the 5 at 58, leaves the 60 ask untouched
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].price_cents, 58);
        assert_eq!(matches[0].quantity, 5 * 100_000_000);
        assert_eq!(book.best_ask(market_id, 0), Some(60));
    }

    #[test]
    fn test_self_cross_policy() {
        let market_id = MarketId::generate();
        let mut book = OrderBookManager::new();
        book.insert(order(market_id, "0.0.1001", OrderSide::Ask, 50, 5, 0));

        let incoming = order(market_id, "0.0.1001", OrderSide::Bid, 50, 5, 1);
        assert!(book.match_incoming(&incoming, false).is_empty());
        assert_eq!(book.match_incoming(&incoming, true).len(), 1);
    }

    #[test]
    fn test_depth_ordering() {
        let market_id = MarketId::generate();
        let mut book = OrderBookManager::new();
        for (price, at) in [(48u8, 0i64), (50, 1), (49, 2)] {
            book.insert(order(market_id, "0.0.1001", OrderSide::Bid, price, 10, at));
        }

        let (bids, _) = book.depth(market_id, 0, 2);
        assert_eq!(bids[0].0, 50);
        assert_eq!(bids[1].0, 49);
    }

    #[test]
    fn test_restore_rebuilds_books() {
        let market_id = MarketId::generate();
        let mut book = OrderBookManager::new();
        book.insert(order(market_id, "0.0.1001", OrderSide::Bid, 45, 10, 0));
        book.insert(order(market_id, "0.0.1002", OrderSide::Ask, 55, 10, 1));

        let restored = OrderBookManager::restore(book.all_orders());
        assert_eq!(restored.best_bid(market_id, 0), Some(45));
        assert_eq!(restored.best_ask(market_id, 0), Some(55));
    }
}
