//! Shared in-memory order table.
//!
//! [`OrderStore`] is the only owner of order records. Every call handler
//! holds an `Arc<OrderStore>` and goes through its methods, each of which is
//! a single critical section under a [`RwLock`]. Callers only ever receive
//! clones, never references into the table.

use ordermgt_core::proto::Order;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Thread-safe mapping from order id to [`Order`]. Last writer wins.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with the sample orders 102 to 106.
    pub fn with_sample_data() -> Self {
        let store = Self::new();
        store.put_many(sample_orders());
        store
    }

    /// Returns a clone of the order stored under `id`.
    pub fn get(&self, id: &str) -> Option<Order> {
        self.orders.read().get(id).cloned()
    }

    /// Inserts or overwrites `order`, returning the previous record.
    pub fn put(&self, order: Order) -> Option<Order> {
        self.orders.write().insert(order.id.clone(), order)
    }

    /// Inserts or overwrites every order under a single lock acquisition.
    pub fn put_many(&self, orders: impl IntoIterator<Item = Order>) {
        let mut guard = self.orders.write();
        for order in orders {
            guard.insert(order.id.clone(), order);
        }
    }

    /// Snapshot of every order with an item containing `query`.
    ///
    /// Each matching order appears once, no matter how many of its items
    /// match. Order of the result is unspecified.
    pub fn search(&self, query: &str) -> Vec<Order> {
        self.orders
            .read()
            .values()
            .filter(|order| order.matches_item(query))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}

fn sample_order(id: &str, items: &[&str], destination: &str, price: f32) -> Order {
    Order {
        id: id.to_string(),
        items: items.iter().map(|item| item.to_string()).collect(),
        description: String::new(),
        price,
        destination: destination.to_string(),
    }
}

/// The fixed sample set the service starts with.
pub fn sample_orders() -> Vec<Order> {
    vec![
        sample_order(
            "102",
            &["Google Pixel 3A", "Mac Book Pro"],
            "Mountain View, CA",
            1800.0,
        ),
        sample_order("103", &["Apple Watch S4"], "San Jose, CA", 400.0),
        sample_order(
            "104",
            &["Google Home Mini", "Google Nest Hub"],
            "Mountain View, CA",
            400.0,
        ),
        sample_order("105", &["Amazon Echo"], "San Jose, CA", 30.0),
        sample_order(
            "106",
            &["Amazon Echo", "Apple iPhone XS"],
            "Mountain View, CA",
            30.0,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn put_overwrites_and_returns_previous() {
        let store = OrderStore::new();
        let first = sample_order("1", &["a"], "X", 1.0);
        let second = sample_order("1", &["b"], "Y", 2.0);

        assert!(store.put(first.clone()).is_none());
        assert_eq!(store.put(second.clone()), Some(first));
        assert_eq!(store.get("1"), Some(second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_unknown_is_none() {
        assert!(OrderStore::with_sample_data().get("999").is_none());
    }

    #[test]
    fn sample_data_has_five_orders() {
        let store = OrderStore::with_sample_data();
        assert_eq!(store.len(), 5);
        assert_eq!(store.get("103").unwrap().destination, "San Jose, CA");
    }

    #[test]
    fn search_matches_item_substrings_once_per_order() {
        let store = OrderStore::with_sample_data();
        let mut ids: Vec<_> = store
            .search("Google")
            .into_iter()
            .map(|order| order.id)
            .collect();
        ids.sort();
        // 104 matches on two items but is reported once.
        assert_eq!(ids, vec!["102", "104"]);
        assert!(store.search("Nokia").is_empty());
    }

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let store = Arc::new(OrderStore::new());
        std::thread::scope(|scope| {
            for t in 0..8 {
                let store = Arc::clone(&store);
                scope.spawn(move || {
                    for i in 0..250 {
                        store.put(sample_order(&format!("{t}-{i}"), &["x"], "Z", 1.0));
                        let _ = store.search("x");
                    }
                });
            }
        });
        assert_eq!(store.len(), 8 * 250);
    }
}
