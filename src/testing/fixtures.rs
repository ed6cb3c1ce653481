//! Pre-built datasets for common testing scenarios.

use crate::event::{Empty, Event};
use serde::{Deserialize, Serialize};

/// A page view, keyed by user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageView {
    pub user: u32,
    pub page: String,
}

/// A purchase, keyed by user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Purchase {
    pub user: u32,
    pub amount: u64,
}

/// Rows `(1, A), (2, B), (1, C)` at ticks 0, 1, 2. Counting per key yields `{1: 2, 2: 1}`.
///
/// # Example
///
/// ```
/// use ironstream::testing::three_rows;
///
/// assert_eq!(three_rows().len(), 3);
/// ```
#[must_use]
pub fn three_rows() -> Vec<Event<Empty, (u32, char)>> {
    vec![
        Event::point(0, Empty, (1, 'A')),
        Event::point(1, Empty, (2, 'B')),
        Event::point(2, Empty, (1, 'C')),
    ]
}

/// Page views from five users over twenty ticks.
#[must_use]
pub fn page_views() -> Vec<Event<Empty, PageView>> {
    let pages = ["/", "/cart", "/search", "/item"];
    (0..40)
        .map(|i: i64| {
            let user = ((i * 7) % 5) as u32;
            Event::point(
                i / 2,
                Empty,
                PageView {
                    user,
                    page: pages[(i % 4) as usize].to_string(),
                },
            )
        })
        .collect()
}

/// Purchases from four of the five users in [`page_views`].
#[must_use]
pub fn purchases() -> Vec<Event<Empty, Purchase>> {
    (0..12)
        .map(|i: i64| {
            Event::point(
                i + 3,
                Empty,
                Purchase {
                    user: (i % 4) as u32,
                    amount: (i as u64 + 1) * 10,
                },
            )
        })
        .collect()
}
