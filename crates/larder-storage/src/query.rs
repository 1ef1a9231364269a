//! Pagination over a bucket's ordered key space
//!
//! Backends compute a [`Window`] from the bucket's key count and then walk a
//! cursor in the requested direction, collecting positions inside the window.

use crate::{Order, QueryOptions};

/// Half-open range of cursor positions `[start, end)` to collect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: usize,
    pub end: usize,
}

impl Window {
    /// Clamp `opts` against a bucket holding `total` keys.
    ///
    /// Negative counts mean "all" and negative offsets mean 0. When the page
    /// starts past the end, the tail page is returned instead; if that would
    /// start before the first key, it starts at 0.
    pub fn compute(total: usize, opts: &QueryOptions) -> Self {
        let total = i64::try_from(total).unwrap_or(i64::MAX);
        let offset = opts.offset.max(0);

        let (mut start, mut end) = if opts.count < 0 {
            (0, total)
        } else {
            let start = opts.count.saturating_mul(offset);
            (start, start.saturating_add(opts.count))
        };

        if start > total {
            start = total.saturating_sub(opts.count).max(0);
        }
        if end > total {
            end = total;
        }
        let end = end.max(start);

        // both bounds are now within [0, total]
        Window {
            start: start as usize,
            end: end as usize,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Walk `cursor` and collect the values at positions inside `window`.
///
/// Stops advancing once `window.end` is reached. Positions before
/// `window.start` are stepped over without extracting their values.
pub(crate) fn traverse<I, T, E, F>(cursor: I, window: Window, mut extract: F) -> Result<Vec<Vec<u8>>, E>
where
    I: Iterator<Item = Result<T, E>>,
    F: FnMut(T) -> Vec<u8>,
{
    let mut items = Vec::with_capacity(window.len());
    for (pos, entry) in cursor.enumerate() {
        if pos >= window.end {
            break;
        }
        let entry = entry?;
        if pos >= window.start {
            items.push(extract(entry));
        }
    }
    Ok(items)
}

/// [`traverse`] in the direction `order` asks for.
pub(crate) fn traverse_ordered<I, T, E, F>(
    cursor: I,
    order: Order,
    window: Window,
    extract: F,
) -> Result<Vec<Vec<u8>>, E>
where
    I: DoubleEndedIterator<Item = Result<T, E>>,
    F: FnMut(T) -> Vec<u8>,
{
    match order {
        Order::Asc => traverse(cursor, window, extract),
        Order::Desc => traverse(cursor.rev(), window, extract),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn window(total: usize, count: i64, offset: i64) -> Window {
        Window::compute(total, &QueryOptions::page(count, offset))
    }

    #[test]
    fn test_unbounded() {
        assert_eq!(window(25, -1, 0), Window { start: 0, end: 25 });
        assert_eq!(window(25, -7, 3), Window { start: 0, end: 25 });
    }

    #[test]
    fn test_first_page() {
        assert_eq!(window(25, 10, 0), Window { start: 0, end: 10 });
        assert_eq!(window(25, 10, -4), Window { start: 0, end: 10 });
    }

    #[test]
    fn test_partial_last_page() {
        assert_eq!(window(25, 10, 2), Window { start: 20, end: 25 });
    }

    #[test]
    fn test_overshoot_returns_tail_page() {
        // start = 30 > 25, so start = 25 - 10
        assert_eq!(window(25, 10, 3), Window { start: 15, end: 25 });
    }

    #[test]
    fn test_overshoot_larger_than_bucket_starts_at_zero() {
        // start = 10 > 3, and 3 - 10 is negative
        assert_eq!(window(3, 10, 1), Window { start: 0, end: 3 });
    }

    #[test]
    fn test_exact_end_is_empty() {
        let w = window(20, 10, 2);
        assert_eq!(w, Window { start: 20, end: 20 });
        assert!(w.is_empty());
    }

    #[test]
    fn test_zero_count_is_empty() {
        assert!(window(25, 0, 0).is_empty());
        assert!(window(25, 0, 9).is_empty());
    }

    #[test]
    fn test_huge_offset_does_not_overflow() {
        assert_eq!(window(25, 10, i64::MAX), Window { start: 15, end: 25 });
    }

    #[test]
    fn test_traverse_stops_at_end() {
        let mut visited = 0;
        let cursor = (0..100u8).map(|i| {
            visited += 1;
            Ok::<_, ()>(i)
        });
        let items = traverse(cursor, Window { start: 2, end: 5 }, |v| vec![v]).unwrap();
        assert_eq!(items, vec![vec![2], vec![3], vec![4]]);
        assert_eq!(visited, 6);
    }

    #[test]
    fn test_traverse_ordered_desc() {
        let cursor = (0..5u8).map(Ok::<_, ()>);
        let items = traverse_ordered(cursor, Order::Desc, Window { start: 0, end: 2 }, |v| vec![v]).unwrap();
        assert_eq!(items, vec![vec![4], vec![3]]);
    }

    #[test]
    fn test_traverse_propagates_errors() {
        let cursor = vec![Ok(1u8), Err("boom"), Ok(3)].into_iter();
        let result = traverse(cursor, Window { start: 0, end: 3 }, |v| vec![v]);
        assert_eq!(result, Err("boom"));
    }

    proptest! {
        #[test]
        fn window_stays_in_bounds(total in 0usize..500, count in -5i64..60, offset in -5i64..60) {
            let w = window(total, count, offset);
            prop_assert!(w.start <= w.end);
            prop_assert!(w.end <= total);
            if count >= 0 {
                prop_assert!(w.len() as i64 <= count);
            } else {
                prop_assert_eq!(w.len(), total);
            }
        }
    }
}
