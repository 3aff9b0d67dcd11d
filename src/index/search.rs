//! Last-occurrence binary search
//!
//! Same result encoding as `[T]::binary_search`, except that among equal
//! elements the highest position is returned, so a new duplicate lands
//! after every existing one.

use std::cmp::Ordering;

/// Search `items` ordered by `cmp` (which compares an item to the key).
///
/// Returns the index of the last matching item, or `-(insertion_point) - 1`
/// when no item matches.
pub fn binary_search_last<T>(items: &[T], mut cmp: impl FnMut(&T) -> Ordering) -> isize {
    // First position whose item is strictly greater than the key
    let mut lo = 0usize;
    let mut hi = items.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if cmp(&items[mid]) == Ordering::Greater {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    if lo > 0 && cmp(&items[lo - 1]) == Ordering::Equal {
        (lo - 1) as isize
    } else {
        -(lo as isize) - 1
    }
}

/// Position at which a new item belongs given a `binary_search_last` result
pub fn insertion_point(result: isize) -> usize {
    if result >= 0 {
        result as usize + 1
    } else {
        (-(result + 1)) as usize
    }
}
