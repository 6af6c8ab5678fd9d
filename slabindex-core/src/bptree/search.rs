/// Result of a binary search algorithm.
///
/// # Cases
///
/// * `Ok(index)` - The index of the key if found.
/// * `Err(index)` - The index where the key should be inserted.
pub(crate) type SearchIndex = Result<usize, usize>;

/// Generates code for a binary search algorithm that searches for a given key in a collection.
///
/// Returns the index of the key if found, or an error indicating where the key should be
/// inserted to maintain a sorted order.
///
/// # Arguments
///
/// * `key` - The value you're searching for in the collection.
/// * `len` - The length of the collection.
/// * `obtain` - An expression that takes an index and returns the value at that index in the collection.
///
/// # Examples
///
/// ```
/// use slabindex::search;
///
/// let keys: &[u64] = &[10, 20, 30, 40];
///
/// assert_eq!(Ok(1), search!(20, keys.len(), idx => keys[idx]));
/// assert_eq!(Err(2), search!(25, keys.len(), idx => keys[idx]));
/// assert_eq!(Err(4), search!(99, keys.len(), idx => keys[idx]));
/// ```
#[macro_export]
macro_rules! search {
    ($key:expr, $len:expr, $index:ident => $obtain:expr) => {{
        let mut result = None;
        let mut range = 0..$len;

        while !range.is_empty() {
            let $index = (range.start + range.end) / 2;
            let record = $obtain;

            if record < $key {
                range.start = $index + 1;
            } else if record > $key {
                range.end = $index;
            } else {
                result = Some($index);
                break;
            }
        }

        result.ok_or_else(|| range.start)
    }};
}
