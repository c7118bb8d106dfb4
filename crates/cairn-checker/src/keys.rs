//! Key-range helpers shared by the rule manager and the region labeler.

/// Returns true if `key` is a valid split point for `[start, end)`.
///
/// Empty `end` means +infinity. A split key equal to either bound would
/// produce an empty region, so both bounds are excluded.
pub(crate) fn is_strictly_inside(key: &[u8], start: &[u8], end: &[u8]) -> bool {
    !key.is_empty() && key > start && (end.is_empty() || key < end)
}

/// Returns true if `[inner_start, inner_end)` lies within `[outer_start, outer_end)`.
pub(crate) fn range_covers(
    outer_start: &[u8],
    outer_end: &[u8],
    inner_start: &[u8],
    inner_end: &[u8],
) -> bool {
    if inner_start < outer_start {
        return false;
    }
    if outer_end.is_empty() {
        return true;
    }
    !inner_end.is_empty() && inner_end <= outer_end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_not_split_points() {
        assert!(!is_strictly_inside(b"a", b"a", b"z"));
        assert!(!is_strictly_inside(b"z", b"a", b"z"));
        assert!(is_strictly_inside(b"m", b"a", b"z"));
        assert!(is_strictly_inside(b"zz", b"a", b""));
        assert!(!is_strictly_inside(b"", b"", b""));
    }

    #[test]
    fn unbounded_ranges_cover() {
        assert!(range_covers(b"", b"", b"a", b"b"));
        assert!(range_covers(b"a", b"", b"b", b""));
        assert!(!range_covers(b"a", b"m", b"b", b""));
        assert!(!range_covers(b"c", b"m", b"b", b"d"));
        assert!(range_covers(b"a", b"m", b"b", b"m"));
    }
}
