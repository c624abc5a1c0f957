use std::cmp::Ordering;

/// Order two portal version identifiers the way the portal numbers them:
/// plain integer ids compare numerically, dotted ids compare as decimals,
/// anything else falls back to lexicographic order.
pub fn compare_version_ids(a: &str, b: &str) -> Ordering {
    if let (Ok(left), Ok(right)) = (a.parse::<u64>(), b.parse::<u64>()) {
        return left.cmp(&right);
    }

    if let (Ok(left), Ok(right)) = (a.parse::<f64>(), b.parse::<f64>()) {
        if let Some(ordering) = left.partial_cmp(&right) {
            return ordering;
        }
    }

    a.cmp(b)
}

/// Most recent first.
pub fn sort_version_ids_desc(ids: &mut [String]) {
    ids.sort_by(|left, right| compare_version_ids(right, left));
}
