//! Order-independent equality over mirror lists.

/// Key used to order records before a positional comparison.
pub trait SortKey {
    fn sort_key(&self) -> &str;
}

/// Returns true if both lists hold the same records, in any order.
///
/// Both sides are sorted by key with a stable sort, then compared pairwise.
/// The caller's slices are left untouched.
pub fn equal<T>(old: &[T], new: &[T]) -> bool
where
    T: SortKey + PartialEq,
{
    if old.len() != new.len() {
        return false;
    }

    let old = sorted(old);
    let new = sorted(new);
    old.iter().zip(new.iter()).all(|(a, b)| a == b)
}

fn sorted<T: SortKey>(items: &[T]) -> Vec<&T> {
    let mut refs: Vec<&T> = items.iter().collect();
    refs.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    refs
}
