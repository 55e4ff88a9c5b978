use crate::key::PriorityKey;

/// Last component of the placeholder keys handed out when there is no
/// integer gap to insert into (`0.5`, `1.1.5`).
pub const HALF_STEP: u64 = 5;

/// Key for an item inserted at `position` of `ordered`, the current
/// ascending order with the moving item already removed.
///
/// Only the moving item receives a key; neighbours are never renumbered, so
/// the result can equal an existing key (`[1],[2],[3]` at position 1 yields
/// `2`). Callers tolerate such ties.
pub fn allocate_insertion_key<I>(ordered: &[(I, PriorityKey)], position: usize) -> PriorityKey {
    let (Some((_, first)), Some((_, last))) = (ordered.first(), ordered.last()) else {
        return PriorityKey::root_key(1);
    };

    if position == 0 {
        if first.root() > 1 {
            return PriorityKey::root_key(first.root() - 1);
        }
        return PriorityKey::root_key(0).child(HALF_STEP);
    }

    if position >= ordered.len() {
        return PriorityKey::root_key(last.root().saturating_add(1));
    }

    let before = &ordered[position - 1].1;
    let after = &ordered[position].1;

    if before.root() != after.root() {
        return PriorityKey::root_key(before.root().saturating_add(1));
    }

    if before.depth() == after.depth() {
        return before.with_last_incremented();
    }

    PriorityKey::root_key(before.root())
        .child(before.component(1).unwrap_or(1))
        .child(HALF_STEP)
}
