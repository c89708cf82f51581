//! Comparison tests between ListContainer and a Vec model.
//!
//! Random operation sequences are applied to both a `ListContainer<dyn Quad>`
//! and a `Vec<u32>` of element ids; after every step the container must
//! traverse exactly like the model in both directions.

use list_container::{impl_element, ListConfig, ListContainer};
use proptest::prelude::*;
use std::cell::Cell;

// ============================================================================
// TEST ELEMENTS
// ============================================================================

thread_local! {
    /// Number of live test elements on this thread
    static LIVE: Cell<isize> = const { Cell::new(0) };
}

fn live() -> isize {
    LIVE.with(|live| live.get())
}

fn track() {
    LIVE.with(|live| live.set(live.get() + 1));
}

trait Quad {
    fn id(&self) -> u32;
}

struct Small {
    id: u32,
}

struct Large {
    id: u32,
    _payload: [u64; 4],
}

impl Small {
    fn new(id: u32) -> Self {
        track();
        Self { id }
    }
}

impl Large {
    fn new(id: u32) -> Self {
        track();
        Self {
            id,
            _payload: [u64::from(id); 4],
        }
    }
}

impl Default for Small {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Default for Large {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Clone for Small {
    fn clone(&self) -> Self {
        Self::new(self.id)
    }
}

impl Drop for Small {
    fn drop(&mut self) {
        LIVE.with(|live| live.set(live.get() - 1));
    }
}

impl Drop for Large {
    fn drop(&mut self) {
        LIVE.with(|live| live.set(live.get() - 1));
    }
}

impl Quad for Small {
    fn id(&self) -> u32 {
        self.id
    }
}

impl Quad for Large {
    fn id(&self) -> u32 {
        self.id
    }
}

impl_element!(dyn Quad: Small, Large);

fn new_list(reserve: usize) -> ListContainer<dyn Quad> {
    ListContainer::with_config(
        ListConfig::new()
            .fit::<Small>()
            .fit::<Large>()
            .reserve(reserve),
    )
}

// ============================================================================
// COMPARISON TESTING INFRASTRUCTURE
// ============================================================================

#[derive(Clone, Debug)]
enum Op {
    Push(u32),
    PushLarge(u32),
    Copy(u32),
    RemoveLast,
    Erase(usize),
    InsertBefore(usize, usize),
    InsertAfter(usize, usize),
    Replace(usize),
    Clear,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (2u32..1000).prop_map(Op::Push),
        2 => (2u32..1000).prop_map(Op::PushLarge),
        1 => (2u32..1000).prop_map(Op::Copy),
        2 => Just(Op::RemoveLast),
        2 => any::<usize>().prop_map(Op::Erase),
        1 => (any::<usize>(), 0usize..6).prop_map(|(at, count)| Op::InsertBefore(at, count)),
        1 => (any::<usize>(), 0usize..6).prop_map(|(at, count)| Op::InsertAfter(at, count)),
        1 => any::<usize>().prop_map(Op::Replace),
        1 => Just(Op::Clear),
    ]
}

/// Applies `op` to both the container and the model.
fn apply(list: &mut ListContainer<dyn Quad>, model: &mut Vec<u32>, op: &Op) {
    match *op {
        Op::Push(id) => {
            list.allocate_with(Small::new(id));
            model.push(id);
        }
        Op::PushLarge(id) => {
            list.allocate_with(Large::new(id));
            model.push(id);
        }
        Op::Copy(id) => {
            let source = Small::new(id);
            list.allocate_and_copy_from(&source);
            model.push(id);
        }
        Op::RemoveLast => {
            if !model.is_empty() {
                list.remove_last();
                model.pop();
            }
        }
        Op::Erase(at) => {
            if !model.is_empty() {
                let at = at % model.len();
                let next = list.erase_and_invalidate_all_pointers(list.position_at(at));
                model.remove(at);
                assert_eq!(next.index(), at);
                assert_eq!(list.at(next).map(|quad| quad.id()), model.get(at).copied());
            }
        }
        Op::InsertBefore(at, count) => {
            let at = at % (model.len() + 1);
            let first =
                list.insert_before_and_invalidate_all_pointers::<Small>(list.position_at(at), count);
            assert_eq!(first.index(), at);
            model.splice(at..at, std::iter::repeat(0).take(count));
        }
        Op::InsertAfter(at, count) => {
            if model.is_empty() {
                let first = list.insert_after_and_invalidate_all_pointers::<Large>(list.end(), count);
                assert_eq!(first, list.begin());
                model.extend(std::iter::repeat(1).take(count));
            } else {
                let at = at % model.len();
                let first =
                    list.insert_after_and_invalidate_all_pointers::<Large>(list.position_at(at), count);
                assert_eq!(first.index(), at + 1);
                model.splice(at + 1..at + 1, std::iter::repeat(1).take(count));
            }
        }
        Op::Replace(at) => {
            if !model.is_empty() {
                let at = at % model.len();
                list.replace_existing_element::<Large>(list.position_at(at));
                model[at] = 1;
            }
        }
        Op::Clear => {
            list.clear();
            model.clear();
        }
    }
}

/// Checks that the container traverses exactly like the model.
fn assert_matches(model: &[u32], list: &ListContainer<dyn Quad>, live_before: isize) {
    assert_eq!(model.len(), list.len());
    assert_eq!(model.is_empty(), list.is_empty());

    let forward: Vec<u32> = list.iter().map(|quad| quad.id()).collect();
    assert_eq!(model, &forward[..]);

    let mut backward: Vec<u32> = list.iter().rev().map(|quad| quad.id()).collect();
    backward.reverse();
    assert_eq!(model, &backward[..]);

    for (index, id) in model.iter().enumerate() {
        assert_eq!(list.element_at(index).id(), *id);
    }
    assert_eq!(list.first().map(|quad| quad.id()), model.first().copied());
    assert_eq!(list.last().map(|quad| quad.id()), model.last().copied());
    assert_eq!(live() - live_before, model.len() as isize);
}

// ============================================================================
// PROPTEST COMPARISON TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn proptest_operation_sequences(
        reserve in 0usize..6,
        ops in prop::collection::vec(op_strategy(), 0..120)
    ) {
        let base = live();
        {
            let mut list = new_list(reserve);
            let mut model: Vec<u32> = Vec::new();
            for op in &ops {
                apply(&mut list, &mut model, op);
                assert_matches(&model, &list, base);
            }
        }
        prop_assert_eq!(live(), base);
    }

    #[test]
    fn proptest_positions_walk_both_ways(
        ids in prop::collection::vec(2u32..1000, 0..80),
        reserve in 1usize..5
    ) {
        let mut list = new_list(reserve);
        for &id in &ids {
            list.allocate_with(Small::new(id));
        }

        let mut forward = Vec::new();
        let mut position = list.begin();
        for _ in 0..list.len() {
            forward.push(list.at(position).unwrap().id());
            list.advance(&mut position);
        }
        prop_assert_eq!(position, list.end());
        prop_assert_eq!(&forward, &ids);

        let mut backward = Vec::new();
        let mut position = list.rbegin();
        for _ in 0..list.len() {
            backward.push(list.at_rev(position).unwrap().id());
            list.advance_rev(&mut position);
        }
        prop_assert_eq!(position, list.rend());
        backward.reverse();
        prop_assert_eq!(&backward, &ids);
    }

    #[test]
    fn proptest_append_keeps_addresses(
        ids in prop::collection::vec(2u32..1000, 1..200),
        removals in 0usize..50
    ) {
        let mut list = new_list(1);
        let mut pointers: Vec<*const Small> = Vec::new();
        for &id in &ids {
            pointers.push(list.allocate_with(Small::new(id)));
        }

        let kept = ids.len().saturating_sub(removals);
        for _ in kept..ids.len() {
            list.remove_last();
        }

        for (pointer, &id) in pointers.iter().zip(&ids).take(kept) {
            prop_assert_eq!(unsafe { (**pointer).id }, id);
        }
        for (index, pointer) in pointers.iter().enumerate().take(kept) {
            let element = list.element_at(index) as *const dyn Quad as *const u8;
            prop_assert_eq!(element, *pointer as *const u8);
        }
    }
}

// ============================================================================
// QUICKCHECK TESTS
// ============================================================================

#[cfg(test)]
mod quickcheck_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[quickcheck]
    fn qc_len_after_allocate(ids: Vec<u32>) -> bool {
        let mut list = new_list(0);
        for &id in &ids {
            list.allocate_with(Small::new(id));
        }
        list.len() == ids.len()
    }

    #[quickcheck]
    fn qc_iter_matches_values(ids: Vec<u32>) -> bool {
        let mut list = new_list(3);
        for &id in &ids {
            list.allocate_with(Large::new(id));
        }
        list.iter().map(|quad| quad.id()).eq(ids.iter().copied())
    }

    #[quickcheck]
    fn qc_reverse_is_reversed_forward(ids: Vec<u32>) -> bool {
        let mut list = new_list(2);
        for &id in &ids {
            list.allocate_with(Small::new(id));
        }
        let mut forward: Vec<u32> = list.iter().map(|quad| quad.id()).collect();
        forward.reverse();
        forward == list.iter().rev().map(|quad| quad.id()).collect::<Vec<_>>()
    }

    #[quickcheck]
    fn qc_remove_last_until_empty(ids: Vec<u32>) -> bool {
        let mut list = new_list(1);
        for &id in &ids {
            list.allocate_with(Small::new(id));
        }
        let mut popped = Vec::new();
        while let Some(last) = list.last() {
            popped.push(last.id());
            list.remove_last();
        }
        popped.reverse();
        popped == ids && list.is_empty()
    }

    #[quickcheck]
    fn qc_erase_front_until_empty(ids: Vec<u32>) -> bool {
        let mut list = new_list(2);
        for &id in &ids {
            list.allocate_with(Small::new(id));
        }
        let mut seen = Vec::new();
        let mut position = list.begin();
        while position != list.end() {
            seen.push(list.at(position).map(|quad| quad.id()));
            position = list.erase_and_invalidate_all_pointers(position);
        }
        seen.into_iter().flatten().eq(ids.iter().copied()) && list.is_empty()
    }

    #[quickcheck]
    fn qc_clear_empties(ids: Vec<u32>) -> bool {
        let mut list = new_list(0);
        for &id in &ids {
            list.allocate_with(Small::new(id));
        }
        list.clear();
        list.is_empty() && list.iter().next().is_none()
    }
}
