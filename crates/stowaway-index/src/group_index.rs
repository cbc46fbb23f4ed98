//! The derived group index: `(owner, group, item)` to carrier keys.
//!
//! Stacks keep their carrier keys in insertion order. That order is the
//! documented tie-break for oldest-first removal when two instances share a
//! creation tick. Empty stacks are dropped eagerly so that the map never
//! holds a key without members.

use std::collections::BTreeMap;

use stowaway_types::{CarrierKey, Group, ItemId, OwnerKey, StackKey};

/// Secondary index over effect instances, grouped by stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupIndex {
    stacks: BTreeMap<StackKey, Vec<CarrierKey>>,
}

impl GroupIndex {
    /// Create an empty group index.
    pub const fn new() -> Self {
        Self {
            stacks: BTreeMap::new(),
        }
    }

    /// Number of non-empty stacks.
    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    /// Whether no stack has any member.
    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }

    /// Append `key` to the end of `stack`. A key already present is left
    /// where it is.
    pub fn insert(&mut self, stack: StackKey, key: CarrierKey) {
        let members = self.stacks.entry(stack).or_default();
        if !members.contains(&key) {
            members.push(key);
        }
    }

    /// Remove `key` from `stack`, dropping the stack once empty.
    ///
    /// Returns whether the key was present.
    pub fn remove(&mut self, stack: &StackKey, key: &CarrierKey) -> bool {
        let Some(members) = self.stacks.get_mut(stack) else {
            return false;
        };
        let before = members.len();
        members.retain(|member| member != key);
        let removed = members.len() != before;
        if members.is_empty() {
            self.stacks.remove(stack);
        }
        removed
    }

    /// Replace `old` with `new` in place, keeping its position in the stack.
    ///
    /// Returns whether `old` was found.
    pub fn replace(&mut self, stack: &StackKey, old: &CarrierKey, new: CarrierKey) -> bool {
        let Some(slot) = self
            .stacks
            .get_mut(stack)
            .and_then(|members| members.iter_mut().find(|member| **member == *old))
        else {
            return false;
        };
        *slot = new;
        true
    }

    /// Carrier keys of `stack`, oldest insertion first.
    pub fn members(&self, stack: &StackKey) -> &[CarrierKey] {
        self.stacks
            .get(stack)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of instances in `stack`.
    pub fn count(&self, stack: &StackKey) -> u32 {
        u32::try_from(self.members(stack).len()).unwrap_or(u32::MAX)
    }

    /// Item to instance count for every non-empty stack of `owner` in `group`.
    pub fn stacks_for(&self, owner: &OwnerKey, group: &Group) -> BTreeMap<ItemId, u32> {
        self.range_for(owner, group)
            .map(|(stack, members)| {
                (
                    stack.item,
                    u32::try_from(members.len()).unwrap_or(u32::MAX),
                )
            })
            .collect()
    }

    /// Every carrier key held by `owner` in `group`, across all items.
    pub fn keys_for(&self, owner: &OwnerKey, group: &Group) -> Vec<CarrierKey> {
        self.range_for(owner, group)
            .flat_map(|(_, members)| members.iter().cloned())
            .collect()
    }

    /// Iterate every stack with its members.
    pub fn iter(&self) -> impl Iterator<Item = (&StackKey, &[CarrierKey])> {
        self.stacks
            .iter()
            .map(|(stack, members)| (stack, members.as_slice()))
    }

    /// Drop every stack.
    pub fn clear(&mut self) {
        self.stacks.clear();
    }

    /// Stacks of one owner in one group. `StackKey` orders by owner, then
    /// group, then item, so this is a contiguous range.
    fn range_for<'a>(
        &'a self,
        owner: &OwnerKey,
        group: &Group,
    ) -> impl Iterator<Item = (&'a StackKey, &'a Vec<CarrierKey>)> + 'a {
        let low = StackKey::new(owner.clone(), group.clone(), ItemId(i32::MIN));
        let high = StackKey::new(owner.clone(), group.clone(), ItemId(i32::MAX));
        self.stacks.range(low..=high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(owner: &str, group: &str, item: i32) -> StackKey {
        StackKey::new(OwnerKey::from(owner), Group::from(group), ItemId(item))
    }

    fn key(n: u32) -> CarrierKey {
        CarrierKey::new(format!("carrier:{n}"))
    }

    #[test]
    fn insert_preserves_order_and_ignores_repeats() {
        let mut groups = GroupIndex::new();
        let s = stack("owner:1", "A", 5);
        groups.insert(s.clone(), key(2));
        groups.insert(s.clone(), key(1));
        groups.insert(s.clone(), key(2));
        assert_eq!(groups.members(&s), &[key(2), key(1)]);
        assert_eq!(groups.count(&s), 2);
    }

    #[test]
    fn removing_last_member_drops_stack() {
        let mut groups = GroupIndex::new();
        let s = stack("owner:1", "A", 5);
        groups.insert(s.clone(), key(1));
        assert!(groups.remove(&s, &key(1)));
        assert!(groups.is_empty());
        assert!(!groups.remove(&s, &key(1)));
    }

    #[test]
    fn replace_keeps_position() {
        let mut groups = GroupIndex::new();
        let s = stack("owner:1", "A", 5);
        groups.insert(s.clone(), key(1));
        groups.insert(s.clone(), key(2));
        assert!(groups.replace(&s, &key(1), key(9)));
        assert_eq!(groups.members(&s), &[key(9), key(2)]);
        assert!(!groups.replace(&s, &key(1), key(10)));
    }

    #[test]
    fn stacks_are_scoped_to_owner_and_group() {
        let mut groups = GroupIndex::new();
        groups.insert(stack("owner:1", "A", 5), key(1));
        groups.insert(stack("owner:1", "A", 5), key(2));
        groups.insert(stack("owner:1", "A", -2), key(3));
        groups.insert(stack("owner:1", "B", 5), key(4));
        groups.insert(stack("owner:2", "A", 5), key(5));

        let stacks = groups.stacks_for(&OwnerKey::from("owner:1"), &Group::from("A"));
        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks.get(&ItemId(5)), Some(&2));
        assert_eq!(stacks.get(&ItemId(-2)), Some(&1));

        let keys = groups.keys_for(&OwnerKey::from("owner:1"), &Group::from("B"));
        assert_eq!(keys, vec![key(4)]);
    }

    #[test]
    fn unknown_stack_is_empty() {
        let groups = GroupIndex::new();
        let s = stack("owner:1", "A", 5);
        assert!(groups.members(&s).is_empty());
        assert_eq!(groups.count(&s), 0);
    }
}
