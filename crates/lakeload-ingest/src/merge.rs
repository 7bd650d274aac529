//! Merge planning
//!
//! Computes what a partition contributes to the store as a set difference
//! against keys already stored. Planning only reads; the engine applies the
//! plan inside the partition's transaction.

use crate::error::Result;
use crate::records::{ItemKey, OrderItemRecord, OrderRecord};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Membership test against a set of stored keys
pub trait KeyLookup<K: ?Sized> {
    fn contains_key(&self, key: &K) -> Result<bool>;
}

impl<K, Q> KeyLookup<Q> for HashSet<K>
where
    K: Borrow<Q> + Eq + Hash,
    Q: Eq + Hash + ?Sized,
{
    fn contains_key(&self, key: &Q) -> Result<bool> {
        Ok(self.contains(key))
    }
}

/// Fact rows to insert for one partition
#[derive(Debug, Default)]
pub struct FactMerge<'a> {
    pub new_records: Vec<&'a OrderRecord>,
    /// Incoming rows whose key is already stored
    pub overlapping: usize,
    /// Keys repeated inside the partition; the first occurrence was kept
    pub duplicate_keys: Vec<String>,
    pub null_keys: usize,
}

impl FactMerge<'_> {
    /// Keys this partition inserts
    pub fn new_keys(&self) -> HashSet<String> {
        self.new_records
            .iter()
            .filter_map(|r| r.order_id.clone())
            .collect()
    }
}

/// `incoming - existing` by primary key
pub fn plan_fact_merge<'a, L>(incoming: &'a [OrderRecord], existing: &L) -> Result<FactMerge<'a>>
where
    L: KeyLookup<str> + ?Sized,
{
    let mut merge = FactMerge::default();
    let mut seen: HashSet<&str> = HashSet::with_capacity(incoming.len());

    for record in incoming {
        let Some(key) = record.order_id.as_deref() else {
            merge.null_keys += 1;
            continue;
        };
        if !seen.insert(key) {
            merge.duplicate_keys.push(key.to_string());
            continue;
        }
        if existing.contains_key(key)? {
            merge.overlapping += 1;
        } else {
            merge.new_records.push(record);
        }
    }

    Ok(merge)
}

/// Dependent rows to insert alongside a set of owners
#[derive(Debug, Default)]
pub struct DependentMerge<'a> {
    pub new_records: Vec<&'a OrderItemRecord>,
    /// Candidates whose owner is not in scope
    pub without_owner: usize,
    /// Candidates whose composite key is already stored
    pub already_stored: usize,
    pub duplicate_keys: usize,
}

/// Restrict candidates to in-scope owners, then anti-join against stored
/// dependents by full composite key.
pub fn plan_dependent_merge<'a, I, O, E>(
    candidates: I,
    owners: &O,
    existing: &E,
) -> Result<DependentMerge<'a>>
where
    I: IntoIterator<Item = &'a OrderItemRecord>,
    O: KeyLookup<str> + ?Sized,
    E: KeyLookup<ItemKey> + ?Sized,
{
    let mut merge = DependentMerge::default();
    let mut seen = HashSet::new();

    for item in candidates {
        let (Some(owner), Some(key)) = (item.owner(), item.key()) else {
            merge.without_owner += 1;
            continue;
        };
        if !owners.contains_key(owner)? {
            merge.without_owner += 1;
            continue;
        }
        if existing.contains_key(&key)? {
            merge.already_stored += 1;
            continue;
        }
        if !seen.insert(key) {
            merge.duplicate_keys += 1;
            continue;
        }
        merge.new_records.push(item);
    }

    Ok(merge)
}

/// Positions of dependent records grouped by owner key
#[derive(Debug, Default)]
pub struct OwnerIndex {
    by_owner: HashMap<String, Vec<usize>>,
}

impl OwnerIndex {
    pub fn build(items: &[OrderItemRecord]) -> Self {
        let mut by_owner: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, item) in items.iter().enumerate() {
            if let Some(owner) = item.owner() {
                by_owner.entry(owner.to_string()).or_default().push(position);
            }
        }
        Self { by_owner }
    }

    /// Dependents of the given owners, `items` being the slice the index was built from
    pub fn candidates<'a>(
        &'a self,
        items: &'a [OrderItemRecord],
        owners: impl IntoIterator<Item = &'a str> + 'a,
    ) -> impl Iterator<Item = &'a OrderItemRecord> + 'a {
        owners
            .into_iter()
            .filter_map(|owner| self.by_owner.get(owner))
            .flatten()
            .filter_map(|position| items.get(*position))
    }

    pub fn owner_count(&self) -> usize {
        self.by_owner.len()
    }
}
