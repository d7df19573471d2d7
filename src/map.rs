//! Keyed view over a repeated entry field.
//!
//! A map field rides the wire as a repeated field of two-element `[key, value]` entries.
//! [`MapView`] indexes those entries by key at construction, reading every key through the
//! key type's codec so keys in different wire forms (a 64-bit key as `10` or `"10"`)
//! normalize to one map key. Raw wire data may carry duplicate keys; the view tolerates
//! that on reads and self-heals the backing sequence on its first mutation.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::coerce::WireCodec;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::value::{SharedArr, Value};

pub struct MapView<K: WireCodec, V: WireCodec>
where
    K::Value: Eq + Hash,
{
    entries: SharedArr,
    /// Normalized key to entry index. Size mismatch against the backing sequence means
    /// duplicate keys exist in the raw data.
    index: RefCell<HashMap<K::Value, usize>>,
    policy: Policy,
    _value: PhantomData<V>,
}

impl<K: WireCodec, V: WireCodec> MapView<K, V>
where
    K::Value: Eq + Hash + Clone,
{
    /// Build a view over an entry array, indexing every key once. Duplicate keys resolve
    /// to the last entry.
    pub fn new(entries: SharedArr, policy: Policy) -> Result<MapView<K, V>> {
        let mut index = HashMap::new();
        for (i, entry) in entries.borrow().iter().enumerate() {
            index.insert(entry_key::<K>(entry, policy)?, i);
        }
        Ok(MapView {
            entries,
            index: RefCell::new(index),
            policy,
            _value: PhantomData,
        })
    }

    /// Build a view over a map field of a container, materializing the entry array if the
    /// field is absent.
    pub fn over(container: &Container, field: u32, policy: Policy) -> Result<MapView<K, V>> {
        let entries = match container.get_slot(field)? {
            Some(Value::Arr(arr)) => arr,
            Some(other) if policy.type_checks => {
                return Err(Error::BadValue {
                    expected: "map entry array",
                    actual: other.kind().to_string(),
                })
            }
            _ => {
                let arr: SharedArr = Rc::new(RefCell::new(Vec::new()));
                container.set_slot(field, Value::Arr(arr.clone()))?;
                arr
            }
        };
        MapView::new(entries, policy)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.index.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.borrow().is_empty()
    }

    pub fn contains_key(&self, key: &K::Value) -> bool {
        self.index.borrow().contains_key(key)
    }

    pub fn get(&self, key: &K::Value) -> Result<Option<V::Value>> {
        let i = self.index.borrow().get(key).copied();
        match i {
            Some(i) => {
                let entry = self.entries.borrow()[i].clone();
                Ok(Some(entry_value::<V>(&entry, self.policy)?))
            }
            None => Ok(None),
        }
    }

    pub fn keys(&self) -> Vec<K::Value> {
        self.index.borrow().keys().cloned().collect()
    }

    /// Insert or overwrite. Heals first if the raw data carried duplicate keys.
    pub fn insert(&self, key: K::Value, value: V::Value) -> Result<()> {
        self.heal_if_malformed()?;
        let raw_key = K::encode(key.clone(), self.policy)?;
        let raw_value = V::encode(value, self.policy)?;
        let existing = self.index.borrow().get(&key).copied();
        match existing {
            Some(i) => {
                self.entries.borrow_mut()[i] = Value::arr(vec![raw_key, raw_value]);
            }
            None => {
                let mut entries = self.entries.borrow_mut();
                entries.push(Value::arr(vec![raw_key, raw_value]));
                self.index.borrow_mut().insert(key, entries.len() - 1);
            }
        }
        Ok(())
    }

    /// Remove a key. The last entry is swapped into the hole (entry order is not
    /// guaranteed) and only the moved entry is re-indexed.
    pub fn remove(&self, key: &K::Value) -> Result<bool> {
        self.heal_if_malformed()?;
        let i = match self.index.borrow_mut().remove(key) {
            Some(i) => i,
            None => return Ok(false),
        };
        let moved = {
            let mut entries = self.entries.borrow_mut();
            entries.swap_remove(i);
            entries.get(i).cloned()
        };
        if let Some(moved) = moved {
            let moved_key = entry_key::<K>(&moved, self.policy)?;
            self.index.borrow_mut().insert(moved_key, i);
        }
        Ok(true)
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
        self.index.borrow_mut().clear();
    }

    fn heal_if_malformed(&self) -> Result<()> {
        if self.index.borrow().len() == self.entries.borrow().len() {
            return Ok(());
        }
        // Duplicate keys in the raw data: rewrite to one entry per distinct key, last
        // write wins, first occurrence keeps its position.
        let old: Vec<Value> = self.entries.borrow().clone();
        let mut fresh: Vec<Value> = Vec::new();
        let mut index: HashMap<K::Value, usize> = HashMap::new();
        for entry in old {
            let key = entry_key::<K>(&entry, self.policy)?;
            match index.get(&key) {
                Some(&pos) => fresh[pos] = entry,
                None => {
                    index.insert(key, fresh.len());
                    fresh.push(entry);
                }
            }
        }
        *self.entries.borrow_mut() = fresh;
        *self.index.borrow_mut() = index;
        Ok(())
    }
}

fn entry_key<K: WireCodec>(entry: &Value, policy: Policy) -> Result<K::Value> {
    entry_slot::<K>(entry, 0, policy)
}

fn entry_value<V: WireCodec>(entry: &Value, policy: Policy) -> Result<V::Value> {
    entry_slot::<V>(entry, 1, policy)
}

fn entry_slot<C: WireCodec>(entry: &Value, slot: usize, policy: Policy) -> Result<C::Value> {
    match entry {
        Value::Arr(pair) => {
            let raw = pair.borrow().get(slot).cloned().unwrap_or(Value::Null);
            C::decode(&raw, policy)
        }
        other if policy.type_checks => Err(Error::BadValue {
            expected: "map entry array",
            actual: other.kind().to_string(),
        }),
        _ => C::decode(&Value::Null, policy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{Int64Codec, StringCodec};

    const STRICT: Policy = Policy::strict();

    fn entry(key: Value, value: Value) -> Value {
        Value::arr(vec![key, value])
    }

    fn entries(values: Vec<Value>) -> SharedArr {
        Rc::new(RefCell::new(values))
    }

    type StrMap = MapView<StringCodec, Int64Codec>;
    type IntMap = MapView<Int64Codec, StringCodec>;

    #[test]
    fn duplicate_keys_resolve_to_last_write() {
        let raw = entries(vec![
            entry(Value::Str("k".to_string()), Value::Num(1.0)),
            entry(Value::Str("k".to_string()), Value::Num(2.0)),
        ]);
        let map = StrMap::new(raw.clone(), STRICT).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&"k".to_string()).unwrap(), Some(2));
        // The raw sequence still carries both entries until the first mutation.
        assert_eq!(raw.borrow().len(), 2);
    }

    #[test]
    fn mutation_self_heals_duplicates() {
        let raw = entries(vec![
            entry(Value::Str("k".to_string()), Value::Num(1.0)),
            entry(Value::Str("k".to_string()), Value::Num(2.0)),
            entry(Value::Str("other".to_string()), Value::Num(3.0)),
        ]);
        let map = StrMap::new(raw.clone(), STRICT).unwrap();
        map.insert("new".to_string(), 4).unwrap();
        // One entry per distinct key plus the insert.
        assert_eq!(raw.borrow().len(), 3);
        assert_eq!(map.len(), 3);
        assert_eq!(map.get(&"k".to_string()).unwrap(), Some(2));
        assert_eq!(map.get(&"other".to_string()).unwrap(), Some(3));
        assert_eq!(map.get(&"new".to_string()).unwrap(), Some(4));
    }

    #[test]
    fn keys_normalize_across_wire_forms() {
        // A 64-bit key may ride as a number or a decimal string; both index as one key.
        let raw = entries(vec![
            entry(Value::Str("10".to_string()), Value::Str("a".to_string())),
            entry(Value::Num(10.0), Value::Str("b".to_string())),
        ]);
        let map = IntMap::new(raw, STRICT).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&10).unwrap(), Some("b".to_string()));
    }

    #[test]
    fn insert_and_overwrite() {
        let map = StrMap::new(entries(vec![]), STRICT).unwrap();
        assert!(map.is_empty());
        map.insert("a".to_string(), 1).unwrap();
        map.insert("b".to_string(), 2).unwrap();
        map.insert("a".to_string(), 10).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(&"a".to_string()).unwrap(), Some(10));
        assert_eq!(map.get(&"b".to_string()).unwrap(), Some(2));
    }

    #[test]
    fn remove_swaps_last_into_hole() {
        let raw = entries(vec![
            entry(Value::Str("a".to_string()), Value::Num(1.0)),
            entry(Value::Str("b".to_string()), Value::Num(2.0)),
            entry(Value::Str("c".to_string()), Value::Num(3.0)),
        ]);
        let map = StrMap::new(raw.clone(), STRICT).unwrap();
        assert!(map.remove(&"a".to_string()).unwrap());
        assert!(!map.remove(&"a".to_string()).unwrap());
        assert_eq!(raw.borrow().len(), 2);
        // "c" moved into the hole and stayed reachable.
        assert_eq!(map.get(&"c".to_string()).unwrap(), Some(3));
        assert_eq!(map.get(&"b".to_string()).unwrap(), Some(2));
        assert_eq!(map.get(&"a".to_string()).unwrap(), None);
    }

    #[test]
    fn over_container_field_materializes_entries() {
        let container = Container::new(false, 0);
        let map = StrMap::over(&container, 6, STRICT).unwrap();
        map.insert("x".to_string(), 9).unwrap();
        drop(map);
        // The entries landed in the container's slot.
        let again = StrMap::over(&container, 6, STRICT).unwrap();
        assert_eq!(again.get(&"x".to_string()).unwrap(), Some(9));
        assert_eq!(container.serialize().unwrap(), r#"[null,null,null,null,null,[["x",9]]]"#);
    }
}
