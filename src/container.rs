//! The message container.
//!
//! One message is an ordered, 0-indexed array of slots, one slot per low-numbered field,
//! optionally terminated by a single extension bucket holding every field at or above the
//! pivot. The pivot is fixed when a container attaches to its backing array and is never
//! recomputed. All field routing happens here: a field number resolves to either a direct
//! slot (`adjusted_index < pivot`) or a bucket key (the unadjusted field number), and that
//! choice must be externally invisible.

use std::cell::Cell;
use std::cmp;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::value::{SharedArr, SharedBucket, Value};
use crate::MAX_FIELD_NUMBER;

/// Pivot sentinel for containers that never spill into a bucket.
const UNBOUNDED: i64 = i64::MAX;

#[derive(Debug)]
pub struct Container {
    arr: SharedArr,
    /// 0 when slot 0 is reserved for an out-of-band message id, else -1.
    message_offset: i32,
    /// Adjusted-index threshold separating direct slots from the bucket.
    pivot: i64,
    frozen: Cell<bool>,
    hash: Cell<Option<u32>>,
}

impl Container {
    /// Attach to a backing array, fixing the pivot.
    ///
    /// If the array already ends in a bucket object, that slot is the bucket and the pivot
    /// sits right on it. Otherwise a positive `suggested_pivot` is honored, clamped so it
    /// can never land inside the existing array. With no suggestion the pivot is
    /// unbounded and the container will never create a bucket.
    pub fn attach(arr: SharedArr, reserved_id: bool, suggested_pivot: i32) -> Container {
        let message_offset: i32 = if reserved_id { 0 } else { -1 };
        let len = arr.borrow().len() as i64;
        let has_bucket = arr.borrow().last().map_or(false, Value::is_ext);
        let pivot = if has_bucket {
            len - 1
        } else if suggested_pivot > 0 {
            cmp::max(suggested_pivot as i64, len - message_offset as i64)
        } else {
            UNBOUNDED
        };
        Container {
            arr,
            message_offset,
            pivot,
            frozen: Cell::new(false),
            hash: Cell::new(None),
        }
    }

    /// Fresh container over an empty array.
    pub fn new(reserved_id: bool, suggested_pivot: i32) -> Container {
        Container::attach(
            Rc::new(std::cell::RefCell::new(Vec::new())),
            reserved_id,
            suggested_pivot,
        )
    }

    /// Parse the canonical textual form. The top level must be a JSON array.
    pub fn parse(text: &str, reserved_id: bool, suggested_pivot: i32) -> Result<Container> {
        let value: Value = serde_json::from_str(text)?;
        match value {
            Value::Arr(arr) => Ok(Container::attach(arr, reserved_id, suggested_pivot)),
            _ => Err(Error::NotAnArray),
        }
    }

    pub(crate) fn from_parts(arr: SharedArr, message_offset: i32, pivot: i64) -> Container {
        Container {
            arr,
            message_offset,
            pivot,
            frozen: Cell::new(false),
            hash: Cell::new(None),
        }
    }

    pub fn message_offset(&self) -> i32 {
        self.message_offset
    }

    /// The backing array handle. Cloning the handle aliases the same storage.
    pub fn raw(&self) -> SharedArr {
        self.arr.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    /// Mark the container frozen. Every mutating operation afterwards fails with
    /// [`Error::Frozen`] instead of corrupting shared state.
    pub fn freeze(&self) {
        self.frozen.set(true);
    }

    fn check_field(&self, field: u32) -> Result<()> {
        if field == 0 || field > MAX_FIELD_NUMBER {
            return Err(Error::BadFieldNumber {
                field_number: field as u64,
            });
        }
        Ok(())
    }

    fn adjusted_index(&self, field: u32) -> i64 {
        field as i64 + self.message_offset as i64
    }

    /// The trailing bucket, if it has been materialized.
    pub(crate) fn bucket(&self) -> Option<SharedBucket> {
        self.arr.borrow().last().and_then(|v| v.as_ext().cloned())
    }

    /// Materialize the bucket at the pivot slot, padding with nulls up to it.
    fn ensure_bucket(&self) -> SharedBucket {
        if let Some(bucket) = self.bucket() {
            return bucket;
        }
        let mut arr = self.arr.borrow_mut();
        while (arr.len() as i64) < self.pivot {
            arr.push(Value::Null);
        }
        let bucket: SharedBucket = Rc::new(std::cell::RefCell::new(BTreeMap::new()));
        arr.push(Value::Ext(bucket.clone()));
        bucket
    }

    /// Read a field's slot. Absent and null slots both read as `None`.
    pub fn get_slot(&self, field: u32) -> Result<Option<Value>> {
        self.check_field(field)?;
        let index = self.adjusted_index(field);
        if index < self.pivot {
            let arr = self.arr.borrow();
            Ok(arr
                .get(index as usize)
                .filter(|v| !v.is_null())
                .cloned())
        } else {
            Ok(self.bucket().and_then(|bucket| {
                bucket
                    .borrow()
                    .get(&field)
                    .filter(|v| !v.is_null())
                    .cloned()
            }))
        }
    }

    pub fn has_slot(&self, field: u32) -> Result<bool> {
        Ok(self.get_slot(field)?.is_some())
    }

    /// Write a field's slot, extending the main sequence or materializing the bucket as
    /// needed.
    pub fn set_slot(&self, field: u32, value: Value) -> Result<()> {
        if self.frozen.get() {
            return Err(Error::Frozen { op: "write" });
        }
        self.check_field(field)?;
        let index = self.adjusted_index(field);
        if index < self.pivot {
            let mut arr = self.arr.borrow_mut();
            let index = index as usize;
            if index >= arr.len() {
                arr.resize(index + 1, Value::Null);
            }
            arr[index] = value;
        } else {
            self.ensure_bucket().borrow_mut().insert(field, value);
        }
        Ok(())
    }

    /// Clear a field. Direct slots are nulled in place so later fields keep their
    /// positions; bucket entries are removed outright.
    pub fn clear_slot(&self, field: u32) -> Result<()> {
        if self.frozen.get() {
            return Err(Error::Frozen { op: "clear" });
        }
        self.check_field(field)?;
        let index = self.adjusted_index(field);
        if index < self.pivot {
            let mut arr = self.arr.borrow_mut();
            let index = index as usize;
            if index < arr.len() {
                arr[index] = Value::Null;
            }
        } else if let Some(bucket) = self.bucket() {
            bucket.borrow_mut().remove(&field);
        }
        Ok(())
    }

    /// New container sharing scalar data, with every slot's array (and the bucket and its
    /// arrays) duplicated one level deep. Values inside those arrays stay shared, so
    /// already-built sub-messages are not copied. The pivot and offset carry over.
    pub fn shallow_copy(&self) -> Container {
        let src = self.arr.borrow();
        let copied: Vec<Value> = src.iter().map(copy_slot).collect();
        Container::from_parts(
            Rc::new(std::cell::RefCell::new(copied)),
            self.message_offset,
            self.pivot,
        )
    }

    /// Canonical textual form: a JSON array with the bucket, if any, as one trailing JSON
    /// object keyed by decimal field numbers.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(&Value::Arr(self.arr.clone()))?)
    }

    /// Lazily computed hash of the serialized form, memoized for the container's lifetime.
    /// Containers are logically immutable once exposed, so one computation suffices.
    pub fn hash_code(&self) -> Result<u32> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash);
        }
        let text = self.serialize()?;
        let mut hash: u32 = 0;
        for ch in text.chars() {
            hash = hash.wrapping_mul(31).wrapping_add(ch as u32);
        }
        self.hash.set(Some(hash));
        Ok(hash)
    }

    /// Wire equivalence with another container (encoding-tolerant, both directions).
    pub fn equals(&self, other: &Container) -> bool {
        crate::equiv::arrays_equivalent(&self.arr, &other.arr)
    }
}

fn copy_slot(v: &Value) -> Value {
    match v {
        Value::Arr(a) => Value::arr(a.borrow().clone()),
        Value::Ext(b) => {
            let copied: BTreeMap<u32, Value> = b
                .borrow()
                .iter()
                .map(|(k, v)| match v {
                    Value::Arr(a) => (*k, Value::arr(a.borrow().clone())),
                    other => (*k, other.clone()),
                })
                .collect();
            Value::ext(copied)
        }
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arr(values: Vec<Value>) -> SharedArr {
        Rc::new(std::cell::RefCell::new(values))
    }

    #[test]
    fn routes_below_and_above_pivot() {
        let c = Container::attach(arr(vec![]), false, 3);
        c.set_slot(2, Value::Num(20.0)).unwrap();
        c.set_slot(10, Value::Num(100.0)).unwrap();
        assert_eq!(c.get_slot(2).unwrap(), Some(Value::Num(20.0)));
        assert_eq!(c.get_slot(10).unwrap(), Some(Value::Num(100.0)));

        // Field 2 landed in the main sequence, field 10 in the bucket at the pivot slot.
        let raw = c.raw();
        let raw = raw.borrow();
        assert_eq!(raw.len(), 4);
        assert!(raw[1].is_num());
        assert!(raw[3].is_ext());
        assert_eq!(
            raw[3].as_ext().unwrap().borrow().get(&10),
            Some(&Value::Num(100.0))
        );
    }

    #[test]
    fn storage_location_is_invisible() {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let field: u32 = rng.gen_range(1..200);
            let pivot: i32 = rng.gen_range(0..50);
            let reserved_id = rng.gen_bool(0.5);
            let c = Container::attach(arr(vec![]), reserved_id, pivot);
            c.set_slot(field, Value::Num(field as f64)).unwrap();
            assert_eq!(
                c.get_slot(field).unwrap(),
                Some(Value::Num(field as f64)),
                "field {} pivot {} reserved {}",
                field,
                pivot,
                reserved_id
            );
            assert!(c.has_slot(field).unwrap());
            c.clear_slot(field).unwrap();
            assert_eq!(c.get_slot(field).unwrap(), None);
        }
    }

    #[test]
    fn unbounded_pivot_never_creates_bucket() {
        let c = Container::attach(arr(vec![]), false, 0);
        c.set_slot(500, Value::Bool(true)).unwrap();
        assert_eq!(c.get_slot(500).unwrap(), Some(Value::Bool(true)));
        assert!(c.bucket().is_none());
        assert_eq!(c.raw().borrow().len(), 500);
    }

    #[test]
    fn attaches_to_existing_bucket() {
        let mut map = BTreeMap::new();
        map.insert(7u32, Value::Str("ext".to_string()));
        let c = Container::attach(
            arr(vec![Value::Num(1.0), Value::ext(map)]),
            false,
            0,
        );
        // Last slot is the bucket, so the pivot sits on it: field 2 (index 1) routes there.
        assert_eq!(c.get_slot(1).unwrap(), Some(Value::Num(1.0)));
        assert_eq!(c.get_slot(7).unwrap(), Some(Value::Str("ext".to_string())));
        c.set_slot(2, Value::Bool(true)).unwrap();
        assert_eq!(c.get_slot(2).unwrap(), Some(Value::Bool(true)));
        assert_eq!(c.raw().borrow().len(), 2, "bucket write must not grow the array");
    }

    #[test]
    fn suggested_pivot_clamps_to_existing_length() {
        // Array of 4 with offset -1 covers fields 1..=5 in main; a suggestion of 2 cannot
        // shrink that.
        let c = Container::attach(
            arr(vec![
                Value::Num(1.0),
                Value::Num(2.0),
                Value::Num(3.0),
                Value::Num(4.0),
            ]),
            false,
            2,
        );
        assert_eq!(c.get_slot(4).unwrap(), Some(Value::Num(4.0)));
        c.set_slot(5, Value::Num(5.0)).unwrap();
        assert_eq!(c.raw().borrow().len(), 5);
        assert!(c.raw().borrow()[4].is_num());
        // Field 6 is past the clamped pivot and lands in the bucket.
        c.set_slot(6, Value::Num(6.0)).unwrap();
        assert_eq!(c.get_slot(6).unwrap(), Some(Value::Num(6.0)));
        assert!(c.raw().borrow()[5].is_ext());
    }

    #[test]
    fn reserved_id_slot_shifts_indexes() {
        let c = Container::attach(arr(vec![Value::Str("msg-id".to_string())]), true, 0);
        c.set_slot(1, Value::Num(11.0)).unwrap();
        assert_eq!(c.raw().borrow()[0], Value::Str("msg-id".to_string()));
        assert_eq!(c.raw().borrow()[1], Value::Num(11.0));
        assert_eq!(c.get_slot(1).unwrap(), Some(Value::Num(11.0)));
    }

    #[test]
    fn rejects_bad_field_numbers() {
        let c = Container::new(false, 0);
        assert!(matches!(
            c.get_slot(0),
            Err(Error::BadFieldNumber { field_number: 0 })
        ));
        assert!(c.set_slot(MAX_FIELD_NUMBER + 1, Value::Null).is_err());
        assert!(c.set_slot(MAX_FIELD_NUMBER, Value::Bool(true)).is_ok());
    }

    #[test]
    fn frozen_rejects_mutation() {
        let c = Container::new(false, 0);
        c.set_slot(1, Value::Bool(true)).unwrap();
        c.freeze();
        assert!(matches!(
            c.set_slot(2, Value::Bool(false)),
            Err(Error::Frozen { .. })
        ));
        assert!(matches!(c.clear_slot(1), Err(Error::Frozen { .. })));
        assert_eq!(c.get_slot(1).unwrap(), Some(Value::Bool(true)));
    }

    #[test]
    fn serialize_and_parse_round_trip() {
        let c = Container::new(false, 0);
        c.set_slot(1, Value::Bool(true)).unwrap();
        c.set_slot(2, Value::Str("hello".to_string())).unwrap();
        assert_eq!(c.serialize().unwrap(), r#"[true,"hello"]"#);

        let back = Container::parse(r#"[true,"hello"]"#, false, 0).unwrap();
        assert!(back.equals(&c));
        assert!(Container::parse(r#"{"1":true}"#, false, 0).is_err());
        assert!(Container::parse("not json", false, 0).is_err());
    }

    #[test]
    fn serialize_renders_trailing_bucket() {
        let c = Container::attach(arr(vec![]), false, 1);
        c.set_slot(1, Value::Num(5.0)).unwrap();
        c.set_slot(100, Value::Str("x".to_string())).unwrap();
        assert_eq!(c.serialize().unwrap(), r#"[5,{"100":"x"}]"#);
    }

    #[test]
    fn hash_is_memoized_and_stable() {
        let c = Container::parse(r#"[1,"a"]"#, false, 0).unwrap();
        let h1 = c.hash_code().unwrap();
        let h2 = c.hash_code().unwrap();
        assert_eq!(h1, h2);
        let d = Container::parse(r#"[1,"b"]"#, false, 0).unwrap();
        assert_ne!(c.hash_code().unwrap(), d.hash_code().unwrap());
    }

    #[test]
    fn shallow_copy_isolates_arrays() {
        let c = Container::new(false, 0);
        c.set_slot(1, Value::arr(vec![Value::Num(1.0)])).unwrap();
        let copy = c.shallow_copy();
        if let Some(Value::Arr(a)) = copy.get_slot(1).unwrap() {
            a.borrow_mut().push(Value::Num(2.0));
        }
        if let Some(Value::Arr(a)) = c.get_slot(1).unwrap() {
            assert_eq!(a.borrow().len(), 1, "source repeated field must be untouched");
        } else {
            unreachable!();
        }
    }

    #[test]
    fn shallow_copy_isolates_bucket_arrays() {
        let c = Container::attach(arr(vec![]), false, 1);
        c.set_slot(50, Value::arr(vec![Value::Str("a".to_string())]))
            .unwrap();
        let copy = c.shallow_copy();
        if let Some(Value::Arr(a)) = copy.get_slot(50).unwrap() {
            a.borrow_mut().push(Value::Str("b".to_string()));
        }
        if let Some(Value::Arr(a)) = c.get_slot(50).unwrap() {
            assert_eq!(a.borrow().len(), 1);
        } else {
            unreachable!();
        }
    }
}
