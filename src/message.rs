//! Field storage kernel.
//!
//! [`Message`] is the single choke point every field operation passes through. Generated
//! accessor classes (external to this crate) translate symbolic field names to field
//! numbers and call in here; each typed operation resolves the pivot branch in the
//! container, then hands the slot to the matching [`WireCodec`]. Callers never see the
//! pivot or the message offset.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::coerce::WireCodec;
use crate::container::Container;
use crate::error::{Error, Result};
use crate::policy::Policy;
use crate::value::{SharedArr, Value};

pub struct Message {
    container: Container,
    policy: Policy,
    /// Memoized sub-message wrappers, keyed by field number. Reference stability is
    /// load-bearing: repeated reads of an unchanged sub-message field must return the
    /// identical wrapper instance.
    wrappers: RefCell<HashMap<u32, Rc<dyn Any>>>,
}

impl Message {
    pub fn new(reserved_id: bool, suggested_pivot: i32, policy: Policy) -> Message {
        Message::from_container(Container::new(reserved_id, suggested_pivot), policy)
    }

    /// Attach to an existing backing array (typically freshly parsed wire data).
    pub fn attach(
        arr: SharedArr,
        reserved_id: bool,
        suggested_pivot: i32,
        policy: Policy,
    ) -> Message {
        Message::from_container(Container::attach(arr, reserved_id, suggested_pivot), policy)
    }

    /// Parse the canonical textual form.
    pub fn parse(
        text: &str,
        reserved_id: bool,
        suggested_pivot: i32,
        policy: Policy,
    ) -> Result<Message> {
        Ok(Message::from_container(
            Container::parse(text, reserved_id, suggested_pivot)?,
            policy,
        ))
    }

    fn from_container(container: Container, policy: Policy) -> Message {
        Message {
            container,
            policy,
            wrappers: RefCell::new(HashMap::new()),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn policy(&self) -> Policy {
        self.policy
    }

    pub fn has_field(&self, field: u32) -> Result<bool> {
        self.container.has_slot(field)
    }

    /// Read a singular field. Absent fields read as `None`.
    pub fn get<C: WireCodec>(&self, field: u32) -> Result<Option<C::Value>> {
        match self.container.get_slot(field)? {
            Some(raw) => Ok(Some(C::decode(&raw, self.policy)?)),
            None => Ok(None),
        }
    }

    /// Read a singular field, substituting `default` when absent.
    pub fn get_with_default<C: WireCodec>(
        &self,
        field: u32,
        default: C::Value,
    ) -> Result<C::Value> {
        Ok(self.get::<C>(field)?.unwrap_or(default))
    }

    /// Write a singular field in its canonical wire form.
    pub fn set<C: WireCodec>(&self, field: u32, value: C::Value) -> Result<()> {
        self.wrappers.borrow_mut().remove(&field);
        self.container.set_slot(field, C::encode(value, self.policy)?)
    }

    pub fn clear_field(&self, field: u32) -> Result<()> {
        self.wrappers.borrow_mut().remove(&field);
        self.container.clear_slot(field)
    }

    fn check_mut(&self, op: &'static str) -> Result<()> {
        if self.container.is_frozen() {
            return Err(Error::Frozen { op });
        }
        Ok(())
    }

    /// The repeated field's backing array, if the slot holds one.
    fn repeated_arr(&self, field: u32) -> Result<Option<SharedArr>> {
        match self.container.get_slot(field)? {
            Some(Value::Arr(arr)) => Ok(Some(arr)),
            Some(other) if self.policy.type_checks => Err(Error::BadValue {
                expected: "repeated field array",
                actual: other.kind().to_string(),
            }),
            _ => Ok(None),
        }
    }

    /// The repeated field's backing array, materializing an empty one on first write.
    fn repeated_arr_mut(&self, field: u32) -> Result<SharedArr> {
        if let Some(arr) = self.repeated_arr(field)? {
            return Ok(arr);
        }
        let arr: SharedArr = Rc::new(RefCell::new(Vec::new()));
        self.container.set_slot(field, Value::Arr(arr.clone()))?;
        Ok(arr)
    }

    /// Lazy read-through view over a repeated field. Not a copy: later writes through this
    /// message are visible through the view.
    pub fn get_repeated<C: WireCodec>(&self, field: u32) -> Result<RepeatedField<C>> {
        Ok(RepeatedField {
            arr: self.repeated_arr(field)?,
            policy: self.policy,
            _codec: PhantomData,
        })
    }

    pub fn repeated_count(&self, field: u32) -> Result<usize> {
        Ok(self.repeated_arr(field)?.map_or(0, |arr| arr.borrow().len()))
    }

    pub fn get_element<C: WireCodec>(&self, field: u32, index: usize) -> Result<C::Value> {
        self.get_repeated::<C>(field)?.get(index)
    }

    pub fn add_element<C: WireCodec>(&self, field: u32, value: C::Value) -> Result<()> {
        self.check_mut("add to")?;
        let arr = self.repeated_arr_mut(field)?;
        let raw = C::encode(value, self.policy)?;
        arr.borrow_mut().push(raw);
        Ok(())
    }

    pub fn add_all_elements<C: WireCodec>(
        &self,
        field: u32,
        values: impl IntoIterator<Item = C::Value>,
    ) -> Result<()> {
        self.check_mut("add to")?;
        let arr = self.repeated_arr_mut(field)?;
        for value in values {
            let raw = C::encode(value, self.policy)?;
            arr.borrow_mut().push(raw);
        }
        Ok(())
    }

    /// Overwrite one element. Out-of-range indexes fail with index checks on; with them
    /// off the array is padded with nulls out to the index.
    pub fn set_element<C: WireCodec>(
        &self,
        field: u32,
        index: usize,
        value: C::Value,
    ) -> Result<()> {
        self.check_mut("write element of")?;
        let arr = self.repeated_arr_mut(field)?;
        let raw = C::encode(value, self.policy)?;
        let mut arr = arr.borrow_mut();
        if index >= arr.len() {
            if self.policy.index_checks {
                return Err(Error::IndexOutOfBounds {
                    index,
                    len: arr.len(),
                });
            }
            arr.resize(index + 1, Value::Null);
        }
        arr[index] = raw;
        Ok(())
    }

    /// Read a sub-message field, wrapping the nested container through `ctor` and
    /// memoizing the wrapper so repeated reads return the identical instance.
    pub fn get_message_field<W: Any>(
        &self,
        field: u32,
        ctor: impl FnOnce(SharedArr) -> W,
    ) -> Result<Option<Rc<W>>> {
        if let Some(cached) = self.wrappers.borrow().get(&field) {
            if let Ok(wrapper) = cached.clone().downcast::<W>() {
                return Ok(Some(wrapper));
            }
        }
        let arr = match self.container.get_slot(field)? {
            None => return Ok(None),
            Some(Value::Arr(arr)) => arr,
            Some(other) if self.policy.type_checks => {
                return Err(Error::BadValue {
                    expected: "message field array",
                    actual: other.kind().to_string(),
                })
            }
            Some(_) => return Ok(None),
        };
        let wrapper = Rc::new(ctor(arr));
        self.wrappers
            .borrow_mut()
            .insert(field, wrapper.clone() as Rc<dyn Any>);
        Ok(Some(wrapper))
    }

    /// Store a sub-message by its raw backing array.
    pub fn set_message_field(&self, field: u32, raw: SharedArr) -> Result<()> {
        self.wrappers.borrow_mut().remove(&field);
        self.container.set_slot(field, Value::Arr(raw))
    }

    /// New builder-side message: scalar data shared, every repeated-field array (and the
    /// bucket and its arrays) duplicated, wrapper cache empty. Sub-message values are not
    /// copied; they are already immutable.
    pub fn shallow_copy(&self) -> Message {
        Message::from_container(self.container.shallow_copy(), self.policy)
    }

    /// Freeze the backing container; all mutators fail loudly afterwards.
    pub fn freeze(&self) {
        self.container.freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.container.is_frozen()
    }

    pub fn serialize(&self) -> Result<String> {
        self.container.serialize()
    }

    pub fn equals(&self, other: &Message) -> bool {
        self.container.equals(&other.container)
    }

    pub fn hash_code(&self) -> Result<u32> {
        self.container.hash_code()
    }
}

/// Lazy read-through view over one repeated field.
pub struct RepeatedField<C: WireCodec> {
    arr: Option<SharedArr>,
    policy: Policy,
    _codec: PhantomData<C>,
}

impl<C: WireCodec> RepeatedField<C> {
    pub fn len(&self) -> usize {
        self.arr.as_ref().map_or(0, |arr| arr.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode one element. Out-of-range reads fail with index checks on, else yield the
    /// wire type's zero value.
    pub fn get(&self, index: usize) -> Result<C::Value> {
        let raw = self
            .arr
            .as_ref()
            .and_then(|arr| arr.borrow().get(index).cloned());
        match raw {
            Some(raw) => C::decode(&raw, self.policy),
            None => {
                if self.policy.index_checks {
                    Err(Error::IndexOutOfBounds {
                        index,
                        len: self.len(),
                    })
                } else {
                    Ok(C::zero())
                }
            }
        }
    }

    /// Decode the whole field into an owned vector.
    pub fn to_vec(&self) -> Result<Vec<C::Value>> {
        let mut out = Vec::with_capacity(self.len());
        for index in 0..self.len() {
            out.push(self.get(index)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{BoolCodec, Int32Codec, Int64Codec, StringCodec};

    const STRICT: Policy = Policy::strict();

    #[test]
    fn typed_round_trip_across_pivot() {
        let msg = Message::new(false, 2, STRICT);
        msg.set::<BoolCodec>(1, true).unwrap();
        msg.set::<StringCodec>(5, "far".to_string()).unwrap();
        msg.set::<Int64Codec>(9, i64::MAX).unwrap();
        assert_eq!(msg.get::<BoolCodec>(1).unwrap(), Some(true));
        assert_eq!(msg.get::<StringCodec>(5).unwrap(), Some("far".to_string()));
        assert_eq!(msg.get::<Int64Codec>(9).unwrap(), Some(i64::MAX));
        assert!(msg.has_field(9).unwrap());
        assert!(!msg.has_field(2).unwrap());
    }

    #[test]
    fn defaults_and_clear() {
        let msg = Message::new(false, 0, STRICT);
        assert_eq!(msg.get::<Int32Codec>(1).unwrap(), None);
        assert_eq!(msg.get_with_default::<Int32Codec>(1, 7).unwrap(), 7);
        msg.set::<Int32Codec>(1, 3).unwrap();
        assert_eq!(msg.get_with_default::<Int32Codec>(1, 7).unwrap(), 3);
        msg.clear_field(1).unwrap();
        assert_eq!(msg.get::<Int32Codec>(1).unwrap(), None);
    }

    #[test]
    fn repeated_view_reads_through() {
        let msg = Message::new(false, 0, STRICT);
        msg.add_element::<Int32Codec>(4, 1).unwrap();
        msg.add_all_elements::<Int32Codec>(4, [2, 3]).unwrap();
        let view = msg.get_repeated::<Int32Codec>(4).unwrap();
        assert_eq!(view.to_vec().unwrap(), vec![1, 2, 3]);

        // The view is not a copy; later writes show through it.
        msg.add_element::<Int32Codec>(4, 4).unwrap();
        assert_eq!(view.len(), 4);
        assert_eq!(view.get(3).unwrap(), 4);
    }

    #[test]
    fn element_index_policy() {
        let msg = Message::new(false, 0, STRICT);
        msg.add_element::<Int32Codec>(1, 10).unwrap();
        assert_eq!(msg.get_element::<Int32Codec>(1, 0).unwrap(), 10);
        assert!(matches!(
            msg.get_element::<Int32Codec>(1, 5),
            Err(Error::IndexOutOfBounds { index: 5, len: 1 })
        ));
        assert!(msg.set_element::<Int32Codec>(1, 5, 9).is_err());

        let lax = Message::new(false, 0, Policy::lenient());
        assert_eq!(lax.get_element::<Int32Codec>(1, 5).unwrap(), 0);
        lax.set_element::<Int32Codec>(1, 2, 9).unwrap();
        assert_eq!(lax.repeated_count(1).unwrap(), 3);
        assert_eq!(lax.get_element::<Int32Codec>(1, 2).unwrap(), 9);
    }

    #[test]
    fn set_element_in_range() {
        let msg = Message::new(false, 0, STRICT);
        msg.add_all_elements::<StringCodec>(2, ["a".to_string(), "b".to_string()])
            .unwrap();
        msg.set_element::<StringCodec>(2, 1, "c".to_string()).unwrap();
        assert_eq!(
            msg.get_repeated::<StringCodec>(2).unwrap().to_vec().unwrap(),
            vec!["a".to_string(), "c".to_string()]
        );
    }

    struct Inner {
        msg: Message,
    }

    fn inner_ctor(arr: SharedArr) -> Inner {
        Inner {
            msg: Message::attach(arr, false, 0, Policy::strict()),
        }
    }

    #[test]
    fn message_wrapper_is_reference_stable() {
        let msg = Message::new(false, 0, STRICT);
        let child = Message::new(false, 0, STRICT);
        child.set::<Int32Codec>(1, 42).unwrap();
        msg.set_message_field(3, child.container().raw()).unwrap();

        let a = msg.get_message_field(3, inner_ctor).unwrap().unwrap();
        let b = msg.get_message_field(3, inner_ctor).unwrap().unwrap();
        assert!(Rc::ptr_eq(&a, &b), "repeated reads must return the same wrapper");
        assert_eq!(a.msg.get::<Int32Codec>(1).unwrap(), Some(42));

        // Overwriting the field invalidates the memoized wrapper.
        let other = Message::new(false, 0, STRICT);
        other.set::<Int32Codec>(1, 7).unwrap();
        msg.set_message_field(3, other.container().raw()).unwrap();
        let c = msg.get_message_field(3, inner_ctor).unwrap().unwrap();
        assert!(!Rc::ptr_eq(&a, &c));
        assert_eq!(c.msg.get::<Int32Codec>(1).unwrap(), Some(7));

        msg.clear_field(3).unwrap();
        assert!(msg.get_message_field(3, inner_ctor).unwrap().is_none());
    }

    #[test]
    fn shallow_copy_isolates_repeated_fields() {
        let msg = Message::new(false, 2, STRICT);
        msg.add_element::<Int32Codec>(1, 1).unwrap();
        msg.add_element::<Int32Codec>(8, 8).unwrap();
        msg.freeze();

        let builder = msg.shallow_copy();
        builder.add_element::<Int32Codec>(1, 2).unwrap();
        builder.add_element::<Int32Codec>(8, 9).unwrap();
        assert_eq!(msg.repeated_count(1).unwrap(), 1);
        assert_eq!(msg.repeated_count(8).unwrap(), 1);
        assert_eq!(builder.repeated_count(1).unwrap(), 2);
        assert_eq!(builder.repeated_count(8).unwrap(), 2);
    }

    #[test]
    fn frozen_message_rejects_all_mutation() {
        let msg = Message::new(false, 0, STRICT);
        msg.add_element::<Int32Codec>(1, 1).unwrap();
        msg.freeze();
        assert!(matches!(
            msg.set::<Int32Codec>(2, 5),
            Err(Error::Frozen { .. })
        ));
        assert!(matches!(
            msg.add_element::<Int32Codec>(1, 2),
            Err(Error::Frozen { .. })
        ));
        assert!(matches!(
            msg.set_element::<Int32Codec>(1, 0, 2),
            Err(Error::Frozen { .. })
        ));
        assert!(matches!(msg.clear_field(1), Err(Error::Frozen { .. })));
        // Reads still work.
        assert_eq!(msg.get_element::<Int32Codec>(1, 0).unwrap(), 1);
    }

    #[test]
    fn serialize_equals_hash() {
        let msg = Message::new(false, 0, STRICT);
        msg.set::<BoolCodec>(1, true).unwrap();
        msg.set::<StringCodec>(2, "hello".to_string()).unwrap();
        assert_eq!(msg.serialize().unwrap(), r#"[true,"hello"]"#);

        let other = Message::parse(r#"[1,"hello"]"#, false, 0, STRICT).unwrap();
        assert!(msg.equals(&other), "true and 1 are the same wire boolean");
        assert_eq!(msg.hash_code().unwrap(), msg.hash_code().unwrap());
    }
}
