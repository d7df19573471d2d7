//! arraypb is a runtime for protobuf-like messages stored as sparse, order-sensitive
//! JSON arrays, together with a compact schema codec that describes a message's field
//! layout in a handful of bytes.
//!
//! The pieces:
//!
//! - A field-storage kernel ([`Message`] over [`Container`]): every field lives either in
//!   a dense positional slot or in a trailing extension bucket, decided once per
//!   container by a fixed pivot. Every get/set/add/clear routes through that single
//!   branch, and the storage location is externally invisible.
//! - Wire value coercion: one [`WireCodec`] per scalar type, normalizing the multiple
//!   encodings the wire format allows (booleans as `1`/`0`, 64-bit integers as decimal
//!   strings, non-finite doubles as sentinel strings), in either strict or best-effort
//!   mode per [`Policy`].
//! - A compact descriptor codec: field schemas packed into base-92 digit strings
//!   ([`Descriptor`]), with field numbers carried as skip distances and submessage
//!   schemas resolved through caller-supplied providers.
//! - Wire equivalence ([`equivalent`]): deep equality over containers that treats every
//!   valid encoding of a value as the same value.
//! - A self-healing map view ([`MapView`]) over repeated `[key, value]` entry fields.
//!
//! Containers are built, frozen, and then shared; a frozen container rejects mutation.
//! Everything is single-threaded and synchronous: no locks, no suspension points, and
//! every failure surfaces immediately as an [`Error`].

mod base92;
mod bytes;
mod coerce;
mod container;
mod descriptor;
mod equiv;
mod error;
mod map;
mod message;
mod policy;
mod value;

pub use self::bytes::ByteData;
pub use self::coerce::{
    BoolCodec, BytesCodec, DoubleCodec, EnumCodec, FloatCodec, Int32Codec, Int52Codec,
    Int64Codec, StringCodec, Uint32Codec, Uint52Codec, Uint64Codec, WireCodec,
};
pub use self::container::Container;
pub use self::descriptor::{
    encode_single_field, Descriptor, DescriptorProvider, ExtensionEntry, ExtensionRegistry,
    FieldDescriptor, FieldType,
};
pub use self::equiv::{arrays_equivalent, equivalent};
pub use self::error::{Error, Result};
pub use self::map::MapView;
pub use self::message::{Message, RepeatedField};
pub use self::policy::Policy;
pub use self::value::{SharedArr, SharedBucket, Value};

/// The largest permitted field number, 2^29 - 1.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;
