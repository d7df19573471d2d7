//! Field descriptors and the compact descriptor codec.
//!
//! A message schema packs into a short base-92 digit string. Field numbers are never
//! stored directly: each field carries only the skip distance from its predecessor, with
//! the common consecutive-field case (skip of one) taking zero digits. After the optional
//! skip digits come one type tag (singular, repeated, or the map sentinel) and, when flag
//! bits are set, one modifier digit. Submessage schemas are not embedded; the decoder
//! consumes one caller-supplied provider per MESSAGE/GROUP/MAP field, in field order.
//!
//! Extensions are never packed into the base string. Each one supplies its own
//! single-field digit fragment through an [`ExtensionRegistry`], since extensions aren't
//! known when the base schema is packed.
//!
//! Structural errors here always raise regardless of [`Policy`][crate::Policy]: a
//! malformed descriptor is a corrupt or incompatible schema, not ordinary bad data.

use std::fmt;
use std::rc::Rc;

use crate::base92::{decode_digit, encode_digit};
use crate::error::{Error, Result};
use crate::MAX_FIELD_NUMBER;

/// Wire field types, numbered as in descriptor protos.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Double = 1,
    Float = 2,
    Int64 = 3,
    Uint64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    Group = 10,
    Message = 11,
    Bytes = 12,
    Uint32 = 13,
    Enum = 14,
    Sfixed32 = 15,
    Sfixed64 = 16,
    Sint32 = 17,
    Sint64 = 18,
}

impl FieldType {
    pub fn from_number(n: u8) -> Option<FieldType> {
        Some(match n {
            1 => FieldType::Double,
            2 => FieldType::Float,
            3 => FieldType::Int64,
            4 => FieldType::Uint64,
            5 => FieldType::Int32,
            6 => FieldType::Fixed64,
            7 => FieldType::Fixed32,
            8 => FieldType::Bool,
            9 => FieldType::String,
            10 => FieldType::Group,
            11 => FieldType::Message,
            12 => FieldType::Bytes,
            13 => FieldType::Uint32,
            14 => FieldType::Enum,
            15 => FieldType::Sfixed32,
            16 => FieldType::Sfixed64,
            17 => FieldType::Sint32,
            18 => FieldType::Sint64,
            _ => return None,
        })
    }

    /// The singular type tag digit.
    fn tag(self) -> u8 {
        self as u8 - 1
    }

    fn from_tag(tag: u8) -> Option<FieldType> {
        FieldType::from_number(tag + 1)
    }

    /// Whether a field of this type consumes a submessage descriptor provider.
    pub fn needs_provider(self) -> bool {
        matches!(self, FieldType::Message | FieldType::Group)
    }
}

// Digit-space partition. 0..=17 singular tags, 18..=35 repeated tags, 36 the map
// sentinel, 37..=52 modifiers, 53..=84 skip digits, 85 the end-of-field-descriptor
// sentinel, 86..=91 reserved.
const REPEATED_TAG_OFFSET: u8 = 18;
const MAP_TAG: u8 = 36;
const MODIFIER_BASE: u8 = 37;
const MODIFIER_SPAN: u8 = 16;
/// Two flag bits are defined; a modifier at or past this value chained with another
/// modifier digit is malformed.
const MODIFIER_CEILING: u8 = 4;
const SKIP_BASE: u8 = 53;
const SKIP_SPAN: u8 = 32;
const SKIP_BITS: u32 = 5;
const END_OF_FIELD: u8 = 85;

const MOD_UNPACKED: u8 = 0b01;
const MOD_INT64_STRING: u8 = 0b10;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum DigitClass {
    Singular(FieldType),
    Repeated(FieldType),
    Map,
    Modifier(u8),
    Skip(u8),
    EndOfField,
    Reserved,
}

fn classify(digit: u8) -> DigitClass {
    if digit < REPEATED_TAG_OFFSET {
        // Singular tags cover the whole type range, so this cannot miss.
        DigitClass::Singular(FieldType::from_tag(digit).unwrap())
    } else if digit < MAP_TAG {
        DigitClass::Repeated(FieldType::from_tag(digit - REPEATED_TAG_OFFSET).unwrap())
    } else if digit == MAP_TAG {
        DigitClass::Map
    } else if digit < MODIFIER_BASE + MODIFIER_SPAN {
        DigitClass::Modifier(digit - MODIFIER_BASE)
    } else if digit < SKIP_BASE + SKIP_SPAN {
        DigitClass::Skip(digit - SKIP_BASE)
    } else if digit == END_OF_FIELD {
        DigitClass::EndOfField
    } else {
        DigitClass::Reserved
    }
}

/// Zero-argument thunk producing a submessage's descriptor. Thunks keep recursive and
/// mutually recursive schemas representable.
pub type DescriptorProvider = Rc<dyn Fn() -> Rc<Descriptor>>;

#[derive(Clone)]
pub struct FieldDescriptor {
    pub field_number: u32,
    pub field_type: FieldType,
    pub repeated: bool,
    /// True for map fields: a repeated entry field whose entry schema comes from the
    /// provider.
    pub map_entry: bool,
    pub extension: bool,
    pub provider: Option<DescriptorProvider>,
    pub unpacked: bool,
    pub int64_as_string: bool,
}

impl FieldDescriptor {
    pub fn singular(field_number: u32, field_type: FieldType) -> FieldDescriptor {
        FieldDescriptor {
            field_number,
            field_type,
            repeated: false,
            map_entry: false,
            extension: false,
            provider: None,
            unpacked: false,
            int64_as_string: false,
        }
    }

    pub fn repeated(field_number: u32, field_type: FieldType) -> FieldDescriptor {
        FieldDescriptor {
            repeated: true,
            ..FieldDescriptor::singular(field_number, field_type)
        }
    }

    pub fn message(field_number: u32, provider: DescriptorProvider) -> FieldDescriptor {
        FieldDescriptor {
            provider: Some(provider),
            ..FieldDescriptor::singular(field_number, FieldType::Message)
        }
    }

    pub fn map(field_number: u32, entry_provider: DescriptorProvider) -> FieldDescriptor {
        FieldDescriptor {
            repeated: true,
            map_entry: true,
            provider: Some(entry_provider),
            ..FieldDescriptor::singular(field_number, FieldType::Message)
        }
    }

    /// Resolve the submessage descriptor, if this field carries one.
    pub fn submessage(&self) -> Option<Rc<Descriptor>> {
        self.provider.as_ref().map(|p| p())
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("field_number", &self.field_number)
            .field("field_type", &self.field_type)
            .field("repeated", &self.repeated)
            .field("map_entry", &self.map_entry)
            .field("extension", &self.extension)
            .field("provider", &self.provider.as_ref().map(|_| "<provider>"))
            .field("unpacked", &self.unpacked)
            .field("int64_as_string", &self.int64_as_string)
            .finish()
    }
}

/// Ordered collection of field descriptors for one message.
#[derive(Clone, Debug, Default)]
pub struct Descriptor {
    fields: Vec<FieldDescriptor>,
}

impl Descriptor {
    pub fn from_fields(fields: Vec<FieldDescriptor>) -> Descriptor {
        Descriptor { fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field(&self, field_number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.field_number == field_number)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Decode a compact descriptor string. `providers` supplies one entry per
    /// MESSAGE/GROUP/MAP field, in ascending field-number order; extension fields arrive
    /// out of band through the registry and are appended after the base fields.
    pub fn decode(
        digits: &str,
        providers: &[DescriptorProvider],
        extensions: Option<&ExtensionRegistry>,
    ) -> Result<Descriptor> {
        let mut cursor = Digits::new(digits);
        let mut fields = Vec::new();
        let mut last_field: u64 = 0;
        let mut next_provider = 0;

        while let Some(first) = cursor.next()? {
            let mut digit = first;
            let mut skip: u64 = 0;
            let mut shift: u32 = 0;
            while let DigitClass::Skip(bits) = classify(digit) {
                if shift > 30 {
                    return Err(Error::FieldNumberOverflow {
                        field_number: skip | ((bits as u64) << shift),
                    });
                }
                skip |= (bits as u64) << shift;
                shift += SKIP_BITS;
                digit = cursor
                    .next()?
                    .ok_or(Error::TruncatedDescriptor { at: "skip" })?;
            }
            // No skip digits, or an explicit zero, both mean the next consecutive field.
            let field_number = last_field + if skip == 0 { 1 } else { skip };
            if field_number > MAX_FIELD_NUMBER as u64 {
                return Err(Error::FieldNumberOverflow { field_number });
            }

            let (field_type, repeated, map_entry) = match classify(digit) {
                DigitClass::Singular(t) => (t, false, false),
                DigitClass::Repeated(t) => (t, true, false),
                DigitClass::Map => (FieldType::Message, true, true),
                DigitClass::Modifier(_) => {
                    return Err(Error::DanglingModifier { digit });
                }
                _ => return Err(Error::BadTypeTag { digit }),
            };

            let provider = if map_entry || field_type.needs_provider() {
                let provider = providers.get(next_provider).ok_or(Error::MissingProvider {
                    field_number: field_number as u32,
                })?;
                next_provider += 1;
                Some(provider.clone())
            } else {
                None
            };

            let (unpacked, int64_as_string) = decode_modifier(&mut cursor)?;

            fields.push(FieldDescriptor {
                field_number: field_number as u32,
                field_type,
                repeated,
                map_entry,
                extension: false,
                provider,
                unpacked,
                int64_as_string,
            });
            last_field = field_number;
        }

        if next_provider < providers.len() {
            return Err(Error::UnusedProviders {
                count: providers.len() - next_provider,
            });
        }

        if let Some(registry) = extensions {
            for entry in registry.entries() {
                fields.push(decode_extension_field(entry)?);
            }
        }

        Ok(Descriptor { fields })
    }

    /// Encode the non-extension fields back into a compact descriptor string. Fields must
    /// be in ascending field-number order.
    pub fn encode(&self) -> Result<String> {
        let mut out = String::new();
        let mut last_field: u64 = 0;
        for field in self.fields.iter().filter(|f| !f.extension) {
            let field_number = field.field_number as u64;
            if field.field_number == 0
                || field.field_number > MAX_FIELD_NUMBER
                || field_number <= last_field
            {
                return Err(Error::BadFieldNumber { field_number });
            }
            let mut skip = field_number - last_field;
            if skip != 1 {
                while skip > 0 {
                    out.push(encode_digit(SKIP_BASE + (skip & 0x1f) as u8));
                    skip >>= SKIP_BITS;
                }
            }
            push_field_digits(&mut out, field);
            last_field = field_number;
        }
        Ok(out)
    }
}

/// Emit a field's tag and optional modifier digit.
fn push_field_digits(out: &mut String, field: &FieldDescriptor) {
    let tag = if field.map_entry {
        MAP_TAG
    } else if field.repeated {
        field.field_type.tag() + REPEATED_TAG_OFFSET
    } else {
        field.field_type.tag()
    };
    out.push(encode_digit(tag));
    let bits = (field.unpacked as u8) * MOD_UNPACKED
        + (field.int64_as_string as u8) * MOD_INT64_STRING;
    if bits != 0 {
        out.push(encode_digit(MODIFIER_BASE + bits));
    }
}

/// Encode one field as a standalone fragment (tag plus optional modifier, no skip), the
/// form extension registries carry.
pub fn encode_single_field(field: &FieldDescriptor) -> String {
    let mut out = String::new();
    push_field_digits(&mut out, field);
    out
}

fn decode_modifier(cursor: &mut Digits) -> Result<(bool, bool)> {
    let bits = match cursor.peek()? {
        Some(digit) => match classify(digit) {
            DigitClass::Modifier(bits) => {
                cursor.next()?;
                if bits >= MODIFIER_CEILING {
                    if let Some(following) = cursor.peek()? {
                        if matches!(classify(following), DigitClass::Modifier(_)) {
                            return Err(Error::MalformedModifier { digit });
                        }
                    }
                }
                bits
            }
            _ => return Ok((false, false)),
        },
        None => return Ok((false, false)),
    };
    Ok((bits & MOD_UNPACKED != 0, bits & MOD_INT64_STRING != 0))
}

fn decode_extension_field(entry: &ExtensionEntry) -> Result<FieldDescriptor> {
    if entry.field_number == 0 || entry.field_number > MAX_FIELD_NUMBER {
        return Err(Error::BadFieldNumber {
            field_number: entry.field_number as u64,
        });
    }
    let mut cursor = Digits::new(&entry.digits);
    let digit = cursor
        .next()?
        .ok_or(Error::TruncatedDescriptor { at: "extension tag" })?;
    let (field_type, repeated, map_entry) = match classify(digit) {
        DigitClass::Singular(t) => (t, false, false),
        DigitClass::Repeated(t) => (t, true, false),
        DigitClass::Map => (FieldType::Message, true, true),
        DigitClass::Modifier(_) => return Err(Error::DanglingModifier { digit }),
        _ => return Err(Error::BadTypeTag { digit }),
    };
    if (map_entry || field_type.needs_provider()) && entry.provider.is_none() {
        return Err(Error::MissingProvider {
            field_number: entry.field_number,
        });
    }
    let (unpacked, int64_as_string) = decode_modifier(&mut cursor)?;
    if let Some(digit) = cursor.next()? {
        return Err(Error::TrailingDigits { digit });
    }
    Ok(FieldDescriptor {
        field_number: entry.field_number,
        field_type,
        repeated,
        map_entry,
        extension: true,
        provider: entry.provider.clone(),
        unpacked,
        int64_as_string,
    })
}

/// Out-of-band extension schema fragments, walked in registration order.
#[derive(Clone, Default)]
pub struct ExtensionRegistry {
    entries: Vec<ExtensionEntry>,
}

#[derive(Clone)]
pub struct ExtensionEntry {
    pub field_number: u32,
    pub digits: String,
    pub provider: Option<DescriptorProvider>,
}

impl ExtensionRegistry {
    pub fn new() -> ExtensionRegistry {
        ExtensionRegistry::default()
    }

    pub fn register(
        &mut self,
        field_number: u32,
        digits: impl Into<String>,
        provider: Option<DescriptorProvider>,
    ) {
        self.entries.push(ExtensionEntry {
            field_number,
            digits: digits.into(),
            provider,
        });
    }

    pub fn entries(&self) -> &[ExtensionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cursor over a digit string, decoding one character at a time.
struct Digits<'a> {
    iter: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Digits<'a> {
    fn new(digits: &'a str) -> Digits<'a> {
        Digits {
            iter: digits.chars().peekable(),
        }
    }

    fn next(&mut self) -> Result<Option<u8>> {
        self.iter.next().map(decode_digit).transpose()
    }

    fn peek(&mut self) -> Result<Option<u8>> {
        self.iter.peek().copied().map(decode_digit).transpose()
    }
}
