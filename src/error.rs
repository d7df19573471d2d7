use std::fmt;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum Error {
    /// Occurs when strict type checks are enabled and a slot holds a representation that isn't
    /// valid for the requested wire type.
    BadValue {
        expected: &'static str,
        actual: String,
    },
    /// Occurs when converting a 64-bit value to the double-safe numeric form would lose
    /// precision and data-loss checks are enabled.
    DataLoss { value: String },
    /// Repeated-field element access went beyond the end of the backing array while index
    /// checks are enabled.
    IndexOutOfBounds { index: usize, len: usize },
    /// A field number was zero or above the maximum allowed field number.
    BadFieldNumber { field_number: u64 },
    /// Accumulated skip distances pushed a decoded field number past the maximum.
    FieldNumberOverflow { field_number: u64 },
    /// A mutating operation was attempted on a container that has already been frozen.
    Frozen { op: &'static str },
    /// A character in a compact descriptor string isn't a valid base-92 digit.
    BadDigit { ch: char },
    /// A digit appeared where a type tag was expected, but isn't in any type range.
    BadTypeTag { digit: u8 },
    /// A modifier digit appeared with no preceding type tag.
    DanglingModifier { digit: u8 },
    /// A modifier digit at or above the defined flag ceiling was chained with another
    /// modifier digit.
    MalformedModifier { digit: u8 },
    /// A MESSAGE/GROUP/MAP field had no submessage descriptor provider left to consume.
    MissingProvider { field_number: u32 },
    /// More submessage descriptor providers were supplied than the descriptor consumed.
    UnusedProviders { count: usize },
    /// The digit stream ended in the middle of a field description.
    TruncatedDescriptor { at: &'static str },
    /// A single-field descriptor fragment had digits left over after the field was read.
    TrailingDigits { digit: u8 },
    /// The serialized container text wasn't valid JSON.
    BadJson(String),
    /// The serialized container text parsed, but the top level wasn't an array.
    NotAnArray,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::BadValue {
                expected,
                ref actual,
            } => write!(f, "Expected {} representation, got {}", expected, actual),
            Error::DataLoss { ref value } => write!(
                f,
                "Value {} cannot be represented as a double without precision loss",
                value
            ),
            Error::IndexOutOfBounds { index, len } => write!(
                f,
                "Element index {} out of bounds for repeated field of length {}",
                index, len
            ),
            Error::BadFieldNumber { field_number } => {
                write!(f, "Invalid field number {}", field_number)
            }
            Error::FieldNumberOverflow { field_number } => write!(
                f,
                "Decoded field number {} exceeds the maximum field number",
                field_number
            ),
            Error::Frozen { op } => write!(f, "Cannot {} a frozen container", op),
            Error::BadDigit { ch } => write!(f, "Character {:?} is not a base-92 digit", ch),
            Error::BadTypeTag { digit } => write!(f, "Digit {} is not a valid type tag", digit),
            Error::DanglingModifier { digit } => {
                write!(f, "Modifier digit {} has no preceding type tag", digit)
            }
            Error::MalformedModifier { digit } => {
                write!(f, "Modifier digit {} is above the flag ceiling", digit)
            }
            Error::MissingProvider { field_number } => write!(
                f,
                "No submessage descriptor provider supplied for field {}",
                field_number
            ),
            Error::UnusedProviders { count } => write!(
                f,
                "{} submessage descriptor providers were never consumed",
                count
            ),
            Error::TruncatedDescriptor { at } => {
                write!(f, "Descriptor digits ended early on step [{}]", at)
            }
            Error::TrailingDigits { digit } => write!(
                f,
                "Single-field descriptor has trailing digit {} after the field",
                digit
            ),
            Error::BadJson(ref err) => write!(f, "Container text is not valid JSON: {}", err),
            Error::NotAnArray => f.write_str("Container text must be a JSON array"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::BadJson(e.to_string())
    }
}
