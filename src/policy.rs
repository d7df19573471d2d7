//! Runtime check modes.
//!
//! Three orthogonal switches govern how forgiving the runtime is about wire data. They are
//! conventionally decided once at process start and then threaded, by value, through every
//! container and coercion call, so any component holding a [`Policy`] can query each flag
//! independently.

/// The three independently toggleable check modes.
///
/// - `type_checks`: when set, every coercion validates the slot representation and raises
///   [`Error::BadValue`][crate::Error::BadValue] on anything invalid; when clear, invalid
///   inputs are coerced best-effort and reads never fail.
/// - `index_checks`: governs whether out-of-bounds repeated-field element access raises
///   [`Error::IndexOutOfBounds`][crate::Error::IndexOutOfBounds] or returns the wire type's
///   zero value.
/// - `data_loss_checks`: governs whether converting a 64-bit value to the double-safe
///   numeric form raises [`Error::DataLoss`][crate::Error::DataLoss] on precision loss or
///   silently truncates.
///
/// Structural errors in the descriptor codec are never gated by these flags; a corrupt
/// schema always raises.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub type_checks: bool,
    pub index_checks: bool,
    pub data_loss_checks: bool,
}

impl Policy {
    /// All checks on. Reads raise on any invalid representation.
    pub const fn strict() -> Policy {
        Policy {
            type_checks: true,
            index_checks: true,
            data_loss_checks: true,
        }
    }

    /// All checks off. Reads never fail; invalid data is coerced best-effort.
    pub const fn lenient() -> Policy {
        Policy {
            type_checks: false,
            index_checks: false,
            data_loss_checks: false,
        }
    }

    pub const fn with_type_checks(mut self, on: bool) -> Policy {
        self.type_checks = on;
        self
    }

    pub const fn with_index_checks(mut self, on: bool) -> Policy {
        self.index_checks = on;
        self
    }

    pub const fn with_data_loss_checks(mut self, on: bool) -> Policy {
        self.data_loss_checks = on;
        self
    }
}

impl Default for Policy {
    fn default() -> Self {
        Policy::strict()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_are_orthogonal() {
        let p = Policy::lenient().with_data_loss_checks(true);
        assert!(!p.type_checks);
        assert!(!p.index_checks);
        assert!(p.data_loss_checks);

        let p = Policy::strict().with_index_checks(false);
        assert!(p.type_checks);
        assert!(!p.index_checks);
        assert!(p.data_loss_checks);
    }
}
