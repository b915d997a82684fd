///
/// Enum Codec
///
/// Enumerations cross the boundary as their ordinal, never as text. Two
/// forms of codec exist:
///
/// - `WireEnum`, implemented by the `wire_enum!` macro, for enumerations
///   known at compile time. Each becomes a closed `#[repr(i32)]` type and
///   decoding is a validated conversion from the wire ordinal.
/// - `EnumTable`, for enumerations described by a schema at run time.
///   Names are interned once per table; decoded values are small `Copy`
///   keys that compare equal when the same table decoded the same ordinal.
///
/// Both forms reject ordinals outside the declared set with
/// `InvalidDiscriminant`. Nothing is ever clamped.
///

use std::sync::atomic::{AtomicU32, Ordering};

use lasso::{Rodeo, Spur};
use indexmap::IndexMap;
use tether_abi::FfiError;

use crate::schema::SchemaError;

pub trait WireEnum: Copy + Eq + Sized + 'static {
    const TYPE_NAME: &'static str;
    /// `(name, ordinal)` in declaration order.
    const VARIANTS: &'static [(&'static str, i32)];

    fn to_ordinal(self) -> i32;

    fn from_ordinal(ordinal: i32) -> Result<Self, FfiError>;

    fn name(self) -> &'static str {
        let ordinal = self.to_ordinal();
        Self::VARIANTS
            .iter()
            .find(|(_, o)| *o == ordinal)
            .map_or("", |(name, _)| *name)
    }

    fn from_name(name: &str) -> Result<Self, FfiError> {
        let ordinal = Self::VARIANTS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, o)| *o)
            .ok_or_else(|| FfiError::UnknownVariant {
                type_name: Self::TYPE_NAME.to_string(),
                name: name.to_string(),
            })?;
        Self::from_ordinal(ordinal)
    }
}

/// Declare a closed enumeration that crosses the boundary by ordinal.
///
/// ```ignore
/// wire_enum! {
///     pub enum SignDisplay { Auto, Never, Always, ExceptZero, Negative }
/// }
/// assert_eq!(SignDisplay::from_ordinal(3)?, SignDisplay::ExceptZero);
/// ```
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident $(= $ordinal:literal)?),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(i32)]
        $vis enum $name {
            $($(#[$vmeta])* $variant $(= $ordinal)?),*
        }

        impl $crate::enums::WireEnum for $name {
            const TYPE_NAME: &'static str = stringify!($name);
            const VARIANTS: &'static [(&'static str, i32)] =
                &[$((stringify!($variant), $name::$variant as i32)),*];

            fn to_ordinal(self) -> i32 {
                self as i32
            }

            fn from_ordinal(ordinal: i32) -> ::std::result::Result<Self, $crate::FfiError> {
                $(
                    if ordinal == $name::$variant as i32 {
                        return Ok($name::$variant);
                    }
                )*
                Err($crate::FfiError::InvalidDiscriminant {
                    type_name: stringify!($name).to_string(),
                    ordinal,
                })
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(<$name as $crate::enums::WireEnum>::name(*self))
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::FfiError;

            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                <$name as $crate::enums::WireEnum>::from_name(s)
            }
        }

        impl $crate::envelope::IntoWire for $name {
            fn lower(
                &self,
                _scope: &mut $crate::memory::CallScope,
                args: &mut ::std::vec::Vec<$crate::WireValue>,
            ) -> ::std::result::Result<(), $crate::FfiError> {
                args.push($crate::WireValue::I32(<$name as $crate::enums::WireEnum>::to_ordinal(*self)));
                Ok(())
            }
        }
    };
}

static NEXT_TABLE_ID: AtomicU32 = AtomicU32::new(0);

/// An enumerator decoded through an `EnumTable`. It belongs to that table:
/// values of two tables never compare equal, and only the issuing table
/// resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumValue {
    table: u32,
    ordinal: i32,
    key: Spur,
}

impl EnumValue {
    pub fn ordinal(self) -> i32 {
        self.ordinal
    }
}

#[derive(Debug)]
pub struct EnumTable {
    id: u32,
    type_name: String,
    names: Rodeo,
    by_ordinal: IndexMap<i32, Spur>,
    by_name: IndexMap<Spur, i32>,
}

impl EnumTable {
    /// Build a table from `(name, ordinal)` entries in declaration order.
    /// An entry without an ordinal takes the previous ordinal plus one,
    /// starting from 0.
    pub fn new<'a>(
        type_name: impl Into<String>,
        entries: impl IntoIterator<Item = (&'a str, Option<i32>)>,
    ) -> Result<Self, SchemaError> {
        let type_name = type_name.into();
        let mut table = EnumTable {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            type_name,
            names: Rodeo::default(),
            by_ordinal: IndexMap::new(),
            by_name: IndexMap::new(),
        };

        let mut next = 0i32;
        for (name, ordinal) in entries {
            let ordinal = ordinal.unwrap_or(next);
            if table.names.contains(name) {
                return Err(SchemaError::DuplicateVariant {
                    enum_name: table.type_name,
                    variant: name.to_string(),
                });
            }
            if table.by_ordinal.contains_key(&ordinal) {
                return Err(SchemaError::DuplicateOrdinal {
                    enum_name: table.type_name,
                    ordinal,
                });
            }
            let key = table.names.get_or_intern(name);
            table.by_ordinal.insert(ordinal, key);
            table.by_name.insert(key, ordinal);
            next = ordinal.wrapping_add(1);
        }
        Ok(table)
    }

    /// Table with ordinals equal to declaration position.
    pub fn sequential<'a>(
        type_name: impl Into<String>,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, SchemaError> {
        EnumTable::new(type_name, names.into_iter().map(|name| (name, None)))
    }

    /// Table mirroring a compile-time enumeration.
    pub fn of<E: WireEnum>() -> Result<Self, SchemaError> {
        EnumTable::new(E::TYPE_NAME, E::VARIANTS.iter().map(|(name, o)| (*name, Some(*o))))
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn len(&self) -> usize {
        self.by_ordinal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_ordinal.is_empty()
    }

    pub fn to_ordinal(&self, name: &str) -> Result<i32, FfiError> {
        self.value(name).map(EnumValue::ordinal)
    }

    pub fn value(&self, name: &str) -> Result<EnumValue, FfiError> {
        self.names
            .get(name)
            .and_then(|key| {
                Some(EnumValue {
                    table: self.id,
                    ordinal: *self.by_name.get(&key)?,
                    key,
                })
            })
            .ok_or_else(|| FfiError::UnknownVariant {
                type_name: self.type_name.clone(),
                name: name.to_string(),
            })
    }

    pub fn from_ordinal(&self, ordinal: i32) -> Result<EnumValue, FfiError> {
        self.by_ordinal
            .get(&ordinal)
            .map(|key| EnumValue {
                table: self.id,
                ordinal,
                key: *key,
            })
            .ok_or_else(|| FfiError::InvalidDiscriminant {
                type_name: self.type_name.clone(),
                ordinal,
            })
    }

    /// Whether `value` was issued by this table.
    pub fn owns(&self, value: EnumValue) -> bool {
        value.table == self.id
    }

    /// Name of `value`. A value issued by another table is
    /// `InvalidDiscriminant` for this one.
    pub fn resolve(&self, value: EnumValue) -> Result<&str, FfiError> {
        if !self.owns(value) {
            return Err(FfiError::InvalidDiscriminant {
                type_name: self.type_name.clone(),
                ordinal: value.ordinal,
            });
        }
        Ok(self.names.resolve(&value.key))
    }

    /// Enumerators in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.by_ordinal
            .iter()
            .map(|(ordinal, key)| (self.names.resolve(key), *ordinal))
    }
}
