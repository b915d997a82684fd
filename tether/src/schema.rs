///
/// # Binding Schema
///
/// A JSON description of the enumerations and fallible returns of a
/// module, for hosts that bind at run time instead of through generated
/// code.
///
/// ```json
/// {
///   "enums": {
///     "CalendarError": { "variants": ["Unknown", "OutOfRange", "UnknownEra"] },
///     "Weekday": { "variants": [{ "name": "Monday", "ordinal": 1 }, "Tuesday"] }
///   },
///   "results": {
///     "Date_create": { "ok": "ptr", "err": "CalendarError" },
///     "Locale_region": { "ok": { "size": 8, "align": 4 }, "flag": "trailing" }
///   }
/// }
/// ```
///
/// A result without `err` is an option: the flag means present/absent and
/// the failure branch carries no discriminant.
///

use std::path::Path;

use indexmap::IndexMap;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use tether_abi::{EnvelopeLayout, FieldLayout, FlagPlacement};
use thiserror::Error;

use crate::enums::EnumTable;

#[derive(Debug, Error, Diagnostic)]
pub enum SchemaError {
    #[error("{0}")]
    #[diagnostic(code(tether::schema::io))]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    #[diagnostic(code(tether::schema::json))]
    Json(#[from] serde_json::Error),

    #[error("Enum '{enum_name}' declares '{variant}' more than once")]
    DuplicateVariant { enum_name: String, variant: String },

    #[error("Enum '{enum_name}' declares ordinal {ordinal} more than once")]
    DuplicateOrdinal { enum_name: String, ordinal: i32 },

    #[error("Result '{export}' refers to unknown error enum '{enum_name}'")]
    #[diagnostic(
        code(tether::schema::unknown_error_enum),
        help("declare the enum under \"enums\" before using it as an error")
    )]
    UnknownErrorEnum { export: String, enum_name: String },

    #[error("Result '{export}' has an invalid layout: {reason}")]
    InvalidLayout { export: String, reason: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum VariantSpec {
    Name(String),
    Explicit { name: String, ordinal: i32 },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnumSpec {
    pub variants: Vec<VariantSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LayoutSpec {
    Named(String),
    Explicit { size: u32, align: u32 },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagSpec {
    #[default]
    Leading,
    Trailing,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultSpec {
    pub ok: LayoutSpec,
    #[serde(default)]
    pub err: Option<String>,
    #[serde(default)]
    pub flag: FlagSpec,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub enums: IndexMap<String, EnumSpec>,
    #[serde(default)]
    pub results: IndexMap<String, ResultSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultShape<'a> {
    pub layout: EnvelopeLayout,
    /// Error enumeration, `None` for option returns.
    pub err: Option<&'a str>,
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    enums: IndexMap<String, EnumTable>,
    results: IndexMap<String, (EnvelopeLayout, Option<String>)>,
}

fn named_layout(name: &str) -> Option<FieldLayout> {
    Some(match name {
        "empty" => FieldLayout::EMPTY,
        "bool" => FieldLayout::BOOL,
        "u8" | "i8" => FieldLayout::U8,
        "u16" | "i16" => FieldLayout::U16,
        "u32" | "i32" => FieldLayout::U32,
        "u64" | "i64" => FieldLayout::U64,
        "f32" => FieldLayout::F32,
        "f64" => FieldLayout::F64,
        "ptr" => FieldLayout::PTR,
        "enum" => FieldLayout::ENUM,
        "slice" => FieldLayout::SLICE,
        _ => return None,
    })
}

fn resolve_layout(export: &str, spec: &LayoutSpec) -> Result<FieldLayout, SchemaError> {
    match spec {
        LayoutSpec::Named(name) => named_layout(name).ok_or_else(|| SchemaError::InvalidLayout {
            export: export.to_string(),
            reason: format!("unknown layout '{}'", name),
        }),
        LayoutSpec::Explicit { size, align } => {
            if !tether_abi::is_valid_align(*align) {
                return Err(SchemaError::InvalidLayout {
                    export: export.to_string(),
                    reason: format!("alignment {} is not a power of two", align),
                });
            }
            Ok(FieldLayout::new(*size, *align))
        }
    }
}

impl SchemaRegistry {
    pub fn from_json(content: &str) -> Result<Self, SchemaError> {
        let file: SchemaFile = serde_json::from_str(content)?;
        SchemaRegistry::from_file(&file)
    }

    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        let content = std::fs::read_to_string(path)?;
        SchemaRegistry::from_json(&content)
    }

    pub fn from_file(file: &SchemaFile) -> Result<Self, SchemaError> {
        let mut registry = SchemaRegistry::default();

        for (name, spec) in &file.enums {
            let entries = spec.variants.iter().map(|v| match v {
                VariantSpec::Name(name) => (name.as_str(), None),
                VariantSpec::Explicit { name, ordinal } => (name.as_str(), Some(*ordinal)),
            });
            registry.enums.insert(name.clone(), EnumTable::new(name.as_str(), entries)?);
        }

        for (export, spec) in &file.results {
            let ok = resolve_layout(export, &spec.ok)?;
            let err = match &spec.err {
                Some(enum_name) if !registry.enums.contains_key(enum_name) => {
                    return Err(SchemaError::UnknownErrorEnum {
                        export: export.clone(),
                        enum_name: enum_name.clone(),
                    });
                }
                Some(_) => FieldLayout::ENUM,
                None => FieldLayout::EMPTY,
            };
            let placement = match spec.flag {
                FlagSpec::Leading => FlagPlacement::Leading,
                FlagSpec::Trailing => FlagPlacement::Trailing,
            };
            let layout = EnvelopeLayout::try_with_placement(placement, ok, err).ok_or_else(|| {
                SchemaError::InvalidLayout {
                    export: export.clone(),
                    reason: format!("payload of {} bytes does not fit in a receive buffer", ok.size),
                }
            })?;
            registry.results.insert(export.clone(), (layout, spec.err.clone()));
        }

        tracing::debug!(
            enums = registry.enums.len(),
            results = registry.results.len(),
            "schema loaded"
        );
        Ok(registry)
    }

    pub fn enum_table(&self, name: &str) -> Option<&EnumTable> {
        self.enums.get(name)
    }

    pub fn result(&self, export: &str) -> Option<ResultShape<'_>> {
        self.results.get(export).map(|(layout, err)| ResultShape {
            layout: *layout,
            err: err.as_deref(),
        })
    }

    /// Error table of a fallible export.
    pub fn error_table(&self, export: &str) -> Option<&EnumTable> {
        self.result(export)?.err.and_then(|name| self.enum_table(name))
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumTable> {
        self.enums.values()
    }
}
