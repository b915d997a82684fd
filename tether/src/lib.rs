//!
//! tether - Host-Side Marshaling Runtime
//!
//! Generated bindings call into a native module through this crate. Each
//! binding method follows the same shape:
//!
//! 1. Encode arguments into a `CallScope`: strings and slices become
//!    scratch regions, enums become ordinals, objects become handles.
//! 2. Invoke one export through the `Runtime`.
//! 3. Decode the return: a scalar slot, a `ReceiveBuffer` envelope, an out
//!    struct, or text drained from a write buffer.
//! 4. Wrap returned handles as `OwnedObject`s and attach lifetime edges to
//!    every input the result borrows from.
//!
//! ```ignore
//! pub fn create(rt: &Runtime, year: i32, month: u8, day: u8) -> Result<Date, FfiError> {
//!     const LAYOUT: EnvelopeLayout = EnvelopeLayout::leading(FieldLayout::PTR, FieldLayout::ENUM);
//!     let buf = ReceiveBuffer::new(rt, LAYOUT)?;
//!     rt.call_void(&rt.export_name("Date", "create"), &[buf.arg(), year.into(), month.into(), day.into()])?;
//!     let handle = buf.decode_result::<_, CalendarError>(|p| p.object(0, Date::TYPE_NAME))?;
//!     Date::wrap(rt, handle, Ownership::Owned, Edges::new())
//! }
//! ```
//!
//! Everything runs on one thread. Objects are `Rc`-shared, cleanup is tied
//! to `Drop`, and no two native calls are ever in flight on one module.
//!

pub mod config;
pub mod edges;
pub mod enums;
pub mod envelope;
pub mod logging;
pub mod memory;
pub mod ownership;
pub mod runtime;
pub mod schema;
pub mod slices;
pub mod strings;

pub use config::{
    AbiConfig, ConfigError, LoggingConfig, RuntimeConfig, StringsConfig, Utf8Policy, parse_config,
    parse_config_str,
};
pub use edges::{Anchor, Anchored, Edges, attach};
pub use enums::{EnumTable, EnumValue, WireEnum};
pub use envelope::{
    Envelope, FailureCode, IntoWire, OutStruct, Payload, RawPayload, ReceiveBuffer, receive_struct,
};
pub use logging::init_logging;
pub use memory::{CallScope, MemoryStats, ScratchRegion};
pub use ownership::{ForeignObject, OwnedObject, Ownership};
pub use runtime::Runtime;
pub use schema::{ResultShape, SchemaError, SchemaRegistry};
pub use slices::{Primitive, read_slice};
pub use strings::{ForeignSlice, read_str16, read_str8, retain_str8, with_write};

pub use tether_abi::{
    EnvelopeLayout, Failure, FfiError, FieldLayout, FlagPlacement, Handle, NativeModule,
    RuntimeExports, WireValue,
};
