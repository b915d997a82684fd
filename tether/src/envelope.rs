///
/// # Result/Option Envelope Decoder
///
/// A fallible or optional native call writes its result into a receive
/// buffer the host allocates beforehand and passes as the first argument.
/// The buffer holds a one-byte flag and, at a fixed offset, a union of the
/// success payload and the failure discriminant:
///
/// ```text
///  leading (default)            trailing (C layout)
///  +------+-----+---------+     +---------+------+-----+
///  | flag | pad | payload |     | payload | flag | pad |
///  +------+-----+---------+     +---------+------+-----+
/// ```
///
/// The offsets come from an `EnvelopeLayout` computed at compile time per
/// return type. Decoding snapshots the flag and payload bytes, frees the
/// buffer, then builds the host value from the snapshot, so the buffer is
/// freed exactly once on both branches and before any payload handle is
/// wrapped.
///
/// ## Forms
///
/// - `decode_result::<T, E>`: failure becomes `FfiError::OperationFailed`
/// - `into_result::<T, E>`: failure stays a value, `Ok(Err(e))`
/// - `decode_option`: absent is `Ok(None)`
/// - `decode_envelope`: untyped, for schema-driven callers
///

use tether_abi::{
    EnvelopeLayout, Failure, FfiError, FieldLayout, Handle, WireValue, read_bytes, read_f64, read_i32,
    read_i64, read_u16, read_u32, read_u8,
};

use crate::edges::Edges;
use crate::enums::{EnumTable, EnumValue, WireEnum};
use crate::memory::{CallScope, ScratchRegion};
use crate::runtime::Runtime;
use crate::strings::ForeignSlice;

/// Payload bytes of a decoded envelope, read by offset from its start.
#[derive(Debug, Clone, Copy)]
pub struct Payload<'a> {
    bytes: &'a [u8],
}

impl<'a> Payload<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Payload { bytes }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn bool(&self, offset: u32) -> Result<bool, FfiError> {
        Ok(read_u8(self.bytes, offset)? != 0)
    }

    pub fn u8(&self, offset: u32) -> Result<u8, FfiError> {
        read_u8(self.bytes, offset)
    }

    pub fn u16(&self, offset: u32) -> Result<u16, FfiError> {
        read_u16(self.bytes, offset)
    }

    pub fn i32(&self, offset: u32) -> Result<i32, FfiError> {
        read_i32(self.bytes, offset)
    }

    pub fn u32(&self, offset: u32) -> Result<u32, FfiError> {
        read_u32(self.bytes, offset)
    }

    pub fn i64(&self, offset: u32) -> Result<i64, FfiError> {
        read_i64(self.bytes, offset)
    }

    pub fn f64(&self, offset: u32) -> Result<f64, FfiError> {
        read_f64(self.bytes, offset)
    }

    pub fn handle(&self, offset: u32) -> Result<Option<Handle>, FfiError> {
        self.u32(offset).map(Handle::new)
    }

    /// A handle that must not be null.
    pub fn object(&self, offset: u32, type_name: &str) -> Result<Handle, FfiError> {
        self.handle(offset)?.ok_or_else(|| FfiError::NullHandle {
            type_name: type_name.to_string(),
        })
    }

    pub fn slice(&self, offset: u32) -> Result<ForeignSlice, FfiError> {
        Ok(ForeignSlice {
            addr: self.u32(offset)?,
            len: self.u32(offset + 4)?,
        })
    }

    pub fn enum_value<E: WireEnum>(&self, offset: u32) -> Result<E, FfiError> {
        E::from_ordinal(self.i32(offset)?)
    }

    /// Failure discriminant at the start of the payload.
    pub fn discriminant(&self) -> Result<i32, FfiError> {
        self.i32(0)
    }

    /// A nested struct at `offset`.
    pub fn at(&self, offset: u32) -> Result<Payload<'a>, FfiError> {
        self.bytes
            .get(offset as usize..)
            .map(Payload::new)
            .ok_or(FfiError::OutOfBounds {
                addr: offset,
                len: 0,
                memory_size: self.bytes.len(),
            })
    }
}

/// Owned copy of a payload, from `decode_envelope`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(pub Vec<u8>);

impl RawPayload {
    pub fn view(&self) -> Payload<'_> {
        Payload::new(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    Enum(EnumValue),
    Code(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Success(RawPayload),
    Failure(FailureCode),
}

fn failure_of<E: WireEnum>(err: E) -> Failure {
    Failure {
        type_name: E::TYPE_NAME.to_string(),
        variant: err.name().to_string(),
        ordinal: err.to_ordinal(),
    }
}

/// Host-owned receive buffer for one call.
#[derive(Debug)]
pub struct ReceiveBuffer {
    region: ScratchRegion,
    layout: EnvelopeLayout,
}

impl ReceiveBuffer {
    pub fn new(rt: &Runtime, layout: EnvelopeLayout) -> Result<Self, FfiError> {
        let region = ScratchRegion::new(rt, layout.size, layout.align)?;
        Ok(ReceiveBuffer { region, layout })
    }

    pub fn addr(&self) -> u32 {
        self.region.addr()
    }

    /// The buffer address as the call's leading argument.
    pub fn arg(&self) -> WireValue {
        self.region.arg()
    }

    pub fn layout(&self) -> EnvelopeLayout {
        self.layout
    }

    /// Copy out the flag and payload, then free the buffer.
    fn take(self) -> Result<(bool, Vec<u8>), FfiError> {
        let ReceiveBuffer { region, layout } = self;
        let base = region.addr();
        let snapshot = region.runtime().with_memory(|mem| {
            let flag = read_u8(mem, base + layout.flag_offset)?;
            let payload = read_bytes(mem, base + layout.payload_offset, layout.payload_size())?;
            Ok((flag, payload.to_vec()))
        });
        let released = region.release();
        let (flag, payload) = snapshot?;
        released?;
        match flag {
            0 => Ok((false, payload)),
            1 => Ok((true, payload)),
            other => Err(FfiError::InvalidDiscriminant {
                type_name: "flag".to_string(),
                ordinal: other as i32,
            }),
        }
    }

    /// Decode a `Result<T, E>` return. A failure is `OperationFailed`
    /// carrying `E`'s enumerator.
    pub fn decode_result<T, E: WireEnum>(
        self,
        ok: impl FnOnce(&Payload<'_>) -> Result<T, FfiError>,
    ) -> Result<T, FfiError> {
        match self.into_result::<T, E>(ok)? {
            Ok(value) => Ok(value),
            Err(err) => Err(FfiError::OperationFailed(failure_of(err))),
        }
    }

    /// Decode a `Result<T, E>` return, keeping a domain failure as a value.
    pub fn into_result<T, E: WireEnum>(
        self,
        ok: impl FnOnce(&Payload<'_>) -> Result<T, FfiError>,
    ) -> Result<Result<T, E>, FfiError> {
        let (success, bytes) = self.take()?;
        let payload = Payload::new(&bytes);
        if success {
            ok(&payload).map(Ok)
        } else {
            let err = E::from_ordinal(payload.discriminant()?)?;
            tracing::debug!(failure = %failure_of(err), "failure envelope");
            Ok(Err(err))
        }
    }

    pub fn decode_option<T>(
        self,
        some: impl FnOnce(&Payload<'_>) -> Result<T, FfiError>,
    ) -> Result<Option<T>, FfiError> {
        let (present, bytes) = self.take()?;
        if present {
            some(&Payload::new(&bytes)).map(Some)
        } else {
            Ok(None)
        }
    }

    /// Untyped decode. With a table, the failure discriminant is validated
    /// against it; without one it is reported as a bare code.
    pub fn decode_envelope(self, errors: Option<&EnumTable>) -> Result<Envelope, FfiError> {
        let (success, bytes) = self.take()?;
        if success {
            return Ok(Envelope::Success(RawPayload(bytes)));
        }
        let code = Payload::new(&bytes).discriminant()?;
        let failure = match errors {
            Some(table) => FailureCode::Enum(table.from_ordinal(code)?),
            None => FailureCode::Code(code),
        };
        Ok(Envelope::Failure(failure))
    }
}

/// A struct returned by value through an out buffer.
pub trait OutStruct: Sized {
    const LAYOUT: FieldLayout;

    /// Build from the struct's bytes. `edges` are the sources any borrowed
    /// field must keep alive.
    fn read(payload: &Payload<'_>, edges: &Edges) -> Result<Self, FfiError>;
}

/// Allocate an out buffer for `S`, let `call` fill it, and decode it.
pub fn receive_struct<S: OutStruct>(
    rt: &Runtime,
    edges: &Edges,
    call: impl FnOnce(WireValue) -> Result<(), FfiError>,
) -> Result<S, FfiError> {
    let region = ScratchRegion::new(rt, S::LAYOUT.size, S::LAYOUT.align)?;
    call(region.arg())?;
    let bytes = rt.with_memory(|mem| Ok(read_bytes(mem, region.addr(), S::LAYOUT.size)?.to_vec()));
    let released = region.release();
    let bytes = bytes?;
    released?;
    S::read(&Payload::new(&bytes), edges)
}

/// A value flattened into call arguments.
pub trait IntoWire {
    fn lower(&self, scope: &mut CallScope, args: &mut Vec<WireValue>) -> Result<(), FfiError>;
}

macro_rules! into_wire_scalar {
    ($($ty:ty),*) => {
        $(
            impl IntoWire for $ty {
                fn lower(&self, _scope: &mut CallScope, args: &mut Vec<WireValue>) -> Result<(), FfiError> {
                    args.push((*self).into());
                    Ok(())
                }
            }
        )*
    };
}

into_wire_scalar!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, Handle);

impl IntoWire for ForeignSlice {
    fn lower(&self, _scope: &mut CallScope, args: &mut Vec<WireValue>) -> Result<(), FfiError> {
        args.extend(self.args());
        Ok(())
    }
}

impl IntoWire for str {
    fn lower(&self, scope: &mut CallScope, args: &mut Vec<WireValue>) -> Result<(), FfiError> {
        let slice = scope.str8(self)?;
        slice.lower(scope, args)
    }
}

impl<T: IntoWire + ?Sized> IntoWire for &T {
    fn lower(&self, scope: &mut CallScope, args: &mut Vec<WireValue>) -> Result<(), FfiError> {
        (**self).lower(scope, args)
    }
}
