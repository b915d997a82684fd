//!
//! Sample native module and its bindings, written the way generated
//! wrappers are: one struct per native type, one method per export.
//!
//! Native side (all objects live in linear memory):
//!
//! - FixedDecimal: 16 bytes, i64 value @0, sign display ordinal @8
//! - Date: 8 bytes, i32 year @0, u8 month @4, u8 day @5
//! - Locale: 16 bytes, text (ptr, len) @0, language subtag (ptr, len) @8
//! - WordSegmenter: 4 bytes, unused
//! - WordBreakIterator: 12 bytes, text (ptr, len) @0, position @8. The text
//!   is borrowed from the host and never copied.
//!

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use tether::{
    AbiConfig, CallScope, Edges, EnvelopeLayout, FfiError, FieldLayout, ForeignObject, Handle,
    OutStruct, OwnedObject, Ownership, Payload, ReceiveBuffer, Runtime, RuntimeConfig, WireValue,
    receive_struct, retain_str8, wire_enum, with_write,
};
use tether_abi::{
    ArgsExt, read_bytes, read_i32, read_i64, read_u32, read_u8, write_i32, write_i64, write_u16,
    write_u32, write_u8,
};
use tether_linear::{LinearModule, NativeCtx};

wire_enum! {
    pub enum SignDisplay { Auto, Never, Always, ExceptZero, Negative }
}

wire_enum! {
    pub enum FixedDecimalParseError { Unknown, Limit, Syntax }
}

wire_enum! {
    pub enum CalendarError { Unknown, OutOfRange, UnknownEra }
}

wire_enum! {
    pub enum WeekRelativeUnit { Previous, Current, Next }
}

/// Destructor calls seen by the module, as (export, handle).
pub type DestroyLog = Rc<RefCell<Vec<(String, u32)>>>;

pub struct Sample {
    pub rt: Runtime,
    pub destroyed: DestroyLog,
}

impl Sample {
    pub fn new() -> Self {
        Sample::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Sample::build(config, |m| m)
    }

    pub fn with_memory(initial_pages: u32, max_pages: u32) -> Self {
        Sample::build(RuntimeConfig::default(), |m| m.with_memory(initial_pages, max_pages).unwrap())
    }

    fn build(config: RuntimeConfig, adjust: impl FnOnce(LinearModule) -> LinearModule) -> Self {
        let destroyed = DestroyLog::default();
        let module = adjust(
            LinearModule::new("sample").with_runtime_exports(config.exports.clone()),
        );
        let module = register(module, &config.abi, &destroyed);
        let rt = Runtime::with_config(module, config).unwrap();
        Sample { rt, destroyed }
    }

    /// Allocations currently live in the module's own heap.
    pub fn native_live_allocations(&self) -> u32 {
        self.rt.call_u32(&self.rt.export_name("Debug", "live_allocations"), &[]).unwrap()
    }

    pub fn destroy_count(&self, type_name: &str) -> usize {
        let export = self.rt.config().abi.destructor_name(type_name);
        self.destroyed.borrow().iter().filter(|(e, _)| *e == export).count()
    }
}

// ---------------------------------------------------------------------------
// Native side
// ---------------------------------------------------------------------------

type Export = fn(&mut NativeCtx<'_>, &[WireValue]) -> Result<Option<WireValue>, FfiError>;

fn register(mut module: LinearModule, abi: &AbiConfig, log: &DestroyLog) -> LinearModule {
    let exports: &[(&str, &str, Export)] = &[
        ("FixedDecimal", "from_i64", decimal_from_i64),
        ("FixedDecimal", "from_string", decimal_from_string),
        ("FixedDecimal", "set_sign_display", decimal_set_sign_display),
        ("FixedDecimal", "set_raw_sign", decimal_set_raw_sign),
        ("FixedDecimal", "sign_display", decimal_sign_display),
        ("FixedDecimal", "to_string", decimal_to_string),
        ("Date", "create", date_create),
        ("Date", "day_of_month", date_day_of_month),
        ("Date", "week_of", date_week_of),
        ("Locale", "from_string", locale_from_string),
        ("Locale", "from_utf16", locale_from_utf16),
        ("Locale", "to_string", locale_to_string),
        ("Locale", "language", locale_language),
        ("Locale", "region_len", locale_region_len),
        ("StrView", "to_string", str_view_to_string),
        ("WordSegmenter", "create", segmenter_create),
        ("WordSegmenter", "segment", segmenter_segment),
        ("WordBreakIterator", "next", iterator_next),
        ("Debug", "live_allocations", debug_live_allocations),
    ];
    for (ty, method, body) in exports {
        module.export(abi.export_name(ty, method), *body);
    }

    let destructors: &[(&str, u32, u32)] = &[
        ("FixedDecimal", 16, 8),
        ("Date", 8, 4),
        ("WordSegmenter", 4, 4),
        ("WordBreakIterator", 12, 4),
    ];
    for (ty, size, align) in destructors.iter().copied() {
        let export = abi.destructor_name(ty);
        let log = log.clone();
        let name = export.clone();
        module.export(export, move |ctx, args| {
            let this = args.u32_at(ctx.export(), 0)?;
            log.borrow_mut().push((name.clone(), this));
            ctx.free(this, size, align)?;
            Ok(None)
        });
    }

    let export = abi.destructor_name("Locale");
    let log = log.clone();
    let name = export.clone();
    module.export(export, move |ctx, args| {
        let this = args.u32_at(ctx.export(), 0)?;
        log.borrow_mut().push((name.clone(), this));
        let text = read_u32(ctx.bytes(), this)?;
        let len = read_u32(ctx.bytes(), this + 4)?;
        ctx.free(text, len, 1)?;
        ctx.free(this, 16, 4)?;
        Ok(None)
    });

    module
}

fn ok_ptr(addr: u32) -> Result<Option<WireValue>, FfiError> {
    Ok(Some(WireValue::ptr(addr)))
}

fn new_decimal(ctx: &mut NativeCtx<'_>, value: i64) -> Result<u32, FfiError> {
    let this = ctx.alloc(16, 8)?;
    write_i64(ctx.bytes_mut(), this, value)?;
    write_i32(ctx.bytes_mut(), this + 8, 0)?;
    Ok(this)
}

fn decimal_from_i64(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let value = args.i64_at(ctx.export(), 0)?;
    ok_ptr(new_decimal(ctx, value)?)
}

/// `(out, ptr, len)`: leading envelope of (ptr | FixedDecimalParseError).
fn decimal_from_string(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let out = args.u32_at(ctx.export(), 0)?;
    let text = ctx
        .read_str8(args.u32_at(ctx.export(), 1)?, args.u32_at(ctx.export(), 2)?)?
        .to_string();
    let digits = text.strip_prefix('-').unwrap_or(&text);
    let parsed = if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        Err(FixedDecimalParseError::Syntax as i32)
    } else {
        text.parse::<i64>().map_err(|_| FixedDecimalParseError::Limit as i32)
    };
    match parsed {
        Ok(value) => {
            let this = new_decimal(ctx, value)?;
            write_u8(ctx.bytes_mut(), out, 1)?;
            write_u32(ctx.bytes_mut(), out + 4, this)?;
        }
        Err(code) => {
            write_u8(ctx.bytes_mut(), out, 0)?;
            write_i32(ctx.bytes_mut(), out + 4, code)?;
        }
    }
    Ok(None)
}

fn decimal_set_sign_display(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let this = args.u32_at(ctx.export(), 0)?;
    let ordinal = args.i32_at(ctx.export(), 1)?;
    if !(0..5).contains(&ordinal) {
        return Err(FfiError::trap(ctx.export(), "sign display out of range"));
    }
    write_i32(ctx.bytes_mut(), this + 8, ordinal)?;
    Ok(None)
}

/// Stores any ordinal, valid or not.
fn decimal_set_raw_sign(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let this = args.u32_at(ctx.export(), 0)?;
    let ordinal = args.i32_at(ctx.export(), 1)?;
    write_i32(ctx.bytes_mut(), this + 8, ordinal)?;
    Ok(None)
}

fn decimal_sign_display(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let this = args.u32_at(ctx.export(), 0)?;
    Ok(Some(WireValue::I32(read_i32(ctx.bytes(), this + 8)?)))
}

fn decimal_to_string(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let this = args.u32_at(ctx.export(), 0)?;
    let write = args.u32_at(ctx.export(), 1)?;
    let value = read_i64(ctx.bytes(), this)?;
    let sign = match (read_i32(ctx.bytes(), this + 8)?, value) {
        (1, _) => "",
        (2, v) if v >= 0 => "+",
        (3, v) if v > 0 => "+",
        (_, v) if v < 0 => "-",
        _ => "",
    };
    ctx.write_str(write, sign)?;
    ctx.write_str(write, &value.unsigned_abs().to_string())?;
    Ok(None)
}

fn days_in_month(year: i32, month: u8) -> u8 {
    match month {
        2 if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// `(out, year, month, day)`: leading envelope of (ptr | CalendarError).
fn date_create(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let out = args.u32_at(ctx.export(), 0)?;
    let year = args.i32_at(ctx.export(), 1)?;
    let month = args.i32_at(ctx.export(), 2)?;
    let day = args.i32_at(ctx.export(), 3)?;

    let error = if !(-9999..=9999).contains(&year) {
        Some(CalendarError::UnknownEra)
    } else if !(1..=12).contains(&month) || day < 1 || day > days_in_month(year, month as u8) as i32 {
        Some(CalendarError::OutOfRange)
    } else {
        None
    };

    match error {
        Some(err) => {
            write_u8(ctx.bytes_mut(), out, 0)?;
            write_i32(ctx.bytes_mut(), out + 4, err as i32)?;
        }
        None => {
            let this = ctx.alloc(8, 4)?;
            write_i32(ctx.bytes_mut(), this, year)?;
            write_u8(ctx.bytes_mut(), this + 4, month as u8)?;
            write_u8(ctx.bytes_mut(), this + 5, day as u8)?;
            write_u8(ctx.bytes_mut(), out, 1)?;
            write_u32(ctx.bytes_mut(), out + 4, this)?;
        }
    }
    Ok(None)
}

fn date_day_of_month(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let this = args.u32_at(ctx.export(), 0)?;
    Ok(Some(read_u8(ctx.bytes(), this + 5)?.into()))
}

/// `(out, this)`: writes a WeekOf { u16 week @0, unit @4 }.
fn date_week_of(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let out = args.u32_at(ctx.export(), 0)?;
    let this = args.u32_at(ctx.export(), 1)?;
    let day = read_u8(ctx.bytes(), this + 5)? as u16;
    write_u16(ctx.bytes_mut(), out, (day - 1) / 7 + 1)?;
    write_i32(ctx.bytes_mut(), out + 4, WeekRelativeUnit::Current as i32)?;
    Ok(None)
}

fn new_locale(ctx: &mut NativeCtx<'_>, text: &str) -> Result<u32, FfiError> {
    let len = text.len() as u32;
    let bytes = ctx.alloc(len, 1)?;
    ctx.bytes_mut()[bytes as usize..(bytes + len) as usize].copy_from_slice(text.as_bytes());
    let language = text.find('-').unwrap_or(text.len()) as u32;
    let this = ctx.alloc(16, 4)?;
    let mem = ctx.bytes_mut();
    write_u32(mem, this, bytes)?;
    write_u32(mem, this + 4, len)?;
    write_u32(mem, this + 8, bytes)?;
    write_u32(mem, this + 12, language)?;
    Ok(this)
}

fn locale_from_string(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let text = ctx
        .read_str8(args.u32_at(ctx.export(), 0)?, args.u32_at(ctx.export(), 1)?)?
        .to_string();
    ok_ptr(new_locale(ctx, &text)?)
}

fn locale_from_utf16(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let addr = args.u32_at(ctx.export(), 0)?;
    let len = args.u32_at(ctx.export(), 1)?;
    let units: Vec<u16> = read_bytes(ctx.bytes(), addr, len * 2)?
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let text = String::from_utf16(&units).map_err(|_| FfiError::InvalidUtf16 { addr, len })?;
    ok_ptr(new_locale(ctx, &text)?)
}

fn write_view(ctx: &mut NativeCtx<'_>, view: u32, write: u32) -> Result<(), FfiError> {
    let text = ctx
        .read_str8(read_u32(ctx.bytes(), view)?, read_u32(ctx.bytes(), view + 4)?)?
        .to_string();
    ctx.write_str(write, &text)
}

fn locale_to_string(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let this = args.u32_at(ctx.export(), 0)?;
    let write = args.u32_at(ctx.export(), 1)?;
    write_view(ctx, this, write)?;
    Ok(None)
}

/// Returns a view into the locale's own storage.
fn locale_language(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    ok_ptr(args.u32_at(ctx.export(), 0)? + 8)
}

/// `(out, this)`: option envelope of u32, present when a region follows
/// the language subtag.
fn locale_region_len(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let out = args.u32_at(ctx.export(), 0)?;
    let this = args.u32_at(ctx.export(), 1)?;
    let len = read_u32(ctx.bytes(), this + 4)?;
    let language = read_u32(ctx.bytes(), this + 12)?;
    if language < len {
        write_u8(ctx.bytes_mut(), out, 1)?;
        write_u32(ctx.bytes_mut(), out + 4, len - language - 1)?;
    } else {
        write_u8(ctx.bytes_mut(), out, 0)?;
    }
    Ok(None)
}

fn str_view_to_string(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let view = args.u32_at(ctx.export(), 0)?;
    let write = args.u32_at(ctx.export(), 1)?;
    write_view(ctx, view, write)?;
    Ok(None)
}

fn segmenter_create(ctx: &mut NativeCtx<'_>, _args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    ok_ptr(ctx.alloc(4, 4)?)
}

fn segmenter_segment(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let text = args.u32_at(ctx.export(), 1)?;
    let len = args.u32_at(ctx.export(), 2)?;
    let this = ctx.alloc(12, 4)?;
    let mem = ctx.bytes_mut();
    write_u32(mem, this, text)?;
    write_u32(mem, this + 4, len)?;
    write_u32(mem, this + 8, 0)?;
    ok_ptr(this)
}

/// Next segment boundary, or -1 at the end. Runs of spaces and runs of
/// other bytes are segments.
fn iterator_next(ctx: &mut NativeCtx<'_>, args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    let this = args.u32_at(ctx.export(), 0)?;
    let text = read_u32(ctx.bytes(), this)?;
    let len = read_u32(ctx.bytes(), this + 4)?;
    let pos = read_u32(ctx.bytes(), this + 8)?;
    if pos >= len {
        return Ok(Some(WireValue::I32(-1)));
    }
    let bytes = read_bytes(ctx.bytes(), text, len)?;
    let space = bytes[pos as usize] == b' ';
    let end = bytes[pos as usize..]
        .iter()
        .position(|b| (*b == b' ') != space)
        .map_or(len, |n| pos + n as u32);
    write_u32(ctx.bytes_mut(), this + 8, end)?;
    Ok(Some(WireValue::I32(end as i32)))
}

fn debug_live_allocations(ctx: &mut NativeCtx<'_>, _args: &[WireValue]) -> Result<Option<WireValue>, FfiError> {
    Ok(Some((ctx.memory().live_allocations() as u32).into()))
}

// ---------------------------------------------------------------------------
// Host bindings
// ---------------------------------------------------------------------------

macro_rules! foreign_object {
    ($name:ident) => {
        pub struct $name(Rc<OwnedObject>);

        impl ForeignObject for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn from_object(object: Rc<OwnedObject>) -> Self {
                $name(object)
            }

            fn object(&self) -> &Rc<OwnedObject> {
                &self.0
            }
        }
    };
}

foreign_object!(FixedDecimal);
foreign_object!(Date);
foreign_object!(Locale);
foreign_object!(StrView);
foreign_object!(WordSegmenter);
foreign_object!(WordBreakIterator);

const HANDLE_OR_ENUM: EnvelopeLayout = EnvelopeLayout::leading(FieldLayout::PTR, FieldLayout::ENUM);

impl FixedDecimal {
    pub fn from_i64(rt: &Runtime, value: i64) -> Result<Self, FfiError> {
        let handle = rt.call_handle(&rt.export_name("FixedDecimal", "from_i64"), &[value.into()], Self::TYPE_NAME)?;
        Self::wrap(rt, handle, Ownership::Owned, Edges::new())
    }

    pub fn from_string(rt: &Runtime, text: &str) -> Result<Self, FfiError> {
        let mut scope = CallScope::new(rt);
        let text = scope.str8(text)?;
        let buf = ReceiveBuffer::new(rt, HANDLE_OR_ENUM)?;
        let [ptr, len] = text.args();
        rt.call_void(&rt.export_name("FixedDecimal", "from_string"), &[buf.arg(), ptr, len])?;
        let handle = buf.decode_result::<_, FixedDecimalParseError>(|p| p.object(0, Self::TYPE_NAME))?;
        scope.finish()?;
        Self::wrap(rt, handle, Ownership::Owned, Edges::new())
    }

    pub fn try_from_string(rt: &Runtime, text: &str) -> Result<Result<Self, FixedDecimalParseError>, FfiError> {
        let mut scope = CallScope::new(rt);
        let text = scope.str8(text)?;
        let buf = ReceiveBuffer::new(rt, HANDLE_OR_ENUM)?;
        let [ptr, len] = text.args();
        rt.call_void(&rt.export_name("FixedDecimal", "from_string"), &[buf.arg(), ptr, len])?;
        match buf.into_result::<_, FixedDecimalParseError>(|p| p.object(0, Self::TYPE_NAME))? {
            Ok(handle) => Ok(Ok(Self::wrap(rt, handle, Ownership::Owned, Edges::new())?)),
            Err(err) => Ok(Err(err)),
        }
    }

    pub fn set_sign_display(&self, sign: SignDisplay) -> Result<(), FfiError> {
        let rt = self.runtime();
        let mut scope = CallScope::new(rt);
        let mut args: Vec<WireValue> = vec![self.handle()?.into()];
        tether::IntoWire::lower(&sign, &mut scope, &mut args)?;
        rt.call_void(&rt.export_name(Self::TYPE_NAME, "set_sign_display"), &args)
    }

    pub fn set_raw_sign(&self, ordinal: i32) -> Result<(), FfiError> {
        let rt = self.runtime();
        rt.call_void(&rt.export_name(Self::TYPE_NAME, "set_raw_sign"), &[self.handle()?.into(), ordinal.into()])
    }

    pub fn sign_display(&self) -> Result<SignDisplay, FfiError> {
        let rt = self.runtime();
        let ordinal = rt.call_i32(&rt.export_name(Self::TYPE_NAME, "sign_display"), &[self.handle()?.into()])?;
        <SignDisplay as tether::WireEnum>::from_ordinal(ordinal)
    }

    pub fn format(&self) -> Result<String, FfiError> {
        let rt = self.runtime();
        let handle = self.handle()?;
        with_write(rt, |write| rt.call_void(&rt.export_name(Self::TYPE_NAME, "to_string"), &[handle.into(), write]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekOf {
    pub week: u16,
    pub unit: WeekRelativeUnit,
}

impl OutStruct for WeekOf {
    const LAYOUT: FieldLayout = FieldLayout::new(8, 4);

    fn read(payload: &Payload<'_>, _edges: &Edges) -> Result<Self, FfiError> {
        Ok(WeekOf {
            week: payload.u16(0)?,
            unit: payload.enum_value(4)?,
        })
    }
}

impl Date {
    pub fn create(rt: &Runtime, year: i32, month: u8, day: u8) -> Result<Self, FfiError> {
        let buf = ReceiveBuffer::new(rt, HANDLE_OR_ENUM)?;
        rt.call_void(
            &rt.export_name("Date", "create"),
            &[buf.arg(), year.into(), month.into(), day.into()],
        )?;
        let handle = buf.decode_result::<_, CalendarError>(|p| p.object(0, Self::TYPE_NAME))?;
        Self::wrap(rt, handle, Ownership::Owned, Edges::new())
    }

    pub fn day_of_month(&self) -> Result<u8, FfiError> {
        let rt = self.runtime();
        rt.call_i32(&rt.export_name(Self::TYPE_NAME, "day_of_month"), &[self.handle()?.into()])
            .map(|d| d as u8)
    }

    pub fn week_of(&self) -> Result<WeekOf, FfiError> {
        let rt = self.runtime();
        let handle = self.handle()?;
        receive_struct(rt, &Edges::new(), |out| {
            rt.call_void(&rt.export_name(Self::TYPE_NAME, "week_of"), &[out, handle.into()])
        })
    }
}

impl Locale {
    pub fn from_string(rt: &Runtime, text: &str) -> Result<Self, FfiError> {
        let mut scope = CallScope::new(rt);
        let text = scope.str8(text)?;
        let handle = rt.call_handle(&rt.export_name("Locale", "from_string"), &text.args(), Self::TYPE_NAME)?;
        scope.finish()?;
        Self::wrap(rt, handle, Ownership::Owned, Edges::new())
    }

    pub fn from_utf16(rt: &Runtime, text: &str) -> Result<Self, FfiError> {
        let mut scope = CallScope::new(rt);
        let text = scope.str16(text)?;
        let handle = rt.call_handle(&rt.export_name("Locale", "from_utf16"), &text.args(), Self::TYPE_NAME)?;
        scope.finish()?;
        Self::wrap(rt, handle, Ownership::Owned, Edges::new())
    }

    pub fn to_string(&self) -> Result<String, FfiError> {
        let rt = self.runtime();
        let handle = self.handle()?;
        with_write(rt, |write| rt.call_void(&rt.export_name(Self::TYPE_NAME, "to_string"), &[handle.into(), write]))
    }

    /// A view into this locale's storage; keeps the locale alive.
    pub fn language(&self) -> Result<StrView, FfiError> {
        let rt = self.runtime();
        let handle = rt.call_handle(&rt.export_name(Self::TYPE_NAME, "language"), &[self.handle()?.into()], StrView::TYPE_NAME)?;
        StrView::wrap(rt, handle, Ownership::Borrowed, Edges::of(&[self]))
    }

    pub fn region_len(&self) -> Result<Option<u32>, FfiError> {
        let rt = self.runtime();
        let buf = ReceiveBuffer::new(rt, EnvelopeLayout::option(FieldLayout::U32))?;
        rt.call_void(&rt.export_name(Self::TYPE_NAME, "region_len"), &[buf.arg(), self.handle()?.into()])?;
        buf.decode_option(|p| p.u32(0))
    }
}

impl StrView {
    pub fn to_string(&self) -> Result<String, FfiError> {
        let rt = self.runtime();
        let handle = self.handle()?;
        with_write(rt, |write| rt.call_void(&rt.export_name(Self::TYPE_NAME, "to_string"), &[handle.into(), write]))
    }
}

impl WordSegmenter {
    pub fn new(rt: &Runtime) -> Result<Self, FfiError> {
        let handle = rt.call_handle(&rt.export_name("WordSegmenter", "create"), &[], Self::TYPE_NAME)?;
        Self::wrap(rt, handle, Ownership::Owned, Edges::new())
    }

    /// The iterator reads `text` in place, so both the text and the
    /// segmenter stay alive as long as it does.
    pub fn segment(&self, text: &str) -> Result<WordBreakIterator, FfiError> {
        let rt = self.runtime();
        let (slice, anchor) = retain_str8(rt, text)?;
        let [ptr, len] = slice.args();
        let handle = rt.call_handle(
            &rt.export_name(Self::TYPE_NAME, "segment"),
            &[self.handle()?.into(), ptr, len],
            WordBreakIterator::TYPE_NAME,
        )?;
        WordBreakIterator::wrap(rt, handle, Ownership::Owned, Edges::of(&[self, &anchor]))
    }
}

impl WordBreakIterator {
    pub fn next_boundary(&self) -> Result<Option<u32>, FfiError> {
        let rt = self.runtime();
        let next = rt.call_i32(&rt.export_name(Self::TYPE_NAME, "next"), &[self.handle()?.into()])?;
        Ok(u32::try_from(next).ok())
    }

    pub fn boundaries(&self) -> Result<Vec<u32>, FfiError> {
        let mut out = Vec::new();
        while let Some(b) = self.next_boundary()? {
            out.push(b);
        }
        Ok(out)
    }
}

pub fn handle_of(object: &impl ForeignObject) -> Handle {
    object.handle().unwrap()
}
