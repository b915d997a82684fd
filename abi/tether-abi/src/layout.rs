//!
//! Layout Arithmetic
//!
//! Sizes and alignments of values as they sit in module memory, and the
//! layout of receive buffers that fallible or optional calls write into.
//!
//! Every layout is a `const` computed once per return type, so wrappers
//! never work out offsets at call time:
//!
//! ```ignore
//! const CREATE: EnvelopeLayout = EnvelopeLayout::leading(FieldLayout::PTR, FieldLayout::ENUM);
//! ```
//!

/// Round `value` up to the next multiple of `align` (a power of two).
/// `None` when the result does not fit in 32 bits.
pub const fn align_up(value: u32, align: u32) -> Option<u32> {
    match value.checked_add(align - 1) {
        Some(end) => Some(end & !(align - 1)),
        None => None,
    }
}

pub const fn is_valid_align(align: u32) -> bool {
    align != 0 && align.is_power_of_two()
}

const fn max(a: u32, b: u32) -> u32 {
    if a > b { a } else { b }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldLayout {
    pub size: u32,
    pub align: u32,
}

impl FieldLayout {
    pub const EMPTY: FieldLayout = FieldLayout::new(0, 1);
    pub const BOOL: FieldLayout = FieldLayout::new(1, 1);
    pub const U8: FieldLayout = FieldLayout::new(1, 1);
    pub const U16: FieldLayout = FieldLayout::new(2, 2);
    pub const U32: FieldLayout = FieldLayout::new(4, 4);
    pub const U64: FieldLayout = FieldLayout::new(8, 8);
    pub const F32: FieldLayout = FieldLayout::new(4, 4);
    pub const F64: FieldLayout = FieldLayout::new(8, 8);
    pub const PTR: FieldLayout = FieldLayout::new(4, 4);
    pub const ENUM: FieldLayout = FieldLayout::new(4, 4);
    /// An (address, length) pair.
    pub const SLICE: FieldLayout = FieldLayout::new(8, 4);

    pub const fn new(size: u32, align: u32) -> Self {
        FieldLayout { size, align }
    }

    /// Layout of a union holding either of two fields.
    pub const fn union(a: FieldLayout, b: FieldLayout) -> Self {
        FieldLayout {
            size: max(a.size, b.size),
            align: max(max(a.align, b.align), 1),
        }
    }
}

/// Where the success/presence flag sits in a receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlagPlacement {
    /// Flag byte at offset 0, payload at the next aligned offset.
    Leading,
    /// Payload union first, flag byte right after it (C struct layout).
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvelopeLayout {
    pub size: u32,
    pub align: u32,
    pub flag_offset: u32,
    pub payload_offset: u32,
}

const fn fits(layout: Option<EnvelopeLayout>) -> EnvelopeLayout {
    match layout {
        Some(layout) => layout,
        None => panic!("envelope layout does not fit in 32 bits"),
    }
}

impl EnvelopeLayout {
    /// For `const` layouts of known types. Layouts built from external
    /// input go through `try_with_placement`.
    pub const fn leading(ok: FieldLayout, err: FieldLayout) -> Self {
        fits(EnvelopeLayout::try_leading(ok, err))
    }

    pub const fn trailing(ok: FieldLayout, err: FieldLayout) -> Self {
        fits(EnvelopeLayout::try_trailing(ok, err))
    }

    pub const fn with_placement(placement: FlagPlacement, ok: FieldLayout, err: FieldLayout) -> Self {
        fits(EnvelopeLayout::try_with_placement(placement, ok, err))
    }

    pub const fn try_leading(ok: FieldLayout, err: FieldLayout) -> Option<Self> {
        let payload = FieldLayout::union(ok, err);
        let Some(payload_offset) = align_up(1, payload.align) else {
            return None;
        };
        let Some(end) = payload_offset.checked_add(payload.size) else {
            return None;
        };
        let Some(size) = align_up(end, payload.align) else {
            return None;
        };
        Some(EnvelopeLayout {
            size,
            align: payload.align,
            flag_offset: 0,
            payload_offset,
        })
    }

    pub const fn try_trailing(ok: FieldLayout, err: FieldLayout) -> Option<Self> {
        let payload = FieldLayout::union(ok, err);
        let Some(end) = payload.size.checked_add(1) else {
            return None;
        };
        let Some(size) = align_up(end, payload.align) else {
            return None;
        };
        Some(EnvelopeLayout {
            size,
            align: payload.align,
            flag_offset: payload.size,
            payload_offset: 0,
        })
    }

    pub const fn try_with_placement(placement: FlagPlacement, ok: FieldLayout, err: FieldLayout) -> Option<Self> {
        match placement {
            FlagPlacement::Leading => EnvelopeLayout::try_leading(ok, err),
            FlagPlacement::Trailing => EnvelopeLayout::try_trailing(ok, err),
        }
    }

    pub const fn option(value: FieldLayout) -> Self {
        EnvelopeLayout::leading(value, FieldLayout::EMPTY)
    }

    pub const fn payload_size(&self) -> u32 {
        if self.payload_offset == 0 {
            self.flag_offset
        } else {
            self.size - self.payload_offset
        }
    }
}
