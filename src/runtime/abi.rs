//! Primitive codec for values crossing the boundary
//!
//! Foreign primitives use fixed-width representations (the `j*` aliases
//! below). Arguments and returns travel through the host as [`RawValue`]
//! slots: one 64-bit word per value, the analogue of a C `jvalue`.
//!
//! Slot layout:
//! - boolean: bits 0-7 (zero = false, any nonzero = true)
//! - byte/short/int/long: sign-extended two's complement
//! - char: zero-extended UTF-16 code unit
//! - float: IEEE 754 bits in bits 0-31
//! - double: IEEE 754 bits
//! - object: raw reference address (0 = null)
//!
//! Every conversion is total; decoding never assumes only 0/1 for booleans.

use std::fmt;

use super::error::{BridgeError, BridgeResult};
use super::refs::ForeignHandle;

#[allow(non_camel_case_types)]
pub type jboolean = u8;
#[allow(non_camel_case_types)]
pub type jbyte = i8;
#[allow(non_camel_case_types)]
pub type jchar = u16;
#[allow(non_camel_case_types)]
pub type jshort = i16;
#[allow(non_camel_case_types)]
pub type jint = i32;
#[allow(non_camel_case_types)]
pub type jlong = i64;
#[allow(non_camel_case_types)]
pub type jfloat = f32;
#[allow(non_camel_case_types)]
pub type jdouble = f64;

/// Canonical foreign `true`.
pub const JNI_TRUE: jboolean = 1;
pub const JNI_FALSE: jboolean = 0;

/// Type tag of a marshaled value, matching one descriptor character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Object,
    Void,
}

impl ValueKind {
    /// The descriptor character for this kind (`L` for every object kind).
    pub fn descriptor_char(self) -> char {
        match self {
            ValueKind::Boolean => 'Z',
            ValueKind::Byte => 'B',
            ValueKind::Char => 'C',
            ValueKind::Short => 'S',
            ValueKind::Int => 'I',
            ValueKind::Long => 'J',
            ValueKind::Float => 'F',
            ValueKind::Double => 'D',
            ValueKind::Object => 'L',
            ValueKind::Void => 'V',
        }
    }

    pub fn is_primitive(self) -> bool {
        !matches!(self, ValueKind::Object | ValueKind::Void)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Byte => "byte",
            ValueKind::Char => "char",
            ValueKind::Short => "short",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Object => "object",
            ValueKind::Void => "void",
        };
        f.write_str(name)
    }
}

/// One encoded argument or return slot, as handed to the host.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct RawValue {
    bits: u64,
}

impl RawValue {
    pub const ZERO: RawValue = RawValue { bits: 0 };

    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.bits
    }

    /// Encode a raw reference address.
    #[inline]
    pub fn from_address(addr: usize) -> Self {
        Self { bits: addr as u64 }
    }

    #[inline]
    pub fn as_address(self) -> usize {
        self.bits as usize
    }
}

impl fmt::Debug for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawValue(0x{:016x})", self.bits)
    }
}

/// Conversion between a native scalar and its foreign representation.
pub trait Primitive: Copy {
    const KIND: ValueKind;
    type Foreign: Copy;

    fn to_foreign(self) -> Self::Foreign;
    fn from_foreign(value: Self::Foreign) -> Self;
    fn to_raw(self) -> RawValue;
    fn from_raw(raw: RawValue) -> Self;
}

impl Primitive for bool {
    const KIND: ValueKind = ValueKind::Boolean;
    type Foreign = jboolean;

    #[inline]
    fn to_foreign(self) -> jboolean {
        if self { JNI_TRUE } else { JNI_FALSE }
    }

    #[inline]
    fn from_foreign(value: jboolean) -> Self {
        value != JNI_FALSE
    }

    #[inline]
    fn to_raw(self) -> RawValue {
        RawValue::from_bits(self.to_foreign() as u64)
    }

    #[inline]
    fn from_raw(raw: RawValue) -> Self {
        Self::from_foreign(raw.to_bits() as u8)
    }
}

macro_rules! signed_primitive {
    ($native:ty, $foreign:ty, $kind:expr) => {
        impl Primitive for $native {
            const KIND: ValueKind = $kind;
            type Foreign = $foreign;

            #[inline]
            fn to_foreign(self) -> $foreign {
                self
            }

            #[inline]
            fn from_foreign(value: $foreign) -> Self {
                value
            }

            #[inline]
            fn to_raw(self) -> RawValue {
                RawValue::from_bits(self as i64 as u64)
            }

            #[inline]
            fn from_raw(raw: RawValue) -> Self {
                raw.to_bits() as $native
            }
        }
    };
}

signed_primitive!(i8, jbyte, ValueKind::Byte);
signed_primitive!(i16, jshort, ValueKind::Short);
signed_primitive!(i32, jint, ValueKind::Int);
signed_primitive!(i64, jlong, ValueKind::Long);

impl Primitive for u16 {
    const KIND: ValueKind = ValueKind::Char;
    type Foreign = jchar;

    #[inline]
    fn to_foreign(self) -> jchar {
        self
    }

    #[inline]
    fn from_foreign(value: jchar) -> Self {
        value
    }

    #[inline]
    fn to_raw(self) -> RawValue {
        RawValue::from_bits(self as u64)
    }

    #[inline]
    fn from_raw(raw: RawValue) -> Self {
        raw.to_bits() as u16
    }
}

impl Primitive for f32 {
    const KIND: ValueKind = ValueKind::Float;
    type Foreign = jfloat;

    #[inline]
    fn to_foreign(self) -> jfloat {
        self
    }

    #[inline]
    fn from_foreign(value: jfloat) -> Self {
        value
    }

    #[inline]
    fn to_raw(self) -> RawValue {
        RawValue::from_bits(self.to_bits() as u64)
    }

    #[inline]
    fn from_raw(raw: RawValue) -> Self {
        f32::from_bits(raw.to_bits() as u32)
    }
}

impl Primitive for f64 {
    const KIND: ValueKind = ValueKind::Double;
    type Foreign = jdouble;

    #[inline]
    fn to_foreign(self) -> jdouble {
        self
    }

    #[inline]
    fn from_foreign(value: jdouble) -> Self {
        value
    }

    #[inline]
    fn to_raw(self) -> RawValue {
        RawValue::from_bits(self.to_bits())
    }

    #[inline]
    fn from_raw(raw: RawValue) -> Self {
        f64::from_bits(raw.to_bits())
    }
}

/// Decode a UTF-16 code unit, or `None` for a lone surrogate.
pub fn char_from_foreign(unit: jchar) -> Option<char> {
    char::from_u32(unit as u32)
}

/// Encode a `char` as a single UTF-16 code unit, or `None` outside the BMP.
pub fn char_to_foreign(c: char) -> Option<jchar> {
    u16::try_from(c as u32).ok()
}

// =========================================================================
// Marshaled values
// =========================================================================

/// A value crossing the boundary, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarshaledValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Object(ForeignHandle),
    Void,
}

impl MarshaledValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            MarshaledValue::Boolean(_) => ValueKind::Boolean,
            MarshaledValue::Byte(_) => ValueKind::Byte,
            MarshaledValue::Char(_) => ValueKind::Char,
            MarshaledValue::Short(_) => ValueKind::Short,
            MarshaledValue::Int(_) => ValueKind::Int,
            MarshaledValue::Long(_) => ValueKind::Long,
            MarshaledValue::Float(_) => ValueKind::Float,
            MarshaledValue::Double(_) => ValueKind::Double,
            MarshaledValue::Object(_) => ValueKind::Object,
            MarshaledValue::Void => ValueKind::Void,
        }
    }

    /// Encode a primitive value. Object and void values have no primitive
    /// encoding and yield `None`; the marshaler resolves handles itself.
    pub fn encode_primitive(&self) -> Option<RawValue> {
        let raw = match *self {
            MarshaledValue::Boolean(v) => v.to_raw(),
            MarshaledValue::Byte(v) => v.to_raw(),
            MarshaledValue::Char(v) => v.to_raw(),
            MarshaledValue::Short(v) => v.to_raw(),
            MarshaledValue::Int(v) => v.to_raw(),
            MarshaledValue::Long(v) => v.to_raw(),
            MarshaledValue::Float(v) => v.to_raw(),
            MarshaledValue::Double(v) => v.to_raw(),
            MarshaledValue::Object(_) | MarshaledValue::Void => return None,
        };
        Some(raw)
    }

    /// Decode a primitive or void slot. Object slots need the registry.
    pub fn decode_primitive(kind: ValueKind, raw: RawValue) -> Option<Self> {
        let value = match kind {
            ValueKind::Boolean => MarshaledValue::Boolean(bool::from_raw(raw)),
            ValueKind::Byte => MarshaledValue::Byte(i8::from_raw(raw)),
            ValueKind::Char => MarshaledValue::Char(u16::from_raw(raw)),
            ValueKind::Short => MarshaledValue::Short(i16::from_raw(raw)),
            ValueKind::Int => MarshaledValue::Int(i32::from_raw(raw)),
            ValueKind::Long => MarshaledValue::Long(i64::from_raw(raw)),
            ValueKind::Float => MarshaledValue::Float(f32::from_raw(raw)),
            ValueKind::Double => MarshaledValue::Double(f64::from_raw(raw)),
            ValueKind::Void => MarshaledValue::Void,
            ValueKind::Object => return None,
        };
        Some(value)
    }

    pub fn as_bool(&self) -> BridgeResult<bool> {
        match *self {
            MarshaledValue::Boolean(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Boolean, other.kind())),
        }
    }

    pub fn as_byte(&self) -> BridgeResult<i8> {
        match *self {
            MarshaledValue::Byte(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Byte, other.kind())),
        }
    }

    /// The raw UTF-16 code unit; see [`char_from_foreign`] for a `char`.
    pub fn as_char(&self) -> BridgeResult<u16> {
        match *self {
            MarshaledValue::Char(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Char, other.kind())),
        }
    }

    pub fn as_short(&self) -> BridgeResult<i16> {
        match *self {
            MarshaledValue::Short(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Short, other.kind())),
        }
    }

    pub fn as_int(&self) -> BridgeResult<i32> {
        match *self {
            MarshaledValue::Int(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Int, other.kind())),
        }
    }

    pub fn as_long(&self) -> BridgeResult<i64> {
        match *self {
            MarshaledValue::Long(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Long, other.kind())),
        }
    }

    pub fn as_float(&self) -> BridgeResult<f32> {
        match *self {
            MarshaledValue::Float(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Float, other.kind())),
        }
    }

    pub fn as_double(&self) -> BridgeResult<f64> {
        match *self {
            MarshaledValue::Double(v) => Ok(v),
            other => Err(BridgeError::kind_mismatch(ValueKind::Double, other.kind())),
        }
    }

    pub fn as_handle(&self) -> BridgeResult<ForeignHandle> {
        match *self {
            MarshaledValue::Object(h) => Ok(h),
            other => Err(BridgeError::kind_mismatch(ValueKind::Object, other.kind())),
        }
    }
}

impl From<bool> for MarshaledValue {
    fn from(v: bool) -> Self {
        MarshaledValue::Boolean(v)
    }
}

impl From<i8> for MarshaledValue {
    fn from(v: i8) -> Self {
        MarshaledValue::Byte(v)
    }
}

impl From<i16> for MarshaledValue {
    fn from(v: i16) -> Self {
        MarshaledValue::Short(v)
    }
}

impl From<i32> for MarshaledValue {
    fn from(v: i32) -> Self {
        MarshaledValue::Int(v)
    }
}

impl From<i64> for MarshaledValue {
    fn from(v: i64) -> Self {
        MarshaledValue::Long(v)
    }
}

impl From<f32> for MarshaledValue {
    fn from(v: f32) -> Self {
        MarshaledValue::Float(v)
    }
}

impl From<f64> for MarshaledValue {
    fn from(v: f64) -> Self {
        MarshaledValue::Double(v)
    }
}

impl From<ForeignHandle> for MarshaledValue {
    fn from(h: ForeignHandle) -> Self {
        MarshaledValue::Object(h)
    }
}
