//! Result marshaling for call sites that only know a method's identity
//!
//! Native code hands back two raw registers: the integer/handle register and
//! the floating-point register. The return tag from the method's shorty
//! decides which one carries the result and how it is narrowed, and the
//! marshaled value packs back into a single 64-bit transport word.

use crate::config::FloatReturnAbi;
use crate::error::BoundaryError;
use crate::thread::RawHandle;

/// Return type of a native method, from the first shorty character
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ReturnTag {
    /// `L`: object reference
    Object,
    /// `Z`: boolean, zero-extended from 8 bits
    Boolean,
    /// `B`: byte, sign-extended from 8 bits
    Byte,
    /// `C`: char, zero-extended from 16 bits
    Char,
    /// `S`: short, sign-extended from 16 bits
    Short,
    /// `I`: 32-bit int
    Int,
    /// `J`: 64-bit long
    Long,
    /// `F`: float
    Float,
    /// `D`: double
    Double,
    /// `V`: void
    Void,
}

impl ReturnTag {
    /// Decode a shorty return character
    pub fn from_shorty(c: u8) -> Result<Self, BoundaryError> {
        Ok(match c {
            b'L' => ReturnTag::Object,
            b'Z' => ReturnTag::Boolean,
            b'B' => ReturnTag::Byte,
            b'C' => ReturnTag::Char,
            b'S' => ReturnTag::Short,
            b'I' => ReturnTag::Int,
            b'J' => ReturnTag::Long,
            b'F' => ReturnTag::Float,
            b'D' => ReturnTag::Double,
            b'V' => ReturnTag::Void,
            other => return Err(BoundaryError::UnknownReturnTag(other as char)),
        })
    }

    /// Whether the result is an object reference
    #[inline]
    pub fn is_reference(self) -> bool {
        matches!(self, ReturnTag::Object)
    }
}

/// Raw return registers of a native call
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct RawResult {
    /// Integer / handle return register
    pub gpr: u64,
    /// Floating-point return register bits
    pub fpr: u64,
}

impl RawResult {
    /// Result carried in the integer register
    pub const fn from_gpr(gpr: u64) -> Self {
        Self { gpr, fpr: 0 }
    }

    /// Result carried in the floating-point register
    pub const fn from_fpr(fpr: u64) -> Self {
        Self { gpr: 0, fpr }
    }

    /// Reference result
    pub const fn from_handle(handle: RawHandle) -> Self {
        Self::from_gpr(handle.bits())
    }

    /// Integer register read as a handle
    #[inline]
    pub const fn handle(&self) -> RawHandle {
        RawHandle::from_bits(self.gpr)
    }
}

/// Objects that can travel in a 64-bit transport word
pub trait TransportBits {
    /// Non-zero address-like bits identifying the object
    fn transport_bits(&self) -> u64;
}

/// Result of a native call, typed by its return tag
#[derive(Debug, Clone, PartialEq)]
pub enum MarshaledResult<O> {
    /// Decoded reference; `None` for null or when an exception was pending
    Object(Option<O>),
    /// Boolean, byte, char, short and int results
    Int(i32),
    /// Long result
    Long(i64),
    /// Float result
    Float(f32),
    /// Double result
    Double(f64),
    /// No result
    Void,
}

impl<O> MarshaledResult<O> {
    /// Pack into the 64-bit transport word.
    ///
    /// Integer results are sign-extended from 32 bits, floats occupy the low
    /// 32 bits, null and void are zero.
    pub fn to_bits(&self) -> u64
    where
        O: TransportBits,
    {
        match self {
            MarshaledResult::Object(Some(object)) => object.transport_bits(),
            MarshaledResult::Object(None) => 0,
            MarshaledResult::Int(v) => *v as i64 as u64,
            MarshaledResult::Long(v) => *v as u64,
            MarshaledResult::Float(v) => v.to_bits() as u64,
            MarshaledResult::Double(v) => v.to_bits(),
            MarshaledResult::Void => 0,
        }
    }

    /// The decoded object, if this is a non-null reference result
    pub fn object(&self) -> Option<&O> {
        match self {
            MarshaledResult::Object(object) => object.as_ref(),
            _ => None,
        }
    }
}

/// Platform fix-up applied to the floating-point register of `F` results
pub type FloatNormalizer = fn(u64) -> u64;

impl FloatReturnAbi {
    /// Select the normalizer for this convention
    pub fn normalizer(self) -> FloatNormalizer {
        match self {
            FloatReturnAbi::Native => normalize_float_native,
            FloatReturnAbi::X87Widened => normalize_float_widened,
        }
    }
}

fn normalize_float_native(bits: u64) -> u64 {
    bits
}

/// Narrow a double-width float return back to single precision
fn normalize_float_widened(bits: u64) -> u64 {
    let widened = f64::from_bits(bits);
    (widened as f32).to_bits() as u64
}

/// Marshal a non-reference result.
///
/// Reference results need the thread's reference table and are decoded by
/// the gate, never here.
pub(crate) fn marshal_primitive<O>(
    tag: ReturnTag,
    raw: RawResult,
    normalize_float: FloatNormalizer,
) -> MarshaledResult<O> {
    match tag {
        ReturnTag::Boolean => MarshaledResult::Int(raw.gpr as u8 as i32),
        ReturnTag::Byte => MarshaledResult::Int(raw.gpr as u8 as i8 as i32),
        ReturnTag::Char => MarshaledResult::Int(raw.gpr as u16 as i32),
        ReturnTag::Short => MarshaledResult::Int(raw.gpr as u16 as i16 as i32),
        ReturnTag::Int => MarshaledResult::Int(raw.gpr as u32 as i32),
        ReturnTag::Long => MarshaledResult::Long(raw.gpr as i64),
        ReturnTag::Float => {
            MarshaledResult::Float(f32::from_bits(normalize_float(raw.fpr) as u32))
        }
        ReturnTag::Double => MarshaledResult::Double(f64::from_bits(raw.fpr)),
        ReturnTag::Void => MarshaledResult::Void,
        ReturnTag::Object => unreachable!("reference results are decoded through the thread"),
    }
}
