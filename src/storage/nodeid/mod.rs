#![forbid(unsafe_code)]
//! 64-bit surrogate keys for terms.
//!
//! A [`NodeId`] is either an offset into the external node dictionary or a
//! self-contained ("inline") encoding of a small literal value:
//!
//! ```text
//! 0xxx..  table pointer, 63-bit offset
//! 11sE..  xsd:double: sign, 9-bit rebased exponent, 52-bit mantissa
//! 10tt..  tagged value: 6-bit type tag, 56-bit payload
//! ```
//!
//! Double patterns with exponent 511 other than the infinities and the
//! canonical NaN are reserved for special ids such as [`NodeId::ANY`].

use std::fmt;

use crate::primitives::bytes::ord;
use crate::storage::term::{xsd, Term};
use crate::types::{Result, StoreError};

mod datetime;
mod inline;

const PTR_FLAG: u64 = 1 << 63;
const REGION_MASK: u64 = 0b11 << 62;
pub(crate) const DOUBLE_REGION: u64 = 0b11 << 62;
const TAGGED_REGION: u64 = 0b10 << 62;
const TAG_SHIFT: u32 = 56;
const TAG_MASK: u64 = 0x3F;
pub(crate) const PAYLOAD_MASK: u64 = (1 << 56) - 1;
const OFFSET_MASK: u64 = !PTR_FLAG;

/// A fixed-width surrogate key for a term.
///
/// Ordering is unsigned on the raw value, which matches the byte order of
/// the big-endian key encoding.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Encoded width in bytes.
    pub const SIZE: usize = 8;

    /// Pattern wildcard. Never stored.
    pub const ANY: NodeId = NodeId::create(-9);

    /// Answer for a term known to be absent from the dictionary.
    pub const DOES_NOT_EXIST: NodeId = NodeId::create(-8);

    /// Wraps any 64-bit value, sentinels included.
    pub const fn create(value: i64) -> Self {
        NodeId(value as u64)
    }

    /// Wraps a raw unsigned value.
    pub const fn from_raw(raw: u64) -> Self {
        NodeId(raw)
    }

    /// Raw unsigned value.
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Raw value reinterpreted as signed.
    pub const fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Table pointer for a dictionary offset. Offsets use 63 bits.
    pub fn from_offset(offset: u64) -> Result<Self> {
        if offset & PTR_FLAG != 0 {
            return Err(StoreError::Invalid("node table offset exceeds 63 bits"));
        }
        Ok(NodeId(offset))
    }

    /// Dictionary offset, for table pointers.
    pub fn offset(self) -> Option<u64> {
        self.is_table_ptr().then_some(self.0 & OFFSET_MASK)
    }

    pub(crate) fn tagged(kind: NodeIdType, payload: u64) -> Option<Self> {
        let tag = kind.tag()?;
        debug_assert!(payload <= PAYLOAD_MASK);
        Some(NodeId(
            TAGGED_REGION | ((tag as u64) << TAG_SHIFT) | (payload & PAYLOAD_MASK),
        ))
    }

    pub(crate) fn payload(self) -> u64 {
        self.0 & PAYLOAD_MASK
    }

    /// True for the pattern wildcard.
    pub fn is_any(self) -> bool {
        self == NodeId::ANY
    }

    /// True for dictionary pointers.
    pub fn is_table_ptr(self) -> bool {
        self.0 & PTR_FLAG == 0
    }

    /// True for ids whose value is encoded in the id itself.
    pub fn is_inline(self) -> bool {
        !matches!(self.kind(), NodeIdType::Ptr | NodeIdType::Special)
    }

    /// True for reserved patterns, including [`NodeId::ANY`] and [`NodeId::DOES_NOT_EXIST`].
    pub fn is_special(self) -> bool {
        self.kind() == NodeIdType::Special
    }

    /// Classifies the id.
    pub fn kind(self) -> NodeIdType {
        if self.is_table_ptr() {
            return NodeIdType::Ptr;
        }
        match self.0 & REGION_MASK {
            DOUBLE_REGION => match inline::decode_double(self) {
                Some(_) => NodeIdType::Double,
                None => NodeIdType::Special,
            },
            _ => {
                let tag = ((self.0 >> TAG_SHIFT) & TAG_MASK) as u8;
                NodeIdType::from_tag(tag).unwrap_or(NodeIdType::Special)
            }
        }
    }

    /// Inline encoding of `term`, if it has one.
    ///
    /// Only literals of the supported datatypes in canonical lexical form and
    /// within range are encoded, so [`NodeId::extract`] gives back the same term.
    pub fn inline(term: &Term) -> Option<NodeId> {
        inline::encode(term)
    }

    /// Term held by an inline id.
    pub fn extract(self) -> Option<Term> {
        inline::decode(self)
    }

    /// Big-endian bytes.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    /// Reads a big-endian id from the first 8 bytes of `src`.
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        ord::get_u64_be(src, 0).map(NodeId)
    }

    /// Writes the id big-endian at `dst[off..off + 8]`.
    pub fn write_to(self, dst: &mut [u8], off: usize) {
        ord::put_u64_be(dst, off, self.0);
    }

    /// Reads the id at `src[off..off + 8]`.
    pub fn read_from(src: &[u8], off: usize) -> Result<Self> {
        ord::get_u64_be(src, off).map(NodeId)
    }

    /// The next id in key order, or `None` at the top of the key space.
    pub fn successor(self) -> Option<NodeId> {
        self.0.checked_add(1).map(NodeId)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == NodeId::ANY {
            return f.write_str("[ANY]");
        }
        if *self == NodeId::DOES_NOT_EXIST {
            return f.write_str("[DOES_NOT_EXIST]");
        }
        match self.kind() {
            NodeIdType::Ptr => write!(f, "[{:#x}]", self.0),
            NodeIdType::Special => write!(f, "[special {:#018x}]", self.0),
            kind => match self.extract() {
                Some(Term::Literal { lexical, .. }) => write!(f, "[{kind:?} {lexical}]"),
                _ => write!(f, "[{kind:?} {:#018x}]", self.0),
            },
        }
    }
}

/// What a [`NodeId`] encodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeIdType {
    /// Offset into the node dictionary.
    Ptr,
    /// Reserved pattern (wildcard, not-found marker, unknown tag).
    Special,
    /// Inline `xsd:double`.
    Double,
    /// Inline `xsd:integer`.
    Integer,
    /// Inline `xsd:decimal`.
    Decimal,
    /// Inline `xsd:float`.
    Float,
    /// Inline `xsd:dateTime`.
    DateTime,
    /// Inline `xsd:dateTimeStamp`.
    DateTimeStamp,
    /// Inline `xsd:date`.
    Date,
    /// Inline `xsd:boolean`.
    Boolean,
    /// Inline `xsd:long`.
    Long,
    /// Inline `xsd:int`.
    Int,
    /// Inline `xsd:short`.
    Short,
    /// Inline `xsd:byte`.
    Byte,
    /// Inline `xsd:nonNegativeInteger`.
    NonNegativeInteger,
    /// Inline `xsd:positiveInteger`.
    PositiveInteger,
    /// Inline `xsd:nonPositiveInteger`.
    NonPositiveInteger,
    /// Inline `xsd:negativeInteger`.
    NegativeInteger,
    /// Inline `xsd:unsignedLong`.
    UnsignedLong,
    /// Inline `xsd:unsignedInt`.
    UnsignedInt,
    /// Inline `xsd:unsignedShort`.
    UnsignedShort,
    /// Inline `xsd:unsignedByte`.
    UnsignedByte,
}

// Tag 0 is never assigned so an all-zero tagged payload stays special.
const TAGGED_TYPES: [(NodeIdType, u8, &str); 19] = [
    (NodeIdType::Integer, 1, xsd::INTEGER),
    (NodeIdType::Decimal, 2, xsd::DECIMAL),
    (NodeIdType::Date, 3, xsd::DATE),
    (NodeIdType::DateTime, 4, xsd::DATE_TIME),
    (NodeIdType::Boolean, 5, xsd::BOOLEAN),
    (NodeIdType::DateTimeStamp, 6, xsd::DATE_TIME_STAMP),
    (NodeIdType::Float, 7, xsd::FLOAT),
    (NodeIdType::Long, 8, xsd::LONG),
    (NodeIdType::Int, 9, xsd::INT),
    (NodeIdType::Short, 10, xsd::SHORT),
    (NodeIdType::Byte, 11, xsd::BYTE),
    (NodeIdType::NonNegativeInteger, 12, xsd::NON_NEGATIVE_INTEGER),
    (NodeIdType::PositiveInteger, 13, xsd::POSITIVE_INTEGER),
    (NodeIdType::NonPositiveInteger, 14, xsd::NON_POSITIVE_INTEGER),
    (NodeIdType::NegativeInteger, 15, xsd::NEGATIVE_INTEGER),
    (NodeIdType::UnsignedLong, 16, xsd::UNSIGNED_LONG),
    (NodeIdType::UnsignedInt, 17, xsd::UNSIGNED_INT),
    (NodeIdType::UnsignedShort, 18, xsd::UNSIGNED_SHORT),
    (NodeIdType::UnsignedByte, 19, xsd::UNSIGNED_BYTE),
];

impl NodeIdType {
    /// 6-bit tag for tagged inline types.
    pub fn tag(self) -> Option<u8> {
        TAGGED_TYPES
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .map(|(_, tag, _)| *tag)
    }

    /// Type for a 6-bit tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        TAGGED_TYPES
            .iter()
            .find(|(_, t, _)| *t == tag)
            .map(|(kind, _, _)| *kind)
    }

    /// Datatype IRI for inline types.
    pub fn datatype(self) -> Option<&'static str> {
        if self == NodeIdType::Double {
            return Some(xsd::DOUBLE);
        }
        TAGGED_TYPES
            .iter()
            .find(|(kind, _, _)| *kind == self)
            .map(|(_, _, dt)| *dt)
    }

    /// Inline type for a datatype IRI.
    pub fn from_datatype(datatype: &str) -> Option<Self> {
        if datatype == xsd::DOUBLE {
            return Some(NodeIdType::Double);
        }
        TAGGED_TYPES
            .iter()
            .find(|(_, _, dt)| *dt == datatype)
            .map(|(kind, _, _)| *kind)
    }

    /// True for `xsd:integer` and its derived types.
    pub fn is_integer(self) -> bool {
        inline::integer_bounds(self).is_some()
    }
}
