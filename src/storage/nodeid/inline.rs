//! Value codecs for inline node ids.

use super::datetime::{self, DateTimeParts};
use super::{NodeId, NodeIdType, DOUBLE_REGION, PAYLOAD_MASK};
use crate::storage::term::Term;

const MANTISSA_MASK: u64 = (1 << 52) - 1;
const EXP9_MASK: u64 = 0x1FF;
const EXP9_SPECIAL: u64 = 511;
// Rebase so that stored exponents 1..=510 cover IEEE exponents 768..=1277.
const EXP_REBASE: u64 = 767;
const CANONICAL_NAN_MANTISSA: u64 = 1 << 51;

const INT56_MIN: i128 = -(1 << 55);
const INT56_MAX: i128 = (1 << 55) - 1;
const DECIMAL_UNSCALED_BITS: u32 = 48;
const DECIMAL_UNSCALED_MIN: i64 = -(1 << 47);
const DECIMAL_UNSCALED_MAX: i64 = (1 << 47) - 1;
const DECIMAL_MAX_SCALE: usize = 127;

pub(super) fn encode(term: &Term) -> Option<NodeId> {
    let (lexical, datatype) = term.typed_parts()?;
    let kind = NodeIdType::from_datatype(datatype)?;
    match kind {
        NodeIdType::Double => encode_double(parse_double(lexical)?),
        NodeIdType::Float => {
            let value = parse_float(lexical)?;
            let bits = if value.is_nan() { f32::NAN.to_bits() } else { value.to_bits() };
            NodeId::tagged(kind, bits as u64)
        }
        NodeIdType::Decimal => NodeId::tagged(kind, encode_decimal(lexical)?),
        NodeIdType::Boolean => match lexical {
            "true" => NodeId::tagged(kind, 1),
            "false" => NodeId::tagged(kind, 0),
            _ => None,
        },
        NodeIdType::DateTime => NodeId::tagged(kind, datetime::parse_date_time(lexical)?.pack()),
        NodeIdType::DateTimeStamp => {
            let parts = datetime::parse_date_time(lexical)?;
            parts.tz_quarters?;
            NodeId::tagged(kind, parts.pack())
        }
        NodeIdType::Date => NodeId::tagged(kind, datetime::parse_date(lexical)?.pack()),
        NodeIdType::Ptr | NodeIdType::Special => None,
        integer => {
            let value = parse_integer(lexical)?;
            let (lo, hi) = integer_bounds(integer)?;
            if value < lo || value > hi {
                return None;
            }
            NodeId::tagged(integer, (value as i64 as u64) & PAYLOAD_MASK)
        }
    }
}

pub(super) fn decode(id: NodeId) -> Option<Term> {
    let kind = id.kind();
    let datatype = kind.datatype()?;
    let payload = id.payload();
    let lexical = match kind {
        NodeIdType::Double => canonical_double(decode_double(id)?),
        NodeIdType::Float => canonical_float(f32::from_bits(u32::try_from(payload).ok()?)),
        NodeIdType::Decimal => decode_decimal(payload)?,
        NodeIdType::Boolean => match payload {
            0 => "false".to_owned(),
            1 => "true".to_owned(),
            _ => return None,
        },
        NodeIdType::DateTime | NodeIdType::DateTimeStamp => {
            DateTimeParts::unpack(payload)?.format_date_time()
        }
        NodeIdType::Date => DateTimeParts::unpack(payload)?.format_date(),
        NodeIdType::Ptr | NodeIdType::Special => return None,
        _ => sign_extend(payload, 56).to_string(),
    };
    Some(Term::typed(lexical, datatype))
}

/// Value space of `kind` clipped to 56 bits, for integer types.
pub(super) fn integer_bounds(kind: NodeIdType) -> Option<(i128, i128)> {
    let (lo, hi): (i128, i128) = match kind {
        NodeIdType::Integer => (INT56_MIN, INT56_MAX),
        NodeIdType::Long => (i64::MIN as i128, i64::MAX as i128),
        NodeIdType::Int => (i32::MIN as i128, i32::MAX as i128),
        NodeIdType::Short => (i16::MIN as i128, i16::MAX as i128),
        NodeIdType::Byte => (i8::MIN as i128, i8::MAX as i128),
        NodeIdType::NonNegativeInteger => (0, INT56_MAX),
        NodeIdType::PositiveInteger => (1, INT56_MAX),
        NodeIdType::NonPositiveInteger => (INT56_MIN, 0),
        NodeIdType::NegativeInteger => (INT56_MIN, -1),
        NodeIdType::UnsignedLong => (0, u64::MAX as i128),
        NodeIdType::UnsignedInt => (0, u32::MAX as i128),
        NodeIdType::UnsignedShort => (0, u16::MAX as i128),
        NodeIdType::UnsignedByte => (0, u8::MAX as i128),
        _ => return None,
    };
    Some((lo.max(INT56_MIN), hi.min(INT56_MAX)))
}

fn parse_integer(lexical: &str) -> Option<i128> {
    // Longer strings cannot be in range and would overflow i128 parsing.
    if lexical.len() > 20 {
        return None;
    }
    let value: i128 = lexical.parse().ok()?;
    (value.to_string() == lexical).then_some(value)
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// Canonical `xsd:double` lexical form: `1.0E0`, `-2.5E-3`, `INF`, `NaN`.
pub(super) fn canonical_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "INF" } else { "-INF" };
        text.to_owned()
    } else {
        with_point(format!("{value:E}"))
    }
}

fn canonical_float(value: f32) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        let text = if value > 0.0 { "INF" } else { "-INF" };
        text.to_owned()
    } else {
        with_point(format!("{value:E}"))
    }
}

// `{:E}` prints `1E0`; the canonical mantissa always has a fraction digit.
fn with_point(formatted: String) -> String {
    match formatted.find('E') {
        Some(e) if !formatted[..e].contains('.') => {
            format!("{}.0{}", &formatted[..e], &formatted[e..])
        }
        _ => formatted,
    }
}

fn parse_double(lexical: &str) -> Option<f64> {
    let value = match lexical {
        "NaN" => f64::NAN,
        "INF" => f64::INFINITY,
        "-INF" => f64::NEG_INFINITY,
        other => other.parse().ok()?,
    };
    (canonical_double(value) == lexical).then_some(value)
}

fn parse_float(lexical: &str) -> Option<f32> {
    let value = match lexical {
        "NaN" => f32::NAN,
        "INF" => f32::INFINITY,
        "-INF" => f32::NEG_INFINITY,
        other => other.parse().ok()?,
    };
    (canonical_float(value) == lexical).then_some(value)
}

fn encode_double(value: f64) -> Option<NodeId> {
    if value.is_nan() {
        return Some(NodeId::from_raw(
            DOUBLE_REGION | (EXP9_SPECIAL << 52) | CANONICAL_NAN_MANTISSA,
        ));
    }
    let bits = value.to_bits();
    let sign = bits >> 63;
    let exponent = (bits >> 52) & 0x7FF;
    let mantissa = bits & MANTISSA_MASK;
    let exp9 = match exponent {
        0 if mantissa == 0 => 0,
        0x7FF if mantissa == 0 => EXP9_SPECIAL,
        768..=1277 => exponent - EXP_REBASE,
        _ => return None,
    };
    Some(NodeId::from_raw(
        DOUBLE_REGION | (sign << 61) | (exp9 << 52) | mantissa,
    ))
}

/// The double held by `id`, or `None` for non-double and reserved patterns.
pub(super) fn decode_double(id: NodeId) -> Option<f64> {
    let raw = id.as_u64();
    if raw & DOUBLE_REGION != DOUBLE_REGION {
        return None;
    }
    let sign = (raw >> 61) & 1;
    let exp9 = (raw >> 52) & EXP9_MASK;
    let mantissa = raw & MANTISSA_MASK;
    match exp9 {
        0 if mantissa == 0 => Some(f64::from_bits(sign << 63)),
        0 => None,
        EXP9_SPECIAL if mantissa == 0 => Some(if sign == 0 {
            f64::INFINITY
        } else {
            f64::NEG_INFINITY
        }),
        EXP9_SPECIAL if sign == 0 && mantissa == CANONICAL_NAN_MANTISSA => Some(f64::NAN),
        EXP9_SPECIAL => None,
        _ => Some(f64::from_bits(
            (sign << 63) | ((exp9 + EXP_REBASE) << 52) | mantissa,
        )),
    }
}

fn encode_decimal(lexical: &str) -> Option<u64> {
    let (negative, body) = match lexical.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, lexical),
    };
    let (int_part, frac_part) = body.split_once('.')?;
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(int_part) || !all_digits(frac_part) {
        return None;
    }
    if int_part.len() > 1 && int_part.starts_with('0') {
        return None;
    }
    if frac_part.len() > 1 && frac_part.ends_with('0') {
        return None;
    }
    let frac_part = if frac_part == "0" { "" } else { frac_part };
    if negative && int_part == "0" && frac_part.is_empty() {
        return None;
    }
    let scale = frac_part.len();
    if scale > DECIMAL_MAX_SCALE || int_part.len() + scale > 18 {
        return None;
    }
    let digits: i64 = format!("{int_part}{frac_part}").parse().ok()?;
    let unscaled = if negative { -digits } else { digits };
    if !(DECIMAL_UNSCALED_MIN..=DECIMAL_UNSCALED_MAX).contains(&unscaled) {
        return None;
    }
    let unscaled_bits = (unscaled as u64) & ((1 << DECIMAL_UNSCALED_BITS) - 1);
    Some(((scale as u64) << DECIMAL_UNSCALED_BITS) | unscaled_bits)
}

fn decode_decimal(payload: u64) -> Option<String> {
    let scale = (payload >> DECIMAL_UNSCALED_BITS) as usize;
    if scale > DECIMAL_MAX_SCALE {
        return None;
    }
    let unscaled = sign_extend(payload, DECIMAL_UNSCALED_BITS);
    if scale == 0 {
        return Some(format!("{unscaled}.0"));
    }
    let digits = format!("{:0>width$}", unscaled.unsigned_abs(), width = scale + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - scale);
    let sign = if unscaled < 0 { "-" } else { "" };
    Some(format!("{sign}{int_part}.{frac_part}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_window_edges() {
        let smallest = f64::from_bits(768 << 52);
        let largest = f64::from_bits((1277 << 52) | MANTISSA_MASK);
        let id = encode_double(smallest).unwrap();
        assert_eq!(decode_double(id), Some(smallest));
        assert_eq!(decode_double(encode_double(largest).unwrap()), Some(largest));
        assert!(encode_double(f64::from_bits(767 << 52)).is_none());
        assert!(encode_double(f64::from_bits(1278 << 52)).is_none());
    }

    #[test]
    fn negative_zero_keeps_its_sign() {
        let id = encode_double(-0.0).unwrap();
        let back = decode_double(id).unwrap();
        assert!(back == 0.0 && back.is_sign_negative());
        assert_eq!(canonical_double(back), "-0.0E0");
    }

    #[test]
    fn decimal_payload_layout() {
        let payload = encode_decimal("-1.25").unwrap();
        assert_eq!(payload >> 48, 2);
        assert_eq!(sign_extend(payload, 48), -125);
        assert_eq!(decode_decimal(payload).as_deref(), Some("-1.25"));
        assert_eq!(decode_decimal(encode_decimal("0.001").unwrap()).as_deref(), Some("0.001"));
    }

    #[test]
    fn integer_bounds_clip_to_56_bits() {
        assert_eq!(integer_bounds(NodeIdType::UnsignedLong), Some((0, INT56_MAX)));
        assert_eq!(integer_bounds(NodeIdType::Long), Some((INT56_MIN, INT56_MAX)));
        assert_eq!(integer_bounds(NodeIdType::Decimal), None);
    }
}
