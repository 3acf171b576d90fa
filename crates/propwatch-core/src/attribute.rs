#![forbid(unsafe_code)]

//! Attribute string parsing and conversion to typed property values.
//!
//! Host attributes are always strings. [`parse_attribute`] classifies a raw
//! attribute into a number, a boolean, or plain text; [`AttributeValue`]
//! converts that classification into a property's type and renders a
//! property value back into attribute text.
//!
//! # Parsing rules
//!
//! | Raw | Result |
//! |-----|--------|
//! | finite numeric literal (`"42"`, `" 1.5e3 "`, `"0x1f"`) | [`AttrValue::Number`] |
//! | `"true"` / `"false"` | [`AttrValue::Bool`] (compared as strings) |
//! | anything else, including `""`, `"NaN"`, `"Infinity"` | [`AttrValue::Text`] |
//!
//! Parsing never fails.

use std::fmt;

/// Classification of a raw attribute string.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    /// A finite number.
    Number(f64),
    /// The literal `"true"` or `"false"`.
    Bool(bool),
    /// Any other string, unchanged.
    Text(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Classify `raw` as a number, boolean, or string.
#[must_use]
pub fn parse_attribute(raw: &str) -> AttrValue {
    if let Some(n) = parse_number(raw) {
        return AttrValue::Number(n);
    }
    match raw {
        "true" => AttrValue::Bool(true),
        "false" => AttrValue::Bool(false),
        _ => AttrValue::Text(raw.to_owned()),
    }
}

/// Finite numeric value of `raw`, following the string-to-number rules hosts
/// use for attributes: surrounding whitespace is ignored, decimal literals may
/// carry a sign and exponent, and `0x`/`0o`/`0b` prefixes select a radix.
/// Blank input is not a number.
fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let radix = match s.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        return parse_radix(&s[2..], radix);
    }
    // Reject the spellings Rust accepts but attribute parsing does not.
    let unsigned = s.trim_start_matches(['+', '-']);
    if !unsigned.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_radix(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    let mut acc = 0.0_f64;
    for c in digits.chars() {
        acc = acc * f64::from(radix) + f64::from(c.to_digit(radix)?);
    }
    acc.is_finite().then_some(acc)
}

/// Render a number the way hosts stringify it for attributes: integral
/// values carry no fractional part, negative zero prints as `0`, and
/// non-finite values print as `NaN`, `Infinity` or `-Infinity`.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_owned();
    }
    if n.is_nan() {
        return "NaN".to_owned();
    }
    if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        return text.to_owned();
    }
    format!("{n}")
}

/// Conversion between a property type and host attribute text.
///
/// Rendering then converting back must yield an equal value, or the
/// attribute echo of a mirrored write would overwrite the property.
pub trait AttributeValue: Sized {
    /// Convert a parsed attribute into `Self`, or `None` if it does not fit.
    fn from_attribute(value: &AttrValue) -> Option<Self>;

    /// Convert raw attribute text into `Self`.
    ///
    /// Defaults to [`from_attribute`](Self::from_attribute) over
    /// [`parse_attribute`]. Types that lose information in that
    /// classification read the text directly.
    fn from_attribute_text(raw: &str) -> Option<Self> {
        Self::from_attribute(&parse_attribute(raw))
    }

    /// Value to assign when the attribute is removed, if the type has one.
    fn from_missing() -> Option<Self> {
        None
    }

    /// Render `self` as attribute text, or `None` for an absent attribute.
    fn to_attribute(&self) -> Option<String>;
}

impl AttributeValue for String {
    fn from_attribute(value: &AttrValue) -> Option<Self> {
        Some(value.to_string())
    }

    fn from_attribute_text(raw: &str) -> Option<Self> {
        Some(raw.to_owned())
    }

    fn to_attribute(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl AttributeValue for bool {
    fn from_attribute(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn to_attribute(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl AttributeValue for f64 {
    fn from_attribute(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn to_attribute(&self) -> Option<String> {
        Some(format_number(*self))
    }
}

impl AttributeValue for f32 {
    fn from_attribute(value: &AttrValue) -> Option<Self> {
        match value {
            AttrValue::Number(n) => Some(*n as f32).filter(|v| v.is_finite()),
            _ => None,
        }
    }

    // Narrowing through f64 can round differently from a direct parse.
    fn from_attribute_text(raw: &str) -> Option<Self> {
        let parsed = parse_attribute(raw);
        if !matches!(parsed, AttrValue::Number(_)) {
            return None;
        }
        raw.trim()
            .parse::<f32>()
            .ok()
            .filter(|v| v.is_finite())
            .or_else(|| Self::from_attribute(&parsed))
    }

    fn to_attribute(&self) -> Option<String> {
        if *self == 0.0 || !self.is_finite() {
            return Some(format_number(f64::from(*self)));
        }
        Some(self.to_string())
    }
}

macro_rules! integer_attribute {
    ($($ty:ty),* $(,)?) => {
        $(
            impl AttributeValue for $ty {
                // `MAX as f64` rounds up for 64-bit types, so the upper
                // bound is exclusive of `MAX + 1`.
                fn from_attribute(value: &AttrValue) -> Option<Self> {
                    match value {
                        AttrValue::Number(n)
                            if n.fract() == 0.0
                                && *n >= <$ty>::MIN as f64
                                && *n < <$ty>::MAX as f64 + 1.0 =>
                        {
                            Some(*n as $ty)
                        }
                        _ => None,
                    }
                }

                // Decimal text is read exactly; f64 holds integers only up
                // to 2^53.
                fn from_attribute_text(raw: &str) -> Option<Self> {
                    let parsed = parse_attribute(raw);
                    if !matches!(parsed, AttrValue::Number(_)) {
                        return None;
                    }
                    raw.trim()
                        .parse::<$ty>()
                        .ok()
                        .or_else(|| Self::from_attribute(&parsed))
                }

                fn to_attribute(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )*
    };
}

integer_attribute!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

/// `None` is an absent attribute. Every attribute text converts through `T`,
/// so `Some("null")` stays distinct from `None`.
impl<T: AttributeValue> AttributeValue for Option<T> {
    fn from_attribute(value: &AttrValue) -> Option<Self> {
        T::from_attribute(value).map(Some)
    }

    fn from_attribute_text(raw: &str) -> Option<Self> {
        T::from_attribute_text(raw).map(Some)
    }

    fn from_missing() -> Option<Self> {
        Some(None)
    }

    fn to_attribute(&self) -> Option<String> {
        self.as_ref().and_then(T::to_attribute)
    }
}
