use std::cmp::Ordering;
use std::fmt;

use derive_ex::derive_ex;
use ordered_float::OrderedFloat;

use super::{Error, Result};

/// A JSON-RPC message identifier.
///
/// An identifier is either absent (`None`, which marks a request as a
/// notification) or carries a string, integer or float value. Kinds are
/// ordered `None < Str < Int < Float` and two identifiers of different
/// kinds are never equal, so `3`, `3.0` and `"3"` are three distinct
/// identifiers.
#[derive(Debug, Clone, Default)]
#[derive_ex(Eq, PartialEq, Hash)]
pub enum MessageId {
    #[default]
    None,
    Str(String),
    Int(i64),
    Float(#[eq(key = OrderedFloat($))] f64),
}

impl MessageId {
    pub fn is_none(&self) -> bool {
        matches!(self, MessageId::None)
    }

    fn kind_rank(&self) -> u8 {
        match self {
            MessageId::None => 0,
            MessageId::Str(_) => 1,
            MessageId::Int(_) => 2,
            MessageId::Float(_) => 3,
        }
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (MessageId::Str(a), MessageId::Str(b)) => a.cmp(b),
            (MessageId::Int(a), MessageId::Int(b)) => a.cmp(b),
            (MessageId::Float(a), MessageId::Float(b)) => {
                OrderedFloat(*a).cmp(&OrderedFloat(*b))
            }
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        MessageId::Int(value)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        MessageId::Str(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        MessageId::Str(value)
    }
}

impl TryFrom<f64> for MessageId {
    type Error = Error;

    /// Fails for NaN and infinities, which have no JSON representation.
    fn try_from(value: f64) -> Result<Self> {
        if value.is_finite() {
            Ok(MessageId::Float(value))
        } else {
            Err(Error::NonFiniteId)
        }
    }
}

impl PartialEq<&str> for MessageId {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, MessageId::Str(s) if s == other)
    }
}

impl PartialEq<i64> for MessageId {
    fn eq(&self, other: &i64) -> bool {
        matches!(self, MessageId::Int(n) if n == other)
    }
}

impl PartialEq<f64> for MessageId {
    fn eq(&self, other: &f64) -> bool {
        matches!(self, MessageId::Float(v) if v == other)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MessageId::None => Ok(()),
            MessageId::Str(s) => f.write_str(s),
            MessageId::Int(n) => write!(f, "{n}"),
            // Always render at least one fractional digit so a float
            // identifier stays distinguishable from an integer one.
            MessageId::Float(v) if v.fract() == 0.0 => write!(f, "{v:.1}"),
            MessageId::Float(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_never_cross_equal() {
        assert_ne!(MessageId::Int(3), MessageId::Float(3.0));
        assert_ne!(MessageId::Int(3), MessageId::from("3"));
        assert_ne!(MessageId::Float(3.0), MessageId::from("3"));
    }

    #[test]
    fn shortcut_equality() {
        assert_eq!(MessageId::from("a"), "a");
        assert_eq!(MessageId::Int(7), 7);
        assert_eq!(MessageId::Float(7.5), 7.5);
        assert_ne!(MessageId::Int(7), 7.0);
    }

    #[test]
    fn order_is_kind_first() {
        let mut ids = vec![
            MessageId::Float(0.5),
            MessageId::Int(9),
            MessageId::from("z"),
            MessageId::None,
            MessageId::from("a"),
            MessageId::Int(-4),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                MessageId::None,
                MessageId::from("a"),
                MessageId::from("z"),
                MessageId::Int(-4),
                MessageId::Int(9),
                MessageId::Float(0.5),
            ]
        );
    }

    #[test]
    fn order_is_consistent_with_equality() {
        let a = MessageId::Float(2.0);
        let b = MessageId::Float(2.0);
        assert_eq!(a.cmp(&b), Ordering::Equal);
        assert_eq!(a, b);
    }

    #[test]
    fn float_construction_rejects_non_finite() {
        assert!(MessageId::try_from(f64::NAN).is_err());
        assert!(MessageId::try_from(f64::INFINITY).is_err());
        assert!(MessageId::try_from(f64::NEG_INFINITY).is_err());
        assert!(MessageId::try_from(2.5).is_ok());
    }

    #[test]
    fn display_keeps_fractional_digit() {
        assert_eq!(MessageId::Float(3.0).to_string(), "3.0");
        assert_eq!(MessageId::Float(3.25).to_string(), "3.25");
        assert_eq!(MessageId::Int(3).to_string(), "3");
        assert_eq!(MessageId::None.to_string(), "");
    }
}
