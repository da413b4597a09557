//! Compiled rule types.

use std::{cmp::Ordering, fmt};

use serde_json::Number;

use crate::{primitive::PrimitiveType, view::Scalar};

// ============================================================================
// Operator
// ============================================================================

/// Comparison operator bitmask.
///
/// `<=` and `>=` are stored as [`Operator::EQUAL`] OR-ed with the strict comparison.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Operator(u8);

impl Operator {
    /// `==`
    pub const EQUAL: u8 = 0x01;
    /// `!=`
    pub const NOT_EQUAL: u8 = 0x02;
    /// `<`
    pub const LESS_THAN: u8 = 0x04;
    /// `>`
    pub const GREATER_THAN: u8 = 0x08;

    /// Parses one of `== != < > <= >=`.
    pub fn parse(symbol: &str) -> Option<Self> {
        let bits = match symbol {
            "==" => Self::EQUAL,
            "!=" => Self::NOT_EQUAL,
            "<" => Self::LESS_THAN,
            ">" => Self::GREATER_THAN,
            "<=" => Self::EQUAL | Self::LESS_THAN,
            ">=" => Self::EQUAL | Self::GREATER_THAN,
            _ => return None,
        };
        Some(Self(bits))
    }

    /// Wraps a raw bit pattern without validating it.
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bit pattern.
    pub fn bits(self) -> u8 {
        self.0
    }

    /// True for the six bit patterns `parse` can produce.
    pub fn is_valid(self) -> bool {
        self.symbol().is_some()
    }

    fn symbol(self) -> Option<&'static str> {
        const LESS_EQUAL: u8 = Operator::EQUAL | Operator::LESS_THAN;
        const GREATER_EQUAL: u8 = Operator::EQUAL | Operator::GREATER_THAN;
        match self.0 {
            Self::EQUAL => Some("=="),
            Self::NOT_EQUAL => Some("!="),
            Self::LESS_THAN => Some("<"),
            Self::GREATER_THAN => Some(">"),
            LESS_EQUAL => Some("<="),
            GREATER_EQUAL => Some(">="),
            _ => None,
        }
    }

    /// Applies the operator to the ordering of `field` relative to `literal`.
    ///
    /// An unordered pair (NaN) only satisfies `!=`. Returns `None` for an invalid
    /// bit pattern.
    pub fn evaluate(self, ordering: Option<Ordering>) -> Option<bool> {
        self.symbol()?;
        let Some(ordering) = ordering else {
            return Some(self.0 == Self::NOT_EQUAL);
        };
        let result = match ordering {
            Ordering::Equal => self.0 & Self::EQUAL != 0,
            Ordering::Less => self.0 & (Self::LESS_THAN | Self::NOT_EQUAL) != 0,
            Ordering::Greater => self.0 & (Self::GREATER_THAN | Self::NOT_EQUAL) != 0,
        };
        Some(result)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(symbol) => f.write_str(symbol),
            None => write!(f, "<invalid {:#04x}>", self.0),
        }
    }
}

// ============================================================================
// Literal
// ============================================================================

/// A rule literal, stored in the slot matching the resolved field type.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Literal {
    /// Literal for `float` and `double` fields.
    Float(f64),
    /// Literal for signed integer fields.
    Signed(i64),
    /// Literal for unsigned integer fields.
    Unsigned(u64),
}

impl Literal {
    /// Picks the slot for `ty` and converts the JSON number into it.
    ///
    /// Fractional numbers for integer fields truncate toward zero. Negative numbers
    /// for unsigned fields then wrap, whether written as integers or as floats.
    pub fn from_number(number: &Number, ty: PrimitiveType) -> Self {
        let natural = if let Some(v) = number.as_u64() {
            Literal::Unsigned(v)
        } else if let Some(v) = number.as_i64() {
            Literal::Signed(v)
        } else {
            Literal::Float(number.as_f64().unwrap_or(f64::NAN))
        };

        match ty {
            PrimitiveType::Float | PrimitiveType::Double => Literal::Float(natural.as_f64()),
            PrimitiveType::Int8
            | PrimitiveType::Int16
            | PrimitiveType::Int32
            | PrimitiveType::Int64 => Literal::Signed(natural.as_i64()),
            PrimitiveType::UInt8
            | PrimitiveType::UInt16
            | PrimitiveType::UInt32
            | PrimitiveType::UInt64 => Literal::Unsigned(natural.as_u64()),
            PrimitiveType::Array => natural,
        }
    }

    /// The literal as a double.
    pub fn as_f64(self) -> f64 {
        match self {
            Literal::Float(v) => v,
            Literal::Signed(v) => v as f64,
            Literal::Unsigned(v) => v as f64,
        }
    }

    /// The literal as a signed 64-bit integer.
    pub fn as_i64(self) -> i64 {
        match self {
            Literal::Float(v) => v as i64,
            Literal::Signed(v) => v,
            Literal::Unsigned(v) => v as i64,
        }
    }

    /// The literal as an unsigned 64-bit integer. Negative values wrap.
    pub fn as_u64(self) -> u64 {
        match self {
            Literal::Float(v) if v < 0.0 => v as i64 as u64,
            Literal::Float(v) => v as u64,
            Literal::Signed(v) => v as u64,
            Literal::Unsigned(v) => v,
        }
    }

    /// Narrows the literal to a value of `ty`. `None` for opaque arrays.
    pub fn to_scalar(self, ty: PrimitiveType) -> Option<Scalar> {
        let scalar = match ty {
            PrimitiveType::Int8 => Scalar::I8(self.as_i64() as i8),
            PrimitiveType::Int16 => Scalar::I16(self.as_i64() as i16),
            PrimitiveType::Int32 => Scalar::I32(self.as_i64() as i32),
            PrimitiveType::Int64 => Scalar::I64(self.as_i64()),
            PrimitiveType::UInt8 => Scalar::U8(self.as_u64() as u8),
            PrimitiveType::UInt16 => Scalar::U16(self.as_u64() as u16),
            PrimitiveType::UInt32 => Scalar::U32(self.as_u64() as u32),
            PrimitiveType::UInt64 => Scalar::U64(self.as_u64()),
            PrimitiveType::Float => Scalar::F32(self.as_f64() as f32),
            PrimitiveType::Double => Scalar::F64(self.as_f64()),
            PrimitiveType::Array => return None,
        };
        Some(scalar)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Signed(v) => write!(f, "{v}"),
            Literal::Unsigned(v) => write!(f, "{v}"),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// A resolved comparison against one field.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    /// Field name as written in the rule document.
    pub field: String,
    /// Byte offset of the field.
    pub offset: usize,
    /// Byte size of the field. Must match the width of `ty` for the condition to hold.
    pub size: usize,
    /// Field type.
    pub ty: PrimitiveType,
    /// Comparison to apply.
    pub operator: Operator,
    /// Right-hand side of the comparison.
    pub literal: Literal,
}

/// A resolved write into one field.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    /// Field name as written in the rule document.
    pub field: String,
    /// Byte offset of the field.
    pub offset: usize,
    /// Byte size of the field. Must match the width of `ty` for the write to happen.
    pub size: usize,
    /// Field type.
    pub ty: PrimitiveType,
    /// Value written when the rule fires.
    pub literal: Literal,
}

/// Conditions that must all hold and the mutations applied when they do.
///
/// A rule without conditions always fires.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Rule {
    /// Conjunction of conditions.
    pub conditions: Vec<Condition>,
    /// Mutations, applied in order.
    pub mutations: Vec<Mutation>,
}

/// Ordered, compiled rules of one rule document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Wraps compiled rules.
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Rules in document order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Iterates over the rules in document order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when there is nothing to evaluate.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Total number of conditions across all rules.
    pub fn condition_count(&self) -> usize {
        self.rules.iter().map(|rule| rule.conditions.len()).sum()
    }

    /// Total number of mutations across all rules.
    pub fn mutation_count(&self) -> usize {
        self.rules.iter().map(|rule| rule.mutations.len()).sum()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(json: &str) -> Number {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse("==").unwrap().bits(), Operator::EQUAL);
        assert_eq!(Operator::parse("<=").unwrap().bits(), Operator::EQUAL | Operator::LESS_THAN);
        assert_eq!(
            Operator::parse(">=").unwrap().bits(),
            Operator::EQUAL | Operator::GREATER_THAN
        );
        assert!(Operator::parse("=<").is_none());
        assert!(Operator::parse("").is_none());
    }

    #[test]
    fn test_operator_truth_table() {
        use Ordering::*;
        let table = [
            ("==", [false, true, false]),
            ("!=", [true, false, true]),
            ("<", [true, false, false]),
            (">", [false, false, true]),
            ("<=", [true, true, false]),
            (">=", [false, true, true]),
        ];
        for (symbol, expected) in table {
            let op = Operator::parse(symbol).unwrap();
            let actual = [Less, Equal, Greater].map(|o| op.evaluate(Some(o)).unwrap());
            assert_eq!(actual, expected, "operator {symbol}");
        }
    }

    #[test]
    fn test_operator_unordered() {
        assert_eq!(Operator::parse("!=").unwrap().evaluate(None), Some(true));
        assert_eq!(Operator::parse("==").unwrap().evaluate(None), Some(false));
        assert_eq!(Operator::parse(">=").unwrap().evaluate(None), Some(false));
    }

    #[test]
    fn test_invalid_bit_pattern() {
        let op = Operator::from_bits(Operator::LESS_THAN | Operator::GREATER_THAN);
        assert!(!op.is_valid());
        assert_eq!(op.evaluate(Some(Ordering::Less)), None);
        assert_eq!(op.to_string(), "<invalid 0x0c>");
        assert_eq!(Operator::parse(">=").unwrap().to_string(), ">=");
    }

    #[test]
    fn test_literal_slots_round_trip() {
        let five = number("5");
        assert_eq!(Literal::from_number(&five, PrimitiveType::UInt64), Literal::Unsigned(5));
        assert_eq!(Literal::from_number(&five, PrimitiveType::Int64), Literal::Signed(5));
        assert_eq!(Literal::from_number(&five, PrimitiveType::Double), Literal::Float(5.0));
        assert_eq!(Literal::from_number(&number("-3"), PrimitiveType::Int16), Literal::Signed(-3));
        assert_eq!(
            Literal::from_number(&number("2.5"), PrimitiveType::Float),
            Literal::Float(2.5)
        );
        assert_eq!(
            Literal::from_number(&number("18446744073709551615"), PrimitiveType::UInt64),
            Literal::Unsigned(u64::MAX)
        );
    }

    #[test]
    fn test_literal_conversions() {
        assert_eq!(Literal::from_number(&number("-1"), PrimitiveType::UInt8).as_u64(), u64::MAX);
        assert_eq!(Literal::from_number(&number("7.9"), PrimitiveType::Int32), Literal::Signed(7));
        assert_eq!(Literal::from_number(&number("9"), PrimitiveType::Array), Literal::Unsigned(9));
    }

    #[test]
    fn test_negative_float_wraps_like_integer() {
        let from_float = Literal::from_number(&number("-1.5"), PrimitiveType::UInt8);
        let from_integer = Literal::from_number(&number("-1"), PrimitiveType::UInt8);
        assert_eq!(from_float, from_integer);
        assert_eq!(from_float.to_scalar(PrimitiveType::UInt8), Some(Scalar::U8(255)));
        assert_eq!(Literal::Float(-2.0).to_scalar(PrimitiveType::UInt16), Some(Scalar::U16(0xFFFE)));
        assert_eq!(Literal::Float(1.8e19).as_u64(), 18_000_000_000_000_000_000);
    }

    #[test]
    fn test_literal_to_scalar() {
        assert_eq!(Literal::Unsigned(0xABCD).to_scalar(PrimitiveType::UInt16), Some(Scalar::U16(0xABCD)));
        assert_eq!(Literal::Unsigned(300).to_scalar(PrimitiveType::UInt8), Some(Scalar::U8(44)));
        assert_eq!(Literal::Signed(-2).to_scalar(PrimitiveType::Int8), Some(Scalar::I8(-2)));
        assert_eq!(Literal::Float(1.5).to_scalar(PrimitiveType::Float), Some(Scalar::F32(1.5)));
        assert_eq!(Literal::Unsigned(1).to_scalar(PrimitiveType::Array), None);
    }

    #[test]
    fn test_rule_set_counts() {
        let mutation = Mutation {
            field: "a".into(),
            offset: 0,
            size: 1,
            ty: PrimitiveType::UInt8,
            literal: Literal::Unsigned(1),
        };
        let rules = RuleSet::new(vec![
            Rule { conditions: Vec::new(), mutations: vec![mutation.clone(), mutation.clone()] },
            Rule { conditions: Vec::new(), mutations: vec![mutation] },
        ]);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.condition_count(), 0);
        assert_eq!(rules.mutation_count(), 3);
        assert_eq!((&rules).into_iter().count(), 2);
    }
}
