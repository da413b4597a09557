//! Condition/mutation evaluation against a live datagram.
//!
//! All field access goes through [`PacketView`], so a rule compiled for a larger
//! packet kind never reads or writes outside a shorter datagram: the condition
//! evaluates false and the mutation is skipped.

use tracing::{debug, error, trace};

use crate::{
    primitive::PrimitiveType,
    rule::{Condition, Mutation, RuleSet},
    view::{PacketView, WireOrder},
};

fn width_matches(field: &str, ty: PrimitiveType, size: usize) -> bool {
    match ty.fixed_size() {
        Some(width) if width != size => {
            error!(field, size, width, "field size does not match its type");
            false
        }
        _ => true,
    }
}

/// Evaluates one condition against `view`.
///
/// Opaque array fields, out-of-bounds fields, fields whose size disagrees with
/// their type and invalid operators evaluate false.
pub fn evaluate_condition<B: AsRef<[u8]>>(view: &PacketView<B>, condition: &Condition) -> bool {
    if condition.ty == PrimitiveType::Array {
        trace!(field = %condition.field, "array fields are never compared");
        return false;
    }
    if !width_matches(&condition.field, condition.ty, condition.size) {
        return false;
    }

    let value = match view.read(condition.offset, condition.ty) {
        Ok(value) => value,
        Err(e) => {
            debug!(field = %condition.field, "condition not evaluated: {}", e);
            return false;
        }
    };
    let Some(literal) = condition.literal.to_scalar(condition.ty) else {
        return false;
    };

    match condition.operator.evaluate(value.compare(&literal)) {
        Some(result) => result,
        None => {
            error!(field = %condition.field, operator = %condition.operator, "invalid operator bit pattern");
            false
        }
    }
}

/// Writes one mutation into `view`. Returns true when bytes were written.
///
/// Arrays, out-of-bounds fields and size/type mismatches are skipped.
pub fn apply_mutation<B>(view: &mut PacketView<B>, mutation: &Mutation) -> bool
where
    B: AsRef<[u8]> + AsMut<[u8]>,
{
    let Some(value) = mutation.literal.to_scalar(mutation.ty) else {
        trace!(field = %mutation.field, "array fields are never written");
        return false;
    };
    if !width_matches(&mutation.field, mutation.ty, mutation.size) {
        return false;
    }

    match view.write(mutation.offset, value) {
        Ok(()) => {
            trace!(field = %mutation.field, literal = %mutation.literal, "applied mutation");
            true
        }
        Err(e) => {
            debug!(field = %mutation.field, "mutation skipped: {}", e);
            false
        }
    }
}

/// Applies every rule in order to `buffer`.
///
/// A rule fires when all of its conditions hold; its mutations are then written in
/// order. Later rules see the writes of earlier ones. Returns true when any
/// mutation wrote to the buffer.
pub fn apply_rules(buffer: &mut [u8], rules: &RuleSet, network_byte_order: bool) -> bool {
    let mut view = PacketView::new(buffer, WireOrder::from_network_flag(network_byte_order));
    let mut fired = false;

    for rule in rules {
        if !rule.conditions.iter().all(|condition| evaluate_condition(&view, condition)) {
            continue;
        }
        for mutation in &rule.mutations {
            fired |= apply_mutation(&mut view, mutation);
        }
    }

    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Literal, Operator, Rule};

    fn condition(offset: usize, ty: PrimitiveType, op: &str, literal: Literal) -> Condition {
        Condition {
            field: "f".into(),
            offset,
            size: ty.fixed_size().unwrap_or(1),
            ty,
            operator: Operator::parse(op).unwrap(),
            literal,
        }
    }

    fn mutation(offset: usize, ty: PrimitiveType, literal: Literal) -> Mutation {
        Mutation { field: "f".into(), offset, size: ty.fixed_size().unwrap_or(1), ty, literal }
    }

    #[test]
    fn test_condition_host_order() {
        let bytes = 10u32.to_ne_bytes();
        let view = PacketView::new(&bytes[..], WireOrder::Host);
        let check = |op, v| evaluate_condition(&view, &condition(0, PrimitiveType::UInt32, op, Literal::Unsigned(v)));
        assert!(check("==", 10));
        assert!(check("<=", 10));
        assert!(!check("<", 10));
        assert!(!check(">=", 11));
        assert!(check("!=", 11));
    }

    #[test]
    fn test_condition_out_of_bounds_is_false() {
        let bytes = [1u8];
        let view = PacketView::new(&bytes[..], WireOrder::Host);
        assert!(!evaluate_condition(&view, &condition(4, PrimitiveType::UInt8, "==", Literal::Unsigned(1))));
        assert!(!evaluate_condition(&view, &condition(0, PrimitiveType::UInt16, "!=", Literal::Unsigned(9))));
    }

    #[test]
    fn test_invalid_operator_is_false() {
        let bytes = [1u8];
        let view = PacketView::new(&bytes[..], WireOrder::Host);
        let mut invalid = condition(0, PrimitiveType::UInt8, "==", Literal::Unsigned(1));
        invalid.operator = Operator::from_bits(0);
        assert!(!evaluate_condition(&view, &invalid));
    }

    #[test]
    fn test_signed_and_float_ordering() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-5i32).to_be_bytes());
        bytes.extend_from_slice(&0.25f64.to_be_bytes());
        let view = PacketView::new(&bytes[..], WireOrder::Network);
        assert!(evaluate_condition(&view, &condition(0, PrimitiveType::Int32, "<", Literal::Signed(0))));
        assert!(evaluate_condition(&view, &condition(4, PrimitiveType::Double, ">", Literal::Float(0.2))));
    }

    #[test]
    fn test_array_condition_and_mutation_are_inert() {
        let mut bytes = [0u8; 4];
        let rule = Rule {
            conditions: Vec::new(),
            mutations: vec![mutation(0, PrimitiveType::Array, Literal::Unsigned(1))],
        };
        assert!(!apply_rules(&mut bytes, &RuleSet::new(vec![rule]), false));
        assert_eq!(bytes, [0; 4]);

        let view = PacketView::new(&bytes[..], WireOrder::Host);
        assert!(!evaluate_condition(&view, &condition(0, PrimitiveType::Array, "==", Literal::Unsigned(0))));
    }

    #[test]
    fn test_size_type_mismatch_is_inert() {
        let mut bytes = 7u32.to_be_bytes();
        let mut narrow = condition(0, PrimitiveType::UInt32, "==", Literal::Unsigned(7));
        narrow.size = 2;
        let view = PacketView::new(&bytes[..], WireOrder::Network);
        assert!(!evaluate_condition(&view, &narrow));

        let mut write = mutation(0, PrimitiveType::UInt32, Literal::Unsigned(9));
        write.size = 8;
        let mut view = PacketView::new(&mut bytes[..], WireOrder::Network);
        assert!(!apply_mutation(&mut view, &write));
        assert_eq!(bytes, 7u32.to_be_bytes());
    }

    #[test]
    fn test_rules_apply_in_order() {
        let mut bytes = [1u8, 0];
        let rules = RuleSet::new(vec![
            Rule {
                conditions: vec![condition(0, PrimitiveType::UInt8, "==", Literal::Unsigned(1))],
                mutations: vec![mutation(0, PrimitiveType::UInt8, Literal::Unsigned(2))],
            },
            Rule {
                conditions: vec![condition(0, PrimitiveType::UInt8, "==", Literal::Unsigned(2))],
                mutations: vec![mutation(1, PrimitiveType::UInt8, Literal::Unsigned(7))],
            },
        ]);
        assert!(apply_rules(&mut bytes, &rules, true));
        assert_eq!(bytes, [2, 7]);
    }

    #[test]
    fn test_unconditional_rule_always_fires() {
        let mut bytes = [0u8, 0];
        let rules = RuleSet::new(vec![Rule {
            conditions: Vec::new(),
            mutations: vec![mutation(0, PrimitiveType::UInt16, Literal::Unsigned(0x0102))],
        }]);
        assert!(apply_rules(&mut bytes, &rules, true));
        assert_eq!(bytes, [0x01, 0x02]);
    }

    #[test]
    fn test_out_of_bounds_mutation_is_skipped() {
        let mut bytes = [0u8; 2];
        let rules = RuleSet::new(vec![Rule {
            conditions: Vec::new(),
            mutations: vec![
                mutation(1, PrimitiveType::UInt32, Literal::Unsigned(1)),
                mutation(0, PrimitiveType::UInt8, Literal::Unsigned(5)),
            ],
        }]);
        assert!(apply_rules(&mut bytes, &rules, false));
        assert_eq!(bytes, [5, 0]);
    }
}
