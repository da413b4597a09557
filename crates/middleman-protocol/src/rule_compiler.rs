//! Rule document compilation.
//!
//! ```json
//! {"rules": [{
//!     "conditions": [{"field": "hdr.kind", "operator": "==", "value": 1}],
//!     "mutations": [{"field": "seq", "new_value": 0}]
//! }]}
//! ```
//!
//! Field names are resolved against the compiled [`Schema`]; each condition and
//! mutation carries the resolved offset, size and type so evaluation never looks
//! names up again.

use serde_json::{Map, Number, Value};
use tracing::{debug, warn};

use crate::{
    diagnostic::{CompileError, Diagnostic},
    rule::{Condition, Literal, Mutation, Operator, Rule, RuleSet},
    schema::{Field, Schema},
};

fn string_key<'a>(entry: &'a Map<String, Value>, key: &'static str) -> Result<&'a str, CompileError> {
    entry.get(key).and_then(Value::as_str).ok_or(CompileError::MissingKey(key))
}

fn number_key<'a>(
    entry: &'a Map<String, Value>,
    key: &'static str,
    field: &str,
) -> Result<&'a Number, CompileError> {
    match entry.get(key) {
        None => Err(CompileError::MissingKey(key)),
        Some(Value::Number(number)) => Ok(number),
        Some(_) => Err(CompileError::InvalidLiteral(field.to_string())),
    }
}

fn resolve<'s>(schema: &'s Schema, name: &str) -> Result<&'s Field, CompileError> {
    schema.resolve(name).ok_or_else(|| CompileError::UnknownField(name.to_string()))
}

fn compile_condition(value: &Value, schema: &Schema) -> Result<Condition, CompileError> {
    let entry = value.as_object().ok_or_else(|| CompileError::MalformedEntry(value.to_string()))?;
    let name = string_key(entry, "field")?;
    let field = resolve(schema, name)?;
    let symbol = string_key(entry, "operator")?;
    let operator =
        Operator::parse(symbol).ok_or_else(|| CompileError::InvalidOperator(symbol.to_string()))?;
    let literal = Literal::from_number(number_key(entry, "value", name)?, field.ty);

    Ok(Condition {
        field: name.to_string(),
        offset: field.offset,
        size: field.size,
        ty: field.ty,
        operator,
        literal,
    })
}

fn compile_mutation(value: &Value, schema: &Schema) -> Result<Mutation, CompileError> {
    let entry = value.as_object().ok_or_else(|| CompileError::MalformedEntry(value.to_string()))?;
    let name = string_key(entry, "field")?;
    let field = resolve(schema, name)?;
    let literal = Literal::from_number(number_key(entry, "new_value", name)?, field.ty);

    Ok(Mutation { field: name.to_string(), offset: field.offset, size: field.size, ty: field.ty, literal })
}

/// Compiles a parsed rule document against `schema`.
///
/// Conditions and mutations that cannot be resolved are dropped one by one; the
/// rest of their rule still compiles. A rule entry without both a `conditions` and
/// a `mutations` array is dropped whole.
pub fn compile_rules(document: &Value, schema: &Schema) -> (RuleSet, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let Some(entries) = document.get("rules").and_then(Value::as_array) else {
        diagnostics.push(Diagnostic::report("rules", CompileError::MissingKey("rules")));
        return (RuleSet::default(), diagnostics);
    };

    let mut rules = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let location = format!("rules[{index}]");
        let Some(conditions) = entry.get("conditions").and_then(Value::as_array) else {
            diagnostics.push(Diagnostic::report(location, CompileError::MissingKey("conditions")));
            continue;
        };
        let Some(mutations) = entry.get("mutations").and_then(Value::as_array) else {
            diagnostics.push(Diagnostic::report(location, CompileError::MissingKey("mutations")));
            continue;
        };

        let mut rule = Rule::default();
        for (position, value) in conditions.iter().enumerate() {
            match compile_condition(value, schema) {
                Ok(condition) => rule.conditions.push(condition),
                Err(error) => diagnostics.push(Diagnostic::report(
                    format!("{location}.conditions[{position}]"),
                    error,
                )),
            }
        }
        for (position, value) in mutations.iter().enumerate() {
            match compile_mutation(value, schema) {
                Ok(mutation) => rule.mutations.push(mutation),
                Err(error) => diagnostics.push(Diagnostic::report(
                    format!("{location}.mutations[{position}]"),
                    error,
                )),
            }
        }

        if rule.conditions.is_empty() && !conditions.is_empty() {
            warn!(%location, "every condition was dropped, rule now fires on every packet");
        }
        debug!(
            %location,
            conditions = rule.conditions.len(),
            mutations = rule.mutations.len(),
            "compiled rule"
        );
        rules.push(rule);
    }

    (RuleSet::new(rules), diagnostics)
}

/// Parses and compiles a rule document from JSON text.
pub fn compile_rules_str(json: &str, schema: &Schema) -> (RuleSet, Vec<Diagnostic>) {
    match serde_json::from_str::<Value>(json) {
        Ok(document) => compile_rules(&document, schema),
        Err(e) => {
            let diagnostic = Diagnostic::report("rules", CompileError::MalformedJson(e.to_string()));
            (RuleSet::default(), vec![diagnostic])
        }
    }
}
