//! Rule-driven datagram mutation.

use std::{fs, net::SocketAddr, path::Path};

use middleman_core::{
    config::{OffsetMode, ProxyConfig},
    error::{ErrorKind, Result},
    mutator::PacketMutator,
};
use tracing::{debug, info, warn};

use crate::{
    diagnostic::Diagnostic,
    evaluator::apply_rules,
    rule::RuleSet,
    rule_compiler::compile_rules_str,
    schema::{compile_schema_str, Schema},
    view::WireOrder,
};

fn read_document(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| ErrorKind::Document(format!("cannot read {}: {e}", path.display())))
}

/// [`PacketMutator`] that evaluates a compiled [`RuleSet`] against every datagram.
///
/// Rules resolved against an unsound schema (one with unresolved type names) are
/// refused unless [`allow_unsound`](Self::allow_unsound) is set, because the field
/// offsets after the unresolved type cannot be trusted.
#[derive(Debug, Clone)]
pub struct RuleBasedMutator {
    schema: Schema,
    rules: RuleSet,
    network_byte_order: bool,
    allow_unsound: bool,
    diagnostics: Vec<Diagnostic>,
}

impl RuleBasedMutator {
    /// Wraps an already compiled schema and rule set.
    pub fn new(schema: Schema, rules: RuleSet, network_byte_order: bool) -> Self {
        if !schema.is_sound() {
            warn!("schema has unresolved types, rules are disabled until allow_unsound is set");
        }
        info!(
            packets = schema.len(),
            rules = rules.len(),
            conditions = rules.condition_count(),
            mutations = rules.mutation_count(),
            "rule engine ready"
        );
        Self { schema, rules, network_byte_order, allow_unsound: false, diagnostics: Vec::new() }
    }

    /// Compiles a schema document and a rule document given as JSON text.
    pub fn from_json_str(
        schema_json: &str,
        rules_json: &str,
        network_byte_order: bool,
        mode: OffsetMode,
    ) -> Self {
        let (schema, mut diagnostics) = compile_schema_str(schema_json, mode);
        let (rules, rule_diagnostics) = compile_rules_str(rules_json, &schema);
        diagnostics.extend(rule_diagnostics);

        let mut mutator = Self::new(schema, rules, network_byte_order);
        mutator.diagnostics = diagnostics;
        mutator
    }

    /// Compiles a schema file and rule JSON held in memory, e.g. from an editor.
    pub fn from_schema_file_and_rules(
        schema_path: impl AsRef<Path>,
        rules_json: &str,
        network_byte_order: bool,
        mode: OffsetMode,
    ) -> Result<Self> {
        let schema_json = read_document(schema_path.as_ref())?;
        Ok(Self::from_json_str(&schema_json, rules_json, network_byte_order, mode))
    }

    /// Compiles a schema file and, when given, a rule file.
    ///
    /// Without a rule file the mutator has no rules and forwards every datagram
    /// unchanged until [`reload_rules`](Self::reload_rules) is called.
    ///
    /// # Errors
    ///
    /// Returns `ErrorKind::Document` if either file cannot be read. Malformed content
    /// is not an error; it is reported through [`diagnostics`](Self::diagnostics).
    pub fn from_files(
        schema_path: impl AsRef<Path>,
        rules_path: Option<&Path>,
        network_byte_order: bool,
        mode: OffsetMode,
    ) -> Result<Self> {
        let schema_path = schema_path.as_ref();
        debug!("Loading schema from {:?}", schema_path);
        let schema_json = read_document(schema_path)?;
        let (schema, mut diagnostics) = compile_schema_str(&schema_json, mode);

        let rules = match rules_path {
            Some(path) => {
                debug!("Loading rules from {:?}", path);
                let (rules, rule_diagnostics) = compile_rules_str(&read_document(path)?, &schema);
                diagnostics.extend(rule_diagnostics);
                rules
            }
            None => RuleSet::default(),
        };

        let mut mutator = Self::new(schema, rules, network_byte_order);
        mutator.diagnostics = diagnostics;
        Ok(mutator)
    }

    /// Builds the mutator described by `config`, or `None` when no schema is configured.
    pub fn from_config(config: &ProxyConfig) -> Result<Option<Self>> {
        let Some(schema_path) = config.schema_file.as_deref() else {
            return Ok(None);
        };
        Self::from_files(
            schema_path,
            config.rules_file.as_deref(),
            config.network_byte_order,
            config.offset_mode,
        )
        .map(Some)
    }

    /// Replaces the rule set wholesale with one compiled from `rules_json`.
    ///
    /// Returns the diagnostics of the new document.
    pub fn reload_rules(&mut self, rules_json: &str) -> &[Diagnostic] {
        let (rules, diagnostics) = compile_rules_str(rules_json, &self.schema);
        info!(previous = self.rules.len(), current = rules.len(), "rules reloaded");
        self.rules = rules;
        self.diagnostics = diagnostics;
        &self.diagnostics
    }

    /// Evaluates rules even when the schema is unsound.
    pub fn allow_unsound(mut self, allow: bool) -> Self {
        self.allow_unsound = allow;
        self
    }

    /// The compiled schema.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The active rule set.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Problems found while compiling the most recent documents.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Whether literals are compared and written big-endian.
    pub fn network_byte_order(&self) -> bool {
        self.network_byte_order
    }

    fn wire_order(&self) -> WireOrder {
        WireOrder::from_network_flag(self.network_byte_order)
    }
}

impl PacketMutator for RuleBasedMutator {
    fn should_mutate(&self, _source: &SocketAddr, _data: &[u8]) -> bool {
        !self.rules.is_empty() && (self.allow_unsound || self.schema.is_sound())
    }

    fn mutate(&mut self, source: &SocketAddr, data: &mut [u8]) -> bool {
        if !self.should_mutate(source, data) {
            return false;
        }

        let fired = apply_rules(data, &self.rules, self.network_byte_order);
        if fired {
            match self.schema.layout_for_opcode(data, self.wire_order()) {
                Some(layout) => debug!(%source, packet = %layout.name(), "mutated datagram"),
                None => debug!(%source, "mutated datagram of unknown kind"),
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use middleman_core::mutator::PassThroughMutator;

    use super::*;

    const SCHEMA: &str = r#"{"packets": [{"name": "ping", "opcode_field": "flag", "opcode": 1,
        "data": [{"value": "flag", "type": "uint8"}]}]}"#;
    const RULES: &str = r#"{"rules": [{"conditions": [{"field": "flag", "operator": "==", "value": 1}],
        "mutations": [{"field": "flag", "new_value": 2}]}]}"#;

    fn source() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_mutates_matching_datagram() {
        let mut mutator = RuleBasedMutator::from_json_str(SCHEMA, RULES, true, OffsetMode::PerPacket);
        assert!(mutator.diagnostics().is_empty());

        let mut data = [0x01];
        assert!(mutator.mutate(&source(), &mut data));
        assert_eq!(data, [0x02]);

        let mut data = [0x00];
        assert!(!mutator.mutate(&source(), &mut data));
        assert_eq!(data, [0x00]);
    }

    #[test]
    fn test_no_rules_skips_evaluation() {
        let mutator = RuleBasedMutator::from_json_str(SCHEMA, r#"{"rules": []}"#, true, OffsetMode::PerPacket);
        assert!(!mutator.should_mutate(&source(), &[0x01]));
    }

    #[test]
    fn test_unsound_schema_is_refused_unless_allowed() {
        let schema = r#"{"packets": [{"name": "p", "opcode_field": "flag", "opcode": 1, "data": [
            {"value": "mystery", "type": "int24"}, {"value": "flag", "type": "uint8"}]}]}"#;
        let mutator = RuleBasedMutator::from_json_str(schema, RULES, true, OffsetMode::PerPacket);
        assert_eq!(mutator.diagnostics().len(), 1);
        assert!(!mutator.should_mutate(&source(), &[0x01]));

        let mut mutator = mutator.allow_unsound(true);
        let mut data = [0x01];
        assert!(mutator.mutate(&source(), &mut data));
        assert_eq!(data, [0x02]);
    }

    #[test]
    fn test_reload_rules_replaces_wholesale() {
        let mut mutator = RuleBasedMutator::from_json_str(SCHEMA, RULES, true, OffsetMode::PerPacket);
        let diagnostics = mutator.reload_rules(
            r#"{"rules": [{"conditions": [], "mutations": [{"field": "nope", "new_value": 1}]}]}"#,
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(mutator.rules().len(), 1);
        assert_eq!(mutator.rules().mutation_count(), 0);

        let mut data = [0x01];
        assert!(!mutator.mutate(&source(), &mut data));
        assert_eq!(data, [0x01]);
    }

    #[test]
    fn test_from_files() {
        let mut schema_file = tempfile::NamedTempFile::new().unwrap();
        schema_file.write_all(SCHEMA.as_bytes()).unwrap();
        let mut rules_file = tempfile::NamedTempFile::new().unwrap();
        rules_file.write_all(RULES.as_bytes()).unwrap();

        let mutator = RuleBasedMutator::from_files(
            schema_file.path(),
            Some(rules_file.path()),
            true,
            OffsetMode::PerPacket,
        )
        .unwrap();
        assert_eq!(mutator.rules().len(), 1);

        let without_rules =
            RuleBasedMutator::from_files(schema_file.path(), None, true, OffsetMode::PerPacket).unwrap();
        assert!(without_rules.rules().is_empty());
    }

    #[test]
    fn test_missing_file_is_document_error() {
        let result = RuleBasedMutator::from_files(
            "/nonexistent/schema.json",
            None,
            true,
            OffsetMode::PerPacket,
        );
        assert!(matches!(result, Err(ErrorKind::Document(_))));
    }

    #[test]
    fn test_from_config_without_schema() {
        assert!(RuleBasedMutator::from_config(&ProxyConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_boxed_mutators_share_the_capability() {
        let mut mutators: Vec<Box<dyn PacketMutator>> = vec![
            Box::new(PassThroughMutator),
            Box::new(RuleBasedMutator::from_json_str(SCHEMA, RULES, true, OffsetMode::PerPacket)),
        ];
        let fired: Vec<bool> = mutators
            .iter_mut()
            .map(|m| {
                let mut data = [0x01];
                m.mutate(&source(), &mut data)
            })
            .collect();
        assert_eq!(fired, vec![false, true]);
    }
}
