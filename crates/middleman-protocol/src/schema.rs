//! Packet schema compilation.
//!
//! A schema document describes each packet kind as a tree of struct nodes and leaves:
//!
//! ```json
//! {"packets": [{"name": "ping", "opcode_field": "hdr.kind", "opcode": 1, "data": [
//!     {"struct": "hdr", "data": [{"value": "kind", "type": "uint8"}]},
//!     {"value": "pad", "size": 24},
//!     {"value": "seq", "type": "uint32"}
//! ]}]}
//! ```
//!
//! Compilation flattens the tree into one [`PacketLayout`] per packet: struct nodes only
//! contribute a dotted name prefix, typed leaves take their type's fixed size and sized
//! leaves take `ceil(size / 8)` bytes.

use std::{collections::HashMap, fmt::Write};

use middleman_core::config::OffsetMode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    diagnostic::{CompileError, Diagnostic},
    primitive::PrimitiveType,
    view::{PacketView, WireOrder},
};

/// Joins struct names and leaf names into a fully qualified field name.
pub const FIELD_SEPARATOR: &str = ".";

// ============================================================================
// Layout Types
// ============================================================================

/// One named, offset-addressed value inside a packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    /// Fully qualified name, e.g. `header.length`.
    pub name: String,
    /// Byte offset from the start of the datagram.
    pub offset: usize,
    /// Resolved type; [`PrimitiveType::Array`] for sized leaves.
    pub ty: PrimitiveType,
    /// Size in bytes.
    pub size: usize,
    /// Type as written in the schema, kept for diagnostics.
    pub type_name: String,
}

/// Flattened field table of one packet kind.
#[derive(Clone, Debug)]
pub struct PacketLayout {
    name: String,
    opcode_field: String,
    opcode: i64,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    unresolved_types: usize,
}

impl PacketLayout {
    /// Builds a layout. A name declared twice resolves to its last declaration.
    pub fn new(
        name: impl Into<String>,
        opcode_field: impl Into<String>,
        opcode: i64,
        fields: Vec<Field>,
    ) -> Self {
        let name = name.into();
        let mut index = HashMap::with_capacity(fields.len());
        for (position, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), position).is_some() {
                warn!(packet = %name, field = %field.name, "duplicate field name, last one wins");
            }
            debug!(packet = %name, field = %field.name, offset = field.offset, "indexed field");
        }
        Self { name, opcode_field: opcode_field.into(), opcode, fields, index, unresolved_types: 0 }
    }

    /// Packet kind name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the field carrying the opcode.
    pub fn opcode_field_name(&self) -> &str {
        &self.opcode_field
    }

    /// Opcode identifying this packet kind.
    pub fn opcode(&self) -> i64 {
        self.opcode
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Looks a field up by fully qualified name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&position| &self.fields[position])
    }

    /// Byte just past the last field.
    pub fn end_offset(&self) -> usize {
        self.fields.iter().map(|f| f.offset + f.size).max().unwrap_or(0)
    }

    /// Number of leaves whose type name could not be resolved.
    pub fn unresolved_types(&self) -> usize {
        self.unresolved_types
    }

    /// False when an unresolved type shifted the offsets of the fields after it.
    pub fn is_sound(&self) -> bool {
        self.unresolved_types == 0
    }

    /// Returns true when `datagram` carries this layout's opcode.
    pub fn matches_opcode(&self, datagram: &[u8], order: WireOrder) -> bool {
        let Some(field) = self.field(&self.opcode_field) else {
            return false;
        };
        let view = PacketView::new(datagram, order);
        match view.read(field.offset, field.ty).ok().and_then(|value| value.as_i128()) {
            Some(value) => value == i128::from(self.opcode),
            None => false,
        }
    }

    /// Human readable field table.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}:", self.name);
        let _ = writeln!(out, "  opcode_field: {}", self.opcode_field);
        let _ = writeln!(out, "  opcode: {}", self.opcode);
        let _ = writeln!(out, "  fields:{{");
        for field in &self.fields {
            let _ = writeln!(out, "    {}: {} @ data[{}]", field.name, field.type_name, field.offset);
        }
        out.push_str("  }\n}");
        out
    }
}

/// All packet layouts of one schema document, in declaration order.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    layouts: Vec<PacketLayout>,
}

impl Schema {
    /// Wraps already compiled layouts.
    pub fn new(layouts: Vec<PacketLayout>) -> Self {
        Self { layouts }
    }

    /// Layouts in declaration order.
    pub fn layouts(&self) -> &[PacketLayout] {
        &self.layouts
    }

    /// Looks a layout up by packet name.
    pub fn layout(&self, name: &str) -> Option<&PacketLayout> {
        self.layouts.iter().find(|layout| layout.name == name)
    }

    /// Resolves a field name across all layouts.
    ///
    /// Packet kinds may declare fields with the same name; the first layout in
    /// declaration order that declares the name wins.
    pub fn resolve(&self, field_name: &str) -> Option<&Field> {
        self.layouts.iter().find_map(|layout| layout.field(field_name))
    }

    /// Finds the packet kind a datagram belongs to by its opcode field.
    pub fn layout_for_opcode(&self, datagram: &[u8], order: WireOrder) -> Option<&PacketLayout> {
        self.layouts.iter().find(|layout| layout.matches_opcode(datagram, order))
    }

    /// True when every layout is sound.
    pub fn is_sound(&self) -> bool {
        self.layouts.iter().all(PacketLayout::is_sound)
    }

    /// Number of layouts.
    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    /// True when the schema declares no packets.
    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

// ============================================================================
// Document Nodes
// ============================================================================

#[derive(Deserialize)]
struct PacketEntry {
    name: String,
    opcode_field: String,
    opcode: i64,
    data: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Node {
    Struct {
        #[serde(rename = "struct")]
        name: String,
        data: Vec<Value>,
    },
    Typed {
        value: String,
        #[serde(rename = "type")]
        type_name: String,
    },
    Sized {
        value: String,
        size: u64,
    },
}

impl Node {
    fn parse(value: &Value) -> Result<Node, CompileError> {
        if let Ok(node) = Node::deserialize(value) {
            return Ok(node);
        }
        if let Some(name) = value.get("struct").and_then(Value::as_str) {
            return Err(CompileError::StructWithoutData(name.to_string()));
        }
        match value.get("value").and_then(Value::as_str) {
            Some(name) => Err(CompileError::UntypedField(name.to_string())),
            None => Err(CompileError::MissingKey("value")),
        }
    }
}

// ============================================================================
// Compiler
// ============================================================================

struct LayoutBuilder<'a> {
    packet: String,
    cursor: usize,
    fields: Vec<Field>,
    unresolved_types: usize,
    diagnostics: &'a mut Vec<Diagnostic>,
}

impl LayoutBuilder<'_> {
    fn flatten(&mut self, nodes: &[Value], prefix: &str, location: &str) {
        for (position, value) in nodes.iter().enumerate() {
            let location = format!("{location}.data[{position}]");
            let node = match Node::parse(value) {
                Ok(node) => node,
                Err(error) => {
                    self.diagnostics.push(Diagnostic::report(location, error));
                    continue;
                }
            };

            match node {
                Node::Struct { name, data } => {
                    debug!(packet = %self.packet, "struct={}", name);
                    let nested = format!("{prefix}{name}{FIELD_SEPARATOR}");
                    self.flatten(&data, &nested, &location);
                }
                Node::Typed { value, type_name } => {
                    let name = format!("{prefix}{value}");
                    let Some(ty) = PrimitiveType::from_type_name(&type_name) else {
                        self.unresolved_types += 1;
                        self.diagnostics.push(Diagnostic::report(
                            location,
                            CompileError::UnknownType { field: name, type_name },
                        ));
                        continue;
                    };
                    let size = ty.fixed_size().unwrap_or(0);
                    self.push(Field { name, offset: self.cursor, ty, size, type_name });
                }
                Node::Sized { value, size } => {
                    let bytes = usize::try_from(size.div_ceil(8)).unwrap_or(usize::MAX);
                    self.push(Field {
                        name: format!("{prefix}{value}"),
                        offset: self.cursor,
                        ty: PrimitiveType::Array,
                        size: bytes,
                        type_name: format!("{size} bits"),
                    });
                }
            }
        }
    }

    fn push(&mut self, field: Field) {
        self.cursor = self.cursor.saturating_add(field.size);
        self.fields.push(field);
    }
}

/// Compiles a parsed schema document into packet layouts.
///
/// Never fails as a whole: malformed packets and nodes are dropped and reported.
pub fn compile_schema(document: &Value, mode: OffsetMode) -> (Schema, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let Some(packets) = document.get("packets").and_then(Value::as_array) else {
        diagnostics.push(Diagnostic::report("schema", CompileError::MissingKey("packets")));
        return (Schema::default(), diagnostics);
    };

    let mut layouts = Vec::with_capacity(packets.len());
    let mut cursor = 0;
    for (position, packet) in packets.iter().enumerate() {
        let location = format!("packets[{position}]");
        let entry = match PacketEntry::deserialize(packet) {
            Ok(entry) => entry,
            Err(e) => {
                diagnostics
                    .push(Diagnostic::report(location, CompileError::MalformedEntry(e.to_string())));
                continue;
            }
        };

        if mode == OffsetMode::PerPacket {
            cursor = 0;
        }

        let mut builder = LayoutBuilder {
            packet: entry.name.clone(),
            cursor,
            fields: Vec::new(),
            unresolved_types: 0,
            diagnostics: &mut diagnostics,
        };
        builder.flatten(&entry.data, "", &location);
        cursor = builder.cursor;
        let unresolved_types = builder.unresolved_types;
        let fields = builder.fields;

        let mut layout = PacketLayout::new(entry.name, entry.opcode_field, entry.opcode, fields);
        layout.unresolved_types = unresolved_types;
        if !layout.is_sound() {
            warn!(
                packet = %layout.name,
                unresolved = unresolved_types,
                "layout has unresolved types, offsets after them are unreliable"
            );
        }
        info!("{}", layout.dump());
        layouts.push(layout);
    }

    (Schema::new(layouts), diagnostics)
}

/// Parses and compiles a schema document from JSON text.
pub fn compile_schema_str(json: &str, mode: OffsetMode) -> (Schema, Vec<Diagnostic>) {
    match serde_json::from_str::<Value>(json) {
        Ok(document) => compile_schema(&document, mode),
        Err(e) => {
            let diagnostic = Diagnostic::report("schema", CompileError::MalformedJson(e.to_string()));
            (Schema::default(), vec![diagnostic])
        }
    }
}
