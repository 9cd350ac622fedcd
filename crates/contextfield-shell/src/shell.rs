//! Parsed protocol shells. Immutable once produced by the parser.

use contextfield_core::ParamValue;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write;

/// Input value marking a key as optional.
pub const DEFAULT_SENTINEL: &str = "<default>";

pub type ParamMap = BTreeMap<String, ParamValue>;

/// One `/namespace.operation{...}` call from a `process` list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolOperation {
    pub namespace: String,
    pub operation: String,
    pub parameters: ParamMap,
    /// Source text of the call, for diagnostics.
    pub raw: String,
}

impl ProtocolOperation {
    pub fn new(
        namespace: impl Into<String>,
        operation: impl Into<String>,
        parameters: ParamMap,
    ) -> Self {
        let namespace = namespace.into();
        let operation = operation.into();
        let mut op = Self {
            namespace,
            operation,
            parameters,
            raw: String::new(),
        };
        op.raw = op.to_pareto();
        op
    }

    /// `namespace.operation`, the registry key.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.operation)
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.parameters.get(name)
    }

    pub fn to_pareto(&self) -> String {
        format!("/{}{{{}}}", self.full_name(), render_pairs(&self.parameters, ", "))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProtocolShell {
    pub name: String,
    pub intent: String,
    pub input_spec: ParamMap,
    pub process: Vec<ProtocolOperation>,
    pub output_spec: ParamMap,
    pub meta: ParamMap,
}

impl ProtocolShell {
    /// Input keys that must be supplied: every key whose declared value
    /// is not the `<default>` sentinel.
    pub fn required_inputs(&self) -> impl Iterator<Item = &str> {
        self.input_spec
            .iter()
            .filter(|(_, v)| v.as_str() != Some(DEFAULT_SENTINEL))
            .map(|(k, _)| k.as_str())
    }

    pub fn operation_names(&self) -> Vec<String> {
        self.process.iter().map(|op| op.full_name()).collect()
    }

    /// Render back to Pareto-lang text. Parsing the result yields the
    /// same operations in the same order.
    pub fn to_pareto(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "/{}{{", self.name);
        let _ = writeln!(out, "    intent:=\"{}\",", escape(&self.intent));
        render_block(&mut out, "input", &self.input_spec);
        out.push_str("    process:=[\n");
        for op in &self.process {
            let _ = writeln!(out, "        {},", op.to_pareto());
        }
        out.push_str("    ],\n");
        render_block(&mut out, "output", &self.output_spec);
        render_block(&mut out, "meta", &self.meta);
        out.push_str("}\n");
        out
    }
}

fn render_block(out: &mut String, section: &str, pairs: &ParamMap) {
    if pairs.is_empty() {
        let _ = writeln!(out, "    {}:={{}},", section);
        return;
    }
    let _ = writeln!(out, "    {}:={{", section);
    for (k, v) in pairs {
        let _ = writeln!(out, "        {}={},", k, v);
    }
    out.push_str("    },\n");
}

fn render_pairs(pairs: &ParamMap, sep: &str) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(sep)
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
