//! Compacts a raw node tree into a compiled template.

use std::mem;
use std::sync::Arc;

use tracing::debug;

use crate::config::SqlPostCompilerConfiguration;
use crate::error::RenderError;
use crate::node::{nodes_literal_len, DelimiterKind, Node};
use crate::postcompiler::PostCompiler;

/// Spaces per indentation level.
pub const DEFAULT_INDENT_WIDTH: usize = 2;

/// An immutable, compacted template.
///
/// Produced once per query shape and shared across renders; cloning only
/// bumps a reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledTemplate {
    nodes: Arc<[Node]>,
    literal_len: usize,
}

impl CompiledTemplate {
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Literal text length, used to pre-size render buffers.
    pub fn literal_len(&self) -> usize {
        self.literal_len
    }

    pub fn render(&self, config: &SqlPostCompilerConfiguration) -> Result<String, RenderError> {
        PostCompiler::render(self, config)
    }
}

/// Folds text fragments and formatting nodes into as few text nodes as
/// possible.
///
/// Only [`Node::Text`], [`Node::Placeholder`], [`Node::Variant`],
/// [`Node::Cycle`] and [`Node::CycleItem`] survive compaction.
#[derive(Debug)]
pub struct Compressor {
    buffer: String,
    output: Vec<Node>,
    indent: usize,
    indent_width: usize,
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(DEFAULT_INDENT_WIDTH)
    }
}

impl Compressor {
    pub fn new(indent_width: usize) -> Self {
        Self {
            buffer: String::new(),
            output: Vec::new(),
            indent: 0,
            indent_width,
        }
    }

    pub fn compile(mut self, nodes: &[Node]) -> CompiledTemplate {
        self.visit_all(nodes);
        self.flush();

        let literal_len = nodes_literal_len(&self.output);
        debug!(nodes = self.output.len(), literal_len, "compiled template");
        CompiledTemplate {
            nodes: self.output.into(),
            literal_len,
        }
    }

    fn visit_all(&mut self, nodes: &[Node]) {
        for node in nodes {
            self.visit(node);
        }
    }

    fn visit(&mut self, node: &Node) {
        match node {
            Node::Text(text) => self.append(&text.text),
            Node::Container(container) => {
                if container.require_indent {
                    self.indent += 1;
                    self.newline();
                    self.visit_all(&container.children);
                    self.indent -= 1;
                    self.newline();
                } else {
                    self.visit_all(&container.children);
                }
            }
            Node::Delimiter(delimiter) => {
                self.append(&delimiter.text);
                match delimiter.kind {
                    DelimiterKind::Column => self.buffer.push(' '),
                    DelimiterKind::Row => self.newline(),
                }
            }
            Node::Placeholder(_) | Node::CycleItem(_) => {
                self.flush();
                self.output.push(node.clone());
            }
            Node::Variant(variant) => {
                self.flush();
                let main = self.scoped(&variant.main);
                let alternative = self.scoped(&variant.alternative);
                self.output
                    .push(Node::variant(variant.id.clone(), main, alternative));
            }
            Node::Cycle(cycle) => {
                self.flush();
                let body = self.scoped(&cycle.body);
                let empty_case = self.scoped(&cycle.empty_case);
                self.output.push(Node::cycle(
                    cycle.id.clone(),
                    body,
                    cycle.delimiter.clone(),
                    empty_case,
                ));
            }
        }
    }

    /// Compile `nodes` with a fresh buffer and output list, restoring the
    /// enclosing ones afterwards.
    fn scoped(&mut self, nodes: &[Node]) -> Vec<Node> {
        let buffer = mem::take(&mut self.buffer);
        let output = mem::take(&mut self.output);
        self.visit_all(nodes);
        self.flush();
        self.buffer = buffer;
        mem::replace(&mut self.output, output)
    }

    fn append(&mut self, text: &str) {
        // "f(a )" -> "f(a)", but indentation before a closing paren stays.
        if text.starts_with(')') {
            let trimmed = self.buffer.trim_end_matches(' ').len();
            if trimmed < self.buffer.len() && !self.buffer[..trimmed].ends_with('\n') {
                self.buffer.truncate(trimmed);
            }
        }
        self.buffer.push_str(text);
    }

    fn newline(&mut self) {
        let trimmed = self.buffer.trim_end_matches(' ').len();
        self.buffer.truncate(trimmed);
        self.buffer.push('\n');
        for _ in 0..self.indent * self.indent_width {
            self.buffer.push(' ');
        }
    }

    fn flush(&mut self) {
        if !self.buffer.is_empty() {
            self.output.push(Node::text(mem::take(&mut self.buffer)));
        }
    }
}
