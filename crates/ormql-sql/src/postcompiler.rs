//! Renders compiled templates to SQL text.

use std::collections::HashMap;

use tracing::trace;

use crate::compressor::CompiledTemplate;
use crate::config::SqlPostCompilerConfiguration;
use crate::error::RenderError;
use crate::node::{CycleNode, DelimiterKind, Node, PlaceholderNode, QualifiedName};

/// Extra capacity over a template's literal length for substituted values.
const RENDER_MARGIN: usize = 128;

/// Single-use renderer holding its own output buffer.
///
/// Templates are immutable, so any number of post-compilers may render the
/// same template concurrently.
pub struct PostCompiler<'a> {
    config: &'a SqlPostCompilerConfiguration,
    output: String,
    /// Row of the innermost cycle being rendered.
    current_cycle_item: Option<&'a [String]>,
}

impl<'a> PostCompiler<'a> {
    pub fn new(config: &'a SqlPostCompilerConfiguration) -> Self {
        Self::with_capacity(config, RENDER_MARGIN)
    }

    pub fn with_capacity(config: &'a SqlPostCompilerConfiguration, capacity: usize) -> Self {
        Self {
            config,
            output: String::with_capacity(capacity),
            current_cycle_item: None,
        }
    }

    /// Render `template` against `config`.
    pub fn render(
        template: &CompiledTemplate,
        config: &'a SqlPostCompilerConfiguration,
    ) -> Result<String, RenderError> {
        let mut compiler = Self::with_capacity(config, template.literal_len() + RENDER_MARGIN);
        compiler.visit_all(template.nodes())?;
        trace!(len = compiler.output.len(), "rendered template");
        Ok(compiler.finish())
    }

    /// Render an arbitrary node list, compacted or not.
    pub fn render_nodes(
        nodes: &[Node],
        config: &'a SqlPostCompilerConfiguration,
    ) -> Result<String, RenderError> {
        let mut compiler = Self::new(config);
        compiler.visit_all(nodes)?;
        Ok(compiler.finish())
    }

    pub fn visit_all(&mut self, nodes: &[Node]) -> Result<(), RenderError> {
        for node in nodes {
            self.visit(node)?;
        }
        Ok(())
    }

    pub fn finish(self) -> String {
        self.output
    }

    fn visit(&mut self, node: &Node) -> Result<(), RenderError> {
        match node {
            Node::Text(text) => self.output.push_str(&text.text),
            Node::Container(container) => self.visit_all(&container.children)?,
            Node::Delimiter(delimiter) => {
                self.output.push_str(&delimiter.text);
                self.output.push(match delimiter.kind {
                    DelimiterKind::Column => ' ',
                    DelimiterKind::Row => '\n',
                });
            }
            Node::Variant(variant) => {
                if self.config.is_alternative(&variant.id) {
                    self.visit_all(&variant.alternative)?;
                } else {
                    self.visit_all(&variant.main)?;
                }
            }
            Node::Placeholder(placeholder) => self.visit_placeholder(placeholder)?,
            Node::Cycle(cycle) => self.visit_cycle(cycle)?,
            Node::CycleItem(item) => {
                let row = self
                    .current_cycle_item
                    .ok_or(RenderError::CycleItemOutsideCycle(item.index))?;
                let value = row.get(item.index).ok_or(RenderError::CycleItemOutOfRange {
                    index: item.index,
                    width: row.len(),
                })?;
                self.output.push_str(value);
            }
        }
        Ok(())
    }

    fn visit_placeholder(&mut self, placeholder: &PlaceholderNode) -> Result<(), RenderError> {
        match &placeholder.qualified {
            None => {
                let config = self.config;
                let value = config
                    .placeholder_values
                    .get(&placeholder.id)
                    .ok_or_else(|| RenderError::MissingPlaceholder(placeholder.id.clone()))?;
                self.output.push_str(value);
            }
            Some(name) => self.actualize(&placeholder.id, name)?,
        }
        Ok(())
    }

    /// Write a schema-qualified name with database and schema renamed
    /// through the configured mappings. Names absent from a mapping are
    /// kept as they are.
    fn actualize(&mut self, id: &str, name: &QualifiedName) -> Result<(), RenderError> {
        let config = self.config;
        let (Some(databases), Some(schemas)) = (&config.database_mapping, &config.schema_mapping)
        else {
            return Err(RenderError::MissingMappings {
                name: id.to_string(),
            });
        };

        if let Some(database) = &name.database {
            self.push_quoted(mapped(databases, database), name.quote);
            self.output.push('.');
        }
        self.push_quoted(mapped(schemas, &name.schema), name.quote);
        self.output.push('.');
        self.push_quoted(&name.name, name.quote);
        Ok(())
    }

    fn push_quoted(&mut self, part: &str, quote: char) {
        self.output.push(quote);
        for c in part.chars() {
            if c == quote {
                self.output.push(quote);
            }
            self.output.push(c);
        }
        self.output.push(quote);
    }

    fn visit_cycle(&mut self, cycle: &CycleNode) -> Result<(), RenderError> {
        let config = self.config;
        let rows = config
            .dynamic_filter_values
            .get(&cycle.id)
            .ok_or_else(|| RenderError::MissingCycleValues(cycle.id.clone()))?;

        if rows.is_empty() {
            return self.visit_all(&cycle.empty_case);
        }

        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                self.output.push_str(&cycle.delimiter);
            }
            let outer = self.current_cycle_item.replace(row.as_slice());
            let result = self.visit_all(&cycle.body);
            self.current_cycle_item = outer;
            result?;
        }
        Ok(())
    }
}

fn mapped<'m>(mapping: &'m HashMap<String, String>, name: &'m str) -> &'m str {
    mapping.get(name).map(String::as_str).unwrap_or(name)
}
