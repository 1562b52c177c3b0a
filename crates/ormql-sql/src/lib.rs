//! ORMQL SQL - Compiled SQL templates.
//!
//! A query shape is compiled once into an immutable node list; each
//! execution renders it to SQL against a [`SqlPostCompilerConfiguration`]
//! carrying placeholder values, variant choices and cycle rows.
//!
//! # Template Syntax
//!
//! ```text
//! SELECT * FROM {tbl}
//! SELECT * FROM {schema:main.dbo.Users}
//! SELECT {variant:all,"*","id"} FROM t
//! WHERE id IN ({cycle:ids,"?",",","NULL"})
//! VALUES {cycle:rows,"({item:0}, {item:1})",","}
//! WHERE x IN ({indent:"a{delimiter:\",\"}b"})
//! ```
//!
//! # Usage
//!
//! ```rust
//! use ormql_sql::{compile, SqlPostCompilerConfiguration};
//!
//! let template = compile(r#"SELECT * FROM {tbl} WHERE id IN ({cycle:ids,"?",","})"#).unwrap();
//! let config = SqlPostCompilerConfiguration::new()
//!     .with_placeholder("tbl", "Users")
//!     .with_cycle_values("ids", vec![vec!["1".into()], vec!["2".into()]]);
//!
//! assert_eq!(
//!     template.render(&config).unwrap(),
//!     "SELECT * FROM Users WHERE id IN (?,?)"
//! );
//! ```

pub mod compressor;
pub mod config;
pub mod error;
pub mod lexer;
pub mod node;
pub mod postcompiler;
pub mod span;
pub mod template;

pub use compressor::{CompiledTemplate, Compressor, DEFAULT_INDENT_WIDTH};
pub use config::SqlPostCompilerConfiguration;
pub use error::{ParseError, RenderError};
pub use node::{
    ContainerNode, CycleItemNode, CycleNode, DelimiterKind, DelimiterNode, Node, PlaceholderNode,
    QualifiedName, TextNode, VariantNode,
};
pub use postcompiler::PostCompiler;
pub use span::{Span, Spanned};
pub use template::{escape_text, parse_template};

/// Parse and compact a template in one step.
///
/// # Example
///
/// ```rust
/// use ormql_sql::compile;
///
/// let template = compile("SELECT 1").unwrap();
/// assert_eq!(template.nodes().len(), 1);
/// ```
pub fn compile(source: &str) -> Result<CompiledTemplate, ParseError> {
    let nodes = parse_template(source)?;
    Ok(Compressor::default().compile(&nodes))
}

/// Render a compiled template against a configuration.
pub fn render(
    template: &CompiledTemplate,
    config: &SqlPostCompilerConfiguration,
) -> Result<String, RenderError> {
    PostCompiler::render(template, config)
}
