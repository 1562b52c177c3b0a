//! SQL template node IR.
//!
//! A freshly built tree holds many small [`TextNode`] fragments and
//! formatting nodes ([`ContainerNode`], [`DelimiterNode`]). The
//! [`Compressor`](crate::Compressor) folds those into a flat list where only
//! text, placeholders, variants, cycles and cycle items remain.

use serde::{Deserialize, Serialize};

/// One node of a SQL template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    Text(TextNode),
    Container(ContainerNode),
    Variant(VariantNode),
    Placeholder(PlaceholderNode),
    Cycle(CycleNode),
    CycleItem(CycleItemNode),
    Delimiter(DelimiterNode),
}

/// Literal SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
}

/// A group of nodes, optionally rendered on its own indented lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerNode {
    pub children: Vec<Node>,
    pub require_indent: bool,
}

/// Two alternative renderings selected by id at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantNode {
    pub id: String,
    pub main: Vec<Node>,
    pub alternative: Vec<Node>,
}

/// A value substituted at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderNode {
    pub id: String,
    /// Set for schema-qualified names, which are actualized through the
    /// database and schema mappings instead of a placeholder value.
    pub qualified: Option<QualifiedName>,
}

/// `database.schema.name`, each part quoted on output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifiedName {
    pub database: Option<String>,
    pub schema: String,
    pub name: String,
    pub quote: char,
}

/// A body repeated once per configured row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleNode {
    pub id: String,
    pub body: Vec<Node>,
    /// Literal text between repetitions.
    pub delimiter: String,
    /// Rendered instead of the body when no rows are configured.
    pub empty_case: Vec<Node>,
}

/// The `index`-th value of the current cycle row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleItemNode {
    pub index: usize,
}

/// A list separator; column lists stay on one line, row lists break.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelimiterNode {
    pub text: String,
    pub kind: DelimiterKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DelimiterKind {
    Column,
    Row,
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode { text: text.into() })
    }

    pub fn container(children: Vec<Node>) -> Self {
        Node::Container(ContainerNode {
            children,
            require_indent: false,
        })
    }

    pub fn indented(children: Vec<Node>) -> Self {
        Node::Container(ContainerNode {
            children,
            require_indent: true,
        })
    }

    pub fn variant(id: impl Into<String>, main: Vec<Node>, alternative: Vec<Node>) -> Self {
        Node::Variant(VariantNode {
            id: id.into(),
            main,
            alternative,
        })
    }

    pub fn placeholder(id: impl Into<String>) -> Self {
        Node::Placeholder(PlaceholderNode {
            id: id.into(),
            qualified: None,
        })
    }

    /// A schema-qualified placeholder; its id is the dotted name.
    pub fn qualified(name: QualifiedName) -> Self {
        Node::Placeholder(PlaceholderNode {
            id: name.dotted(),
            qualified: Some(name),
        })
    }

    pub fn cycle(
        id: impl Into<String>,
        body: Vec<Node>,
        delimiter: impl Into<String>,
        empty_case: Vec<Node>,
    ) -> Self {
        Node::Cycle(CycleNode {
            id: id.into(),
            body,
            delimiter: delimiter.into(),
            empty_case,
        })
    }

    pub fn cycle_item(index: usize) -> Self {
        Node::CycleItem(CycleItemNode { index })
    }

    pub fn delimiter(text: impl Into<String>, kind: DelimiterKind) -> Self {
        Node::Delimiter(DelimiterNode {
            text: text.into(),
            kind,
        })
    }

    /// Total length of literal text in this subtree, counting every branch.
    pub fn literal_len(&self) -> usize {
        match self {
            Node::Text(node) => node.text.len(),
            Node::Container(node) => nodes_literal_len(&node.children),
            Node::Variant(node) => {
                nodes_literal_len(&node.main).max(nodes_literal_len(&node.alternative))
            }
            Node::Cycle(node) => {
                nodes_literal_len(&node.body)
                    + node.delimiter.len()
                    + nodes_literal_len(&node.empty_case)
            }
            Node::Delimiter(node) => node.text.len(),
            Node::Placeholder(_) | Node::CycleItem(_) => 0,
        }
    }
}

pub(crate) fn nodes_literal_len(nodes: &[Node]) -> usize {
    nodes.iter().map(Node::literal_len).sum()
}

impl QualifiedName {
    pub fn new(
        database: Option<String>,
        schema: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database,
            schema: schema.into(),
            name: name.into(),
            quote: '"',
        }
    }

    pub fn with_quote(mut self, quote: char) -> Self {
        self.quote = quote;
        self
    }

    /// Unquoted `database.schema.name` form.
    pub fn dotted(&self) -> String {
        match &self.database {
            Some(database) => format!("{}.{}.{}", database, self.schema, self.name),
            None => format!("{}.{}", self.schema, self.name),
        }
    }
}
