//! Skip/Take normalization.
//!
//! A maximal chain of Skip, Take and Paging providers is folded into one
//! window and emitted as a single physical step. Dialects without native
//! OFFSET or LIMIT get a row-number column to page on, which is projected
//! away afterwards.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::ordering::rebuild;
use crate::config::ProviderCapabilities;
use crate::error::Error;
use crate::provider::{Header, Provider, ProviderKind};

/// Base name of the synthetic row-number column.
pub const ROW_NUMBER_COLUMN: &str = "RowNumber";

/// An accumulated skip/take window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PagingWindow {
    pub skip: u64,
    /// `None` means no upper bound.
    pub take: Option<u64>,
}

impl PagingWindow {
    /// The window that passes every row through.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Apply a further skip to rows already windowed by `self`.
    pub fn skip(self, count: u64) -> Self {
        Self {
            skip: self.skip.saturating_add(count),
            take: self.take.map(|t| t.saturating_sub(count)),
        }
    }

    /// Apply a further take to rows already windowed by `self`.
    pub fn take(self, count: u64) -> Self {
        Self {
            skip: self.skip,
            take: Some(self.take.map_or(count, |t| t.min(count))),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.skip == 0 && self.take.is_none()
    }

    /// Wrap `source` in the cheapest provider implementing this window.
    fn apply(self, source: impl Into<Arc<Provider>>) -> Arc<Provider> {
        let source = source.into();
        match (self.skip, self.take) {
            (0, None) => source,
            (0, Some(take)) => Arc::new(Provider::take(source, take)),
            (skip, None) => Arc::new(Provider::skip(source, skip)),
            (skip, Some(take)) => Arc::new(Provider::paging(source, skip, take)),
        }
    }
}

/// Collapses Skip/Take/Paging chains into single paging steps.
#[derive(Debug, Clone, Default)]
pub struct SkipTakeRewriter {
    capabilities: ProviderCapabilities,
}

impl SkipTakeRewriter {
    pub fn new(capabilities: ProviderCapabilities) -> Self {
        Self { capabilities }
    }

    #[instrument(skip(self, root), fields(root = root.kind_name()))]
    pub fn rewrite(&self, root: &Arc<Provider>) -> Result<Arc<Provider>, Error> {
        self.visit(root)
    }

    fn visit(&self, node: &Arc<Provider>) -> Result<Arc<Provider>, Error> {
        if is_paging(node) {
            let (window, source) = accumulate(node);
            let source = self.visit(&source)?;
            return Ok(self.flush(window, source));
        }

        let sources = node
            .sources()
            .into_iter()
            .map(|s| self.visit(s))
            .collect::<Result<Vec<_>, _>>()?;
        rebuild(node, sources)
    }

    fn flush(&self, window: PagingWindow, source: Arc<Provider>) -> Arc<Provider> {
        if window.is_unbounded() {
            return source;
        }
        if self
            .capabilities
            .supports(window.skip > 0, window.take.is_some())
        {
            debug!(skip = window.skip, take = ?window.take, "collapsed paging chain");
            return window.apply(source);
        }

        let width = source.header().len();
        let column = unique_column_name(source.header(), ROW_NUMBER_COLUMN);
        debug!(
            skip = window.skip,
            take = ?window.take,
            column = %column,
            "collapsed paging chain over row numbers"
        );
        let numbered = Provider::row_number(source, column);
        let paged = window.apply(numbered);
        Arc::new(Provider::select(paged, (0..width).collect()))
    }
}

fn is_paging(node: &Provider) -> bool {
    matches!(
        node.kind(),
        ProviderKind::Skip { .. } | ProviderKind::Take { .. } | ProviderKind::Paging { .. }
    )
}

/// Fold the chain starting at `node` into a window over its first
/// non-paging descendant.
fn accumulate(node: &Arc<Provider>) -> (PagingWindow, Arc<Provider>) {
    match node.kind() {
        ProviderKind::Skip { source, count } => {
            let (window, base) = accumulate(source);
            (window.skip(*count), base)
        }
        ProviderKind::Take { source, count } => {
            let (window, base) = accumulate(source);
            (window.take(*count), base)
        }
        ProviderKind::Paging { source, skip, take } => {
            let (window, base) = accumulate(source);
            (window.skip(*skip).take(*take), base)
        }
        _ => (PagingWindow::unbounded(), node.clone()),
    }
}

/// `base`, or `base` followed by the first free counter.
fn unique_column_name(header: &Header, base: &str) -> String {
    if header.index_of(base).is_none() {
        return base.to_string();
    }
    (0u64..)
        .map(|i| format!("{}{}", base, i))
        .find(|name| header.index_of(name).is_none())
        .unwrap_or_else(|| base.to_string())
}
