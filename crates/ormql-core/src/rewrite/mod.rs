//! Plan-correctness rewrites.

mod ordering;
mod paging;

pub use ordering::OrderingCorrector;
pub use paging::{PagingWindow, SkipTakeRewriter, ROW_NUMBER_COLUMN};

pub(crate) use ordering::rebuild;
