use futures::stream::BoxStream;

use crate::models::RawItem;
use crate::utils::error::AppError;

/// Lazily produced listings from one source.
///
/// The stream ends after yielding at most one `Err`; items yielded before it
/// were collected from earlier pages and remain valid.
pub type ItemStream<'a> = BoxStream<'a, Result<RawItem, AppError>>;

/// Trait for implementing catalog sources (one per scraped site)
pub trait SourceAdapter: Send + Sync {
    /// Stable identifier used in logs, notifications and failure counts.
    fn id(&self) -> &str;

    /// Fetch the source's current catalog page by page.
    ///
    /// Every call starts again from the first page.
    fn fetch(&self) -> ItemStream<'_>;
}
