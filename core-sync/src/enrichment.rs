//! Lazy loading of local item details before classification.
//!
//! Repositories may hand out local items with only the columns needed for
//! matching. A [`DetailsLoader`] fills in the rest (artwork, cast) right
//! before the changeset classifier compares them.

use async_trait::async_trait;
use core_library::MediaItem;

use crate::error::Result;

#[async_trait]
pub trait DetailsLoader: Send + Sync {
    /// Completes the comparison fields of `item` in place.
    ///
    /// # Errors
    ///
    /// A failure is logged by the caller, which then compares whatever
    /// fields `item` already has.
    async fn load_details(&self, item: &mut MediaItem) -> Result<()>;
}
