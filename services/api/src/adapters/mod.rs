pub mod db;
pub mod epub;
pub mod images;
pub mod store;
pub mod summary;

pub use db::DbAdapter;
pub use epub::EpubBookSource;
pub use images::{CloudflareImageStrategy, PlaceholderImageStrategy};
pub use store::LocalFileStore;
pub use summary::{CachedSummarizer, OpenAiSummaryAdapter};
