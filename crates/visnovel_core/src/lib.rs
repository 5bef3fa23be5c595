pub mod cache;
pub mod domain;
pub mod images;
pub mod pagination;
pub mod paginator;
pub mod ports;

pub use cache::BoundedCache;
pub use domain::{AuthUser, DocumentKind, Novel, Role, User, UserCredentials};
pub use images::{ImageChain, ImageRequest, ImageStyle};
pub use pagination::{PaginationError, PaginationSettings, PastEndPolicy};
pub use paginator::{Paginator, ResolvedPage};
pub use ports::{
    BookSource, DatabaseService, DocumentStore, ImageStrategy, OpenedBook, PortError, PortResult,
    SummaryService,
};
