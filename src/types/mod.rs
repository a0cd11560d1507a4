//! Shared API types.

mod pagination;
mod response;

pub use pagination::{Paginated, PaginatedInvoices, PaginationMeta, PaginationParams};
pub use response::MessageResponse;
