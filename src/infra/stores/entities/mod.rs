//! SeaORM entity definitions
//!
//! These are database-specific entities separate from domain models.

pub mod invoice;
pub mod user;

pub use invoice::{ActiveModel as InvoiceActiveModel, Entity as InvoiceEntity};
pub use user::{ActiveModel as UserActiveModel, Entity as UserEntity};
