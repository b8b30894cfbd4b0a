//! `kade-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the POS crates:
//! identifiers issued by the backend, exact money arithmetic and the domain
//! error model. No IO lives here.

pub mod error;
pub mod id;
pub mod money;

pub use error::{DomainError, DomainResult};
pub use id::{OrderId, ProductId};
pub use money::Money;
