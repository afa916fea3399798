//! External economic collaborators and the async wager operations
//!
//! The collaborators (wallet, price feed, account store, identity provider) are
//! object-safe traits returning boxed futures, so the session can hold them as
//! `Arc<dyn _>` and swap in-memory implementations for tests and development.

use std::future::Future;
use std::pin::Pin;

pub mod accounts;
pub mod price;
pub mod wager;
pub mod wallet;

/// Boxed, sendable future returned by collaborator traits
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
