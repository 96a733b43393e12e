//! Isolated in-memory `SQLite` databases for unit tests.
//!
//! A [`MemoryDatabaseProvider`] holds exactly one live connection to a
//! private in-memory `SQLite` database and hands out schema-bound context
//! instances over it. Contexts produced by one provider all see the same
//! storage; separate providers never interfere with each other, which is
//! what makes test cases repeatable and safe to run in parallel.
//!
//! Because `SQLite` cannot natively store timestamps with offsets,
//! arbitrary-precision decimals, or durations, the provider attaches
//! value conversions for those types during model construction unless
//! the caller opts out.
//!
//! ```ignore
//! let provider = MemoryDatabaseProvider::open().await?;
//! let db: MyEntities = provider
//!     .create_database_with((), |db: &mut MyEntities| {
//!         db.add(seed_row());
//!         Ok(())
//!     })
//!     .await?;
//! // query through `db`; drop it whenever, then:
//! provider.close().await;
//! ```

#![deny(unsafe_code)]

pub mod context;
pub mod error;
pub mod provider;
pub mod schema;
pub mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod fixtures;

pub use context::{Context, ContextOptions, close_connection};
pub use error::{CreateDatabaseError, OpenDatabaseError, PersistCancelled};
pub use provider::{AfterCreate, CreateOptions, MemoryDatabaseProvider};
pub use store::{Order, StoredRow};

#[cfg(any(test, feature = "test-utils"))]
pub use fixtures::{ComplexTestEntities, DatedModel, MissingArgument, TestEntities, TestModel};
