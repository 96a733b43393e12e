//! The context port: schema-bound handles produced by the provider.
//!
//! A context type describes its tables in [`Context::define_model`] and
//! is built by [`Context::construct`] from options bound to the
//! provider's live connection plus whatever extra arguments its
//! constructor needs. The provider never tracks contexts after creation;
//! their lifetime belongs to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::SqlitePool;

use memdb_core::{ModelBuilder, SchemaModel, StoreError};

/// Schema-configuration options bound to one live connection.
///
/// Always the first constructor argument of a context. Cloning is cheap;
/// clones share the same connection.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pool: SqlitePool,
    model: Arc<SchemaModel>,
}

impl ContextOptions {
    pub(crate) fn new(pool: SqlitePool, model: Arc<SchemaModel>) -> Self {
        Self { pool, model }
    }

    /// The shared connection this context operates on.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The finalized schema model, conversions already attached.
    pub fn model(&self) -> &SchemaModel {
        &self.model
    }
}

/// A database context the provider knows how to create.
///
/// The constructor contract mirrors "options first, extra arguments
/// after": `construct` receives the bound [`ContextOptions`] and the
/// caller-supplied [`Context::Args`], and may fail, in which case the
/// provider reports a creation failure carrying the cause.
#[async_trait]
pub trait Context: Send + Sized {
    /// Extra constructor arguments supplied after the options. Use `()`
    /// when the context needs none.
    type Args: Send;

    /// Declare the tables this context owns.
    fn define_model(builder: &mut ModelBuilder);

    /// Build the context instance. Runs before schema realization.
    fn construct(options: ContextOptions, args: Self::Args) -> anyhow::Result<Self>;

    fn options(&self) -> &ContextOptions;

    /// Flush rows queued since construction or the last flush. Returns
    /// the number of rows written.
    ///
    /// Implementations write the whole flush inside one transaction: a
    /// failed or interrupted flush leaves storage untouched and keeps
    /// the queued rows for a retry.
    async fn save_changes(&mut self) -> Result<u64, StoreError>;
}

/// Close the connection backing one context.
///
/// This tears down the shared in-memory database for every context of
/// the same provider, exactly like the provider's own `close`. It exists
/// as a separate affordance for callers that hold a context but not the
/// provider that made it.
pub async fn close_connection<C: Context>(context: &C) {
    context.options().pool().close().await;
}
