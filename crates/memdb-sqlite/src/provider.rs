//! Provider that spins up isolated in-memory databases for tests.

use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use memdb_core::{ModelBuilder, apply_sqlite_conversions};

use crate::context::{Context, ContextOptions};
use crate::error::{CreateDatabaseError, OpenDatabaseError, PersistCancelled};
use crate::schema;

/// Callback run against a freshly created context; the provider persists
/// whatever it queued before handing the context back.
pub type AfterCreate<C> = Box<dyn FnOnce(&mut C) -> anyhow::Result<()> + Send>;

/// Options for [`MemoryDatabaseProvider::create_database_opts`].
pub struct CreateOptions<C: Context> {
    /// Attach the value conversions for types `SQLite` cannot store
    /// natively. On by default.
    pub use_converters: bool,
    pub after_create: Option<AfterCreate<C>>,
    /// Cooperative cancellation of the persist step. A cancelled token
    /// fails creation with a [`PersistCancelled`] cause; an interrupted
    /// flush is dropped mid-transaction and rolls back.
    pub cancel: Option<CancellationToken>,
}

impl<C: Context> Default for CreateOptions<C> {
    fn default() -> Self {
        Self {
            use_converters: true,
            after_create: None,
            cancel: None,
        }
    }
}

/// Owns one live connection to a private in-memory `SQLite` database and
/// produces schema-realized contexts bound to it.
///
/// Every context created by one provider shares the same storage; rows
/// persisted through one context are visible to every other context of
/// the same provider. Separate providers are fully isolated from each
/// other, even for identical context types and data, which is the
/// property that makes per-test databases repeatable and parallel-safe.
///
/// The provider is the sole owner of the connection. Call
/// [`MemoryDatabaseProvider::close`] when the test is done; dropping the
/// provider and every context releases the connection too, but only as a
/// leak mitigation, not a timing guarantee.
pub struct MemoryDatabaseProvider {
    pool: SqlitePool,
}

impl MemoryDatabaseProvider {
    /// Open a fresh in-memory database.
    ///
    /// The pool is pinned to exactly one connection with no idle or
    /// lifetime reaping: an in-memory `SQLite` database lives and dies
    /// with its connection, so recycling it would silently drop all
    /// state between two uses.
    pub async fn open() -> Result<Self, OpenDatabaseError> {
        let options =
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(OpenDatabaseError)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(OpenDatabaseError)?;
        debug!("opened in-memory sqlite database");
        Ok(Self { pool })
    }

    /// Create a context with converters attached and no seed callback.
    pub async fn create_database<C: Context>(
        &self,
        args: C::Args,
    ) -> Result<C, CreateDatabaseError> {
        self.create_inner(args, CreateOptions::default()).await
    }

    /// Create a context and seed it: the callback mutates the fresh
    /// context, then its queued changes are persisted before the context
    /// is returned. No extra save is needed on the caller's side.
    pub async fn create_database_with<C, F>(
        &self,
        args: C::Args,
        after_create: F,
    ) -> Result<C, CreateDatabaseError>
    where
        C: Context,
        F: FnOnce(&mut C) -> anyhow::Result<()> + Send + 'static,
    {
        let opts = CreateOptions {
            after_create: Some(Box::new(after_create)),
            ..CreateOptions::default()
        };
        self.create_inner(args, opts).await
    }

    /// Create a context with full control over converters, seeding, and
    /// cancellation.
    pub async fn create_database_opts<C: Context>(
        &self,
        args: C::Args,
        opts: CreateOptions<C>,
    ) -> Result<C, CreateDatabaseError> {
        self.create_inner(args, opts).await
    }

    // Every public create variant funnels through here.
    async fn create_inner<C: Context>(
        &self,
        args: C::Args,
        opts: CreateOptions<C>,
    ) -> Result<C, CreateDatabaseError> {
        let mut builder = ModelBuilder::new();
        C::define_model(&mut builder);
        let mut model = builder.build();
        if opts.use_converters {
            apply_sqlite_conversions(&mut model);
        }

        let options = ContextOptions::new(self.pool.clone(), Arc::new(model));
        let mut context = C::construct(options.clone(), args).map_err(CreateDatabaseError::wrap)?;

        schema::create_schema(&self.pool, options.model())
            .await
            .map_err(CreateDatabaseError::wrap)?;

        if let Some(after_create) = opts.after_create {
            after_create(&mut context).map_err(CreateDatabaseError::wrap)?;
            let persist = context.save_changes();
            match opts.cancel {
                Some(token) => {
                    tokio::select! {
                        // Check cancellation first so an already-cancelled
                        // token never persists.
                        biased;
                        () = token.cancelled() => {
                            return Err(CreateDatabaseError::wrap(PersistCancelled));
                        }
                        result = persist => {
                            result.map_err(CreateDatabaseError::wrap)?;
                        }
                    }
                }
                None => {
                    persist.await.map_err(CreateDatabaseError::wrap)?;
                }
            }
        }

        debug!(
            context = std::any::type_name::<C>(),
            "created in-memory database context"
        );
        Ok(context)
    }

    /// The shared connection, for callers that need raw access next to
    /// their contexts.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Release the connection. Idempotent; once closed, every context of
    /// this provider fails its queries.
    pub async fn close(&self) {
        self.pool.close().await;
        debug!("closed in-memory sqlite database");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::close_connection;
    use crate::fixtures::{
        ComplexTestEntities, DatedModel, MissingArgument, TestEntities, TestModel,
    };
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};
    use memdb_core::{StoreError, Value};
    use rust_decimal::Decimal;
    use sqlx::Row as _;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(2 * 3600).unwrap()
    }

    fn at(day: u32) -> DateTime<FixedOffset> {
        offset().with_ymd_and_hms(2024, 5, day, 10, 30, 0).unwrap()
    }

    fn sample(label: &str) -> TestModel {
        TestModel {
            id: None,
            other_property: label.to_string(),
            date: at(17),
            amount: Decimal::new(123_45, 2),
            elapsed: Duration::minutes(90),
        }
    }

    #[tokio::test]
    async fn test_create_database_returns_usable_context() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let mut db: TestEntities = provider.create_database(()).await.unwrap();
        db.add(sample("Test"));
        db.save_changes().await.unwrap();
        assert_eq!(db.count().await.unwrap(), 1);
        let record = db.first().await.unwrap().unwrap();
        assert_eq!(record.other_property, "Test");
    }

    #[tokio::test]
    async fn test_rows_added_in_after_create_are_persisted() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: TestEntities = provider
            .create_database_with((), |db: &mut TestEntities| {
                db.add(sample("Seeded"));
                Ok(())
            })
            .await
            .unwrap();
        // No explicit save on this side.
        let record = db.first().await.unwrap().unwrap();
        assert_eq!(record.other_property, "Seeded");
    }

    #[tokio::test]
    async fn test_contexts_on_one_provider_share_storage() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let mut c1: TestEntities = provider.create_database(()).await.unwrap();
        c1.add(sample("Shared"));
        c1.save_changes().await.unwrap();

        let c2: TestEntities = provider.create_database(()).await.unwrap();
        assert_eq!(c2.count().await.unwrap(), 1);
        assert_eq!(
            c2.first().await.unwrap().unwrap().other_property,
            "Shared"
        );
    }

    #[tokio::test]
    async fn test_providers_are_isolated_from_each_other() {
        let p1 = MemoryDatabaseProvider::open().await.unwrap();
        let p2 = MemoryDatabaseProvider::open().await.unwrap();

        let _seeded: TestEntities = p1
            .create_database_with((), |db: &mut TestEntities| {
                db.add(sample("OnlyInP1"));
                Ok(())
            })
            .await
            .unwrap();

        let other: TestEntities = p2.create_database(()).await.unwrap();
        assert_eq!(other.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_repeated_create_reuses_realized_schema() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let _first: TestEntities = provider.create_database(()).await.unwrap();
        let _second: TestEntities = provider.create_database(()).await.unwrap();
        let third: TestEntities = provider
            .create_database_with((), |db: &mut TestEntities| {
                db.add(sample("Third"));
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(third.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_extra_constructor_argument_is_passed_through() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: ComplexTestEntities = provider
            .create_database("audit".to_string())
            .await
            .unwrap();
        assert_eq!(db.label(), "audit");
    }

    #[tokio::test]
    async fn test_unusable_constructor_argument_is_a_creation_failure() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let err = provider
            .create_database::<ComplexTestEntities>(String::new())
            .await
            .unwrap_err();
        assert!(err.cause().downcast_ref::<MissingArgument>().is_some());
    }

    #[tokio::test]
    async fn test_after_create_error_is_wrapped_with_cause() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let err = provider
            .create_database_with::<TestEntities, _>((), |_| {
                Err(anyhow::anyhow!("seed data rejected"))
            })
            .await
            .unwrap_err();
        assert!(format!("{:#}", err.cause()).contains("seed data rejected"));
    }

    #[tokio::test]
    async fn test_timestamp_round_trips_with_offset() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: TestEntities = provider
            .create_database_with((), |db: &mut TestEntities| {
                db.add(sample("Dated"));
                Ok(())
            })
            .await
            .unwrap();
        let record = db.first().await.unwrap().unwrap();
        assert_eq!(record.date, at(17));
        assert_eq!(record.date.offset().local_minus_utc(), 2 * 3600);
    }

    #[tokio::test]
    async fn test_timestamp_ordering_with_converters() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: TestEntities = provider
            .create_database_with((), |db: &mut TestEntities| {
                db.add(TestModel { date: at(16), ..sample("Older") });
                db.add(TestModel { date: at(17), ..sample("Newer") });
                Ok(())
            })
            .await
            .unwrap();
        let records = db.order_by_date_desc().await.unwrap();
        assert_eq!(records[0].other_property, "Newer");
        assert_eq!(records[1].other_property, "Older");
    }

    #[tokio::test]
    async fn test_decimal_round_trip_and_ordering() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: TestEntities = provider
            .create_database_with((), |db: &mut TestEntities| {
                db.add(TestModel {
                    amount: Decimal::new(-6541, 0),
                    ..sample("Low")
                });
                db.add(TestModel {
                    amount: Decimal::new(9846, 0),
                    ..sample("High")
                });
                Ok(())
            })
            .await
            .unwrap();
        let records = db.order_by_amount_desc().await.unwrap();
        assert_eq!(records[0].other_property, "High");
        assert_eq!(records[0].amount, Decimal::new(9846, 0));
        assert_eq!(records[1].amount, Decimal::new(-6541, 0));
    }

    #[tokio::test]
    async fn test_duration_round_trips_including_negative() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: TestEntities = provider
            .create_database_with((), |db: &mut TestEntities| {
                db.add(TestModel {
                    elapsed: Duration::days(-1),
                    ..sample("Backward")
                });
                db.add(TestModel {
                    elapsed: Duration::zero(),
                    ..sample("Zero")
                });
                Ok(())
            })
            .await
            .unwrap();
        let records = db.order_by_elapsed_desc().await.unwrap();
        assert_eq!(records[0].other_property, "Zero");
        assert_eq!(records[1].elapsed, Duration::days(-1));
    }

    #[tokio::test]
    async fn test_order_by_unconverted_column_is_unsupported() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let opts = CreateOptions {
            use_converters: false,
            ..CreateOptions::default()
        };
        let mut db: TestEntities = provider.create_database_opts((), opts).await.unwrap();
        // Storing still works through the TEXT fallback.
        db.add(sample("Unconverted"));
        db.save_changes().await.unwrap();
        assert_eq!(db.count().await.unwrap(), 1);

        for result in [
            db.order_by_date_desc().await,
            db.order_by_amount_desc().await,
            db.order_by_elapsed_desc().await,
        ] {
            assert!(matches!(
                result.unwrap_err(),
                StoreError::UnsupportedValueType { .. }
            ));
        }
    }

    #[tokio::test]
    async fn test_explicit_conversion_is_not_overridden() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: ComplexTestEntities = provider
            .create_database_with("audit".to_string(), |db: &mut ComplexTestEntities| {
                db.add(DatedModel {
                    id: None,
                    date: offset().with_ymd_and_hms(2024, 5, 17, 10, 30, 0).unwrap(),
                });
                Ok(())
            })
            .await
            .unwrap();
        let records = db.all().await.unwrap();
        assert_eq!(records.len(), 1);

        // The explicitly configured text conversion survived the policy
        // pass: the column physically holds text, not a packed integer.
        let row = sqlx::query("SELECT typeof(date) FROM dated_models")
            .fetch_one(provider.pool())
            .await
            .unwrap();
        let type_of: String = row.get(0);
        assert_eq!(type_of, "text");
    }

    #[tokio::test]
    async fn test_cancelled_persist_fails_creation() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let opts = CreateOptions {
            after_create: Some(Box::new(|db: &mut TestEntities| {
                db.add(sample("Doomed"));
                Ok(())
            })),
            cancel: Some(token),
            ..CreateOptions::default()
        };
        let err = provider
            .create_database_opts::<TestEntities>((), opts)
            .await
            .unwrap_err();
        assert!(err.cause().downcast_ref::<PersistCancelled>().is_some());
    }

    #[tokio::test]
    async fn test_failed_persist_leaves_no_rows_behind() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let err = provider
            .create_database_with((), |db: &mut TestEntities| {
                db.add(sample("Storable"));
                // Overflows the microsecond encoding, so the second
                // insert of the flush fails after the first succeeded.
                db.add(TestModel {
                    elapsed: Duration::milliseconds(i64::MAX),
                    ..sample("Unstorable")
                });
                Ok(())
            })
            .await
            .unwrap_err();
        assert!(err.cause().downcast_ref::<StoreError>().is_some());

        let fresh: TestEntities = provider.create_database(()).await.unwrap();
        assert_eq!(fresh.count().await.unwrap(), 0);
    }

    /// Context whose flush writes one row inside an open transaction,
    /// cancels its token, and parks, so the provider observes the
    /// cancellation while the flush is genuinely in flight.
    #[derive(Debug)]
    struct StallingEntities {
        options: ContextOptions,
        token: CancellationToken,
    }

    #[async_trait::async_trait]
    impl Context for StallingEntities {
        type Args = CancellationToken;

        fn define_model(builder: &mut ModelBuilder) {
            <TestEntities as Context>::define_model(builder);
        }

        fn construct(options: ContextOptions, token: Self::Args) -> anyhow::Result<Self> {
            Ok(Self { options, token })
        }

        fn options(&self) -> &ContextOptions {
            &self.options
        }

        async fn save_changes(&mut self) -> Result<u64, StoreError> {
            let table = self
                .options
                .model()
                .table("test_models")
                .ok_or_else(|| StoreError::UnknownTable("test_models".to_string()))?;
            let mut tx = self
                .options
                .pool()
                .begin()
                .await
                .map_err(|e| StoreError::Storage(e.to_string()))?;
            let values = vec![
                Value::Null,
                Value::Text("Partial".to_string()),
                Value::Timestamp(at(17)),
                Value::Decimal(Decimal::new(1, 0)),
                Value::Duration(Duration::minutes(1)),
            ];
            crate::store::insert(&mut *tx, table, &values).await?;
            self.token.cancel();
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_cancellation_during_flush_rolls_back() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let token = CancellationToken::new();
        let opts = CreateOptions {
            after_create: Some(Box::new(|_db: &mut StallingEntities| Ok(()))),
            cancel: Some(token.clone()),
            ..CreateOptions::default()
        };
        let err = provider
            .create_database_opts::<StallingEntities>(token, opts)
            .await
            .unwrap_err();
        assert!(err.cause().downcast_ref::<PersistCancelled>().is_some());

        // The interrupted transaction rolled back; storage is untouched.
        let fresh: TestEntities = provider.create_database(()).await.unwrap();
        assert_eq!(fresh.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_ends_queries() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: TestEntities = provider.create_database(()).await.unwrap();

        provider.close().await;
        provider.close().await;

        assert!(matches!(
            db.count().await.unwrap_err(),
            StoreError::Storage(_)
        ));
    }

    #[tokio::test]
    async fn test_close_connection_helper_tears_down_shared_storage() {
        let provider = MemoryDatabaseProvider::open().await.unwrap();
        let db: TestEntities = provider.create_database(()).await.unwrap();

        close_connection(&db).await;

        assert!(matches!(
            db.count().await.unwrap_err(),
            StoreError::Storage(_)
        ));
    }
}
