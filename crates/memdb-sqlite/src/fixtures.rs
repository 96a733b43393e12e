//! Test fixture contexts.
//!
//! These model the kinds of data-access code this library provisions
//! databases for: a plain context over a table exercising every
//! convertible column type, and a context that takes an extra
//! constructor argument and configures one conversion explicitly. They
//! back this crate's own tests and are exported under the `test-utils`
//! feature for downstream suites.

use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset};
use rust_decimal::Decimal;
use thiserror::Error;

use memdb_core::{Conversion, ModelBuilder, StoreError, TableDef, Value, ValueType};

use crate::context::{Context, ContextOptions};
use crate::store::{self, Order, StoredRow};

/// Row type exercising every convertible column type.
#[derive(Debug, Clone, PartialEq)]
pub struct TestModel {
    /// `None` until the engine assigns a rowid on flush.
    pub id: Option<i64>,
    pub other_property: String,
    pub date: DateTime<FixedOffset>,
    pub amount: Decimal,
    pub elapsed: Duration,
}

impl TestModel {
    fn to_values(&self) -> Vec<Value> {
        vec![
            self.id.map_or(Value::Null, Value::Integer),
            Value::Text(self.other_property.clone()),
            Value::Timestamp(self.date),
            Value::Decimal(self.amount),
            Value::Duration(self.elapsed),
        ]
    }

    fn from_row(row: &StoredRow) -> Result<Self, StoreError> {
        Ok(Self {
            id: Some(row.integer("id")?),
            other_property: row.text("other_property")?.to_string(),
            date: row.timestamp("date")?,
            amount: row.decimal("amount")?,
            elapsed: row.duration("elapsed")?,
        })
    }
}

const TEST_MODELS: &str = "test_models";

/// Context over [`TestModel`] with no extra constructor arguments.
///
/// Rows queue in memory via [`TestEntities::add`] until `save_changes`
/// flushes them, which is what lets an after-create callback stay
/// synchronous while the provider persists on its behalf. The flush is
/// one transaction; on failure it rolls back and the rows stay queued.
#[derive(Debug)]
pub struct TestEntities {
    options: ContextOptions,
    pending: Vec<TestModel>,
}

#[async_trait]
impl Context for TestEntities {
    type Args = ();

    fn define_model(builder: &mut ModelBuilder) {
        let table = builder.table(TEST_MODELS);
        table.column("id", ValueType::Integer).primary_key();
        table.column("other_property", ValueType::Text);
        table.column("date", ValueType::Timestamp);
        table.column("amount", ValueType::Decimal);
        table.column("elapsed", ValueType::Duration);
    }

    fn construct(options: ContextOptions, (): Self::Args) -> anyhow::Result<Self> {
        Ok(Self {
            options,
            pending: Vec::new(),
        })
    }

    fn options(&self) -> &ContextOptions {
        &self.options
    }

    async fn save_changes(&mut self) -> Result<u64, StoreError> {
        let table = self.table()?;
        let mut tx = self
            .options
            .pool()
            .begin()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let mut written = 0u64;
        for model in &self.pending {
            store::insert(&mut *tx, table, &model.to_values()).await?;
            written += 1;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.pending.clear();
        Ok(written)
    }
}

impl TestEntities {
    fn table(&self) -> Result<&TableDef, StoreError> {
        self.options
            .model()
            .table(TEST_MODELS)
            .ok_or_else(|| StoreError::UnknownTable(TEST_MODELS.to_string()))
    }

    /// Queue a row for the next `save_changes`.
    pub fn add(&mut self, model: TestModel) {
        self.pending.push(model);
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        store::count(self.options.pool(), self.table()?).await
    }

    pub async fn all(&self) -> Result<Vec<TestModel>, StoreError> {
        self.fetch(None).await
    }

    pub async fn first(&self) -> Result<Option<TestModel>, StoreError> {
        let mut models = self.all().await?;
        Ok(if models.is_empty() {
            None
        } else {
            Some(models.remove(0))
        })
    }

    pub async fn order_by_date_desc(&self) -> Result<Vec<TestModel>, StoreError> {
        self.fetch(Some(("date", Order::Desc))).await
    }

    pub async fn order_by_amount_desc(&self) -> Result<Vec<TestModel>, StoreError> {
        self.fetch(Some(("amount", Order::Desc))).await
    }

    pub async fn order_by_elapsed_desc(&self) -> Result<Vec<TestModel>, StoreError> {
        self.fetch(Some(("elapsed", Order::Desc))).await
    }

    async fn fetch(&self, order: Option<(&str, Order)>) -> Result<Vec<TestModel>, StoreError> {
        let rows = store::fetch_all(self.options.pool(), self.table()?, order).await?;
        rows.iter().map(TestModel::from_row).collect()
    }
}

/// Row type for [`ComplexTestEntities`].
#[derive(Debug, Clone, PartialEq)]
pub struct DatedModel {
    pub id: Option<i64>,
    pub date: DateTime<FixedOffset>,
}

/// Error returned when [`ComplexTestEntities`] is built without its
/// required schema label.
#[derive(Debug, Clone, Error)]
#[error("required schema label was not supplied")]
pub struct MissingArgument;

const DATED_MODELS: &str = "dated_models";

/// Context that needs an extra constructor argument and configures its
/// date column's conversion explicitly, so the policy pass must leave it
/// alone.
#[derive(Debug)]
pub struct ComplexTestEntities {
    options: ContextOptions,
    label: String,
    pending: Vec<DatedModel>,
}

#[async_trait]
impl Context for ComplexTestEntities {
    type Args = String;

    fn define_model(builder: &mut ModelBuilder) {
        let table = builder.table(DATED_MODELS);
        table.column("id", ValueType::Integer).primary_key();
        table
            .column("date", ValueType::Timestamp)
            .with_conversion(Conversion::TimestampToText);
    }

    fn construct(options: ContextOptions, label: Self::Args) -> anyhow::Result<Self> {
        if label.is_empty() {
            return Err(MissingArgument.into());
        }
        Ok(Self {
            options,
            label,
            pending: Vec::new(),
        })
    }

    fn options(&self) -> &ContextOptions {
        &self.options
    }

    async fn save_changes(&mut self) -> Result<u64, StoreError> {
        let table = self.table()?;
        let mut tx = self
            .options
            .pool()
            .begin()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        let mut written = 0u64;
        for model in &self.pending {
            let values = vec![
                model.id.map_or(Value::Null, Value::Integer),
                Value::Timestamp(model.date),
            ];
            store::insert(&mut *tx, table, &values).await?;
            written += 1;
        }
        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        self.pending.clear();
        Ok(written)
    }
}

impl ComplexTestEntities {
    fn table(&self) -> Result<&TableDef, StoreError> {
        self.options
            .model()
            .table(DATED_MODELS)
            .ok_or_else(|| StoreError::UnknownTable(DATED_MODELS.to_string()))
    }

    /// The extra constructor argument, verbatim.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn add(&mut self, model: DatedModel) {
        self.pending.push(model);
    }

    pub async fn all(&self) -> Result<Vec<DatedModel>, StoreError> {
        let rows = store::fetch_all(self.options.pool(), self.table()?, None).await?;
        rows.iter()
            .map(|row| {
                Ok(DatedModel {
                    id: Some(row.integer("id")?),
                    date: row.timestamp("date")?,
                })
            })
            .collect()
    }
}
