//! Schema metadata declared by contexts.
//!
//! A context declares its tables through a [`ModelBuilder`]; the finished
//! [`SchemaModel`] is what the customizer inspects and the storage
//! adapter realizes. A conversion set here during model definition is an
//! explicit configuration and is never overridden by the policy pass.

use crate::convert::Conversion;
use crate::value::ValueType;

/// One declared column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ValueType,
    pub nullable: bool,
    pub primary_key: bool,
    /// Conversion applied between the declared type and storage.
    /// `None` on a non-native type means the TEXT fallback, which can be
    /// stored and read back but not ordered or compared.
    pub conversion: Option<Conversion>,
}

impl ColumnDef {
    fn new(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            nullable: false,
            primary_key: false,
            conversion: None,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn primary_key(&mut self) -> &mut Self {
        self.primary_key = true;
        self
    }

    /// Explicitly configure the conversion for this column. Explicit
    /// configuration always wins over the policy pass.
    pub fn with_conversion(&mut self, conversion: Conversion) -> &mut Self {
        self.conversion = Some(conversion);
        self
    }

    /// The type this column occupies in storage: the conversion's target
    /// if one is configured, the declared type if native, TEXT otherwise.
    pub fn storage_type(&self) -> ValueType {
        match self.conversion {
            Some(conversion) => conversion.store_as(),
            None if self.ty.is_native() => self.ty,
            None => ValueType::Text,
        }
    }
}

/// One declared table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
        }
    }

    /// Declare a column and return it for chained configuration.
    pub fn column(&mut self, name: &str, ty: ValueType) -> &mut ColumnDef {
        self.columns.push(ColumnDef::new(name, ty));
        let idx = self.columns.len() - 1;
        &mut self.columns[idx]
    }

    pub fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }
}

/// The finished schema a context is bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaModel {
    pub tables: Vec<TableDef>,
}

impl SchemaModel {
    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Collects table declarations during context model definition.
#[derive(Debug, Default)]
pub struct ModelBuilder {
    tables: Vec<TableDef>,
}

impl ModelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table, or return the already-declared table of the same
    /// name for further columns.
    pub fn table(&mut self, name: &str) -> &mut TableDef {
        if let Some(idx) = self.tables.iter().position(|t| t.name == name) {
            return &mut self.tables[idx];
        }
        self.tables.push(TableDef::new(name));
        let idx = self.tables.len() - 1;
        &mut self.tables[idx]
    }

    pub fn build(self) -> SchemaModel {
        SchemaModel {
            tables: self.tables,
        }
    }
}
