//! Database Factory System
//!
//! Builds model instances from a per-model attribute definition, optionally
//! persisting them through the bound [`Query`] so observers fire as usual.

use serde_json::Value;

use crate::backends::Record;
use crate::error::OrmResult;
use crate::model::{from_record, Model};
use crate::query::Query;

pub mod fake_data;

/// Models that can be produced by a [`Factory`]
pub trait Factoryable: Model {
    /// Default attributes for a new instance. The primary key is normally left
    /// out so the model's serde default applies.
    fn definition() -> Record;
}

/// Factory bound to one connection and context
#[derive(Debug, Clone)]
pub struct Factory {
    query: Query,
    count: usize,
    overrides: Record,
}

impl Factory {
    pub(crate) fn new(query: Query) -> Self {
        Self {
            query,
            count: 1,
            overrides: Record::new(),
        }
    }

    /// Number of instances `make` and `create` produce
    pub fn count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Override one attribute of the definition
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.overrides.insert(key.to_string(), value.into());
        self
    }

    pub fn with_attributes(mut self, attributes: Record) -> Self {
        self.overrides.extend(attributes);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Build instances without touching the database
    pub fn make<M: Factoryable>(&self) -> OrmResult<Vec<M>> {
        (0..self.count).map(|_| self.build::<M>()).collect()
    }

    pub fn make_one<M: Factoryable>(&self) -> OrmResult<M> {
        self.build::<M>()
    }

    /// Build and insert instances one by one
    pub async fn create<M: Factoryable>(&self) -> OrmResult<Vec<M>> {
        let mut models = Vec::with_capacity(self.count);
        for _ in 0..self.count {
            models.push(self.create_one::<M>().await?);
        }
        Ok(models)
    }

    pub async fn create_one<M: Factoryable>(&self) -> OrmResult<M> {
        let mut model = self.build::<M>()?;
        self.query.create(&mut model).await?;
        Ok(model)
    }

    fn build<M: Factoryable>(&self) -> OrmResult<M> {
        let mut attributes = M::definition();
        for (key, value) in &self.overrides {
            attributes.insert(key.clone(), value.clone());
        }
        from_record(attributes)
    }
}
