//! Query - typed model operations bound to one connection
//!
//! A [`Query`] is an immutable value: connection name, driver, context and the
//! shared observer registry, plus the open transaction when it was handed out
//! by [`Query::transaction`]. Cloning is cheap and clones share the same
//! transaction.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::backends::{Driver, Filter, Record};
use crate::context::Context;
use crate::error::{OrmError, OrmResult};
use crate::events::{Event, ModelEvent, ModelType};
use crate::factory::Factory;
use crate::model::{from_record, to_record, Model, CREATED_AT, DELETED_AT, UPDATED_AT};
use crate::observers::ObserverRegistry;
use crate::transaction::{run_in_transaction, TransactionConfig, TransactionHandle};

#[derive(Clone)]
pub struct Query {
    connection: String,
    driver: Arc<dyn Driver>,
    transaction: Option<Arc<TransactionHandle>>,
    ctx: Context,
    observers: Arc<ObserverRegistry>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("connection", &self.connection)
            .field("driver", &self.driver.kind())
            .field("transaction", &self.transaction.as_ref().map(|tx| tx.id()))
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl Query {
    pub(crate) fn new(
        connection: impl Into<String>,
        driver: Arc<dyn Driver>,
        observers: Arc<ObserverRegistry>,
    ) -> Self {
        Self {
            connection: connection.into(),
            driver,
            transaction: None,
            ctx: Context::background(),
            observers,
        }
    }

    pub(crate) fn driver(&self) -> Arc<dyn Driver> {
        self.driver.clone()
    }

    pub(crate) fn bind_transaction(&self, handle: Arc<TransactionHandle>) -> Self {
        Self {
            transaction: Some(handle),
            ..self.clone()
        }
    }

    /// A copy of this query carrying `ctx`
    pub fn with_context(&self, ctx: Context) -> Self {
        Self {
            ctx,
            ..self.clone()
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn connection_name(&self) -> &str {
        &self.connection
    }

    pub fn is_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// The open transaction this query runs in, if any
    pub fn transaction_handle(&self) -> Option<&Arc<TransactionHandle>> {
        self.transaction.as_ref()
    }

    pub fn observers(&self) -> &Arc<ObserverRegistry> {
        &self.observers
    }

    /// Raw driver of the bound connection; fails once the connection is closed
    pub fn db(&self) -> OrmResult<Arc<dyn Driver>> {
        if self.driver.is_closed() {
            return Err(OrmError::Connection(format!(
                "connection '{}' is closed",
                self.connection
            )));
        }
        Ok(self.driver.clone())
    }

    pub fn factory(&self) -> Factory {
        Factory::new(self.clone())
    }

    /// Run `f` in a transaction with the default configuration
    pub async fn transaction<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Query) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<OrmError>,
    {
        run_in_transaction(self, &TransactionConfig::default(), f).await
    }

    pub async fn transaction_with<F, Fut, T, E>(&self, config: TransactionConfig, f: F) -> Result<T, E>
    where
        F: FnOnce(Query) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<OrmError>,
    {
        run_in_transaction(self, &config, f).await
    }

    // ---- reads ----

    pub async fn find<M: Model>(&self, id: i64) -> OrmResult<M> {
        let filter = Filter::new().where_eq(M::primary_key_name(), id);
        self.first::<M>(filter)
            .await?
            .ok_or_else(|| OrmError::not_found(M::table_name(), id))
    }

    /// First row matching `filter`, if any
    pub async fn first<M: Model>(&self, filter: Filter) -> OrmResult<Option<M>> {
        Ok(self.find_by::<M>(filter.limit(1)).await?.into_iter().next())
    }

    pub async fn find_by<M: Model>(&self, filter: Filter) -> OrmResult<Vec<M>> {
        let records = self.select_records(M::table_name(), M::primary_key_name(), &scoped::<M>(filter)).await?;

        let mut models = Vec::with_capacity(records.len());
        for record in records {
            let mut event = self.event::<M>(record);
            self.fire(ModelEvent::Retrieved, &mut event).await?;
            models.push(from_record(event.into_attributes())?);
        }
        Ok(models)
    }

    pub async fn all<M: Model>(&self) -> OrmResult<Vec<M>> {
        self.find_by::<M>(Filter::new()).await
    }

    /// Number of rows matching `filter`; fires no events
    pub async fn count<M: Model>(&self, filter: Filter) -> OrmResult<usize> {
        Ok(self
            .select_records(M::table_name(), M::primary_key_name(), &scoped::<M>(filter))
            .await?
            .len())
    }

    // ---- writes ----

    /// Insert `model`, writing the generated key back into it
    pub async fn create<M: Model>(&self, model: &mut M) -> OrmResult<()> {
        let mut attributes = to_record(model)?;
        if M::uses_timestamps() {
            let now = timestamp();
            if attributes.get(CREATED_AT).map_or(true, Value::is_null) {
                attributes.insert(CREATED_AT.to_string(), now.clone());
            }
            attributes.insert(UPDATED_AT.to_string(), now);
        }

        let mut event = self.event::<M>(attributes);
        self.fire(ModelEvent::Saving, &mut event).await?;
        self.fire(ModelEvent::Creating, &mut event).await?;

        *model = from_record(event.attributes().clone())?;
        let mut record = event.into_attributes();
        if model.primary_key().is_none() {
            record.remove(M::primary_key_name());
        }

        let id = self.insert_record(M::table_name(), M::primary_key_name(), record).await?;
        model.set_primary_key(id);

        let mut event = self.event::<M>(to_record(model)?);
        self.fire(ModelEvent::Created, &mut event).await?;
        self.fire(ModelEvent::Saved, &mut event).await
    }

    /// Write every attribute of a persisted `model`
    pub async fn update<M: Model>(&self, model: &mut M) -> OrmResult<()> {
        let id = model.primary_key().ok_or(OrmError::MissingPrimaryKey)?;

        let mut attributes = to_record(model)?;
        if M::uses_timestamps() {
            attributes.insert(UPDATED_AT.to_string(), timestamp());
        }

        let mut event = self.event::<M>(attributes);
        self.fire(ModelEvent::Saving, &mut event).await?;
        self.fire(ModelEvent::Updating, &mut event).await?;

        *model = from_record(event.attributes().clone())?;
        let mut record = event.into_attributes();
        record.remove(M::primary_key_name());

        let affected = self
            .update_record(M::table_name(), M::primary_key_name(), id, record)
            .await?;
        if affected == 0 {
            return Err(OrmError::not_found(M::table_name(), id));
        }

        let mut event = self.event::<M>(to_record(model)?);
        self.fire(ModelEvent::Updated, &mut event).await?;
        self.fire(ModelEvent::Saved, &mut event).await
    }

    /// Create when `model` has no key yet, update otherwise
    pub async fn save<M: Model>(&self, model: &mut M) -> OrmResult<()> {
        match model.primary_key() {
            Some(_) => self.update(model).await,
            None => self.create(model).await,
        }
    }

    /// Delete `model`; soft-deleting models only get `deleted_at` set
    pub async fn delete<M: Model>(&self, model: &mut M) -> OrmResult<()> {
        let id = model.primary_key().ok_or(OrmError::MissingPrimaryKey)?;

        let mut event = self.event::<M>(to_record(model)?);
        self.fire(ModelEvent::Deleting, &mut event).await?;
        let mut attributes = event.into_attributes();

        let affected = if M::uses_soft_deletes() {
            let now = timestamp();
            attributes.insert(DELETED_AT.to_string(), now.clone());

            let mut record = Record::new();
            record.insert(DELETED_AT.to_string(), now);
            self.update_record(M::table_name(), M::primary_key_name(), id, record)
                .await?
        } else {
            self.delete_record(M::table_name(), M::primary_key_name(), id)
                .await?
        };
        if affected == 0 {
            return Err(OrmError::not_found(M::table_name(), id));
        }
        *model = from_record(attributes.clone())?;

        let mut event = self.event::<M>(attributes);
        self.fire(ModelEvent::Deleted, &mut event).await
    }

    /// Permanently remove `model`, bypassing soft deletes
    pub async fn force_delete<M: Model>(&self, model: &mut M) -> OrmResult<()> {
        let id = model.primary_key().ok_or(OrmError::MissingPrimaryKey)?;

        let mut event = self.event::<M>(to_record(model)?);
        self.fire(ModelEvent::ForceDeleting, &mut event).await?;
        let attributes = event.into_attributes();

        let affected = self
            .delete_record(M::table_name(), M::primary_key_name(), id)
            .await?;
        if affected == 0 {
            return Err(OrmError::not_found(M::table_name(), id));
        }
        *model = from_record(attributes.clone())?;

        let mut event = self.event::<M>(attributes);
        self.fire(ModelEvent::ForceDeleted, &mut event).await
    }

    // ---- plumbing ----

    fn event<M: Model>(&self, attributes: Record) -> Event {
        Event::new(ModelType::of::<M>(), attributes, self.ctx.clone())
    }

    async fn fire(&self, kind: ModelEvent, event: &mut Event) -> OrmResult<()> {
        Ok(self.observers.dispatch(kind, event).await?)
    }

    async fn insert_record(&self, table: &str, primary_key: &str, record: Record) -> OrmResult<i64> {
        match &self.transaction {
            Some(tx) => tx.active().await?.insert(&self.ctx, table, primary_key, record).await,
            None => self.driver.insert(&self.ctx, table, primary_key, record).await,
        }
    }

    async fn update_record(
        &self,
        table: &str,
        primary_key: &str,
        id: i64,
        record: Record,
    ) -> OrmResult<u64> {
        match &self.transaction {
            Some(tx) => {
                tx.active()
                    .await?
                    .update(&self.ctx, table, primary_key, id, record)
                    .await
            }
            None => self.driver.update(&self.ctx, table, primary_key, id, record).await,
        }
    }

    async fn delete_record(&self, table: &str, primary_key: &str, id: i64) -> OrmResult<u64> {
        match &self.transaction {
            Some(tx) => tx.active().await?.delete(&self.ctx, table, primary_key, id).await,
            None => self.driver.delete(&self.ctx, table, primary_key, id).await,
        }
    }

    async fn select_records(&self, table: &str, primary_key: &str, filter: &Filter) -> OrmResult<Vec<Record>> {
        match &self.transaction {
            Some(tx) => tx.active().await?.select(&self.ctx, table, primary_key, filter).await,
            None => self.driver.select(&self.ctx, table, primary_key, filter).await,
        }
    }
}

/// Hide soft-deleted rows unless the filter asks for them
fn scoped<M: Model>(filter: Filter) -> Filter {
    if M::uses_soft_deletes() && !filter.includes_trashed() {
        filter.where_null(DELETED_AT)
    } else {
        filter
    }
}

fn timestamp() -> Value {
    Value::String(Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryDriver;
    use crate::event_error::EventError;
    use crate::events::Observer;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: i64,
        body: String,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
        #[serde(default)]
        updated_at: Option<DateTime<Utc>>,
        #[serde(default)]
        deleted_at: Option<DateTime<Utc>>,
    }

    impl Model for Note {
        fn table_name() -> &'static str {
            "notes"
        }

        fn primary_key(&self) -> Option<i64> {
            (self.id > 0).then_some(self.id)
        }

        fn set_primary_key(&mut self, key: i64) {
            self.id = key;
        }

        fn uses_timestamps() -> bool {
            true
        }

        fn uses_soft_deletes() -> bool {
            true
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Tag {
        id: i64,
        label: String,
    }

    impl Model for Tag {
        fn table_name() -> &'static str {
            "tags"
        }

        fn primary_key(&self) -> Option<i64> {
            (self.id > 0).then_some(self.id)
        }

        fn set_primary_key(&mut self, key: i64) {
            self.id = key;
        }
    }

    fn note(body: &str) -> Note {
        Note {
            body: body.to_string(),
            ..Default::default()
        }
    }

    fn memory_query() -> Query {
        Query::new(
            "memory",
            Arc::new(MemoryDriver::new("memory")),
            Arc::new(ObserverRegistry::new()),
        )
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Observer for Arc<Recorder> {
        async fn retrieved(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("retrieved".into());
            Ok(())
        }
        async fn creating(&self, event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("creating".into());
            if event.get_attribute("body") == Some(&Value::from("shout")) {
                event.set_attribute("body", "SHOUT");
            }
            Ok(())
        }
        async fn created(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("created".into());
            Ok(())
        }
        async fn updating(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("updating".into());
            Ok(())
        }
        async fn updated(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("updated".into());
            Ok(())
        }
        async fn saving(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("saving".into());
            Ok(())
        }
        async fn saved(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("saved".into());
            Ok(())
        }
        async fn deleting(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("deleting".into());
            Ok(())
        }
        async fn deleted(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("deleted".into());
            Ok(())
        }
        async fn force_deleting(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("force_deleting".into());
            Ok(())
        }
        async fn force_deleted(&self, _event: &mut Event) -> Result<(), EventError> {
            self.events.lock().unwrap().push("force_deleted".into());
            Ok(())
        }
    }

    impl Recorder {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    #[tokio::test]
    async fn test_create_find_and_timestamps() {
        let query = memory_query();
        let mut created = note("hello");

        query.create(&mut created).await.unwrap();
        assert_eq!(created.id, 1);
        assert!(created.created_at.is_some());
        assert_eq!(created.created_at, created.updated_at);

        let found: Note = query.find(1).await.unwrap();
        assert_eq!(found, created);
    }

    #[tokio::test]
    async fn test_find_missing_is_not_found() {
        let query = memory_query();
        let err = query.find::<Tag>(42).await.unwrap_err();
        assert!(matches!(err, OrmError::NotFound { ref table, ref key } if table == "tags" && key == "42"));
    }

    #[tokio::test]
    async fn test_update_requires_key_and_existing_row() {
        let query = memory_query();

        let mut unsaved = Tag::default();
        assert!(matches!(query.update(&mut unsaved).await, Err(OrmError::MissingPrimaryKey)));

        let mut ghost = Tag {
            id: 9,
            label: "ghost".into(),
        };
        assert!(matches!(query.update(&mut ghost).await, Err(OrmError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_save_creates_then_updates() {
        let query = memory_query();
        let mut tag = Tag {
            id: 0,
            label: "rust".into(),
        };

        query.save(&mut tag).await.unwrap();
        assert_eq!(tag.id, 1);

        tag.label = "rustacean".into();
        query.save(&mut tag).await.unwrap();

        let all: Vec<Tag> = query.all().await.unwrap();
        assert_eq!(all, vec![tag]);
    }

    #[tokio::test]
    async fn test_soft_delete_hides_rows_until_with_trashed() {
        let query = memory_query();
        let mut first = note("first");
        let mut second = note("second");
        query.create(&mut first).await.unwrap();
        query.create(&mut second).await.unwrap();

        query.delete(&mut first).await.unwrap();
        assert!(first.deleted_at.is_some());

        let visible: Vec<Note> = query.all().await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, second.id);
        assert!(matches!(query.find::<Note>(first.id).await, Err(OrmError::NotFound { .. })));

        let trashed: Vec<Note> = query.find_by(Filter::new().with_trashed()).await.unwrap();
        assert_eq!(trashed.len(), 2);
        assert_eq!(query.count::<Note>(Filter::new()).await.unwrap(), 1);

        query.force_delete(&mut first).await.unwrap();
        assert_eq!(query.count::<Note>(Filter::new().with_trashed()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hard_delete_without_soft_deletes() {
        let query = memory_query();
        let mut tag = Tag {
            id: 0,
            label: "gone".into(),
        };
        query.create(&mut tag).await.unwrap();
        query.delete(&mut tag).await.unwrap();

        assert_eq!(query.count::<Tag>(Filter::new().with_trashed()).await.unwrap(), 0);
        assert!(matches!(query.delete(&mut tag).await, Err(OrmError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_lifecycle_event_order() {
        let query = memory_query();
        let recorder = Arc::new(Recorder::default());
        query.observers().register::<Note>(recorder.clone());

        let mut model = note("shout");
        query.create(&mut model).await.unwrap();
        assert_eq!(recorder.take(), vec!["saving", "creating", "created", "saved"]);
        assert_eq!(model.body, "SHOUT");

        model.body = "quiet".into();
        query.update(&mut model).await.unwrap();
        assert_eq!(recorder.take(), vec!["saving", "updating", "updated", "saved"]);

        let _: Note = query.find(model.id).await.unwrap();
        assert_eq!(recorder.take(), vec!["retrieved"]);

        query.delete(&mut model).await.unwrap();
        assert_eq!(recorder.take(), vec!["deleting", "deleted"]);

        query.force_delete(&mut model).await.unwrap();
        assert_eq!(recorder.take(), vec!["force_deleting", "force_deleted"]);

        let stored: Vec<Note> = query.find_by(Filter::new().with_trashed()).await.unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_first_and_find_by_conditions() {
        let query = memory_query();
        for label in ["a", "b", "b"] {
            let mut tag = Tag {
                id: 0,
                label: label.into(),
            };
            query.create(&mut tag).await.unwrap();
        }

        let bs: Vec<Tag> = query.find_by(Filter::new().where_eq("label", "b")).await.unwrap();
        assert_eq!(bs.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 3]);

        let first: Option<Tag> = query.first(Filter::new().where_eq("label", "b")).await.unwrap();
        assert_eq!(first.map(|t| t.id), Some(2));

        let none: Option<Tag> = query.first(Filter::new().where_eq("label", "z")).await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_with_context_leaves_original_untouched() {
        let query = memory_query();
        let scoped = query.with_context(Context::background().with_value("k", 1_u8));

        assert!(scoped.context().has_value("k"));
        assert!(!query.context().has_value("k"));
        assert_eq!(scoped.connection_name(), "memory");
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_operations() {
        let query = memory_query();
        let (ctx, token) = Context::background().with_cancellation();
        let cancelled = query.with_context(ctx);
        token.cancel();

        let mut tag = Tag {
            id: 0,
            label: "x".into(),
        };
        assert!(matches!(cancelled.create(&mut tag).await, Err(OrmError::Cancelled)));
        assert_eq!(query.count::<Tag>(Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let query = memory_query();

        let id = query
            .transaction(|tx| async move {
                let mut tag = Tag {
                    id: 0,
                    label: "kept".into(),
                };
                tx.create(&mut tag).await?;
                assert!(tx.is_transaction());
                Ok::<_, OrmError>(tag.id)
            })
            .await
            .unwrap();
        assert_eq!(query.find::<Tag>(id).await.unwrap().label, "kept");

        let result: Result<(), OrmError> = query
            .transaction(|tx| async move {
                let mut tag = Tag {
                    id: 0,
                    label: "dropped".into(),
                };
                tx.create(&mut tag).await?;
                Err::<(), _>(OrmError::Database("boom".into()))
            })
            .await;
        assert!(matches!(result, Err(OrmError::Database(msg)) if msg == "boom"));
        assert_eq!(query.count::<Tag>(Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_transaction_query_fails_after_completion() {
        let query = memory_query();
        let leaked = query
            .transaction(|tx| async move { Ok::<_, OrmError>(tx) })
            .await
            .unwrap();

        let mut tag = Tag {
            id: 0,
            label: "late".into(),
        };
        assert!(matches!(leaked.create(&mut tag).await, Err(OrmError::Transaction(_))));
    }

    #[tokio::test]
    async fn test_nested_transaction_joins_outer() {
        let query = memory_query();

        let result: Result<(), OrmError> = query
            .transaction(|tx| async move {
                let outer_id = tx.transaction_handle().map(|h| h.id());
                tx.transaction(|inner| async move {
                    assert_eq!(inner.transaction_handle().map(|h| h.id()), outer_id);
                    let mut tag = Tag {
                        id: 0,
                        label: "inner".into(),
                    };
                    inner.create(&mut tag).await
                })
                .await?;
                Err::<(), _>(OrmError::Database("outer failed".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(query.count::<Tag>(Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_db_fails_after_close() {
        let query = memory_query();
        assert!(query.db().is_ok());

        query.db().unwrap().close().await;
        assert!(matches!(query.db(), Err(OrmError::Connection(_))));
    }

    /// Fails the one hook it is armed for, with the hook name as message
    struct Veto(ModelEvent);

    impl Veto {
        fn check(&self, kind: ModelEvent) -> Result<(), EventError> {
            if self.0 == kind {
                return Err(EventError::observer(kind.name()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Observer for Veto {
        async fn retrieved(&self, _event: &mut Event) -> Result<(), EventError> {
            self.check(ModelEvent::Retrieved)
        }
        async fn saving(&self, _event: &mut Event) -> Result<(), EventError> {
            self.check(ModelEvent::Saving)
        }
        async fn updating(&self, _event: &mut Event) -> Result<(), EventError> {
            self.check(ModelEvent::Updating)
        }
        async fn deleting(&self, _event: &mut Event) -> Result<(), EventError> {
            self.check(ModelEvent::Deleting)
        }
        async fn force_deleting(&self, _event: &mut Event) -> Result<(), EventError> {
            self.check(ModelEvent::ForceDeleting)
        }
    }

    fn vetoed_query(kind: ModelEvent) -> Query {
        let query = memory_query();
        query.observers().register::<Tag>(Veto(kind));
        query
    }

    fn tag(label: &str) -> Tag {
        Tag {
            label: label.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_saving_error_aborts_create() {
        let query = vetoed_query(ModelEvent::Saving);
        let mut created = tag("ok");

        let err = query.create(&mut created).await.unwrap_err();
        assert_eq!(err.to_string(), "saving");
        assert_eq!(created.id, 0);
        assert_eq!(query.count::<Tag>(Filter::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_updating_error_leaves_row_unchanged() {
        let query = vetoed_query(ModelEvent::Updating);
        let mut created = tag("ok");
        query.create(&mut created).await.unwrap();

        created.label = "changed".to_string();
        let err = query.update(&mut created).await.unwrap_err();
        assert_eq!(err.to_string(), "updating");

        let stored: Tag = query.find(created.id).await.unwrap();
        assert_eq!(stored.label, "ok");
    }

    #[tokio::test]
    async fn test_deleting_error_keeps_row() {
        let query = vetoed_query(ModelEvent::Deleting);
        let mut created = tag("ok");
        query.create(&mut created).await.unwrap();

        let err = query.delete(&mut created).await.unwrap_err();
        assert_eq!(err.to_string(), "deleting");
        assert_eq!(query.count::<Tag>(Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_force_deleting_error_keeps_row() {
        let query = vetoed_query(ModelEvent::ForceDeleting);
        let mut created = tag("ok");
        query.create(&mut created).await.unwrap();

        let err = query.force_delete(&mut created).await.unwrap_err();
        assert_eq!(err.to_string(), "force_deleting");
        assert_eq!(query.count::<Tag>(Filter::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_retrieved_error_fails_the_read() {
        let query = vetoed_query(ModelEvent::Retrieved);
        let mut created = tag("ok");
        query.create(&mut created).await.unwrap();

        let err = query.find::<Tag>(created.id).await.unwrap_err();
        assert_eq!(err.to_string(), "retrieved");
        assert!(err.is_hook_error());
        assert!(query.all::<Tag>().await.is_err());
        assert_eq!(query.count::<Tag>(Filter::new()).await.unwrap(), 1);
    }
}
