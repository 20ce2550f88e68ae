//! End-to-end behaviour of the ORM over four in-memory connections.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use keel_orm::backends::MemoryDriver;
use keel_orm::factory::fake_data;
use keel_orm::{
    async_trait, ConnectionConfig, Context, DatabaseConfig, DriverKind, Event, EventError, Factoryable,
    Filter, Model, Observer, Orm, OrmError, Record, TransactionConfig,
};
use serde::{Deserialize, Serialize};

const CONNECTIONS: [&str; 4] = ["mysql", "postgresql", "sqlite", "sqlserver"];
const CONTEXT_KEY: &str = "context_avatar";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct User {
    #[serde(default)]
    id: i64,
    name: String,
    #[serde(default)]
    avatar: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    deleted_at: Option<DateTime<Utc>>,
}

impl Model for User {
    fn table_name() -> &'static str {
        "users"
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

impl Factoryable for User {
    fn definition() -> Record {
        let mut record = Record::new();
        record.insert("name".to_string(), fake_data::fake_name().into());
        record.insert("avatar".to_string(), fake_data::fake_avatar_url().into());
        record
    }
}

struct UserObserver;

#[async_trait]
impl Observer for UserObserver {
    async fn creating(&self, event: &mut Event) -> Result<(), EventError> {
        match event.get_attribute("name").and_then(|name| name.as_str()) {
            Some("observer_name") => Err(EventError::observer("error")),
            Some("with_context_name") => {
                if let Some(avatar) = event.context().value::<String>(CONTEXT_KEY).cloned() {
                    event.set_attribute("avatar", avatar);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

fn user(name: &str) -> User {
    User {
        name: name.to_string(),
        avatar: "avatar".to_string(),
        ..Default::default()
    }
}

fn setup() -> Orm {
    let mut config = DatabaseConfig::new("postgresql");
    for name in CONNECTIONS {
        config = config.with_connection(ConnectionConfig::new(
            name,
            DriverKind::Memory,
            format!("memory://{}", name),
        ));
    }

    let orm = Orm::new(config).unwrap();
    orm.observe::<User>(UserObserver);
    orm
}

fn with_avatar_context() -> Context {
    Context::background().with_value(CONTEXT_KEY, "context_avatar".to_string())
}

#[tokio::test]
async fn test_connection() {
    let orm = setup();
    assert_eq!(orm.connection_name(), "postgresql");

    for name in CONNECTIONS {
        let bound = orm.connection(name).unwrap();
        assert_eq!(bound.connection_name(), name);
        assert_eq!(bound.query().connection_name(), name);
    }
    assert_eq!(orm.connection_name(), "postgresql");
}

#[tokio::test]
async fn test_db() {
    let orm = setup();

    for name in CONNECTIONS {
        let db = orm.connection(name).unwrap().db().unwrap();
        assert_eq!(db.kind(), DriverKind::Memory);
        assert!(db.as_any().downcast_ref::<MemoryDriver>().is_some());
        assert!(db.health_check(&Context::background()).await.is_ok());
    }
}

#[tokio::test]
async fn test_connections_are_isolated() {
    let orm = setup();

    let mut stored = user("mysql_only");
    orm.connection("mysql").unwrap().query().create(&mut stored).await.unwrap();

    let mysql = orm.connection("mysql").unwrap().query();
    assert_eq!(mysql.count::<User>(Filter::new()).await.unwrap(), 1);

    for name in ["postgresql", "sqlite", "sqlserver"] {
        let query = orm.connection(name).unwrap().query();
        assert_eq!(query.count::<User>(Filter::new()).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_unknown_connection() {
    let orm = setup();
    let err = orm.connection("oracle").unwrap_err();

    assert!(matches!(err, OrmError::UnknownConnection(ref name) if name == "oracle"));
    assert!(err.is_configuration_error());
}

#[tokio::test]
async fn test_query() {
    let orm = setup();

    for name in CONNECTIONS {
        let query = orm.connection(name).unwrap().query();

        let mut created = user("count_user");
        query.create(&mut created).await.unwrap();
        assert!(created.id > 0);
        assert!(created.created_at.is_some());

        let found: User = query.find(created.id).await.unwrap();
        assert_eq!(found.name, "count_user");
        assert_eq!(found.id, created.id);
    }
}

#[tokio::test]
async fn test_query_concurrently() {
    let orm = setup();

    let mut handles = Vec::new();
    for i in 0..20 {
        let orm = orm.clone();
        handles.push(tokio::spawn(async move {
            let mut created = user(&format!("concurrent_{}", i));
            orm.query().create(&mut created).await?;
            orm.query().find::<User>(created.id).await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().id);
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 20);
}

#[tokio::test]
async fn test_factory() {
    let orm = setup();

    for name in CONNECTIONS {
        let bound = orm.connection(name).unwrap();

        let users: Vec<User> = bound.factory().count(2).create().await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(users.iter().all(|u| u.id > 0 && !u.name.is_empty()));

        let made: User = bound.factory().with("name", "unsaved").make_one().unwrap();
        assert_eq!(made.id, 0);
        assert_eq!(bound.query().count::<User>(Filter::new()).await.unwrap(), 2);
    }
}

#[tokio::test]
async fn test_observe() {
    let orm = setup();

    for name in CONNECTIONS {
        let query = orm.connection(name).unwrap().query();

        let mut rejected = user("observer_name");
        let err = query.create(&mut rejected).await.unwrap_err();
        assert_eq!(err.to_string(), "error");
        assert!(err.is_hook_error());
        assert_eq!(rejected.id, 0);
        assert_eq!(query.count::<User>(Filter::new()).await.unwrap(), 0);
    }
}

#[tokio::test]
async fn test_transaction_success() {
    let orm = setup();

    for name in CONNECTIONS {
        let bound = orm.connection(name).unwrap();

        let (a, b) = bound
            .transaction(|tx| async move {
                let mut a = user("transaction_success_user");
                tx.create(&mut a).await?;

                let mut b = user("transaction_success_user1");
                tx.create(&mut b).await?;
                Ok::<_, OrmError>((a, b))
            })
            .await
            .unwrap();

        let query = bound.query();
        let found_a: User = query.find(a.id).await.unwrap();
        let found_b: User = query.find(b.id).await.unwrap();
        assert_eq!(found_a.name, "transaction_success_user");
        assert_eq!(found_b.name, "transaction_success_user1");
    }
}

#[tokio::test]
async fn test_transaction_update_inside_scope() {
    let orm = setup();

    let id = orm
        .transaction(|tx| async move {
            let mut created = user("transaction_update_user");
            tx.create(&mut created).await?;

            let mut renamed: User = tx.find(created.id).await?;
            renamed.name = "transaction_update_user1".to_string();
            tx.update(&mut renamed).await?;
            Ok::<_, OrmError>(renamed.id)
        })
        .await
        .unwrap();

    let stored: User = orm.query().find(id).await.unwrap();
    assert_eq!(stored.name, "transaction_update_user1");
}

#[tokio::test]
async fn test_transaction_error() {
    let orm = setup();

    for name in CONNECTIONS {
        let bound = orm.connection(name).unwrap();

        let err = bound
            .transaction(|tx| async move {
                let mut a = user("transaction_error_user");
                tx.create(&mut a).await?;

                let mut b = user("transaction_error_user1");
                tx.create(&mut b).await?;
                Err::<(), _>(OrmError::Database("error".to_string()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Database error: error");

        let users: Vec<User> = bound.query().all().await.unwrap();
        assert!(users.is_empty());
    }
}

#[tokio::test]
async fn test_transaction_callback_error_type_is_preserved() {
    #[derive(Debug, PartialEq)]
    enum SignupError {
        Orm(String),
        EmailTaken,
    }

    impl From<OrmError> for SignupError {
        fn from(err: OrmError) -> Self {
            SignupError::Orm(err.to_string())
        }
    }

    let orm = setup();
    let err = orm
        .transaction(|tx| async move {
            let mut created = user("taken");
            tx.create(&mut created).await?;
            Err::<(), _>(SignupError::EmailTaken)
        })
        .await
        .unwrap_err();

    assert_eq!(err, SignupError::EmailTaken);
    assert_eq!(orm.query().count::<User>(Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transaction_hook_error_rolls_back() {
    let orm = setup();

    let err = orm
        .transaction(|tx| async move {
            let mut kept = user("before_hook_error");
            tx.create(&mut kept).await?;

            let mut rejected = user("observer_name");
            tx.create(&mut rejected).await?;
            Ok::<_, OrmError>(())
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "error");
    assert_eq!(orm.query().count::<User>(Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_transaction_panic_rolls_back_and_propagates() {
    let orm = setup();

    let task = {
        let orm = orm.clone();
        tokio::spawn(async move {
            orm.transaction(|tx| async move {
                let mut created = user("transaction_panic_user");
                tx.create(&mut created).await?;
                if created.id > 0 {
                    panic!("boom");
                }
                Ok::<_, OrmError>(())
            })
            .await
        })
    };

    let join_err = task.await.unwrap_err();
    assert!(join_err.is_panic());
    assert_eq!(orm.query().count::<User>(Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_read_only_transaction() {
    let orm = setup();

    let err = orm
        .transaction_with(TransactionConfig::read_only(), |tx| async move {
            let mut created = user("read_only_user");
            tx.create(&mut created).await
        })
        .await
        .unwrap_err();

    assert!(matches!(err, OrmError::Database(_)));
    assert_eq!(orm.query().count::<User>(Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_with_context() {
    let orm = setup();

    // context bound on the façade
    let mut first = user("with_context_name");
    orm.with_context(with_avatar_context())
        .query()
        .create(&mut first)
        .await
        .unwrap();
    assert_eq!(first.avatar, "context_avatar");

    // context bound on the query
    let mut second = user("with_context_name");
    orm.query()
        .with_context(with_avatar_context())
        .create(&mut second)
        .await
        .unwrap();
    assert_eq!(second.avatar, "context_avatar");

    // context carried into a transaction
    let third = orm
        .with_context(with_avatar_context())
        .transaction(|tx| async move {
            let mut created = user("with_context_name");
            tx.create(&mut created).await?;
            Ok::<_, OrmError>(created)
        })
        .await
        .unwrap();
    assert_eq!(third.avatar, "context_avatar");

    let stored: User = orm.query().find(third.id).await.unwrap();
    assert_eq!(stored.avatar, "context_avatar");

    // no context, no rewrite
    let mut plain = user("with_context_name");
    orm.query().create(&mut plain).await.unwrap();
    assert_eq!(plain.avatar, "avatar");
}

#[tokio::test]
async fn test_with_context_and_connection_commute() {
    let orm = setup();

    for name in CONNECTIONS {
        let mut first = user("with_context_name");
        orm.with_context(with_avatar_context())
            .connection(name)
            .unwrap()
            .query()
            .create(&mut first)
            .await
            .unwrap();

        let mut second = user("with_context_name");
        orm.connection(name)
            .unwrap()
            .with_context(with_avatar_context())
            .query()
            .create(&mut second)
            .await
            .unwrap();

        assert_eq!(first.avatar, "context_avatar");
        assert_eq!(second.avatar, "context_avatar");

        let bound = orm.connection(name).unwrap().query();
        let stored: Vec<User> = bound.all().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|u| u.avatar == "context_avatar"));
    }
}

#[tokio::test]
async fn test_cancelled_context_fails_operation() {
    let orm = setup();
    let (ctx, token) = Context::background().with_cancellation();
    token.cancel();

    let mut created = user("cancelled");
    let err = orm.with_context(ctx).query().create(&mut created).await.unwrap_err();

    assert!(matches!(err, OrmError::Cancelled));
    assert_eq!(orm.query().count::<User>(Filter::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_soft_delete_and_force_delete() {
    let orm = setup();
    let query = orm.query();

    let mut created = user("soft_delete_user");
    query.create(&mut created).await.unwrap();

    query.delete(&mut created).await.unwrap();
    assert!(created.deleted_at.is_some());
    assert!(matches!(
        query.find::<User>(created.id).await,
        Err(OrmError::NotFound { .. })
    ));

    let trashed = Filter::new().where_eq("id", created.id).with_trashed();
    assert_eq!(query.count::<User>(trashed.clone()).await.unwrap(), 1);

    query.force_delete(&mut created).await.unwrap();
    assert_eq!(query.count::<User>(trashed).await.unwrap(), 0);
}

#[tokio::test]
async fn test_observer_registered_twice_fires_twice() {
    struct Suffix;

    #[async_trait]
    impl Observer for Suffix {
        async fn creating(&self, event: &mut Event) -> Result<(), EventError> {
            let name = event
                .get_attribute("name")
                .and_then(|name| name.as_str())
                .unwrap_or_default()
                .to_string();
            event.set_attribute("name", format!("{}!", name));
            Ok(())
        }
    }

    let orm = setup();
    orm.observe::<User>(Suffix);
    orm.observe::<User>(Suffix);

    let mut created = user("loud");
    orm.query().create(&mut created).await.unwrap();
    assert_eq!(created.name, "loud!!");
}

#[tokio::test]
async fn test_close() {
    let orm = setup();
    orm.close().await;

    for name in CONNECTIONS {
        assert!(orm.connection(name).unwrap().db().is_err());
    }
    let mut created = user("after_close");
    assert!(matches!(
        orm.query().create(&mut created).await,
        Err(OrmError::Connection(_))
    ));
}

#[tokio::test]
async fn test_shared_context_is_not_mutated() {
    let orm = setup();
    let scoped = orm.with_context(Context::background().with_value("tenant", 7_u32));

    assert_eq!(scoped.context().value::<u32>("tenant"), Some(&7));
    assert!(orm.context().value::<u32>("tenant").is_none());
    assert!(Arc::ptr_eq(orm.observers(), scoped.observers()));
}
