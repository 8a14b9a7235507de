use bson::{Bson, Document, doc};
use permlayer::{memory::InMemoryStore, prelude::*, record::from_json};

const ROOT: &str = "root";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn user_shape() -> Shape {
    Shape::object([
        ("age", Shape::Number),
        ("login", Shape::String),
        ("password", Shape::String),
        (
            "data",
            Shape::object([
                ("firstName", Shape::String),
                ("lastName", Shape::String),
                ("age", Shape::Number),
            ]),
        ),
    ])
}

fn guarded(read: &str) -> FieldPermissions {
    FieldPermissions::open()
        .with_read([read])
        .with_update(["users:write"])
        .with_remove(["users:admin"])
}

fn users_config() -> CollectionConfig {
    CollectionConfig::new("users")
        .shape(user_shape())
        .container_permissions(true)
        .default_permissions(
            FieldPermissions::open()
                .with_update(["users:write"])
                .with_remove(["users:admin"]),
        )
        .override_permissions("password", guarded("secrets").with_update(["secrets"]))
        .override_permissions("data.age", guarded("age:read"))
}

fn user(login: &str, age: i32) -> Document {
    doc! {
        "login": login,
        "password": "pw",
        "age": age,
        "data": { "firstName": login, "lastName": "Doe", "age": age },
    }
}

async fn setup() -> DocumentStore<InMemoryStore> {
    init_tracing();

    let backend = InMemoryStore::builder().build().await.unwrap();
    let store = DocumentStore::with_config(backend, StoreConfig::new().superadmin_id(ROOT));

    store.register_actor(SimpleActor::new("reader", Vec::<String>::new())).await.unwrap();
    store.register_actor(SimpleActor::new("writer", ["users:write"])).await.unwrap();
    store
        .register_actor(SimpleActor::new(
            "admin",
            ["users:write", "users:admin", "secrets", "age:read"],
        ))
        .await
        .unwrap();
    store.register_collection(users_config()).await.unwrap();

    let users = store.collection("users").await.unwrap();
    let created = users
        .create(ROOT, vec![user("alice", 30), user("bob", 17)])
        .await
        .unwrap();
    assert_eq!(created.status, Status::Ok);
    assert_eq!(created.payload.len(), 2);

    store
}

fn by_login(login: &str) -> Query {
    Query::builder().filter_doc(doc! { "login": login }).build()
}

fn logins(outcome: &Outcome) -> Vec<&str> {
    outcome
        .payload
        .iter()
        .filter_map(|record| record.get_str("login").ok())
        .collect()
}

#[tokio::test]
async fn reader_gets_redacted_records() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let outcome = users.read("reader", Query::new()).await.unwrap();

    assert_eq!(outcome.status, Status::Partial);
    assert_eq!(outcome.status.code(), 206);
    assert!(outcome.is_restricted);
    assert_eq!(logins(&outcome), vec!["alice", "bob"]);
    assert_eq!(outcome.not_permitted.get("password"), Some(&2));
    assert_eq!(outcome.not_permitted.get("data.age"), Some(&2));

    for record in &outcome.payload {
        assert!(record.get("password").is_none());
        assert!(record.get_str("_id").is_ok());
        assert_eq!(
            record.get_document("data").unwrap().keys().collect::<Vec<_>>(),
            vec!["firstName", "lastName"]
        );
    }
}

#[tokio::test]
async fn granted_actor_and_superadmin_see_everything() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    for actor in ["admin", ROOT] {
        let outcome = users.read(actor, by_login("alice")).await.unwrap();

        assert_eq!(outcome.status, Status::Ok);
        assert!(!outcome.is_restricted);
        assert!(outcome.not_permitted.is_empty());
        assert_eq!(outcome.payload[0].get_str("password").ok(), Some("pw"));
        assert_eq!(outcome.payload[0].get_document("data").unwrap().get_i32("age").ok(), Some(30));
    }
}

#[tokio::test]
async fn unknown_actor_is_rejected() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    assert!(matches!(
        users.read("mallory", Query::new()).await,
        Err(CollectionError::ActorNotFound(_))
    ));
}

#[tokio::test]
async fn projection_limits_what_is_checked() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let outcome = users
        .read("reader", Query::builder().project(["login", "data.lastName"]).build())
        .await
        .unwrap();

    assert_eq!(outcome.status, Status::Ok);
    assert_eq!(
        outcome.payload,
        vec![
            doc! { "login": "alice", "data": { "lastName": "Doe" } },
            doc! { "login": "bob", "data": { "lastName": "Doe" } },
        ]
    );
}

#[tokio::test]
async fn filters_sort_and_limit() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let adults = users
        .read(ROOT, Query::builder().filter_doc(doc! { "age": { "$gte": 18 } }).build())
        .await
        .unwrap();
    assert_eq!(logins(&adults), vec!["alice"]);

    let limited = users
        .read(ROOT, Query::builder().sort("age", SortDirection::Asc).limit(1).build())
        .await
        .unwrap();
    assert_eq!(logins(&limited), vec!["bob"]);
    assert!(limited.is_limited);

    let nested = users
        .read(ROOT, Query::builder().filter_doc(doc! { "data": { "firstName": { "$sw": "al" } } }).build())
        .await
        .unwrap();
    assert_eq!(logins(&nested), vec!["alice"]);

    let none = users.read(ROOT, by_login("carol")).await.unwrap();
    assert_eq!(none.status, Status::NotFound);
    assert_eq!(none.status.code(), 404);
    assert!(none.payload.is_empty());
}

#[tokio::test]
async fn filters_load_from_json() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let filter = Filter::from_json(serde_json::json!({
        "$or": [{ "login": "bob" }, { "data.age": { "$gt": 25 } }]
    }))
    .unwrap();

    let outcome = users
        .read(ROOT, Query::builder().filter(filter).sort("login", SortDirection::Desc).build())
        .await
        .unwrap();

    assert_eq!(logins(&outcome), vec!["bob", "alice"]);
}

#[tokio::test]
async fn create_validates_and_restamps() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let invalid = users
        .create(ROOT, vec![user("carol", 40), doc! { "login": "dave" }])
        .await;
    assert!(matches!(invalid, Err(CollectionError::InvalidRecord(_))));
    assert_eq!(users.read(ROOT, by_login("carol")).await.unwrap().status, Status::NotFound);

    let mut forged = user("erin", 22);
    forged.insert("_id", "forged");
    let created = users.create("writer", vec![forged]).await.unwrap();
    let record = &created.payload[0];

    assert_ne!(record.get_str("_id").ok(), Some("forged"));
    assert_eq!(record.get_document("_created").unwrap().get_str("by").ok(), Some("writer"));
    assert_eq!(record.get("_deleted"), Some(&Bson::Boolean(false)));

    let imported = from_json(serde_json::json!({
        "login": "frank",
        "password": "pw",
        "age": 51,
        "data": { "firstName": "Frank", "lastName": "Doe", "age": 51 },
    }))
    .unwrap();
    assert_eq!(users.create(ROOT, vec![imported]).await.unwrap().status, Status::Ok);
}

#[tokio::test]
async fn update_touches_only_permitted_fields() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let patch = doc! { "age": 31, "password": "stolen", "data": { "age": 40 }, "_id": "x" };
    let outcome = users.update("writer", by_login("alice"), patch).await.unwrap();

    assert_eq!(outcome.status, Status::Partial);
    assert_eq!(outcome.not_permitted.get("password"), Some(&1));
    assert_eq!(outcome.payload.len(), 1);
    assert!(outcome.payload[0].get("password").is_none());
    assert_eq!(outcome.payload[0].get_i32("age").ok(), Some(31));

    let stored = users.read(ROOT, by_login("alice")).await.unwrap().payload.remove(0);

    assert_eq!(stored.get_str("password").ok(), Some("pw"));
    assert_eq!(stored.get_i32("age").ok(), Some(31));
    assert_eq!(stored.get_document("data").unwrap().get_i32("age").ok(), Some(40));
    assert_eq!(stored.get_document("data").unwrap().get_str("firstName").ok(), Some("alice"));
    assert_eq!(stored.get_document("_updated").unwrap().get_str("by").ok(), Some("writer"));
    assert_ne!(stored.get_str("_id").ok(), Some("x"));
}

#[tokio::test]
async fn update_without_rights_changes_nothing() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let outcome = users
        .update("reader", by_login("alice"), doc! { "age": 99 })
        .await
        .unwrap();

    assert_eq!(outcome.status, Status::NotFound);
    assert!(outcome.is_restricted);

    let stored = users.read(ROOT, by_login("alice")).await.unwrap();
    assert_eq!(stored.payload[0].get_i32("age").ok(), Some(30));
}

#[tokio::test]
async fn update_cannot_replace_a_guarded_branch() {
    init_tracing();

    let store = DocumentStore::new(InMemoryStore::new());
    store.register_actor(SimpleActor::new("bob", Vec::<String>::new())).await.unwrap();
    store
        .register_collection(
            CollectionConfig::new("notes")
                .override_permissions("data.age", FieldPermissions::open().with_update(["age:write"])),
        )
        .await
        .unwrap();

    let notes = store.collection("notes").await.unwrap();
    notes
        .create(store.superadmin_id(), vec![doc! { "title": "a", "data": { "age": 3, "city": "Lyon" } }])
        .await
        .unwrap();

    let outcome = notes
        .update("bob", Query::new(), doc! { "data": "gone" })
        .await
        .unwrap();

    assert_eq!(outcome.status, Status::NotFound);
    assert_eq!(outcome.not_permitted.get("data.age"), Some(&1));

    let swapped = notes
        .update("bob", Query::new(), doc! { "title": { "text": "b" }, "data": { "city": "Paris" } })
        .await
        .unwrap();
    assert_eq!(swapped.payload.len(), 1);

    let stored = notes
        .read(store.superadmin_id(), Query::new())
        .await
        .unwrap()
        .payload
        .remove(0);

    assert_eq!(stored.get_str("title").ok(), Some("a"));
    assert_eq!(stored.get_document("data").unwrap(), &doc! { "age": 3, "city": "Paris" });
}

#[tokio::test]
async fn update_and_remove_payloads_hide_unreadable_fields() {
    let store = setup().await;
    store
        .register_actor(SimpleActor::new("janitor", ["users:write", "users:admin"]))
        .await
        .unwrap();
    let users = store.collection("users").await.unwrap();

    let updated = users
        .update("janitor", by_login("alice"), doc! { "data": { "age": 33 } })
        .await
        .unwrap();

    assert_eq!(updated.status, Status::Partial);
    assert_eq!(updated.not_permitted.get("data.age"), Some(&1));
    assert!(updated.payload[0].get("password").is_none());
    assert!(updated.payload[0].get_document("data").unwrap().get("age").is_none());

    let stored = users.read(ROOT, by_login("alice")).await.unwrap().payload.remove(0);
    assert_eq!(stored.get_document("data").unwrap().get_i32("age").ok(), Some(33));

    let removed = users.remove("janitor", by_login("bob")).await.unwrap();

    assert_eq!(removed.status, Status::Partial);
    assert_eq!(logins(&removed), vec!["bob"]);
    assert!(removed.payload[0].get("password").is_none());
    assert!(removed.payload[0].get_document("data").unwrap().get("age").is_none());
    assert_eq!(removed.not_permitted.get("password"), Some(&1));

    let admin_view = users.remove("admin", by_login("alice")).await.unwrap();
    assert_eq!(admin_view.payload[0].get_str("password").ok(), Some("pw"));
}

#[tokio::test]
async fn update_rejects_shape_violations() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let result = users.update("admin", by_login("alice"), doc! { "age": "old" }).await;

    assert!(matches!(result, Err(CollectionError::InvalidRecord(_))));
    assert_eq!(
        users.read(ROOT, by_login("alice")).await.unwrap().payload[0].get_i32("age").ok(),
        Some(30)
    );
}

#[tokio::test]
async fn concurrent_updates_are_serialized() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let (first, second) = tokio::join!(
        users.update("admin", by_login("alice"), doc! { "age": 41 }),
        users.update("admin", by_login("alice"), doc! { "data": { "lastName": "Smith" } }),
    );
    first.unwrap();
    second.unwrap();

    let stored = users.read(ROOT, by_login("alice")).await.unwrap().payload.remove(0);

    assert_eq!(stored.get_i32("age").ok(), Some(41));
    assert_eq!(stored.get_document("data").unwrap().get_str("lastName").ok(), Some("Smith"));
}

#[tokio::test]
async fn remove_soft_deletes_permitted_records() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let denied = users.remove("writer", by_login("bob")).await.unwrap();
    assert_eq!(denied.status, Status::NotFound);
    assert!(denied.is_restricted);
    assert_eq!(users.read(ROOT, by_login("bob")).await.unwrap().payload.len(), 1);

    let removed = users.remove("admin", by_login("bob")).await.unwrap();
    assert_eq!(removed.status, Status::Ok);
    assert_eq!(logins(&removed), vec!["bob"]);

    assert_eq!(logins(&users.read(ROOT, Query::new()).await.unwrap()), vec!["alice"]);

    let all = users
        .read(ROOT, Query::builder().include_deleted().build())
        .await
        .unwrap();
    let bob = all
        .payload
        .iter()
        .find(|record| record.get_str("login").ok() == Some("bob"))
        .unwrap();

    assert_eq!(bob.get_document("_deleted").unwrap().get_str("by").ok(), Some("admin"));
}

#[tokio::test]
async fn container_restriction_hides_the_whole_branch() {
    init_tracing();

    let store = DocumentStore::new(InMemoryStore::new());
    store.register_actor(SimpleActor::new("guest", ["x"])).await.unwrap();
    store
        .register_collection(
            CollectionConfig::new("profiles")
                .shape(user_shape())
                .container_permissions(true)
                .override_permissions("data", FieldPermissions::open().with_read(["profile"])),
        )
        .await
        .unwrap();

    let profiles = store.collection("profiles").await.unwrap();
    profiles
        .create(store.superadmin_id(), vec![user("alice", 30)])
        .await
        .unwrap();

    let outcome = profiles.read("guest", Query::new()).await.unwrap();

    assert_eq!(outcome.status, Status::Partial);
    assert!(outcome.payload[0].get("data").is_none());
    assert_eq!(outcome.not_permitted.keys().collect::<Vec<_>>(), vec!["data"]);
}

#[tokio::test]
async fn per_record_permission_overrides() {
    let store = setup().await;
    let users = store.collection("users").await.unwrap();

    let overrides = std::collections::BTreeMap::from([(
        "login".to_string(),
        FieldPermissions::open().with_read(["vip"]),
    )]);
    users
        .create_with_permissions(ROOT, vec![user("vip", 50)], &overrides)
        .await
        .unwrap();

    let outcome = users
        .read("reader", Query::builder().filter_doc(doc! { "age": 50 }).build())
        .await
        .unwrap();

    assert!(outcome.payload[0].get("login").is_none());
    assert_eq!(outcome.not_permitted.get("login"), Some(&1));
}

#[tokio::test]
async fn collection_registry() {
    let store = setup().await;

    assert!(matches!(
        store.register_collection(CollectionConfig::new("users")).await,
        Err(CollectionError::CollectionAlreadyExists(_))
    ));
    assert!(matches!(
        store.collection("missing").await,
        Err(CollectionError::CollectionNotFound(_))
    ));

    store.register_collection(CollectionConfig::new("audit")).await.unwrap();
    assert_eq!(store.list_collections().await.unwrap(), vec!["audit", "users"]);

    store.drop_collection("users").await.unwrap();
    assert_eq!(store.list_collections().await.unwrap(), vec!["audit"]);
    assert!(store.collection("users").await.is_err());

    store.revoke_actor("reader").await.unwrap();
    store.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_backend_drop_keeps_the_registration() {
    let store = setup().await;

    store.backend().drop_collection("users").await.unwrap();

    assert!(matches!(
        store.drop_collection("users").await,
        Err(CollectionError::CollectionNotFound(_))
    ));
    assert!(store.collection("users").await.is_ok());

    let users = store.collection("users").await.unwrap();
    assert!(matches!(
        users.read(ROOT, Query::new()).await,
        Err(CollectionError::CollectionNotFound(_))
    ));
}
