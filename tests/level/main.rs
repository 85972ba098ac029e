//! Integration tests for model repositories on sled and in-memory stores.


use level_model::{
    BatchOp, InMemoryBackend, IndexOptions, IndexSpec, KeyEncoding, Level, Model, ModelsExt,
    Options, ReadOptions, ResolvedOptions, SledBackend, StoreConfig, StoreError, ValueEncoding,
};
use models::{Account, Post, Tag, User};
use serde_json::json;

fn temporary() -> Level {
    Level::open_with(StoreConfig::temporary()).unwrap()
}

fn sorted(mut users: Vec<User>) -> Vec<User> {
    users.sort_by(|a, b| a.id.cmp(&b.id));
    users
}

#[test]
fn save_then_get_round_trips() {
    let level = temporary();
    let users = level.models::<User>().unwrap();
    let user = User::new("1", "matt", "matt@matt.com");

    let stored = users.save(&user).unwrap();
    assert_eq!(
        stored,
        json!({ "id": "1", "name": "matt", "email": "matt@matt.com" })
    );

    let loaded = users.find("1").unwrap().unwrap();
    assert_eq!(loaded, user);
}

#[test]
fn get_absent_key_is_none_not_error() {
    let level = temporary();
    let users = level.models::<User>().unwrap();

    assert_eq!(users.get("4").unwrap(), None);
}

#[test]
fn remove_then_get_is_none() {
    let level = temporary();
    let users = level.models::<User>().unwrap();
    let user = User::new("1", "matt", "matt@matt.com");

    users.save(&user).unwrap();
    users.remove(&user).unwrap();

    assert_eq!(users.get("1").unwrap(), None);
    // Removing again is tolerated
    users.remove(&user).unwrap();
}

#[test]
fn save_is_last_write_wins() {
    let level = temporary();
    let users = level.models::<User>().unwrap();

    users.save(&User::new("1", "matt", "m@m.com")).unwrap();
    users.update(&User::new("1", "matthew", "m@m.com")).unwrap();

    assert_eq!(users.get("1").unwrap().unwrap().name, "matthew");
    assert_eq!(users.len().unwrap(), 1);
}

#[test]
fn all_returns_models_in_key_order() {
    let level = temporary();
    let users = level.models::<User>().unwrap();

    users.save(&User::new("2", "natt", "n@n.com")).unwrap();
    users.save(&User::new("1", "matt", "m@m.com")).unwrap();

    let all = users.all().unwrap().collect_all().unwrap();
    assert_eq!(
        all,
        vec![
            User::new("1", "matt", "m@m.com"),
            User::new("2", "natt", "n@n.com"),
        ]
    );
}

#[test]
fn partitions_do_not_leak_between_models() {
    let level = temporary();
    let users = level.models::<User>().unwrap();
    let posts = level.models::<Post>().unwrap();

    users.save(&User::new("1", "matt", "m@m.com")).unwrap();
    users.save(&User::new("2", "natt", "n@n.com")).unwrap();
    posts.save(&Post::new("3", "lorem", "ipsum")).unwrap();

    let all_posts = posts.all().unwrap().collect_all().unwrap();
    assert_eq!(all_posts, vec![Post::new("3", "lorem", "ipsum")]);

    // Same key in both partitions stays separate
    posts.save(&Post::new("1", "dolor", "sit")).unwrap();
    assert_eq!(users.get("1").unwrap().unwrap().name, "matt");
    assert_eq!(posts.get("1").unwrap().unwrap().title, "dolor");
    assert_eq!(users.get("3").unwrap(), None);
}

#[test]
fn all_matches_saved_minus_removed() {
    let level = Level::memory();
    let users = level.models::<User>().unwrap();

    let saved: Vec<User> = (0..10)
        .rev()
        .map(|i| User::new(&format!("u{}", i), "name", &format!("{}@x.com", i)))
        .collect();
    for user in &saved {
        users.save(user).unwrap();
    }
    users.remove_key("u3").unwrap();
    users.remove_key("u7").unwrap();

    let expected: Vec<User> = saved
        .into_iter()
        .filter(|u| u.id != "u3" && u.id != "u7")
        .collect();
    let actual = users.all().unwrap().collect_all().unwrap();
    assert_eq!(sorted(actual), sorted(expected));
}

#[test]
fn remove_all_empties_only_its_partition() {
    let level = temporary();
    let users = level.models::<User>().unwrap();
    let posts = level.models::<Post>().unwrap();

    users.save(&User::new("1", "matt", "m@m.com")).unwrap();
    users.save(&User::new("2", "natt", "n@n.com")).unwrap();
    posts.save(&Post::new("3", "lorem", "ipsum")).unwrap();

    assert_eq!(users.remove_all().unwrap(), 2);

    assert_eq!(users.all().unwrap().count(), 0);
    assert!(users.is_empty().unwrap());
    assert_eq!(posts.len().unwrap(), 1);
    // Index entries went with the records
    assert_eq!(users.find_by("email", "m@m.com").unwrap(), None);
}

#[test]
fn range_reverse_and_limit_options() {
    let level = Level::memory();
    let posts = level.models::<Post>().unwrap();
    for id in ["a", "b", "c", "d", "e"] {
        posts.save(&Post::new(id, id, "")).unwrap();
    }

    let ids = |read: ReadOptions| -> Vec<String> {
        posts
            .all_with(read)
            .unwrap()
            .map(|p| p.unwrap().id)
            .collect()
    };

    assert_eq!(ids(ReadOptions::new().gte("b").lt("d")), vec!["b", "c"]);
    assert_eq!(ids(ReadOptions::new().gt("b").lte("d")), vec!["c", "d"]);
    assert_eq!(ids(ReadOptions::new().reverse().limit(2)), vec!["e", "d"]);
    assert!(ids(ReadOptions::new().gte("d").lt("b")).is_empty());

    let keys: Vec<String> = posts
        .keys_with(ReadOptions::new().gt("c"))
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(keys, vec!["d", "e"]);
}

#[test]
fn remove_all_respects_range() {
    let level = Level::memory();
    let posts = level.models::<Post>().unwrap();
    for id in ["a", "b", "c"] {
        posts.save(&Post::new(id, id, "")).unwrap();
    }

    assert_eq!(posts.remove_all_with(ReadOptions::new().lt("c")).unwrap(), 2);

    let left: Vec<String> = posts.keys().unwrap().map(|k| k.unwrap()).collect();
    assert_eq!(left, vec!["c"]);
}

#[test]
fn find_by_unique_index() {
    let level = temporary();
    let users = level.models::<User>().unwrap();

    users.save(&User::new("1", "matt", "m@m.com")).unwrap();
    users.save(&User::new("2", "natt", "n@n.com")).unwrap();
    users.save(&User::new("3", "oatt", "o@o.com")).unwrap();

    let found = users.find_by("email", "n@n.com").unwrap().unwrap();
    assert_eq!(found, User::new("2", "natt", "n@n.com"));
    assert_eq!(users.find_by("email", "z@z.com").unwrap(), None);
}

#[test]
fn unique_index_rejects_duplicate_without_writing() {
    let level = temporary();
    let users = level.models::<User>().unwrap();

    users.save(&User::new("1", "matt", "m@m.com")).unwrap();
    let err = users.save(&User::new("2", "imposter", "m@m.com")).unwrap_err();

    assert!(matches!(err, StoreError::UniqueViolation { ref field, .. } if field == "email"));
    assert_eq!(users.get("2").unwrap(), None);

    // Re-saving the owner with the same email is fine
    users.save(&User::new("1", "matthew", "m@m.com")).unwrap();
}

#[test]
fn index_follows_updates() {
    let level = temporary();
    let users = level.models::<User>().unwrap();

    users.save(&User::new("1", "matt", "old@m.com")).unwrap();
    users.save(&User::new("1", "matt", "new@m.com")).unwrap();

    assert_eq!(users.find_by("email", "old@m.com").unwrap(), None);
    assert_eq!(users.find_by("email", "new@m.com").unwrap().unwrap().id, "1");

    // The old email is free again
    users.save(&User::new("2", "natt", "old@m.com")).unwrap();
}

#[test]
fn non_unique_index_finds_all_and_skips_nulls() {
    let level = Level::memory();
    let tags = level.models::<Tag>().unwrap();

    tags.save(&Tag::new("rust", Some("lang"))).unwrap();
    tags.save(&Tag::new("go", Some("lang"))).unwrap();
    tags.save(&Tag::new("misc", None)).unwrap();

    let langs = tags.find_all_by("group", "lang").unwrap();
    let slugs: Vec<&str> = langs.iter().map(|t| t.id()).collect();
    assert_eq!(slugs, vec!["go", "rust"]);

    assert!(tags.find_all_by("group", &None::<String>).unwrap().is_empty());
}

#[test]
fn find_by_undeclared_index_is_invalid_usage() {
    let level = Level::memory();
    let users = level.models::<User>().unwrap();

    let err = users.find_by("name", "matt").unwrap_err();
    assert!(matches!(err, StoreError::InvalidUsage(_)));
}

#[test]
fn runtime_index_backfills_existing_records() {
    let level = temporary();
    let posts = level.models::<Post>().unwrap();
    posts.save(&Post::new("1", "lorem", "a")).unwrap();
    posts.save(&Post::new("2", "dolor", "b")).unwrap();

    posts.index("title", IndexOptions::default()).unwrap();
    assert_eq!(posts.find_by("title", "dolor").unwrap().unwrap().id, "2");

    // Another repository of the same type on the same handle sees it
    let again = level.models::<Post>().unwrap();
    again.save(&Post::new("3", "sit", "c")).unwrap();
    assert_eq!(posts.find_by("title", "sit").unwrap().unwrap().id, "3");
}

#[test]
fn unique_runtime_index_on_conflicting_data_is_rejected() {
    let level = Level::memory();
    let posts = level.models::<Post>().unwrap();
    posts.save(&Post::new("1", "same", "a")).unwrap();
    posts.save(&Post::new("2", "same", "b")).unwrap();

    assert!(matches!(
        posts.index("title", IndexOptions::unique()),
        Err(StoreError::UniqueViolation { .. })
    ));

    // Not declared
    assert!(matches!(
        posts.find_by("title", "same"),
        Err(StoreError::InvalidUsage(_))
    ));
}

#[test]
fn failed_unique_upgrade_keeps_the_existing_index() {
    let level = temporary();
    let posts = level.models::<Post>().unwrap();
    posts.save(&Post::new("1", "same", "a")).unwrap();
    posts.save(&Post::new("2", "same", "b")).unwrap();
    posts.index("title", IndexOptions::default()).unwrap();
    assert_eq!(posts.find_all_by("title", "same").unwrap().len(), 2);

    let err = posts.index("title", IndexOptions::unique()).err();
    assert!(matches!(
        err,
        Some(StoreError::UniqueViolation { ref existing, .. }) if existing == "1"
    ));

    let found = posts.find_all_by("title", "same").unwrap();
    assert_eq!(
        found.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
        vec!["1", "2"]
    );

    // Still non-unique: a third duplicate is accepted and indexed
    posts.save(&Post::new("3", "same", "c")).unwrap();
    assert_eq!(posts.find_all_by("title", "same").unwrap().len(), 3);
}

#[test]
fn unique_violation_reports_key_in_its_encoding() {
    let level = Level::from_backend(
        InMemoryBackend::new(),
        ResolvedOptions {
            key_encoding: KeyEncoding::Hex,
            ..ResolvedOptions::default()
        },
    );
    let users = level.models::<User>().unwrap();
    users.save(&User::new("00ff", "matt", "m@m.com")).unwrap();

    let err = users.save(&User::new("0a0b", "imposter", "m@m.com")).unwrap_err();
    assert_eq!(
        err,
        StoreError::UniqueViolation {
            collection: "user".into(),
            field: "email".into(),
            value: "\"m@m.com\"".into(),
            existing: "00ff".into(),
        }
    );

    let err = users
        .batch(vec![BatchOp::Put(User::new("0c0d", "other", "m@m.com"))])
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation { ref existing, .. } if existing == "00ff"));
}

#[test]
fn indexes_use_serialized_field_names() {
    assert_eq!(
        Account::INDEXES,
        &[IndexSpec::unique("displayName"), IndexSpec::new("kind")]
    );

    let level = Level::memory();
    let accounts = level.models::<Account>().unwrap();
    accounts.save(&Account::new("1", "Matt", "admin")).unwrap();
    accounts.save(&Account::new("2", "Sam", "admin")).unwrap();

    assert_eq!(
        accounts.find_by("displayName", "Sam").unwrap(),
        Some(Account::new("2", "Sam", "admin"))
    );
    assert_eq!(accounts.find_all_by("kind", "admin").unwrap().len(), 2);
    assert!(matches!(
        accounts.save(&Account::new("3", "Matt", "user")),
        Err(StoreError::UniqueViolation { .. })
    ));
}

#[test]
fn empty_primary_key_is_invalid_usage() {
    let level = Level::memory();
    let users = level.models::<User>().unwrap();

    let err = users.save(&User::new("", "nobody", "x@x.com")).unwrap_err();
    assert!(matches!(err, StoreError::InvalidUsage(_)));
    assert!(users.is_empty().unwrap());
}

#[test]
fn batch_applies_puts_and_deletes() {
    let level = temporary();
    let users = level.models::<User>().unwrap();
    users.save(&User::new("1", "matt", "m@m.com")).unwrap();

    users
        .batch(vec![
            BatchOp::Del("1".into()),
            BatchOp::Put(User::new("2", "natt", "n@n.com")),
            // Takes over the email freed by the delete above
            BatchOp::Put(User::new("3", "oatt", "m@m.com")),
        ])
        .unwrap();

    assert_eq!(users.get("1").unwrap(), None);
    assert_eq!(users.find_by("email", "m@m.com").unwrap().unwrap().id, "3");
    assert_eq!(users.len().unwrap(), 2);
}

#[test]
fn batch_with_unique_conflict_writes_nothing() {
    let level = Level::memory();
    let users = level.models::<User>().unwrap();
    users.save(&User::new("1", "matt", "m@m.com")).unwrap();

    let err = users
        .batch(vec![
            BatchOp::Put(User::new("2", "natt", "n@n.com")),
            BatchOp::Put(User::new("3", "oatt", "m@m.com")),
        ])
        .unwrap_err();

    assert!(matches!(err, StoreError::UniqueViolation { .. }));
    assert_eq!(users.len().unwrap(), 1);
    assert_eq!(users.get("2").unwrap(), None);
}

#[test]
fn bitcode_values_with_option_override() {
    let level = Level::memory();
    let posts = level.models::<Post>().unwrap();
    let post = Post::new("1", "lorem", "ipsum");
    let bitcode = Options::new().value_encoding(ValueEncoding::Bitcode);

    posts.save_with(&post, bitcode).unwrap();

    assert_eq!(posts.get_with("1", bitcode).unwrap(), Some(post));
    // Reading with the default JSON encoding fails to decode
    assert!(matches!(posts.get("1"), Err(StoreError::Decode(_))));
}

#[test]
fn store_defaults_apply_when_options_are_unset() {
    let config = StoreConfig::temporary().value_encoding(ValueEncoding::Bitcode);
    let level = Level::open_with(config).unwrap();
    let posts = level.models::<Post>().unwrap();

    posts.save(&Post::new("1", "lorem", "ipsum")).unwrap();

    assert_eq!(posts.get("1").unwrap().unwrap().title, "lorem");
    assert!(posts
        .get_with("1", Options::new().value_encoding(ValueEncoding::Json))
        .is_err());
}

#[test]
fn hex_key_encoding() {
    let level = Level::memory();
    let posts = level.models::<Post>().unwrap();
    let hex = Options::new().key_encoding(KeyEncoding::Hex);

    posts.save_with(&Post::new("0a0b", "t", "c"), hex).unwrap();
    assert_eq!(posts.get_with("0a0b", hex).unwrap().unwrap().title, "t");

    let keys: Vec<String> = posts
        .keys_with(ReadOptions::new().with_options(hex))
        .unwrap()
        .map(|k| k.unwrap())
        .collect();
    assert_eq!(keys, vec!["0a0b"]);

    let err = posts.save_with(&Post::new("zz", "t", "c"), hex).unwrap_err();
    assert!(matches!(err, StoreError::Encode(_)));
}

#[test]
fn base64_keys_scan_in_byte_order() {
    let level = temporary();
    let posts = level.models::<Post>().unwrap();
    let b64 = Options::new().key_encoding(KeyEncoding::Base64);

    // 0xff, 0x01, 0x02 as base64 text
    for id in ["/w==", "AQ==", "Ag=="] {
        posts.save_with(&Post::new(id, "t", id), b64).unwrap();
    }
    assert_eq!(posts.get_with("AQ==", b64).unwrap().unwrap().content, "AQ==");

    // Stored bytes decide the order, not the key text
    let keys: Vec<String> = posts
        .keys_with(ReadOptions::new().with_options(b64))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(keys, vec!["AQ==", "Ag==", "/w=="]);

    let ranged: Vec<String> = posts
        .keys_with(ReadOptions::new().with_options(b64).gt("AQ=="))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(ranged, vec!["Ag==", "/w=="]);

    let err = posts.save_with(&Post::new("not base64!", "t", "c"), b64).unwrap_err();
    assert!(matches!(err, StoreError::Encode(_)));
}

#[test]
fn caller_supplied_sled_instance() {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let level = Level::from_backend(
        SledBackend::from_db(db.clone(), "shared"),
        ResolvedOptions::default(),
    );
    assert_eq!(level.name(), "shared");

    let posts = level.models::<Post>().unwrap();
    posts.save(&Post::new("1", "lorem", "ipsum")).unwrap();

    // The caller's handle sees the partition as a plain sled tree
    let tree = db.open_tree("post").unwrap();
    assert_eq!(tree.len(), 1);
    let raw = tree.get("1").unwrap().unwrap();
    let stored: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(stored, json!({ "id": "1", "title": "lorem", "content": "ipsum" }));

    level.close().unwrap();
    assert!(db.open_tree("post").unwrap().contains_key("1").unwrap());
}

#[test]
fn sync_writes_flush() {
    let level = temporary();
    let posts = level.models::<Post>().unwrap();

    posts
        .save_with(&Post::new("1", "t", "c"), Options::new().sync(true))
        .unwrap();
    posts.remove_key_with("1", Options::new().sync(true)).unwrap();

    assert_eq!(posts.get("1").unwrap(), None);
}

#[test]
fn records_survive_close_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db");

    {
        let level = Level::open(&path).unwrap();
        let users = level.models::<User>().unwrap();
        users.save(&User::new("1", "matt", "m@m.com")).unwrap();
        level.close().unwrap();
    }

    let level = Level::open(&path).unwrap();
    let users = level.models::<User>().unwrap();
    assert_eq!(users.get("1").unwrap().unwrap().name, "matt");
    assert_eq!(users.find_by("email", "m@m.com").unwrap().unwrap().id, "1");
}

#[test]
fn closed_store_rejects_operations() {
    let level = Level::memory();
    let users = level.models::<User>().unwrap();
    level.close().unwrap();

    assert!(matches!(users.get("1"), Err(StoreError::Closed(_))));
    assert!(matches!(
        users.save(&User::new("1", "m", "m@m.com")),
        Err(StoreError::Closed(_))
    ));
    assert!(matches!(users.all(), Err(StoreError::Closed(_))));
    assert!(matches!(level.models::<Post>(), Err(StoreError::Closed(_))));
}

#[test]
fn repository_reports_its_collection() {
    let level = Level::memory();
    assert_eq!(level.models::<User>().unwrap().collection(), "user");
    assert_eq!(level.models::<Post>().unwrap().collection(), "post");
    assert_eq!(Tag::COLLECTION, "tag");
}
