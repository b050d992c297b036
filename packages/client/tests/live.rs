//! End-to-end scenarios against a live Redis.
//!
//! Every test opens a uniquely named collection under the `captest`
//! namespace and self-skips when no server is reachable at `REDIS_URL`
//! (default `redis://127.0.0.1:6379/`). The eviction scenario additionally
//! requires `CAPCOLL_EVICTION_TEST=1` because it reconfigures `maxmemory`
//! on the server.

use capcoll_client::{Collection, CollectionConfig, CollectionParams, Error, ErrorKind};

const NAMESPACE: &str = "captest";

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/".to_string())
}

/// Opt into driver logs with e.g. `RUST_LOG=capcoll_client=debug`.
fn init_logging() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

fn unique_name() -> String {
    format!("it-{}", uuid::Uuid::new_v4().simple())
}

async fn open_collection(params: CollectionParams) -> Option<Collection> {
    init_logging();
    let mut config = CollectionConfig::new(redis_url(), unique_name());
    config.namespace = NAMESPACE.to_string();
    config.params = params;
    match Collection::open(config).await {
        Ok(collection) => Some(collection),
        Err(e) => {
            eprintln!("skipping live test: {e}");
            None
        }
    }
}

fn relaxed() -> CollectionParams {
    CollectionParams {
        older_allowed: true,
        ..CollectionParams::default()
    }
}

#[tokio::test]
async fn s1_basic_insert_and_receive() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    coll.insert("L1", "d1", b"hello", Some(1.0)).await.unwrap();
    assert_eq!(
        coll.receive("L1", "d1").await.unwrap().as_deref(),
        Some(&b"hello"[..])
    );

    let info = coll.collection_info().await.unwrap();
    assert_eq!(info.lists, 1);
    assert_eq!(info.items, 1);
    assert_eq!(info.oldest_time, Some(1.0));
    assert!((info.last_removed_time - 0.0).abs() < f64::EPSILON);

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn s2_multi_item_list_pops_in_time_order() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    coll.insert("L1", "d1", b"a", Some(1.0)).await.unwrap();
    coll.insert("L1", "d2", b"b", Some(3.0)).await.unwrap();
    coll.insert("L1", "d3", b"c", Some(2.0)).await.unwrap();

    let mut values = coll.receive_values("L1").await.unwrap();
    values.sort_unstable();
    assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);

    let info = coll.list_info("L1").await.unwrap();
    assert_eq!(info.items, 3);
    assert_eq!(info.oldest_time, Some(1.0));

    assert_eq!(
        coll.pop_oldest().await.unwrap(),
        Some(("L1".to_string(), b"a".to_vec()))
    );
    assert_eq!(
        coll.pop_oldest().await.unwrap(),
        Some(("L1".to_string(), b"c".to_vec()))
    );
    assert_eq!(
        coll.pop_oldest().await.unwrap(),
        Some(("L1".to_string(), b"b".to_vec()))
    );
    assert_eq!(coll.pop_oldest().await.unwrap(), None);

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn s3_duplicate_data_id_is_rejected_without_overwrite() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    coll.insert("L1", "d1", b"x", Some(1.0)).await.unwrap();
    let err = coll.insert("L1", "d1", b"y", Some(2.0)).await.unwrap_err();
    assert!(matches!(err, Error::DataIdExists));
    assert_eq!(coll.last_errorcode(), ErrorKind::DataIdExists);

    assert_eq!(
        coll.receive("L1", "d1").await.unwrap().as_deref(),
        Some(&b"x"[..])
    );

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn s4_strict_mode_rejects_items_older_than_last_removed() {
    let Some(mut coll) = open_collection(CollectionParams::default()).await else {
        return;
    };

    coll.insert("L1", "d1", b"x", Some(5.0)).await.unwrap();
    assert_eq!(
        coll.pop_oldest().await.unwrap(),
        Some(("L1".to_string(), b"x".to_vec()))
    );
    let info = coll.collection_info().await.unwrap();
    assert!((info.last_removed_time - 5.0).abs() < 1e-9);

    let err = coll.insert("L1", "d2", b"y", Some(4.0)).await.unwrap_err();
    assert!(matches!(err, Error::OlderThanAllowed));
    assert_eq!(coll.last_errorcode(), ErrorKind::OlderThanAllowed);

    // Newer items are still admitted.
    coll.insert("L1", "d3", b"z", Some(6.0)).await.unwrap();

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn s6_update_preserves_time_unless_given() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    coll.insert("L1", "d1", b"a", Some(1.0)).await.unwrap();
    assert!(coll.update("L1", "d1", b"A", None).await.unwrap());

    let info = coll.list_info("L1").await.unwrap();
    assert_eq!(info.oldest_time, Some(1.0));
    assert_eq!(
        coll.receive("L1", "d1").await.unwrap().as_deref(),
        Some(&b"A"[..])
    );

    // An explicit time moves the item.
    coll.update("L1", "d1", b"A", Some(9.0)).await.unwrap();
    let info = coll.list_info("L1").await.unwrap();
    assert_eq!(info.oldest_time, Some(9.0));

    // Updating a missing id is an error and changes nothing.
    let err = coll.update("L1", "nope", b"B", None).await.unwrap_err();
    assert!(matches!(err, Error::NonExistentDataId));

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn upsert_dispatches_to_insert_or_update() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    coll.upsert("L1", "d1", b"v1", Some(1.0)).await.unwrap();
    assert_eq!(coll.list_len("L1").await.unwrap(), 1);

    coll.upsert("L1", "d1", b"v2", None).await.unwrap();
    assert_eq!(coll.list_len("L1").await.unwrap(), 1);
    assert_eq!(
        coll.receive("L1", "d1").await.unwrap().as_deref(),
        Some(&b"v2"[..])
    );
    // The update branch with no time keeps the original ordering key.
    assert_eq!(coll.list_info("L1").await.unwrap().oldest_time, Some(1.0));

    coll.upsert("L1", "d2", b"v3", None).await.unwrap();
    assert_eq!(coll.list_len("L1").await.unwrap(), 2);

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn counts_stay_consistent_across_lists() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    for (list, id, time) in [
        ("L1", "a", 1.0),
        ("L1", "b", 2.0),
        ("L2", "a", 3.0),
        ("L3", "a", 4.0),
        ("L3", "b", 5.0),
        ("L3", "c", 6.0),
    ] {
        coll.insert(list, id, b"payload", Some(time)).await.unwrap();
    }

    let info = coll.collection_info().await.unwrap();
    assert_eq!(info.lists, 3);
    assert_eq!(info.items, 6);

    let mut sum = 0;
    for list in coll.lists().await.unwrap() {
        sum += coll.list_info(&list).await.unwrap().items;
    }
    assert_eq!(sum, info.items);

    assert!(coll.drop_list("L3").await.unwrap());
    let info = coll.collection_info().await.unwrap();
    assert_eq!(info.lists, 2);
    assert_eq!(info.items, 3);
    assert!(!coll.list_exists("L3").await.unwrap());

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn time_index_materializes_only_at_two_items() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };
    let time_key = format!("{NAMESPACE}:T:{}:L1", coll.name());

    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_tokio_connection().await.unwrap();

    coll.insert("L1", "d1", b"a", Some(1.0)).await.unwrap();
    assert!(!key_exists(&mut conn, &time_key).await);

    coll.insert("L1", "d2", b"b", Some(2.0)).await.unwrap();
    assert!(key_exists(&mut conn, &time_key).await);

    coll.pop_oldest().await.unwrap();
    assert!(!key_exists(&mut conn, &time_key).await);

    coll.pop_oldest().await.unwrap();
    assert!(!coll.list_exists("L1").await.unwrap());

    coll.drop_collection().await.unwrap();
}

async fn key_exists(conn: &mut redis::aio::MultiplexedConnection, key: &str) -> bool {
    redis::AsyncCommands::exists(conn, key).await.unwrap()
}

#[tokio::test]
async fn reopening_with_mismatched_params_is_rejected() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };
    let name = coll.name().to_string();

    let mut config = CollectionConfig::new(redis_url(), name);
    config.namespace = NAMESPACE.to_string();
    config.params = CollectionParams {
        older_allowed: false,
        ..relaxed()
    };
    let err = Collection::open(config).await.unwrap_err();
    assert!(matches!(err, Error::MismatchArg(_)));

    // Matching parameters reopen fine.
    let mut config = CollectionConfig::new(redis_url(), coll.name());
    config.namespace = NAMESPACE.to_string();
    config.params = relaxed();
    Collection::open(config).await.unwrap();

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn clear_keeps_settings_and_resets_counters() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    coll.insert("L1", "d1", b"a", Some(1.0)).await.unwrap();
    coll.insert("L2", "d1", b"b", Some(2.0)).await.unwrap();
    coll.pop_oldest().await.unwrap();

    let deleted = coll.clear_collection().await.unwrap();
    assert!(deleted >= 1);

    let info = coll.collection_info().await.unwrap();
    assert_eq!(info.lists, 0);
    assert_eq!(info.items, 0);
    assert!((info.last_removed_time - 0.0).abs() < f64::EPSILON);
    assert!(info.params.older_allowed, "settings must survive a clear");
    assert!(coll.collection_exists().await.unwrap());

    coll.drop_collection().await.unwrap();
    assert!(!coll.collection_exists().await.unwrap());
    assert!(matches!(
        coll.collection_info().await.unwrap_err(),
        Error::CollectionDeleted
    ));
}

#[tokio::test]
async fn resize_adjusts_stored_settings() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    let changed = coll
        .resize(capcoll_client::ResizeRequest {
            advance_cleanup_bytes: Some(4096),
            advance_cleanup_num: Some(3),
            ..capcoll_client::ResizeRequest::default()
        })
        .await
        .unwrap();
    assert_eq!(changed, 2);

    let info = coll.collection_info().await.unwrap();
    assert_eq!(info.params.advance_cleanup_bytes, 4096);
    assert_eq!(info.params.advance_cleanup_num, 3);

    let err = coll
        .resize(capcoll_client::ResizeRequest {
            memory_reserve: Some(0.9),
            ..capcoll_client::ResizeRequest::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MismatchArg(_)));

    coll.drop_collection().await.unwrap();
}

#[tokio::test]
async fn ping_and_config_probe() {
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };
    assert!(coll.ping().await.unwrap());
    // Open succeeded, so the policy check must agree.
    assert!(coll.redis_config_ok().await.unwrap());
    assert!(coll.used_memory().await.unwrap() > 0);
    coll.drop_collection().await.unwrap();
}

/// S5: memory pressure evicts the globally oldest items across lists.
///
/// Reconfigures `maxmemory` for its duration; opt in with
/// `CAPCOLL_EVICTION_TEST=1` against a disposable server only.
#[tokio::test]
async fn s5_eviction_under_memory_pressure() {
    if std::env::var("CAPCOLL_EVICTION_TEST").is_err() {
        eprintln!("skipping eviction test: set CAPCOLL_EVICTION_TEST=1 to enable");
        return;
    }
    let Some(mut coll) = open_collection(relaxed()).await else {
        return;
    };

    let client = redis::Client::open(redis_url()).unwrap();
    let mut conn = client.get_multiplexed_tokio_connection().await.unwrap();
    let restore: String = redis::cmd("CONFIG")
        .arg("GET")
        .arg("maxmemory")
        .query_async::<_, Vec<String>>(&mut conn)
        .await
        .unwrap()
        .pop()
        .unwrap();

    let used = coll.used_memory().await.unwrap();
    let ceiling = used + 512 * 1024;
    redis::cmd("CONFIG")
        .arg("SET")
        .arg("maxmemory")
        .arg(ceiling)
        .query_async::<_, ()>(&mut conn)
        .await
        .unwrap();

    let payload = vec![0u8; 1024];
    let total = 1000u64;
    let mut inserted = 0u64;
    for i in 0..total {
        let list = if i % 2 == 0 { "L1" } else { "L2" };
        let time = 1.0 + i as f64;
        match coll.insert(list, &format!("d{i}"), &payload, Some(time)).await {
            Ok(_) => inserted += 1,
            // Tolerated: the guard may be the only remaining item.
            Err(Error::MaxMemoryLimit(_)) => {}
            Err(other) => panic!("unexpected insert failure: {other}"),
        }
    }

    let info = coll.collection_info().await.unwrap();
    assert!(
        info.items < inserted,
        "memory pressure must have evicted items ({} of {inserted} left)",
        info.items
    );
    assert!(info.last_removed_time > 0.0);
    // Everything still stored is at least as new as everything evicted.
    if let Some(oldest) = info.oldest_time {
        assert!(oldest >= info.last_removed_time);
    }

    redis::cmd("CONFIG")
        .arg("SET")
        .arg("maxmemory")
        .arg(restore)
        .query_async::<_, ()>(&mut conn)
        .await
        .unwrap();
    coll.drop_collection().await.unwrap();
}
