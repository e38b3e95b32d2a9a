use super::*;
use chrono::TimeZone;

async fn create_test_store() -> (SqliteStore, ContainerId) {
    let store = SqliteStore::new_in_memory().await.unwrap();
    let container = ContainerId::new();
    store.create_container(&container).await.unwrap();
    (store, container)
}

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn key(s: &str) -> OrderKey {
    OrderKey::parse(s).unwrap()
}

#[cfg(test)]
mod transaction_tests {
    use super::*;

    #[tokio::test]
    async fn test_begin_unknown_container() {
        let (store, _) = create_test_store().await;
        let missing = ContainerId::new();

        let result = store.begin(&missing).await;
        assert!(matches!(result, Err(OrderError::ContainerNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn test_commit_persists_and_rollback_discards() {
        let (store, container) = create_test_store().await;
        let kept = ItemId::new();
        let discarded = ItemId::new();

        let mut tx = store.begin(&container).await.unwrap();
        tx.insert_item(&ItemRef::new(container, kept, Some(key("a")), at(0)))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        tx.insert_item(&ItemRef::new(container, discarded, Some(key("b")), at(1)))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        let items = tx.items_in_order().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item, kept);
        assert_eq!(items[0].created_at, at(0));
    }

    #[tokio::test]
    async fn test_max_key_ignores_unassigned() {
        let (store, container) = create_test_store().await;
        store
            .insert_raw(&container, &ItemId::new(), Some(""), at(0))
            .await
            .unwrap();
        store
            .insert_raw(&container, &ItemId::new(), None, at(1))
            .await
            .unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        assert_eq!(tx.max_key().await.unwrap(), None);
        tx.rollback().await.unwrap();

        store
            .insert_raw(&container, &ItemId::new(), Some("b"), at(2))
            .await
            .unwrap();
        store
            .insert_raw(&container, &ItemId::new(), Some("aZ"), at(3))
            .await
            .unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        assert_eq!(tx.max_key().await.unwrap(), Some(key("b")));
    }

    #[tokio::test]
    async fn test_items_in_order_sorts_bytewise_then_by_creation() {
        let (store, container) = create_test_store().await;
        let upper = ItemId::new();
        let lower = ItemId::new();
        let legacy_old = ItemId::new();
        let legacy_new = ItemId::new();

        // 'Z' < 'a' byte-wise; a case-insensitive collation would flip these
        store.insert_raw(&container, &lower, Some("a"), at(0)).await.unwrap();
        store.insert_raw(&container, &upper, Some("Z"), at(1)).await.unwrap();
        store.insert_raw(&container, &legacy_new, Some(""), at(3)).await.unwrap();
        store.insert_raw(&container, &legacy_old, None, at(2)).await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        let order: Vec<ItemId> = tx
            .items_in_order()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.item)
            .collect();

        assert_eq!(order, vec![legacy_old, legacy_new, upper, lower]);
    }

    #[tokio::test]
    async fn test_items_by_creation_time() {
        let (store, container) = create_test_store().await;
        let first = ItemId::new();
        let second = ItemId::new();
        store.insert_raw(&container, &second, Some("a"), at(5)).await.unwrap();
        store.insert_raw(&container, &first, Some("b"), at(1)).await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        let order: Vec<ItemId> = tx
            .items_by_creation_time()
            .await
            .unwrap()
            .into_iter()
            .map(|item| item.item)
            .collect();
        assert_eq!(order, vec![first, second]);
    }

    #[tokio::test]
    async fn test_write_key_and_remove() {
        let (store, container) = create_test_store().await;
        let item = ItemId::new();
        store.insert_raw(&container, &item, None, at(0)).await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        tx.write_key(&item, &key("c")).await.unwrap();
        assert_eq!(tx.item(&item).await.unwrap().unwrap().key, Some(key("c")));

        let missing = tx.write_key(&ItemId::new(), &key("d")).await;
        assert!(matches!(missing, Err(OrderError::ItemNotFound { .. })));

        assert!(tx.remove_item(&item).await.unwrap());
        assert!(!tx.remove_item(&item).await.unwrap());
        assert!(tx.item(&item).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_item() {
        let (store, container) = create_test_store().await;
        let item = ItemId::new();
        store.insert_raw(&container, &item, Some("a"), at(0)).await.unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        let result = tx
            .insert_item(&ItemRef::new(container, item, Some(key("b")), at(1)))
            .await;
        assert!(matches!(result, Err(OrderError::DuplicateItem { .. })));
    }

    #[tokio::test]
    async fn test_corrupt_key_is_reported() {
        let (store, container) = create_test_store().await;
        store
            .insert_raw(&container, &ItemId::new(), Some("not a key"), at(0))
            .await
            .unwrap();

        let mut tx = store.begin(&container).await.unwrap();
        let result = tx.items_in_order().await;
        assert!(matches!(
            result,
            Err(OrderError::Key(playlist_order_core::KeyError::InvalidSymbol { .. }))
        ));
    }
}

#[cfg(test)]
mod missing_key_tests {
    use super::*;

    #[tokio::test]
    async fn test_containers_missing_keys() {
        let (store, keyed) = create_test_store().await;
        let null_keys = ContainerId::new();
        let empty_keys = ContainerId::new();
        store.create_container(&null_keys).await.unwrap();
        store.create_container(&empty_keys).await.unwrap();

        store.insert_raw(&keyed, &ItemId::new(), Some("a"), at(0)).await.unwrap();
        store.insert_raw(&null_keys, &ItemId::new(), None, at(0)).await.unwrap();
        store.insert_raw(&empty_keys, &ItemId::new(), Some(""), at(0)).await.unwrap();

        let mut expected = vec![null_keys, empty_keys];
        expected.sort_by_key(|id| id.to_string());

        assert_eq!(store.containers_missing_keys().await.unwrap(), expected);
    }
}
