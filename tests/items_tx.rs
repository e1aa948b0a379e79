use anyhow::Result;
use todolist_lib::model::{ListId, NewTodo};
use todolist_lib::ErrorKind;

#[path = "util.rs"]
mod util;

#[tokio::test]
async fn delete_commits_and_renumbers() -> Result<()> {
    let store = util::temp_store().await;
    let list = ListId::default();
    let items = util::fill(&store, &list, &["a", "b", "c", "d"]).await;

    let deleted = store.delete(&list, items[1].id).await?;
    assert_eq!(deleted.headline, "b");
    assert_eq!(deleted.position, 2);

    assert_eq!(util::headlines(&store, &list).await, vec!["a", "c", "d"]);
    let positions: Vec<i64> = util::positions(&store, &list)
        .await
        .into_iter()
        .map(|(_, pos)| pos)
        .collect();
    assert_eq!(positions, vec![1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn deleting_last_item_needs_no_shift() -> Result<()> {
    let store = util::temp_store().await;
    let list = ListId::default();
    let items = util::fill(&store, &list, &["a", "b"]).await;

    store.delete(&list, items[1].id).await?;
    assert_eq!(util::positions(&store, &list).await, vec![(items[0].id, 1)]);

    store.delete(&list, items[0].id).await?;
    assert_eq!(store.count(&list).await?, 0);
    Ok(())
}

#[tokio::test]
async fn delete_of_missing_id_changes_nothing() -> Result<()> {
    let store = util::temp_store().await;
    let list = ListId::default();
    util::fill(&store, &list, &["a", "b", "c"]).await;
    let before = util::positions(&store, &list).await;

    let err = store.delete(&list, 999).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(util::positions(&store, &list).await, before);
    Ok(())
}

#[tokio::test]
async fn create_appends_after_last() -> Result<()> {
    let store = util::temp_store().await;
    let list = ListId::default();
    util::fill(&store, &list, &["1", "2", "3", "4", "5"]).await;

    let created = store.insert(&list, NewTodo::new("6", "")).await?;
    assert_eq!(created.position, 6);
    assert!(!created.done);
    assert_eq!(store.count(&list).await?, 6);
    assert_eq!(store.verify_density(&list).await?, 6);
    Ok(())
}

#[tokio::test]
async fn create_rejects_blank_headline() -> Result<()> {
    let store = util::temp_store().await;
    let list = ListId::default();
    let err = store.insert(&list, NewTodo::new("   ", "desc")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(store.count(&list).await?, 0);
    Ok(())
}

#[tokio::test]
async fn update_of_missing_id_is_not_found() -> Result<()> {
    let store = util::temp_store().await;
    let list = ListId::default();
    let err = store
        .update_partial(&list, 42, todolist_lib::model::TodoPatch::done(true))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}
