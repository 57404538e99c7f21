//! Tests for the SeaORM-backed commit and repository stores.

mod test_utils;

use repo_sync::error::RepositoryError;
use repo_sync::models::repository::SyncStatus;
use repo_sync::repositories::{
    CommitPageQuery, CommitRepository, CommitSort, CommitStore, RepoMetadataRepository,
    RepoMetadataStore, RepositoryChanges, SortDirection,
};
use repo_sync::sync::fetch::store_commit;
use test_utils::{RecordBuilder, ScriptedProvider, commit, setup_test_db, test_context, test_settings};
use uuid::Uuid;

#[tokio::test]
async fn saving_the_same_commit_twice_keeps_one_record() {
    let db = setup_test_db().await.unwrap();
    let store = CommitRepository::new(db.clone());

    store.save(commit("sha1", "Ada", "octo/hello", 1)).await.unwrap();
    let second = store.save(commit("sha1", "Ada", "octo/hello", 1)).await;
    assert!(matches!(second, Err(RepositoryError::Duplicate(ref id)) if id == "sha1"));

    // The engine-level helper swallows the duplicate
    let ctx = test_context(&db, ScriptedProvider::new(), test_settings());
    assert!(!store_commit(&ctx, commit("sha1", "Ada", "octo/hello", 1)).await.unwrap());

    let page = store
        .list_by_repository("octo/hello", &CommitPageQuery::default())
        .await
        .unwrap();
    assert_eq!(page.total_count, 1);
    assert!(store.exists_by_id("sha1").await.unwrap());
    assert!(!store.exists_by_id("sha2").await.unwrap());
}

#[tokio::test]
async fn lists_commits_by_repository_with_paging_and_sorting() {
    let db = setup_test_db().await.unwrap();
    let store = CommitRepository::new(db.clone());

    for (sha, author, day) in [("a1", "Carol", 3), ("a2", "Ada", 1), ("a3", "Bob", 2)] {
        store.save(commit(sha, author, "octo/hello", day)).await.unwrap();
    }
    store.save(commit("z1", "Zed", "octo/other", 4)).await.unwrap();

    let newest_first = store
        .list_by_repository("octo/hello", &CommitPageQuery::new(Some(1), Some(2)))
        .await
        .unwrap();
    assert_eq!(newest_first.total_count, 3);
    assert!(newest_first.has_next_page);
    let ids: Vec<_> = newest_first.items.iter().map(|c| c.commit_id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a3"]);

    let second_page = store
        .list_by_repository("octo/hello", &CommitPageQuery::new(Some(2), Some(2)))
        .await
        .unwrap();
    assert!(!second_page.has_next_page);
    assert_eq!(second_page.items.len(), 1);
    assert_eq!(second_page.items[0].commit_id, "a2");

    let by_author = store
        .list_by_repository(
            "octo/hello",
            &CommitPageQuery::default().sorted_by(CommitSort::Author, SortDirection::Asc),
        )
        .await
        .unwrap();
    let authors: Vec<_> = by_author.items.iter().map(|c| c.author.as_str()).collect();
    assert_eq!(authors, vec!["Ada", "Bob", "Carol"]);
}

#[tokio::test]
async fn ranks_top_authors_with_stable_ties() {
    let db = setup_test_db().await.unwrap();
    let store = CommitRepository::new(db.clone());

    let commits = [
        ("c1", "Grace"),
        ("c2", "Grace"),
        ("c3", "Linus"),
        ("c4", "Ada"),
        ("c5", "Linus"),
        ("c6", "Grace"),
        ("c7", "Ken"),
    ];
    for (day, (sha, author)) in commits.iter().enumerate() {
        store
            .save(commit(sha, author, "octo/hello", day as u32 + 1))
            .await
            .unwrap();
    }

    let top = store.top_authors("octo/hello", 3).await.unwrap();
    let ranked: Vec<_> = top.iter().map(|a| (a.author.as_str(), a.commit_count)).collect();
    assert_eq!(ranked, vec![("Grace", 3), ("Linus", 2), ("Ada", 1)]);

    assert!(store.top_authors("octo/empty", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn repository_names_are_unique() {
    let db = setup_test_db().await.unwrap();

    RecordBuilder::new("octo/hello").insert(&db).await.unwrap();
    let duplicate = RecordBuilder::new("octo/hello").insert(&db).await;

    let err = duplicate.unwrap_err();
    let repo_err = err.downcast_ref::<RepositoryError>().expect("repository error");
    assert!(repo_err.is_duplicate());
}

#[tokio::test]
async fn try_claim_succeeds_only_once() {
    let db = setup_test_db().await.unwrap();
    let store = RepoMetadataRepository::new(db.clone());
    let record = RecordBuilder::new("octo/hello").insert(&db).await.unwrap();

    assert!(store.try_claim(record.id).await.unwrap());
    assert!(!store.try_claim(record.id).await.unwrap());

    store
        .update_by_public_id(record.id, RepositoryChanges::default().with_fetching(false))
        .await
        .unwrap();
    assert!(store.try_claim(record.id).await.unwrap());

    assert!(!store.try_claim(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn clears_fetching_flag_for_all_records() {
    let db = setup_test_db().await.unwrap();
    let store = RepoMetadataRepository::new(db.clone());

    let a = RecordBuilder::new("octo/a").fetching(true).insert(&db).await.unwrap();
    let b = RecordBuilder::new("octo/b").fetching(true).insert(&db).await.unwrap();
    RecordBuilder::new("octo/c").insert(&db).await.unwrap();

    assert_eq!(store.set_fetching_flag_for_all(false).await.unwrap(), 2);
    assert!(!store.get_by_public_id(a.id).await.unwrap().unwrap().is_fetching);
    assert!(!store.get_by_public_id(b.id).await.unwrap().unwrap().is_fetching);
    assert_eq!(store.set_fetching_flag_for_all(false).await.unwrap(), 0);
}

#[tokio::test]
async fn partial_updates_touch_only_named_fields() {
    let db = setup_test_db().await.unwrap();
    let store = RepoMetadataRepository::new(db.clone());
    let record = RecordBuilder::new("octo/hello")
        .cursor(2, "sha9")
        .insert(&db)
        .await
        .unwrap();

    let updated = store
        .update_by_public_id(
            record.id,
            RepositoryChanges::default()
                .with_status(SyncStatus::Stuck)
                .with_error(Some("boom".to_string())),
        )
        .await
        .unwrap();

    assert_eq!(updated.status(), SyncStatus::Stuck);
    assert_eq!(updated.last_error.as_deref(), Some("boom"));
    assert_eq!(updated.last_fetched_page, 2);
    assert_eq!(updated.last_fetched_commit_id, "sha9");
    assert_eq!(updated.name, "octo/hello");

    let missing = store
        .update_by_public_id(Uuid::new_v4(), RepositoryChanges::default().with_fetching(true))
        .await;
    assert!(matches!(missing, Err(RepositoryError::NotFound(_))));

    assert!(store.get_by_name("octo/hello").await.unwrap().is_some());
    assert!(store.get_by_name("octo/missing").await.unwrap().is_none());
}
