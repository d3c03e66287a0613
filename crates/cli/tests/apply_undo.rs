use sorter_core::config::SafetyConfig;

async fn seed_action(pool: &sqlx::SqlitePool, src: &std::path::Path, dest: &std::path::Path, kind: &str) {
    sqlx::query("INSERT INTO tracks (path, size, mtime, ext, status) VALUES (?1, 0, 0, 'mp3', 'classified')")
        .bind(src.to_string_lossy())
        .execute(pool)
        .await
        .unwrap();
    sqlx::query(
        "INSERT INTO actions (track_id, kind, payload_json, status) \
         VALUES ((SELECT id FROM tracks WHERE path = ?1), ?2, ?3, 'planned')",
    )
    .bind(src.to_string_lossy())
    .bind(kind)
    .bind(serde_json::json!({ "to": dest.to_string_lossy() }).to_string())
    .execute(pool)
    .await
    .unwrap();
}

#[tokio::test]
async fn apply_and_undo_restores_a_moved_file() {
    let temp = tempfile::tempdir().unwrap();
    let src = temp.path().join("library/track.mp3");
    let dest = temp.path().join("sorted/Techno/track.mp3");
    std::fs::create_dir_all(src.parent().unwrap()).unwrap();
    std::fs::write(&src, "audio").unwrap();

    let db_url = "sqlite://file:apply_undo_move?mode=memory&cache=shared";
    let pool = storage::connect(db_url).await.unwrap();
    storage::migrate(&pool).await.unwrap();
    seed_action(&pool, &src, &dest, "move").await;

    let safety = SafetyConfig {
        dry_run: false,
        allow_paths: vec![],
        deny_paths: vec![],
        trash_dir: Some(temp.path().join("trash").to_string_lossy().into_owned()),
        copy_then_delete: false,
    };

    // Dry run must not touch the filesystem.
    let previewed = cli::apply::apply_actions(db_url, true, None, &safety, "rename")
        .await
        .unwrap();
    assert_eq!(previewed.len(), 1);
    assert_eq!(previewed[0].status, "planned");
    assert!(src.exists());

    let actions = cli::apply::apply_actions(db_url, false, None, &safety, "rename")
        .await
        .unwrap();
    assert_eq!(actions[0].status, "executed");
    assert!(actions[0].backup.is_some());
    assert!(!src.exists());
    assert!(dest.exists());

    let reverted = cli::undo::undo_actions(db_url, None, None).await.unwrap();
    assert_eq!(reverted, 1);
    assert!(src.exists());
    assert!(!dest.exists());
}

#[tokio::test]
async fn undo_removes_a_copied_file_but_keeps_the_source() {
    let temp = tempfile::tempdir().unwrap();
    let src = temp.path().join("library/track.mp3");
    let dest = temp.path().join("sorted/House/track.mp3");
    std::fs::create_dir_all(src.parent().unwrap()).unwrap();
    std::fs::write(&src, "audio").unwrap();

    let db_url = "sqlite://file:apply_undo_copy?mode=memory&cache=shared";
    let pool = storage::connect(db_url).await.unwrap();
    storage::migrate(&pool).await.unwrap();
    seed_action(&pool, &src, &dest, "copy").await;

    let safety = SafetyConfig {
        dry_run: false,
        allow_paths: vec![],
        deny_paths: vec![],
        trash_dir: None,
        copy_then_delete: false,
    };

    cli::apply::apply_actions(db_url, false, None, &safety, "rename")
        .await
        .unwrap();
    assert!(src.exists());
    assert!(dest.exists());

    let reverted = cli::undo::undo_actions(db_url, None, None).await.unwrap();
    assert_eq!(reverted, 1);
    assert!(src.exists());
    assert!(!dest.exists());
}

#[tokio::test]
async fn denied_paths_are_not_touched() {
    let temp = tempfile::tempdir().unwrap();
    let src = temp.path().join("protected/track.mp3");
    let dest = temp.path().join("sorted/Techno/track.mp3");
    std::fs::create_dir_all(src.parent().unwrap()).unwrap();
    std::fs::write(&src, "audio").unwrap();

    let db_url = "sqlite://file:apply_denied?mode=memory&cache=shared";
    let pool = storage::connect(db_url).await.unwrap();
    storage::migrate(&pool).await.unwrap();
    seed_action(&pool, &src, &dest, "move").await;

    let safety = SafetyConfig {
        dry_run: false,
        allow_paths: vec![],
        deny_paths: vec![temp.path().join("protected").to_string_lossy().into_owned()],
        trash_dir: None,
        copy_then_delete: false,
    };

    let actions = cli::apply::apply_actions(db_url, false, None, &safety, "rename")
        .await
        .unwrap();
    assert_eq!(actions[0].status, "error");
    assert_eq!(actions[0].error.as_deref(), Some("path denied"));
    assert!(src.exists());
    assert!(!dest.exists());
}
