//! Pull, push and realtime merges driven by hand against the in-process
//! backend.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;

use continuity_core::model::{
    Character, FilmingStatus, Look, Photo, PhotoAngle, ProjectState, Scene, SceneCapture,
};
use continuity_core::{EntityId, SyncCategory, Table};
use continuity_db::models::{ChangeKind, RowChange};
use continuity_db::{BackendError, RowStore};
use continuity_sync::{Applied, PullError, SyncError, SyncStatus};

use common::{Backend, Direct};

/// One character in one scene, with a look and a photographed capture.
struct Fixture {
    character: Character,
    scene: Scene,
    look: Look,
    capture: SceneCapture,
    photo: Photo,
}

fn fixture() -> Fixture {
    let character = Character::new("Rory Gilmore");
    let mut scene = Scene::new("12");
    scene.characters.push(character.id);
    scene.script_content = Some("INT. DINER - DAY".into());
    let mut look = Look::new(character.id, "Day 1");
    look.scenes.push("12".into());
    let photo = Photo::new(PhotoAngle::Front, Utc::now()).with_inline(vec![0xFF, 0xD8, 1, 2, 3]);
    let mut capture = SceneCapture::new(scene.id, character.id, Utc::now());
    capture.look_id = Some(look.id);
    capture.notes = "Lipstick smudged left".into();
    capture.photos.place(photo.clone());
    Fixture {
        character,
        scene,
        look,
        capture,
        photo,
    }
}

fn add_fixture(state: &mut ProjectState, f: &Fixture) {
    Arc::make_mut(&mut state.characters).push(f.character.clone());
    Arc::make_mut(&mut state.scenes).push(f.scene.clone());
    Arc::make_mut(&mut state.looks).push(f.look.clone());
    Arc::make_mut(&mut state.captures).insert(f.capture.key(), f.capture.clone());
}

fn scene_mut(state: &mut ProjectState, id: EntityId) -> &mut Scene {
    Arc::make_mut(&mut state.scenes)
        .iter_mut()
        .find(|s| s.id == id)
        .unwrap()
}

/// A client that has pushed the whole fixture.
async fn seeded(backend: &Backend) -> (Direct, Fixture) {
    let client = Direct::new(backend).await;
    let f = fixture();
    client.edit(|s| add_fixture(s, &f));
    client.push_all().await;
    (client, f)
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pushed_project_is_reproduced_by_a_new_client() {
    let backend = Backend::new();
    let (_author, f) = seeded(&backend).await;
    assert_eq!(backend.rows.row_count(Table::SceneCharacters), 1);
    assert_eq!(backend.rows.row_count(Table::LookScenes), 1);
    assert_eq!(backend.rows.row_count(Table::Photos), 1);

    let reader = Direct::new(&backend).await;
    let report = reader.pull.pull(backend.project_id).await.unwrap();
    assert!(!report.fresh_project);
    assert_eq!(report.photos_downloaded, 1);

    let state = reader.snapshot();
    let scene = state.scene(f.scene.id).unwrap();
    assert_eq!(scene.characters, vec![f.character.id]);
    assert_eq!(scene.script_content, None, "script text never leaves the device");
    assert_eq!(state.look(f.look.id).unwrap().scenes, vec!["12".to_string()]);

    let capture = state.capture_by_id(f.capture.id).unwrap();
    assert_eq!(capture.notes, "Lipstick smudged left");
    assert_eq!(capture.look_id, Some(f.look.id));
    let photo = capture.photos.slot(PhotoAngle::Front).unwrap();
    assert_eq!(photo.id, f.photo.id);
    assert!(photo.storage_path.is_some());
    assert!(reader.cache().await.contains(f.photo.id).await);
}

#[tokio::test]
async fn pull_caches_look_master_references() {
    let backend = Backend::new();
    let author = Direct::new(&backend).await;
    let character = Character::new("Lorelai Gilmore");
    let mut look = Look::new(character.id, "Gala");
    let bytes = vec![0xFF, 0xD8, 9, 8, 7];
    let reference = Photo::new(PhotoAngle::Front, Utc::now()).with_inline(bytes.clone());
    look.master_reference = Some(reference.clone());
    author.edit(|s| {
        Arc::make_mut(&mut s.characters).push(character.clone());
        Arc::make_mut(&mut s.looks).push(look.clone());
    });
    author.push_all().await;
    assert_eq!(backend.objects.upload_count(), 1);

    let reader = Direct::new(&backend).await;
    let report = reader.pull.pull(backend.project_id).await.unwrap();
    assert_eq!(report.photos_downloaded, 1);
    let state = reader.snapshot();
    let pulled = state.look(look.id).unwrap().master_reference.clone().unwrap();
    assert_eq!(pulled.id, reference.id);
    assert!(pulled.storage_path.is_some());
    let cache = reader.cache().await;
    assert!(cache.contains(reference.id).await);
    assert_eq!(cache.get(reference.id).await.unwrap().blob, bytes);
}

#[tokio::test]
async fn repeated_pull_changes_nothing() {
    let backend = Backend::new();
    seeded(&backend).await;

    let reader = Direct::new(&backend).await;
    reader.pull.pull(backend.project_id).await.unwrap();
    let before = reader.snapshot();

    let report = reader.pull.pull(backend.project_id).await.unwrap();
    assert!(report.changed.is_empty());
    assert_eq!(report.photos_downloaded, 0);
    let after = reader.snapshot();
    assert!(Arc::ptr_eq(&before.scenes, &after.scenes));
    assert!(Arc::ptr_eq(&before.captures, &after.captures));
}

#[tokio::test]
async fn pull_keeps_client_only_fields() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;

    let mut row = backend.rows.list_scenes(backend.project_id).await.unwrap().remove(0);
    row.filming_status = "filmed".into();
    backend.rows.upsert_scenes(&[row]).await.unwrap();

    let report = author.pull.pull(backend.project_id).await.unwrap();
    assert!(report.changed.contains(&SyncCategory::Scenes));
    let state = author.snapshot();
    let scene = state.scene(f.scene.id).unwrap();
    assert_eq!(scene.filming_status, FilmingStatus::Filmed);
    assert_eq!(scene.script_content.as_deref(), Some("INT. DINER - DAY"));
}

#[tokio::test]
async fn empty_server_project_leaves_local_data_alone() {
    let backend = Backend::new();
    let client = Direct::new(&backend).await;
    let f = fixture();
    client.edit(|s| add_fixture(s, &f));
    let before = client.snapshot();

    let report = client.pull.pull(backend.project_id).await.unwrap();
    assert!(report.fresh_project);
    assert_eq!(client.snapshot(), before);
}

#[tokio::test]
async fn failed_pull_keeps_the_groups_merged_before_it() {
    let backend = Backend::new();
    let (_author, f) = seeded(&backend).await;
    backend
        .rows
        .fail_table(Table::SceneCharacters, BackendError::Network("reset".into()));

    let reader = Direct::new(&backend).await;
    let err = reader.pull.pull(backend.project_id).await.unwrap_err();
    assert!(err.is_retryable());
    assert_matches!(&err, SyncError::Pull(PullError { table: Table::SceneCharacters, merged, .. }) => {
        assert!(merged.contains(&SyncCategory::Characters));
        assert!(!merged.contains(&SyncCategory::Scenes));
    });
    let state = reader.snapshot();
    assert!(state.character(f.character.id).is_some());
    assert!(state.scenes.is_empty());
    assert!(reader.ctx.status.current().error.is_some());

    backend.rows.clear_failures();
    reader.pull.pull(backend.project_id).await.unwrap();
    assert!(reader.snapshot().scene(f.scene.id).is_some());
}

#[tokio::test]
async fn deleted_project_is_reported_as_not_found() {
    let backend = Backend::new();
    let (author, _) = seeded(&backend).await;
    backend
        .rows
        .delete_rows(Table::Projects, &[backend.project_id])
        .await
        .unwrap();

    let err = author.pull.pull(backend.project_id).await.unwrap_err();
    assert_matches!(err, SyncError::ProjectNotFound(id) if id == backend.project_id);
    assert!(!author.snapshot().is_blank(), "local data is not discarded");
}

#[tokio::test]
async fn pull_drops_rows_deleted_by_another_client_and_keeps_drafts() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let reader = Direct::new(&backend).await;
    reader.pull.pull(backend.project_id).await.unwrap();

    let draft = Character::new("Lorelai");
    reader.edit(|s| Arc::make_mut(&mut s.characters).push(draft.clone()));
    author.edit(|s| Arc::make_mut(&mut s.looks).retain(|l| l.id != f.look.id));
    author.push_all().await;

    reader.pull.pull(backend.project_id).await.unwrap();
    let state = reader.snapshot();
    assert!(state.look(f.look.id).is_none());
    assert!(state.character(draft.id).is_some());
    let capture = state.capture_by_id(f.capture.id).unwrap();
    assert_eq!(capture.look_id, None);
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

#[tokio::test]
async fn push_sends_only_rows_that_changed() {
    let backend = Backend::new();
    let (author, _) = seeded(&backend).await;
    backend.rows.clear_history();

    let other = Character::new("Luke");
    author.edit(|s| {
        let characters = Arc::make_mut(&mut s.characters);
        characters.push(other.clone());
        characters[0].name = "Rory G".into();
    });
    let report = author
        .push
        .push(backend.project_id, SyncCategory::Characters)
        .await
        .unwrap();
    assert_eq!(report.upserted, 2);
    assert_eq!(backend.rows.upsert_history(Table::Characters), vec![2]);

    let again = author
        .push
        .push(backend.project_id, SyncCategory::Characters)
        .await
        .unwrap();
    assert_eq!(again.upserted, 0);
    assert_eq!(backend.rows.upsert_history(Table::Characters), vec![2]);
}

#[tokio::test]
async fn push_clears_pending_only_for_the_generation_it_sent() {
    let backend = Backend::new();
    let client = Direct::new(&backend).await;
    client.edit(|s| Arc::make_mut(&mut s.characters).push(Character::new("A")));
    let generation = client.ctx.status.pending_generation(SyncCategory::Characters).unwrap();

    client.edit(|s| Arc::make_mut(&mut s.characters).push(Character::new("B")));
    client.ctx.status.clear_pending(SyncCategory::Characters, generation);
    assert!(client.ctx.status.is_pending(SyncCategory::Characters));

    client.push_all().await;
    assert!(!client.ctx.status.is_pending(SyncCategory::Characters));
    assert_eq!(backend.rows.row_count(Table::Characters), 2);
}

#[tokio::test]
async fn concurrent_junction_edits_keep_both_links() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let extra = Character::new("Paris");
    author.edit(|s| Arc::make_mut(&mut s.characters).push(extra.clone()));
    author.push_all().await;

    let a = Direct::new(&backend).await;
    let b = Direct::new(&backend).await;
    a.pull.pull(backend.project_id).await.unwrap();
    b.pull.pull(backend.project_id).await.unwrap();

    // A removes Rory and adds Paris; B, unaware, keeps the scene as it was
    // and only renames it.
    a.edit(|s| scene_mut(s, f.scene.id).characters = vec![extra.id]);
    b.edit(|s| scene_mut(s, f.scene.id).location = "Diner".into());
    a.push_all().await;
    b.push_all().await;

    let links = backend.rows.list_scene_characters(&[f.scene.id]).await.unwrap();
    let linked: Vec<EntityId> = links.iter().map(|l| l.character_id).collect();
    assert_eq!(linked, vec![extra.id], "B's push must not re-add or drop links");

    // Both add a different character at once.
    let c1 = Character::new("Dean");
    let c2 = Character::new("Jess");
    author.edit(|s| {
        let characters = Arc::make_mut(&mut s.characters);
        characters.push(c1.clone());
        characters.push(c2.clone());
    });
    author.push_all().await;
    a.pull.pull(backend.project_id).await.unwrap();
    b.pull.pull(backend.project_id).await.unwrap();
    a.edit(|s| scene_mut(s, f.scene.id).characters.push(c1.id));
    b.edit(|s| scene_mut(s, f.scene.id).characters.push(c2.id));
    a.push_all().await;
    b.push_all().await;

    let links = backend.rows.list_scene_characters(&[f.scene.id]).await.unwrap();
    let mut linked: Vec<EntityId> = links.iter().map(|l| l.character_id).collect();
    linked.sort();
    let mut expected = vec![extra.id, c1.id, c2.id];
    expected.sort();
    assert_eq!(linked, expected);
}

#[tokio::test]
async fn pull_rebases_unpushed_junction_edits() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let dean = Character::new("Dean");
    let jess = Character::new("Jess");
    author.edit(|s| {
        let characters = Arc::make_mut(&mut s.characters);
        characters.push(dean.clone());
        characters.push(jess.clone());
    });
    author.push_all().await;

    let offline = Direct::new(&backend).await;
    offline.pull.pull(backend.project_id).await.unwrap();
    offline.edit(|s| {
        let scene = scene_mut(s, f.scene.id);
        scene.characters.push(jess.id);
        scene.synopsis = Some("Rory meets Jess".into());
    });

    author.edit(|s| scene_mut(s, f.scene.id).characters.push(dean.id));
    author.push_all().await;

    // Reconnect: pull first, then push what was queued.
    offline.pull.pull(backend.project_id).await.unwrap();
    let state = offline.snapshot();
    let scene = state.scene(f.scene.id).unwrap();
    assert_eq!(scene.synopsis.as_deref(), Some("Rory meets Jess"));
    assert_eq!(scene.characters, vec![f.character.id, jess.id, dean.id]);

    offline.push_all().await;
    let links = backend.rows.list_scene_characters(&[f.scene.id]).await.unwrap();
    assert_eq!(links.len(), 3);
    let row = backend
        .rows
        .list_scenes(backend.project_id)
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.id == f.scene.id)
        .unwrap();
    assert_eq!(row.synopsis.as_deref(), Some("Rory meets Jess"));
}

#[tokio::test]
async fn failed_photo_upload_keeps_captures_pending() {
    let backend = Backend::new();
    let client = Direct::new(&backend).await;
    let f = fixture();
    client.edit(|s| add_fixture(s, &f));

    backend.objects.set_unreachable(true);
    client.push_all().await;
    assert!(client.ctx.status.is_pending(SyncCategory::Captures));
    assert_eq!(backend.rows.row_count(Table::SceneCaptures), 1);
    assert_eq!(backend.rows.row_count(Table::Photos), 0);
    let state = client.ctx.status.current();
    assert_eq!(state.status, SyncStatus::Error);
    assert_eq!(
        state.category_errors.get(&SyncCategory::Captures).map(String::as_str),
        Some("1 photos not uploaded"),
    );

    backend.objects.set_unreachable(false);
    client.push_all().await;
    assert!(!client.ctx.status.is_pending(SyncCategory::Captures));
    assert!(client.ctx.status.current().category_errors.is_empty());
    assert_eq!(backend.rows.row_count(Table::Photos), 1);
    assert_eq!(backend.objects.upload_count(), 1);
    let state = client.snapshot();
    let photo = state.capture_by_id(f.capture.id).unwrap().photos.slot(PhotoAngle::Front).cloned();
    assert!(photo.unwrap().storage_path.is_some());
}

#[tokio::test]
async fn rejected_write_is_not_retryable() {
    let backend = Backend::new();
    let client = Direct::new(&backend).await;
    client.edit(|s| Arc::make_mut(&mut s.characters).push(Character::new("A")));
    backend.rows.fail_table(
        Table::Characters,
        BackendError::SchemaMismatch {
            table: Table::Characters,
            message: "column \"initials\" does not exist".into(),
        },
    );

    let err = client.push.flush(backend.project_id).await.unwrap_err();
    assert!(!err.is_retryable());
    assert!(client.ctx.status.is_pending(SyncCategory::Characters));
    let status = client.ctx.status.current();
    assert!(status.category_errors.contains_key(&SyncCategory::Characters));
}

// ---------------------------------------------------------------------------
// Realtime merges
// ---------------------------------------------------------------------------

/// Record the changes the next `f` commits.
async fn changes_of<F: std::future::Future<Output = ()>>(backend: &Backend, f: F) -> Vec<RowChange> {
    let mut rx = backend.rows.subscribe();
    f.await;
    let mut changes = Vec::new();
    while let Ok(change) = rx.try_recv() {
        changes.push(change);
    }
    changes
}

#[tokio::test]
async fn remote_update_merges_and_keeps_local_script() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let reader = Direct::new(&backend).await;
    reader.pull.pull(backend.project_id).await.unwrap();
    reader.ctx.store.update(|s| {
        scene_mut(s, f.scene.id).script_content = Some("EXT. BRIDGE - NIGHT".into())
    });

    let changes = changes_of(&backend, async {
        author.edit(|s| scene_mut(s, f.scene.id).filming_status = FilmingStatus::Wrapped);
        author.push_all().await;
    })
    .await;
    let scene_change = changes.iter().find(|c| c.table == Table::Scenes).unwrap();

    let applied = reader
        .realtime
        .apply_change(backend.project_id, scene_change)
        .await
        .unwrap();
    assert_eq!(applied, Applied::Merged);
    let state = reader.snapshot();
    let scene = state.scene(f.scene.id).unwrap();
    assert_eq!(scene.filming_status, FilmingStatus::Wrapped);
    assert_eq!(scene.script_content.as_deref(), Some("EXT. BRIDGE - NIGHT"));

    let again = reader
        .realtime
        .apply_change(backend.project_id, scene_change)
        .await
        .unwrap();
    assert_eq!(again, Applied::Unchanged);
}

#[tokio::test]
async fn remote_look_brings_its_master_reference_bytes() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let reader = Direct::new(&backend).await;
    reader.pull.pull(backend.project_id).await.unwrap();

    let bytes = vec![0xFF, 0xD8, 4, 4, 4];
    let reference = Photo::new(PhotoAngle::Left, Utc::now()).with_inline(bytes.clone());
    let changes = changes_of(&backend, async {
        author.edit(|s| {
            let look = Arc::make_mut(&mut s.looks).iter_mut().find(|l| l.id == f.look.id).unwrap();
            look.master_reference = Some(reference.clone());
        });
        author.push_all().await;
    })
    .await;
    let look_change = changes.iter().find(|c| c.table == Table::Looks).unwrap();

    let applied = reader
        .realtime
        .apply_change(backend.project_id, look_change)
        .await
        .unwrap();
    assert_eq!(applied, Applied::Merged);
    let cache = reader.cache().await;
    assert_eq!(cache.get(reference.id).await.unwrap().blob, bytes);
}

#[tokio::test]
async fn own_writes_are_dropped_while_in_flight() {
    let backend = Backend::new();
    let client = Direct::new(&backend).await;
    let changes = changes_of(&backend, async {
        client.edit(|s| Arc::make_mut(&mut s.characters).push(Character::new("Emily")));
        client.push_all().await;
    })
    .await;
    let change = &changes[0];

    let guard = client.ctx.in_flight.enter(SyncCategory::Characters);
    let applied = client.realtime.apply_change(backend.project_id, change).await.unwrap();
    assert_eq!(applied, Applied::Echo);
    drop(guard);

    // After the push the echo equals the baseline.
    let applied = client.realtime.apply_change(backend.project_id, change).await.unwrap();
    assert_eq!(applied, Applied::Unchanged);
}

#[tokio::test]
async fn capture_for_an_unknown_scene_is_ignored() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let reader = Direct::new(&backend).await;

    let changes = changes_of(&backend, async {
        author.edit(|s| {
            let capture = Arc::make_mut(&mut s.captures).get_mut(&f.capture.key()).unwrap();
            capture.notes = "Touched up".into();
        });
        author.push_all().await;
    })
    .await;
    let change = changes.iter().find(|c| c.table == Table::SceneCaptures).unwrap();

    let applied = reader.realtime.apply_change(backend.project_id, change).await.unwrap();
    assert_eq!(applied, Applied::Ignored);
    assert!(reader.snapshot().captures.is_empty());
}

#[tokio::test]
async fn pending_local_edit_wins_over_a_remote_update() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let reader = Direct::new(&backend).await;
    reader.pull.pull(backend.project_id).await.unwrap();
    reader.edit(|s| Arc::make_mut(&mut s.characters)[0].name = "Rory (reader)".into());

    let changes = changes_of(&backend, async {
        author.edit(|s| Arc::make_mut(&mut s.characters)[0].color = "#112233".into());
        author.push_all().await;
    })
    .await;
    let applied = reader
        .realtime
        .apply_change(backend.project_id, &changes[0])
        .await
        .unwrap();
    assert_eq!(applied, Applied::LocalEditPending);
    assert_eq!(reader.snapshot().character(f.character.id).unwrap().name, "Rory (reader)");

    reader.push_all().await;
    let rows = backend.rows.list_characters(backend.project_id).await.unwrap();
    assert_eq!(rows[0].name, "Rory (reader)");
}

#[tokio::test]
async fn remote_delete_cascades_locally() {
    let backend = Backend::new();
    let (author, f) = seeded(&backend).await;
    let reader = Direct::new(&backend).await;
    reader.pull.pull(backend.project_id).await.unwrap();
    assert!(reader.cache().await.contains(f.photo.id).await);

    let changes = changes_of(&backend, async {
        author.edit(|s| Arc::make_mut(&mut s.scenes).clear());
        author.push_all().await;
    })
    .await;
    for change in changes.iter().filter(|c| c.kind == ChangeKind::Delete) {
        reader.realtime.apply_change(backend.project_id, change).await.unwrap();
    }

    let state = reader.snapshot();
    assert!(state.scene(f.scene.id).is_none());
    assert!(state.captures.is_empty());
    assert!(!reader.cache().await.contains(f.photo.id).await);
}

#[tokio::test]
async fn changes_for_another_project_are_ignored() {
    let backend = Backend::new();
    let (author, _) = seeded(&backend).await;
    let changes = changes_of(&backend, async {
        author.edit(|s| Arc::make_mut(&mut s.characters).push(Character::new("Kirk")));
        author.push_all().await;
    })
    .await;

    let other = Direct::new(&backend).await;
    let unrelated = uuid::Uuid::new_v4();
    let applied = other.realtime.apply_change(unrelated, &changes[0]).await.unwrap();
    assert_eq!(applied, Applied::Ignored);
    assert!(other.snapshot().characters.is_empty());
}
