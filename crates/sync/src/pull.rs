//! Full project pull.
//!
//! Fetches every table in three dependency phases, merges each group into
//! the local store as soon as its rows are in, refreshes the push
//! baselines from the merged result and finally fills the photo blob cache.
//! A failing table stops the pull; groups merged before it are kept.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;

use continuity_core::model::{Look, PhotoAngle, ProjectState, Scene, SceneCapture};
use continuity_core::{EntityId, SyncCategory, Table};
use continuity_db::models::{
    CallSheetRow, CaptureRow, CharacterRow, LookRow, LookSceneRow, PhotoRow, SceneCharacterRow,
    SceneRow, ScheduleRow, ScriptUploadRow,
};

use crate::baseline::BaselineSnapshot;
use crate::context::{bounded, SyncContext};
use crate::error::{MapperError, PullError, SyncError};
use crate::mapper;
use crate::merge::{merge_captures, merge_list, merge_schedule, merge_script, rebase_links};
use crate::store::replace_if_changed;

/// Concurrent photo downloads after a pull.
const PHOTO_DOWNLOAD_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullReport {
    /// The server had no scenes, characters or looks; nothing was merged.
    pub fresh_project: bool,
    /// Categories whose local group changed.
    pub changed: Vec<SyncCategory>,
    pub photos_downloaded: usize,
}

/// A single table's fetch or merge failure.
struct TableFailure {
    table: Table,
    error: SyncError,
}

impl TableFailure {
    fn mapping(table: Table, error: MapperError) -> Self {
        Self {
            table,
            error: error.into(),
        }
    }

    fn into_pull_error(self, merged: &[SyncCategory]) -> SyncError {
        SyncError::Pull(PullError {
            table: self.table,
            merged: merged.to_vec(),
            source: Box::new(self.error),
        })
    }
}

async fn fetch<T, E: Into<SyncError>>(
    table: Table,
    timeout: Duration,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, TableFailure> {
    bounded(timeout, fut)
        .await
        .map_err(|error| TableFailure { table, error })
}

/// Skip the round trip for an empty id set.
async fn fetch_by_ids<T, E: Into<SyncError>, F>(
    table: Table,
    timeout: Duration,
    ids: &[EntityId],
    fut: impl FnOnce() -> F,
) -> Result<Vec<T>, TableFailure>
where
    F: Future<Output = Result<Vec<T>, E>>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    fetch(table, timeout, fut()).await
}

struct FirstPhase {
    scenes: Vec<SceneRow>,
    characters: Vec<CharacterRow>,
    looks: Vec<LookRow>,
    schedule: Option<ScheduleRow>,
    call_sheets: Vec<CallSheetRow>,
    script: Option<ScriptUploadRow>,
}

struct SecondPhase {
    scene_characters: Vec<SceneCharacterRow>,
    look_scenes: Vec<LookSceneRow>,
    captures: Vec<CaptureRow>,
}

pub struct PullEngine {
    ctx: Arc<SyncContext>,
    lock: Mutex<()>,
}

impl PullEngine {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            ctx,
            lock: Mutex::new(()),
        }
    }

    /// Pull the whole project and merge it into the local store.
    ///
    /// Concurrent calls queue behind one another.
    pub async fn pull(&self, project_id: EntityId) -> Result<PullReport, SyncError> {
        let _serial = self.lock.lock().await;
        let _activity = self.ctx.status.begin();
        tracing::info!(project_id = %project_id, "Pull started");

        let result = self.pull_locked(project_id).await;
        match &result {
            Ok(report) => {
                self.ctx.status.pull_succeeded();
                tracing::info!(
                    project_id = %project_id,
                    fresh = report.fresh_project,
                    changed = ?report.changed,
                    photos = report.photos_downloaded,
                    "Pull finished",
                );
            }
            Err(e) => {
                self.ctx.status.pull_failed(e);
                tracing::warn!(project_id = %project_id, error = %e, "Pull failed");
            }
        }
        result
    }

    async fn pull_locked(&self, project_id: EntityId) -> Result<PullReport, SyncError> {
        let ctx = &self.ctx;
        let timeout = ctx.config.request_timeout;
        let rows = &ctx.rows;

        let project = fetch(Table::Projects, timeout, rows.fetch_project(project_id))
            .await
            .map_err(|f| f.into_pull_error(&[]))?;
        if project.is_none() {
            return Err(SyncError::ProjectNotFound(project_id));
        }

        let (scenes, characters, looks, schedule, call_sheets, script) = tokio::try_join!(
            fetch(Table::Scenes, timeout, rows.list_scenes(project_id)),
            fetch(Table::Characters, timeout, rows.list_characters(project_id)),
            fetch(Table::Looks, timeout, rows.list_looks(project_id)),
            fetch(Table::Schedules, timeout, rows.latest_schedule(project_id)),
            fetch(Table::CallSheets, timeout, rows.list_call_sheets(project_id)),
            fetch(Table::ScriptUploads, timeout, rows.latest_script(project_id)),
        )
        .map_err(|f| f.into_pull_error(&[]))?;
        let first = FirstPhase {
            scenes,
            characters,
            looks,
            schedule,
            call_sheets,
            script,
        };

        if first.scenes.is_empty() && first.characters.is_empty() && first.looks.is_empty() {
            tracing::info!(project_id = %project_id, "Server project is empty, keeping local data");
            return Ok(PullReport {
                fresh_project: true,
                ..PullReport::default()
            });
        }

        let mut merged = Vec::new();
        let mut changed = Vec::new();

        self.merge_first_phase(&first, &mut merged, &mut changed)?;

        let scene_ids: Vec<EntityId> = first.scenes.iter().map(|r| r.id).collect();
        let look_ids: Vec<EntityId> = first.looks.iter().map(|r| r.id).collect();
        let (scene_characters, look_scenes, captures) = tokio::try_join!(
            fetch_by_ids(Table::SceneCharacters, timeout, &scene_ids, || {
                rows.list_scene_characters(&scene_ids)
            }),
            fetch_by_ids(Table::LookScenes, timeout, &look_ids, || rows.list_look_scenes(&look_ids)),
            fetch_by_ids(Table::SceneCaptures, timeout, &scene_ids, || rows.list_captures(&scene_ids)),
        )
        .map_err(|f| f.into_pull_error(&merged))?;
        let second = SecondPhase {
            scene_characters,
            look_scenes,
            captures,
        };

        self.merge_second_phase(&first, &second, &mut merged, &mut changed)?;

        let capture_ids: Vec<EntityId> = second.captures.iter().map(|r| r.id).collect();
        let photos = fetch_by_ids(Table::Photos, timeout, &capture_ids, || {
            rows.list_photos(&capture_ids)
        })
        .await
        .map_err(|f| f.into_pull_error(&merged))?;

        if self.merge_captures(&second.captures, &photos, &merged)? {
            changed.push(SyncCategory::Captures);
        }

        let photos_downloaded = self.download_photos(project_id, &photos).await;

        Ok(PullReport {
            fresh_project: false,
            changed,
            photos_downloaded,
        })
    }

    /// Characters and the documents only need phase-one rows.
    fn merge_first_phase(
        &self,
        first: &FirstPhase,
        merged: &mut Vec<SyncCategory>,
        changed: &mut Vec<SyncCategory>,
    ) -> Result<(), SyncError> {
        let known = self.ctx.baselines.snapshot();
        let policy = self.ctx.config.schedule_merge;
        let status = &self.ctx.status;
        let project_id = self.ctx.store.project_id();
        let mut kept = Kept::default();

        self.ctx
            .store
            .try_apply_remote(|state| -> Result<(), TableFailure> {
                let pending = status.is_pending(SyncCategory::Characters);
                let characters = merge_list(
                    &state.characters,
                    &first.characters,
                    |c| c.id,
                    |r| r.id,
                    |id| known.characters.contains_key(&id),
                    |row, existing| match existing {
                        Some(c)
                            if is_dirty(pending, known.characters.get(&c.id), || {
                                Ok(mapper::character::to_row(c, project_id))
                            }) =>
                        {
                            kept.ids.insert(c.id);
                            Ok(c.clone())
                        }
                        _ => Ok(mapper::character::from_row(row, existing)),
                    },
                )
                .map_err(|e| TableFailure::mapping(Table::Characters, e))?;
                let did = replace_if_changed(&mut state.characters, characters);
                mark(changed, SyncCategory::Characters, did);

                let local = (*state.schedule).as_ref();
                let edited = local.filter(|s| {
                    first.schedule.as_ref().is_some_and(|r| r.id == s.id)
                        && is_dirty(
                            status.is_pending(SyncCategory::Schedule),
                            known.schedules.get(&s.id),
                            || mapper::document::schedule_to_row(s, project_id),
                        )
                });
                let schedule = match edited {
                    Some(s) => {
                        kept.schedule = true;
                        Some(s.clone())
                    }
                    None => merge_schedule(
                        local,
                        first.schedule.as_ref(),
                        |id| known.schedules.contains_key(&id),
                        policy,
                    )
                    .map_err(|e| TableFailure::mapping(Table::Schedules, e))?,
                };
                let did = replace_if_changed(&mut state.schedule, schedule);
                mark(changed, SyncCategory::Schedule, did);

                let pending = status.is_pending(SyncCategory::CallSheets);
                let call_sheets = merge_list(
                    &state.call_sheets,
                    &first.call_sheets,
                    |c| c.id,
                    |r| r.id,
                    |id| known.call_sheets.contains_key(&id),
                    |row, existing| match existing {
                        Some(c)
                            if is_dirty(pending, known.call_sheets.get(&c.id), || {
                                mapper::document::call_sheet_to_row(c, project_id)
                            }) =>
                        {
                            kept.call_sheets.insert(c.id);
                            Ok(c.clone())
                        }
                        _ => mapper::document::call_sheet_from_row(row, existing),
                    },
                )
                .map_err(|e| TableFailure::mapping(Table::CallSheets, e))?;
                let did = replace_if_changed(&mut state.call_sheets, call_sheets);
                mark(changed, SyncCategory::CallSheets, did);

                let local = (*state.script).as_ref();
                let edited = local.filter(|s| {
                    first.script.as_ref().is_some_and(|r| r.id == s.id)
                        && is_dirty(
                            status.is_pending(SyncCategory::Script),
                            known.scripts.get(&s.id),
                            || Ok(mapper::document::script_to_row(s, project_id)),
                        )
                });
                let script = match edited {
                    Some(s) => {
                        kept.script = true;
                        Some(s.clone())
                    }
                    None => merge_script(local, first.script.as_ref(), |id| {
                        known.scripts.contains_key(&id)
                    })
                    .map_err(|e| TableFailure::mapping(Table::ScriptUploads, e))?,
                };
                let did = replace_if_changed(&mut state.script, script);
                mark(changed, SyncCategory::Script, did);
                Ok(())
            })
            .map_err(|f| f.into_pull_error(merged))?;

        let snapshot = self.ctx.store.snapshot();
        self.ctx
            .baselines
            .update(|b| record_first_phase(b, &snapshot, first, &kept))
            .map_err(|e| TableFailure::mapping(e.table(), e).into_pull_error(merged))?;

        merged.extend([
            SyncCategory::Characters,
            SyncCategory::Schedule,
            SyncCategory::CallSheets,
            SyncCategory::Script,
        ]);
        Ok(())
    }

    fn merge_second_phase(
        &self,
        first: &FirstPhase,
        second: &SecondPhase,
        merged: &mut Vec<SyncCategory>,
        changed: &mut Vec<SyncCategory>,
    ) -> Result<(), SyncError> {
        let known = self.ctx.baselines.snapshot();
        let status = &self.ctx.status;
        let project_id = self.ctx.store.project_id();
        let links = ServerLinks::new(first, second);
        let mut kept = Kept::default();

        let applied = self.ctx.store.try_apply_remote(|state| -> Result<(), TableFailure> {
            let pending = status.is_pending(SyncCategory::Scenes);
            let scenes = merge_list(
                &state.scenes,
                &first.scenes,
                |s| s.id,
                |r| r.id,
                |id| known.scenes.contains_key(&id),
                |row, existing| match existing {
                    Some(s) if pending && scene_dirty(&known, s, project_id) => {
                        kept.ids.insert(s.id);
                        let mut scene = s.clone();
                        scene.characters = rebase_links(
                            &s.characters,
                            known.scene_characters.get(&s.id),
                            &links.character_set(row.id),
                        );
                        Ok(scene)
                    }
                    _ => mapper::scene::from_row(row, links.characters_of(row.id), existing),
                },
            )
            .map_err(|e| TableFailure::mapping(Table::Scenes, e))?;
            mark(changed, SyncCategory::Scenes, replace_if_changed(&mut state.scenes, scenes));

            let pending = status.is_pending(SyncCategory::Looks);
            let looks = merge_list(
                &state.looks,
                &first.looks,
                |l| l.id,
                |r| r.id,
                |id| known.looks.contains_key(&id),
                |row, existing| match existing {
                    Some(l) if pending && look_dirty(&known, l, project_id) => {
                        kept.looks.insert(l.id);
                        let mut look = l.clone();
                        look.scenes = rebase_links(
                            &l.scenes,
                            known.look_scenes.get(&l.id),
                            &links.scene_set(row.id),
                        );
                        Ok(look)
                    }
                    _ => mapper::look::from_row(row, links.scenes_of(row.id), existing),
                },
            )
            .map_err(|e| TableFailure::mapping(Table::Looks, e))?;
            mark(changed, SyncCategory::Looks, replace_if_changed(&mut state.looks, looks));
            Ok(())
        });
        applied.map_err(|f| f.into_pull_error(merged))?;

        let snapshot = self.ctx.store.snapshot();
        self.ctx
            .baselines
            .update(|b| record_second_phase(b, &snapshot, first, &links, &kept))
            .map_err(|e| TableFailure::mapping(e.table(), e).into_pull_error(merged))?;

        merged.extend([SyncCategory::Scenes, SyncCategory::Looks]);
        Ok(())
    }

    /// Returns whether the local capture map changed.
    fn merge_captures(
        &self,
        captures: &[CaptureRow],
        photos: &[PhotoRow],
        merged: &[SyncCategory],
    ) -> Result<bool, SyncError> {
        let known = self.ctx.baselines.snapshot();
        let pending = self.ctx.status.is_pending(SyncCategory::Captures);
        let mut by_capture: HashMap<EntityId, Vec<PhotoRow>> = HashMap::new();
        for photo in photos {
            by_capture
                .entry(photo.capture_id)
                .or_default()
                .push(photo.clone());
        }

        let mut adopted = Vec::new();
        let mut kept = Vec::new();
        let changed = self
            .ctx
            .store
            .try_apply_remote(|state| -> Result<(), MapperError> {
                let merge = merge_captures(
                    &state.captures,
                    captures,
                    &by_capture,
                    |id| known.captures.contains_key(&id),
                    |local| {
                        is_dirty(pending, known.captures.get(&local.id), || {
                            mapper::capture::to_row(local)
                        })
                    },
                )?;
                adopted = merge.adopted;
                kept = merge.kept;
                replace_if_changed(&mut state.captures, merge.captures);
                Ok(())
            })
            .map_err(|e| TableFailure::mapping(Table::SceneCaptures, e).into_pull_error(merged))?;

        let snapshot = self.ctx.store.snapshot();
        let adopted: HashSet<EntityId> = adopted.into_iter().collect();
        let kept: HashSet<EntityId> = kept.into_iter().collect();
        self.ctx
            .baselines
            .update(|b| record_captures(b, &snapshot, captures, &adopted, &kept, photos))
            .map_err(|e| TableFailure::mapping(Table::SceneCaptures, e).into_pull_error(merged))?;
        Ok(changed)
    }

    /// Fill the blob cache with capture photos and look master references
    /// it does not hold yet. Failures are logged and skipped; the photo is
    /// retried on the next pull.
    async fn download_photos(&self, project_id: EntityId, photos: &[PhotoRow]) -> usize {
        let mut wanted: Vec<RemotePhoto> = Vec::with_capacity(photos.len());
        for photo in photos {
            match PhotoAngle::from_name(&photo.angle) {
                Ok(angle) => wanted.push(RemotePhoto {
                    id: photo.id,
                    angle,
                    path: photo.storage_path.clone(),
                }),
                Err(e) => {
                    let error = MapperError::shape(Table::Photos, "angle", e);
                    tracing::warn!(photo_id = %photo.id, error = %error, "Skipping photo download");
                }
            }
        }
        let snapshot = self.ctx.store.snapshot();
        wanted.extend(snapshot.looks.iter().filter_map(|look| {
            let reference = look.master_reference.as_ref()?;
            Some(RemotePhoto {
                id: reference.id,
                angle: reference.angle,
                path: reference.storage_path.clone()?,
            })
        }));
        if wanted.is_empty() {
            return 0;
        }
        tracing::debug!(project_id = %project_id, candidates = wanted.len(), "Filling photo cache");

        let ctx = Arc::clone(&self.ctx);
        let fetched = stream::iter(wanted)
            .map(move |remote| {
                let ctx = Arc::clone(&ctx);
                async move {
                    match ctx.cache_remote_photo(remote.id, remote.angle, &remote.path).await {
                        Ok(fetched) => fetched,
                        Err(e) => {
                            tracing::warn!(photo_id = %remote.id, error = %e, "Photo download failed");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(PHOTO_DOWNLOAD_CONCURRENCY)
            .fold(0usize, |count, fetched| async move { count + usize::from(fetched) })
            .await;
        if fetched > 0 {
            tracing::info!(project_id = %project_id, count = fetched, "Downloaded photos");
        }
        fetched
    }
}

/// A backend photo object the blob cache should hold.
struct RemotePhoto {
    id: EntityId,
    angle: PhotoAngle,
    path: String,
}

fn mark(changed: &mut Vec<SyncCategory>, category: SyncCategory, did_change: bool) {
    if did_change {
        changed.push(category);
    }
}

// ---------------------------------------------------------------------------
// Unpushed local edits
// ---------------------------------------------------------------------------

/// Local items a pull left as they were because they carry an edit not
/// pushed yet. Their baseline becomes the server row so the next push
/// still sends them.
#[derive(Default)]
struct Kept {
    /// Characters in phase one, scenes in phase two.
    ids: HashSet<EntityId>,
    call_sheets: HashSet<EntityId>,
    looks: HashSet<EntityId>,
    schedule: bool,
    script: bool,
}

/// Whether `local` differs from the row the server was last known to
/// hold. Only a pending category can carry an unpushed edit.
fn is_dirty<R: PartialEq>(
    pending: bool,
    known: Option<&R>,
    local: impl FnOnce() -> Result<R, MapperError>,
) -> bool {
    match known {
        Some(row) if pending => local().is_ok_and(|l| l != *row),
        _ => false,
    }
}

fn scene_dirty(known: &BaselineSnapshot, scene: &Scene, project_id: EntityId) -> bool {
    let Some(row) = known.scenes.get(&scene.id) else {
        return false;
    };
    let links = known.scene_characters.get(&scene.id).cloned().unwrap_or_default();
    *row != mapper::scene::to_row(scene, project_id) || links != mapper::scene::character_set(scene)
}

fn look_dirty(known: &BaselineSnapshot, look: &Look, project_id: EntityId) -> bool {
    let Some(row) = known.looks.get(&look.id) else {
        return false;
    };
    let scenes = known.look_scenes.get(&look.id).cloned().unwrap_or_default();
    mapper::look::to_row(look, project_id).is_ok_and(|r| r != *row)
        || scenes != mapper::look::scene_set(look)
}

/// Junction rows of the second phase, grouped per server parent.
struct ServerLinks {
    scene_characters: HashMap<EntityId, Vec<EntityId>>,
    look_scenes: HashMap<EntityId, Vec<String>>,
}

impl ServerLinks {
    fn new(first: &FirstPhase, second: &SecondPhase) -> Self {
        let mut scene_characters: HashMap<EntityId, Vec<EntityId>> =
            first.scenes.iter().map(|r| (r.id, Vec::new())).collect();
        for row in &second.scene_characters {
            scene_characters
                .entry(row.scene_id)
                .or_default()
                .push(row.character_id);
        }
        let mut look_scenes: HashMap<EntityId, Vec<String>> =
            first.looks.iter().map(|r| (r.id, Vec::new())).collect();
        for row in &second.look_scenes {
            look_scenes
                .entry(row.look_id)
                .or_default()
                .push(row.scene_number.clone());
        }
        Self {
            scene_characters,
            look_scenes,
        }
    }

    fn characters_of(&self, scene_id: EntityId) -> &[EntityId] {
        self.scene_characters
            .get(&scene_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn scenes_of(&self, look_id: EntityId) -> &[String] {
        self.look_scenes.get(&look_id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn character_set(&self, scene_id: EntityId) -> BTreeSet<EntityId> {
        self.characters_of(scene_id).iter().copied().collect()
    }

    fn scene_set(&self, look_id: EntityId) -> BTreeSet<String> {
        self.scenes_of(look_id).iter().cloned().collect()
    }

    fn character_sets(&self) -> HashMap<EntityId, BTreeSet<EntityId>> {
        self.scene_characters
            .iter()
            .map(|(id, links)| (*id, links.iter().copied().collect()))
            .collect()
    }

    fn scene_sets(&self) -> HashMap<EntityId, BTreeSet<String>> {
        self.look_scenes
            .iter()
            .map(|(id, links)| (*id, links.iter().cloned().collect()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Baseline refresh
// ---------------------------------------------------------------------------

/// Rows the server returned, as this client would now push them. Kept
/// items are recorded with the server's row instead.
fn known_rows<T, R: Clone>(
    items: &[T],
    server: &HashMap<EntityId, R>,
    kept: &HashSet<EntityId>,
    id: impl Fn(&T) -> EntityId,
    to_row: impl Fn(&T) -> Result<R, MapperError>,
) -> Result<HashMap<EntityId, R>, MapperError> {
    let mut rows = HashMap::new();
    for item in items {
        let item_id = id(item);
        let Some(server_row) = server.get(&item_id) else {
            continue;
        };
        let row = if kept.contains(&item_id) {
            server_row.clone()
        } else {
            to_row(item)?
        };
        rows.insert(item_id, row);
    }
    Ok(rows)
}

fn by_id<R: Clone>(rows: &[R], id: impl Fn(&R) -> EntityId) -> HashMap<EntityId, R> {
    rows.iter().map(|r| (id(r), r.clone())).collect()
}

fn record_first_phase(
    b: &mut BaselineSnapshot,
    state: &ProjectState,
    first: &FirstPhase,
    kept: &Kept,
) -> Result<(), MapperError> {
    let project_id = state.project_id;
    b.characters = known_rows(
        &state.characters,
        &by_id(&first.characters, |r| r.id),
        &kept.ids,
        |c| c.id,
        |c| Ok(mapper::character::to_row(c, project_id)),
    )?;

    b.schedules.clear();
    if let Some(row) = &first.schedule {
        let adopted = (*state.schedule)
            .as_ref()
            .filter(|s| s.id == row.id && !kept.schedule);
        let known = match adopted {
            Some(schedule) => mapper::document::schedule_to_row(schedule, project_id)?,
            None => row.clone(),
        };
        b.schedules.insert(row.id, known);
    }

    b.call_sheets = known_rows(
        &state.call_sheets,
        &by_id(&first.call_sheets, |r| r.id),
        &kept.call_sheets,
        |c| c.id,
        |c| mapper::document::call_sheet_to_row(c, project_id),
    )?;

    b.scripts.clear();
    if let Some(row) = &first.script {
        let adopted = (*state.script)
            .as_ref()
            .filter(|s| s.id == row.id && !kept.script);
        let known = match adopted {
            Some(script) => mapper::document::script_to_row(script, project_id),
            None => row.clone(),
        };
        b.scripts.insert(row.id, known);
    }
    Ok(())
}

fn record_second_phase(
    b: &mut BaselineSnapshot,
    state: &ProjectState,
    first: &FirstPhase,
    links: &ServerLinks,
    kept: &Kept,
) -> Result<(), MapperError> {
    let project_id = state.project_id;
    b.scenes = known_rows(
        &state.scenes,
        &by_id(&first.scenes, |r| r.id),
        &kept.ids,
        |s| s.id,
        |s| Ok(mapper::scene::to_row(s, project_id)),
    )?;
    b.scene_characters = known_rows(
        &state.scenes,
        &links.character_sets(),
        &kept.ids,
        |s| s.id,
        |s| Ok(mapper::scene::character_set(s)),
    )?;
    b.looks = known_rows(
        &state.looks,
        &by_id(&first.looks, |r| r.id),
        &kept.looks,
        |l| l.id,
        |l| mapper::look::to_row(l, project_id),
    )?;
    b.look_scenes = known_rows(
        &state.looks,
        &links.scene_sets(),
        &kept.looks,
        |l| l.id,
        |l| Ok(mapper::look::scene_set(l)),
    )?;
    Ok(())
}

fn record_captures(
    b: &mut BaselineSnapshot,
    state: &ProjectState,
    server: &[CaptureRow],
    adopted: &HashSet<EntityId>,
    kept: &HashSet<EntityId>,
    photos: &[PhotoRow],
) -> Result<(), MapperError> {
    let server: HashMap<EntityId, CaptureRow> = server
        .iter()
        .filter(|r| adopted.contains(&r.id))
        .map(|r| (r.id, r.clone()))
        .collect();
    let captures: Vec<SceneCapture> = state.captures.values().cloned().collect();
    b.captures = known_rows(&captures, &server, kept, |c| c.id, mapper::capture::to_row)?;
    b.photos = photos
        .iter()
        .filter(|p| adopted.contains(&p.capture_id))
        .map(|p| (p.id, p.capture_id))
        .collect();
    Ok(())
}
