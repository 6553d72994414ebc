//! Incremental merge of row changes delivered by the change feed.
//!
//! Each change is filtered, in order: this client's own writes (category
//! in flight) are dropped, rows for other projects or for parents unknown
//! locally are ignored, rows equal to the push baseline are no-ops, and a
//! row whose local copy carries an unpushed edit only refreshes the
//! baseline (and rebases its links) so the pending push still wins. Everything else is merged
//! with the same rules as a pull and recorded in the baseline.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use continuity_core::model::{PhotoAngle, ProjectState, SceneCapture};
use continuity_core::{EntityId, SyncCategory, Table};
use continuity_db::models::{
    CallSheetRow, CaptureRow, ChangeKind, CharacterRow, LookRow, PhotoRow, RowChange, SceneRow,
    ScheduleRow, ScriptUploadRow,
};
use continuity_realtime::{ChangeFeed, FeedMessage, FeedStatus, Subscription, SubscriptionRequest, TableFilter};

use crate::context::SyncContext;
use crate::error::{MapperError, SyncError};
use crate::mapper;
use crate::merge::{merge_capture_row, merge_schedule, merge_script, rebase_links, upsert_by_id};
use crate::store::replace_if_changed;

/// What applying one change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Merged,
    Removed,
    /// The category had a push in flight; the change is our own write.
    Echo,
    /// Already reflected locally and in the baseline.
    Unchanged,
    /// Another project, an unknown parent, or a table merged via its parent.
    Ignored,
    /// The local row has an unpushed edit; only the baseline moved.
    LocalEditPending,
}

/// Tables one project subscription listens on.
///
/// Captures and photos have no `project_id` column and are filtered on
/// arrival. Junction rows are not subscribed: a junction change is always
/// followed by an update of its parent, which refetches them.
pub fn subscription_tables(project_id: EntityId) -> Vec<TableFilter> {
    let mut tables: Vec<TableFilter> = [
        Table::Scenes,
        Table::Characters,
        Table::Looks,
        Table::Schedules,
        Table::CallSheets,
        Table::ScriptUploads,
    ]
    .into_iter()
    .map(|table| TableFilter::project(table, project_id))
    .collect();
    tables.push(TableFilter::unfiltered(Table::SceneCaptures));
    tables.push(TableFilter::unfiltered(Table::Photos));
    tables
}

/// A running feed consumer.
pub struct RealtimeHandle {
    cancel: CancellationToken,
    ended: CancellationToken,
    task: JoinHandle<()>,
}

impl RealtimeHandle {
    /// Stop consuming and close the subscription.
    pub async fn unsubscribe(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    /// Resolves once the feed closed or ended on its own.
    pub async fn ended(&self) {
        self.ended.cancelled().await
    }
}

pub struct RealtimeEngine {
    ctx: Arc<SyncContext>,
}

impl RealtimeEngine {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    /// Open the project subscription and spawn its consumer.
    ///
    /// After the feed recovers from a transport drop a unit is sent on
    /// `resync`: changes may have been missed and a full pull is due.
    pub async fn subscribe(
        self: &Arc<Self>,
        feed: &dyn ChangeFeed,
        project_id: EntityId,
        identity: String,
        resync: mpsc::Sender<()>,
        cancel: CancellationToken,
    ) -> Result<RealtimeHandle, SyncError> {
        let request = SubscriptionRequest {
            project_id,
            identity,
            tables: subscription_tables(project_id),
        };
        let subscription = self.ctx.call(feed.subscribe(request)).await?;
        tracing::info!(project_id = %project_id, "Realtime subscription opened");

        let engine = Arc::clone(self);
        let ended = CancellationToken::new();
        let task = tokio::spawn(engine.consume(
            project_id,
            subscription,
            resync,
            cancel.clone(),
            ended.clone(),
        ));
        Ok(RealtimeHandle { cancel, ended, task })
    }

    async fn consume(
        self: Arc<Self>,
        project_id: EntityId,
        mut subscription: Subscription,
        resync: mpsc::Sender<()>,
        cancel: CancellationToken,
        ended: CancellationToken,
    ) {
        let mut reconnecting = false;
        loop {
            let message = tokio::select! {
                _ = cancel.cancelled() => break,
                message = subscription.recv() => message,
            };
            let Some(message) = message else {
                tracing::warn!(project_id = %project_id, "Realtime feed ended");
                ended.cancel();
                break;
            };

            match message {
                FeedMessage::Change(change) => match self.apply_change(project_id, &change).await {
                    Ok(applied) => {
                        tracing::debug!(table = %change.table, kind = ?change.kind, ?applied, "Realtime change");
                    }
                    Err(e) => {
                        tracing::warn!(table = %change.table, error = %e, "Realtime change dropped");
                    }
                },
                FeedMessage::Presence { members } => {
                    tracing::debug!(project_id = %project_id, members, "Presence changed");
                    self.ctx.status.set_members(members);
                }
                FeedMessage::Status(FeedStatus::Subscribed) => {
                    if reconnecting {
                        reconnecting = false;
                        tracing::info!(project_id = %project_id, "Realtime feed rejoined, requesting resync");
                        let _ = resync.try_send(());
                    }
                }
                FeedMessage::Status(FeedStatus::Reconnecting) => {
                    reconnecting = true;
                    tracing::info!(project_id = %project_id, "Realtime feed reconnecting");
                }
                FeedMessage::Status(FeedStatus::Closed(reason)) => {
                    tracing::warn!(project_id = %project_id, reason = %reason, "Realtime feed closed");
                    self.ctx.status.set_error(format!("Realtime feed closed: {reason}"));
                    ended.cancel();
                    break;
                }
            }
        }
        subscription.close().await;
        self.ctx.status.set_members(0);
    }

    /// Apply one committed row change to the local store.
    pub async fn apply_change(
        &self,
        project_id: EntityId,
        change: &RowChange,
    ) -> Result<Applied, SyncError> {
        let Some(category) = change.table.category() else {
            return Ok(Applied::Ignored);
        };
        if self.ctx.in_flight.contains(category) {
            return Ok(Applied::Echo);
        }
        if self.ctx.store.project_id() != project_id {
            return Ok(Applied::Ignored);
        }
        if matches!(change.table, Table::SceneCharacters | Table::LookScenes) {
            // Merged through the parent's update.
            return Ok(Applied::Ignored);
        }

        if change.kind == ChangeKind::Delete {
            let id = change
                .uuid_field("id")
                .ok_or_else(|| MapperError::shape(change.table, "id", "delete without a row id"))?;
            return Ok(self.apply_delete(change.table, id).await);
        }

        let record = change
            .record
            .as_ref()
            .ok_or_else(|| MapperError::shape(change.table, "record", "missing new row"))?;
        match change.table {
            Table::Scenes => self.apply_scene(project_id, decode(Table::Scenes, record)?).await,
            Table::Characters => self.apply_character(project_id, decode(Table::Characters, record)?),
            Table::Looks => self.apply_look(project_id, decode(Table::Looks, record)?).await,
            Table::SceneCaptures => self.apply_capture(decode(Table::SceneCaptures, record)?),
            Table::Photos => self.apply_photo(decode(Table::Photos, record)?).await,
            Table::Schedules => self.apply_schedule(project_id, decode(Table::Schedules, record)?),
            Table::CallSheets => self.apply_call_sheet(project_id, decode(Table::CallSheets, record)?),
            Table::ScriptUploads => self.apply_script(project_id, decode(Table::ScriptUploads, record)?),
            Table::SceneCharacters | Table::LookScenes | Table::Projects => Ok(Applied::Ignored),
        }
    }

    fn edit_pending(&self, category: SyncCategory, dirty: bool) -> bool {
        dirty && self.ctx.status.is_pending(category)
    }

    // -----------------------------------------------------------------------
    // Upserts
    // -----------------------------------------------------------------------

    async fn apply_scene(&self, project_id: EntityId, row: SceneRow) -> Result<Applied, SyncError> {
        if row.project_id != project_id {
            return Ok(Applied::Ignored);
        }
        let links = self
            .ctx
            .call(self.ctx.rows.list_scene_characters(&[row.id]))
            .await?;
        let characters: Vec<EntityId> = links.iter().map(|l| l.character_id).collect();
        let linked: BTreeSet<EntityId> = characters.iter().copied().collect();

        let (known_row, known_links) = self.ctx.baselines.read(|b| {
            (b.scenes.get(&row.id).cloned(), b.scene_characters.get(&row.id).cloned())
        });
        if known_row.as_ref() == Some(&row) && known_links.as_ref() == Some(&linked) {
            return Ok(Applied::Unchanged);
        }

        let snapshot = self.ctx.store.snapshot();
        let dirty = snapshot.scene(row.id).is_some_and(|s| {
            known_row.as_ref() != Some(&mapper::scene::to_row(s, project_id))
                || known_links.as_ref() != Some(&mapper::scene::character_set(s))
        });
        if self.edit_pending(SyncCategory::Scenes, dirty) {
            self.ctx.store.apply_remote(|state| {
                let Some(scene) = state.scene(row.id) else {
                    return;
                };
                let rebased = rebase_links(&scene.characters, known_links.as_ref(), &linked);
                if rebased != scene.characters {
                    let scenes = Arc::make_mut(&mut state.scenes);
                    if let Some(scene) = scenes.iter_mut().find(|s| s.id == row.id) {
                        scene.characters = rebased;
                    }
                }
            });
            self.ctx.baselines.update(|b| {
                b.scenes.insert(row.id, row.clone());
                b.scene_characters.insert(row.id, linked);
            });
            return Ok(Applied::LocalEditPending);
        }

        let changed = self.ctx.store.try_apply_remote(|state| -> Result<(), MapperError> {
            let merged = mapper::scene::from_row(&row, &characters, state.scene(row.id))?;
            upsert_group(&mut state.scenes, merged, |s| s.id);
            Ok(())
        })?;

        let snapshot = self.ctx.store.snapshot();
        if let Some(scene) = snapshot.scene(row.id) {
            self.ctx.baselines.update(|b| {
                b.scenes.insert(row.id, mapper::scene::to_row(scene, project_id));
                b.scene_characters.insert(row.id, mapper::scene::character_set(scene));
            });
        }
        Ok(merged_or_unchanged(changed))
    }

    fn apply_character(&self, project_id: EntityId, row: CharacterRow) -> Result<Applied, SyncError> {
        if row.project_id != project_id {
            return Ok(Applied::Ignored);
        }
        let known = self.ctx.baselines.read(|b| b.characters.get(&row.id).cloned());
        if known.as_ref() == Some(&row) {
            return Ok(Applied::Unchanged);
        }

        let snapshot = self.ctx.store.snapshot();
        let dirty = snapshot
            .character(row.id)
            .is_some_and(|c| known.as_ref() != Some(&mapper::character::to_row(c, project_id)));
        if self.edit_pending(SyncCategory::Characters, dirty) {
            self.ctx.baselines.update(|b| b.characters.insert(row.id, row.clone()));
            return Ok(Applied::LocalEditPending);
        }

        let changed = self.ctx.store.apply_remote(|state| {
            let merged = mapper::character::from_row(&row, state.character(row.id));
            upsert_group(&mut state.characters, merged, |c| c.id);
        });

        let snapshot = self.ctx.store.snapshot();
        if let Some(character) = snapshot.character(row.id) {
            let known = mapper::character::to_row(character, project_id);
            self.ctx.baselines.update(|b| b.characters.insert(row.id, known));
        }
        Ok(merged_or_unchanged(changed))
    }

    async fn apply_look(&self, project_id: EntityId, row: LookRow) -> Result<Applied, SyncError> {
        if row.project_id != project_id {
            return Ok(Applied::Ignored);
        }
        let links = self.ctx.call(self.ctx.rows.list_look_scenes(&[row.id])).await?;
        let scene_numbers: Vec<String> = links.into_iter().map(|l| l.scene_number).collect();
        let linked: BTreeSet<String> = scene_numbers.iter().cloned().collect();

        let (known_row, known_links) = self.ctx.baselines.read(|b| {
            (b.looks.get(&row.id).cloned(), b.look_scenes.get(&row.id).cloned())
        });
        if known_row.as_ref() == Some(&row) && known_links.as_ref() == Some(&linked) {
            return Ok(Applied::Unchanged);
        }

        let snapshot = self.ctx.store.snapshot();
        let dirty = match snapshot.look(row.id) {
            Some(look) => {
                known_row.as_ref() != Some(&mapper::look::to_row(look, project_id)?)
                    || known_links.as_ref() != Some(&mapper::look::scene_set(look))
            }
            None => false,
        };
        if self.edit_pending(SyncCategory::Looks, dirty) {
            self.ctx.store.apply_remote(|state| {
                let Some(look) = state.look(row.id) else {
                    return;
                };
                let rebased = rebase_links(&look.scenes, known_links.as_ref(), &linked);
                if rebased != look.scenes {
                    let looks = Arc::make_mut(&mut state.looks);
                    if let Some(look) = looks.iter_mut().find(|l| l.id == row.id) {
                        look.scenes = rebased;
                    }
                }
            });
            self.ctx.baselines.update(|b| {
                b.looks.insert(row.id, row.clone());
                b.look_scenes.insert(row.id, linked);
            });
            return Ok(Applied::LocalEditPending);
        }

        let changed = self.ctx.store.try_apply_remote(|state| -> Result<(), MapperError> {
            let merged = mapper::look::from_row(&row, &scene_numbers, state.look(row.id))?;
            upsert_group(&mut state.looks, merged, |l| l.id);
            Ok(())
        })?;

        let snapshot = self.ctx.store.snapshot();
        if let Some(look) = snapshot.look(row.id) {
            let known = mapper::look::to_row(look, project_id)?;
            let scenes = mapper::look::scene_set(look);
            self.ctx.baselines.update(|b| {
                b.looks.insert(row.id, known);
                b.look_scenes.insert(row.id, scenes);
            });
            if let Some(reference) = &look.master_reference {
                if let Some(path) = &reference.storage_path {
                    self.cache_photo(reference.id, reference.angle, path).await;
                }
            }
        }
        Ok(merged_or_unchanged(changed))
    }

    /// Best effort: a photo that fails here is picked up again by the next pull.
    async fn cache_photo(&self, id: EntityId, angle: PhotoAngle, path: &str) {
        if let Err(e) = self.ctx.cache_remote_photo(id, angle, path).await {
            tracing::warn!(photo_id = %id, error = %e, "Photo download failed");
        }
    }

    fn apply_capture(&self, row: CaptureRow) -> Result<Applied, SyncError> {
        let snapshot = self.ctx.store.snapshot();
        if !snapshot.has_scene(row.scene_id) {
            return Ok(Applied::Ignored);
        }
        let known = self.ctx.baselines.read(|b| b.captures.get(&row.id).cloned());
        if known.as_ref() == Some(&row) {
            return Ok(Applied::Unchanged);
        }

        let dirty = match snapshot.capture_by_id(row.id) {
            Some(capture) => known.as_ref() != Some(&mapper::capture::to_row(capture)?),
            None => false,
        };
        if self.edit_pending(SyncCategory::Captures, dirty) {
            self.ctx.baselines.update(|b| b.captures.insert(row.id, row.clone()));
            return Ok(Applied::LocalEditPending);
        }

        let known_ids: HashSet<EntityId> =
            self.ctx.baselines.read(|b| b.captures.keys().copied().collect());
        let mut won = false;
        let changed = self.ctx.store.try_apply_remote(|state| -> Result<(), MapperError> {
            let mut captures = (*state.captures).clone();
            won = merge_capture_row(&mut captures, &row, |id| known_ids.contains(&id))?;
            if won {
                replace_if_changed(&mut state.captures, captures);
            }
            Ok(())
        })?;
        if !won {
            // The pair belongs to a local capture not pushed yet.
            return Ok(Applied::Ignored);
        }

        let snapshot = self.ctx.store.snapshot();
        if let Some(capture) = snapshot.capture_by_id(row.id) {
            let known = mapper::capture::to_row(capture)?;
            self.ctx.baselines.update(|b| b.captures.insert(row.id, known));
        }
        Ok(merged_or_unchanged(changed))
    }

    async fn apply_photo(&self, row: PhotoRow) -> Result<Applied, SyncError> {
        let snapshot = self.ctx.store.snapshot();
        let Some(capture) = snapshot.capture_by_id(row.capture_id) else {
            return Ok(Applied::Ignored);
        };
        let known = self
            .ctx
            .baselines
            .read(|b| b.photos.get(&row.id) == Some(&row.capture_id));
        if known && capture.photos.contains(row.id) {
            return Ok(Applied::Unchanged);
        }

        let photo = mapper::photo::from_row(&row)?;
        self.cache_photo(row.id, photo.angle, &row.storage_path).await;

        let capture_id = row.capture_id;
        let changed = self.ctx.store.apply_remote(|state| {
            let Some(key) = state
                .captures
                .iter()
                .find(|(_, c)| c.id == capture_id)
                .map(|(k, _)| *k)
            else {
                return;
            };
            let mut captures = (*state.captures).clone();
            if let Some(capture) = captures.get_mut(&key) {
                match capture.photos.get_mut(photo.id) {
                    Some(existing) => existing.storage_path = photo.storage_path.clone(),
                    None => capture.photos.place(photo),
                }
            }
            replace_if_changed(&mut state.captures, captures);
        });
        self.ctx.baselines.update(|b| b.photos.insert(row.id, capture_id));
        Ok(merged_or_unchanged(changed))
    }

    fn apply_schedule(&self, project_id: EntityId, row: ScheduleRow) -> Result<Applied, SyncError> {
        if row.project_id != project_id {
            return Ok(Applied::Ignored);
        }
        let known = self.ctx.baselines.read(|b| b.schedules.get(&row.id).cloned());
        if known.as_ref() == Some(&row) {
            return Ok(Applied::Unchanged);
        }

        let snapshot = self.ctx.store.snapshot();
        let dirty = match (*snapshot.schedule).as_ref().filter(|s| s.id == row.id) {
            Some(schedule) => known.as_ref() != Some(&mapper::document::schedule_to_row(schedule, project_id)?),
            None => false,
        };
        if self.edit_pending(SyncCategory::Schedule, dirty) {
            self.ctx.baselines.update(|b| {
                b.schedules.clear();
                b.schedules.insert(row.id, row.clone());
            });
            return Ok(Applied::LocalEditPending);
        }

        let known_ids: HashSet<EntityId> =
            self.ctx.baselines.read(|b| b.schedules.keys().copied().collect());
        let policy = self.ctx.config.schedule_merge;
        let changed = self.ctx.store.try_apply_remote(|state| -> Result<(), MapperError> {
            let merged = merge_schedule(
                (*state.schedule).as_ref(),
                Some(&row),
                |id| known_ids.contains(&id),
                policy,
            )?;
            replace_if_changed(&mut state.schedule, merged);
            Ok(())
        })?;

        let snapshot = self.ctx.store.snapshot();
        let known = match (*snapshot.schedule).as_ref().filter(|s| s.id == row.id) {
            Some(schedule) => mapper::document::schedule_to_row(schedule, project_id)?,
            None => row.clone(),
        };
        self.ctx.baselines.update(|b| {
            b.schedules.clear();
            b.schedules.insert(row.id, known);
        });
        Ok(merged_or_unchanged(changed))
    }

    fn apply_call_sheet(&self, project_id: EntityId, row: CallSheetRow) -> Result<Applied, SyncError> {
        if row.project_id != project_id {
            return Ok(Applied::Ignored);
        }
        let known = self.ctx.baselines.read(|b| b.call_sheets.get(&row.id).cloned());
        if known.as_ref() == Some(&row) {
            return Ok(Applied::Unchanged);
        }

        let snapshot = self.ctx.store.snapshot();
        let dirty = match snapshot.call_sheets.iter().find(|c| c.id == row.id) {
            Some(sheet) => known.as_ref() != Some(&mapper::document::call_sheet_to_row(sheet, project_id)?),
            None => false,
        };
        if self.edit_pending(SyncCategory::CallSheets, dirty) {
            self.ctx.baselines.update(|b| b.call_sheets.insert(row.id, row.clone()));
            return Ok(Applied::LocalEditPending);
        }

        let changed = self.ctx.store.try_apply_remote(|state| -> Result<(), MapperError> {
            let existing = state.call_sheets.iter().find(|c| c.id == row.id);
            let merged = mapper::document::call_sheet_from_row(&row, existing)?;
            upsert_group(&mut state.call_sheets, merged, |c| c.id);
            Ok(())
        })?;

        let snapshot = self.ctx.store.snapshot();
        if let Some(sheet) = snapshot.call_sheets.iter().find(|c| c.id == row.id) {
            let known = mapper::document::call_sheet_to_row(sheet, project_id)?;
            self.ctx.baselines.update(|b| b.call_sheets.insert(row.id, known));
        }
        Ok(merged_or_unchanged(changed))
    }

    fn apply_script(&self, project_id: EntityId, row: ScriptUploadRow) -> Result<Applied, SyncError> {
        if row.project_id != project_id {
            return Ok(Applied::Ignored);
        }
        let known = self.ctx.baselines.read(|b| b.scripts.get(&row.id).cloned());
        if known.as_ref() == Some(&row) {
            return Ok(Applied::Unchanged);
        }

        let snapshot = self.ctx.store.snapshot();
        let dirty = (*snapshot.script)
            .as_ref()
            .filter(|s| s.id == row.id)
            .is_some_and(|s| known.as_ref() != Some(&mapper::document::script_to_row(s, project_id)));
        if self.edit_pending(SyncCategory::Script, dirty) {
            self.ctx.baselines.update(|b| {
                b.scripts.clear();
                b.scripts.insert(row.id, row.clone());
            });
            return Ok(Applied::LocalEditPending);
        }

        let known_ids: HashSet<EntityId> =
            self.ctx.baselines.read(|b| b.scripts.keys().copied().collect());
        let changed = self.ctx.store.try_apply_remote(|state| -> Result<(), MapperError> {
            let merged = merge_script((*state.script).as_ref(), Some(&row), |id| known_ids.contains(&id))?;
            replace_if_changed(&mut state.script, merged);
            Ok(())
        })?;

        let snapshot = self.ctx.store.snapshot();
        let known = match (*snapshot.script).as_ref().filter(|s| s.id == row.id) {
            Some(script) => mapper::document::script_to_row(script, project_id),
            None => row.clone(),
        };
        self.ctx.baselines.update(|b| {
            b.scripts.clear();
            b.scripts.insert(row.id, known);
        });
        Ok(merged_or_unchanged(changed))
    }

    // -----------------------------------------------------------------------
    // Deletes
    // -----------------------------------------------------------------------

    /// Remove a row deleted on the server, with the local rows the
    /// backend cascades along with it.
    async fn apply_delete(&self, table: Table, id: EntityId) -> Applied {
        let store = &self.ctx.store;
        let changed = match table {
            Table::Scenes => {
                self.ctx.baselines.update(|b| b.forget_scene(id));
                store.apply_remote(|state| {
                    if remove_by_id(&mut state.scenes, id, |s| s.id) {
                        remove_captures(state, |c| c.scene_id == id);
                    }
                })
            }
            Table::Characters => {
                self.ctx.baselines.update(|b| b.forget_character(id));
                store.apply_remote(|state| {
                    if !remove_by_id(&mut state.characters, id, |c| c.id) {
                        return;
                    }
                    if state.scenes.iter().any(|s| s.characters.contains(&id)) {
                        for scene in Arc::make_mut(&mut state.scenes) {
                            scene.characters.retain(|c| *c != id);
                        }
                    }
                    if state.looks.iter().any(|l| l.character_id == id) {
                        Arc::make_mut(&mut state.looks).retain(|l| l.character_id != id);
                    }
                    remove_captures(state, |c| c.character_id == id);
                })
            }
            Table::Looks => {
                self.ctx.baselines.update(|b| b.forget_look(id));
                store.apply_remote(|state| {
                    if !remove_by_id(&mut state.looks, id, |l| l.id) {
                        return;
                    }
                    if state.captures.values().any(|c| c.look_id == Some(id)) {
                        for capture in Arc::make_mut(&mut state.captures).values_mut() {
                            if capture.look_id == Some(id) {
                                capture.look_id = None;
                            }
                        }
                    }
                })
            }
            Table::SceneCaptures => {
                self.ctx.baselines.update(|b| b.forget_capture(id));
                store.apply_remote(|state| remove_captures(state, |c| c.id == id))
            }
            Table::Photos => {
                self.ctx.baselines.update(|b| b.photos.remove(&id));
                let changed = store.apply_remote(|state| {
                    if !state.captures.values().any(|c| c.photos.contains(id)) {
                        return;
                    }
                    for capture in Arc::make_mut(&mut state.captures).values_mut() {
                        capture.photos.remove(id);
                    }
                });
                if let Err(e) = self.ctx.cache.delete(id).await {
                    tracing::warn!(photo_id = %id, error = %e, "Evicting deleted photo failed");
                }
                changed
            }
            Table::Schedules => {
                self.ctx.baselines.update(|b| b.schedules.remove(&id));
                store.apply_remote(|state| {
                    if (*state.schedule).as_ref().is_some_and(|s| s.id == id) {
                        state.schedule = Arc::new(None);
                    }
                })
            }
            Table::CallSheets => {
                self.ctx.baselines.update(|b| b.call_sheets.remove(&id));
                store.apply_remote(|state| {
                    remove_by_id(&mut state.call_sheets, id, |c| c.id);
                })
            }
            Table::ScriptUploads => {
                self.ctx.baselines.update(|b| b.scripts.remove(&id));
                store.apply_remote(|state| {
                    if (*state.script).as_ref().is_some_and(|s| s.id == id) {
                        state.script = Arc::new(None);
                    }
                })
            }
            Table::SceneCharacters | Table::LookScenes | Table::Projects => return Applied::Ignored,
        };
        if changed {
            Applied::Removed
        } else {
            Applied::Unchanged
        }
    }
}

fn decode<R: DeserializeOwned>(table: Table, record: &serde_json::Value) -> Result<R, MapperError> {
    serde_json::from_value(record.clone()).map_err(|e| MapperError::shape(table, "record", e))
}

fn merged_or_unchanged(changed: bool) -> Applied {
    if changed {
        Applied::Merged
    } else {
        Applied::Unchanged
    }
}

/// Replace or append `item`, keeping the group's identity if nothing
/// changed.
fn upsert_group<T: Clone + PartialEq>(
    group: &mut Arc<Vec<T>>,
    item: T,
    id: impl Fn(&T) -> EntityId,
) -> bool {
    let mut list = Vec::clone(group);
    upsert_by_id(&mut list, item, id);
    replace_if_changed(group, list)
}

fn remove_by_id<T: Clone>(group: &mut Arc<Vec<T>>, id: EntityId, item_id: impl Fn(&T) -> EntityId) -> bool {
    if !group.iter().any(|x| item_id(x) == id) {
        return false;
    }
    Arc::make_mut(group).retain(|x| item_id(x) != id);
    true
}

fn remove_captures(state: &mut ProjectState, doomed: impl Fn(&SceneCapture) -> bool) {
    if state.captures.values().any(&doomed) {
        Arc::make_mut(&mut state.captures).retain(|_, c| !doomed(c));
    }
}
