//! Category pushes.
//!
//! A push reads the current local snapshot, diffs it against the category
//! baseline and sends only the difference: changed rows are upserted,
//! junction sets are resynchronized as one transactional diff, rows the
//! server knows but this client removed are deleted. Binaries (photos and
//! document PDFs) are uploaded before the rows referencing them.
//!
//! Every push runs under one mutex, so a child category never races ahead
//! of a parent it depends on.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use continuity_core::model::{Attachment, Photo, ProjectState};
use continuity_core::{EntityId, SyncCategory, Table};
use continuity_db::models::{LookSceneRow, SceneCharacterRow};
use continuity_storage::object_store::{JPEG_CONTENT_TYPE, PDF_CONTENT_TYPE};
use continuity_storage::{document_path, photo_path};

use crate::baseline::{diff_rows, diff_set};
use crate::context::SyncContext;
use crate::error::SyncError;
use crate::mapper;
use crate::scheduler::PushLane;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub upserted: usize,
    pub deleted: usize,
    pub junction_changes: usize,
    pub photos_uploaded: usize,
    /// Photos that could not be uploaded this time; the category stays
    /// pending so they are retried.
    pub photo_failures: usize,
}

/// Categories whose rows must reach the server before `category`'s.
pub fn dependencies(category: SyncCategory) -> &'static [SyncCategory] {
    match category {
        SyncCategory::Scenes | SyncCategory::Looks => &[SyncCategory::Characters],
        SyncCategory::Captures => &[
            SyncCategory::Characters,
            SyncCategory::Scenes,
            SyncCategory::Looks,
        ],
        _ => &[],
    }
}

pub struct PushEngine {
    ctx: Arc<SyncContext>,
    lock: Mutex<()>,
}

impl PushEngine {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self {
            ctx,
            lock: Mutex::new(()),
        }
    }

    /// Push `category` if pending, pushing pending parents first.
    pub async fn push_pending(
        &self,
        project_id: EntityId,
        category: SyncCategory,
    ) -> Result<(), SyncError> {
        let _serial = self.lock.lock().await;
        for &parent in dependencies(category) {
            if self.ctx.status.is_pending(parent) {
                self.push_locked(project_id, parent).await?;
            }
        }
        if self.ctx.status.is_pending(category) {
            self.push_locked(project_id, category).await?;
        }
        Ok(())
    }

    /// Push every pending category in dependency order.
    ///
    /// A failing category does not stop the others; the first error is
    /// returned.
    pub async fn flush(&self, project_id: EntityId) -> Result<(), SyncError> {
        let _serial = self.lock.lock().await;
        let mut first_error = None;
        for category in self.ctx.status.pending() {
            if let Err(e) = self.push_locked(project_id, category).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Push `category` whether or not it is pending.
    pub async fn push(
        &self,
        project_id: EntityId,
        category: SyncCategory,
    ) -> Result<PushReport, SyncError> {
        let _serial = self.lock.lock().await;
        self.push_locked(project_id, category).await
    }

    async fn push_locked(
        &self,
        project_id: EntityId,
        category: SyncCategory,
    ) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let generation = ctx.status.pending_generation(category);
        let _activity = ctx.status.begin();
        let _in_flight = ctx.in_flight.enter(category);

        if ctx.store.project_id() != project_id {
            tracing::warn!(project_id = %project_id, category = %category, "Local store holds another project, push skipped");
            return Ok(PushReport::default());
        }

        let result = match category {
            SyncCategory::Characters => self.push_characters(project_id).await,
            SyncCategory::Scenes => self.push_scenes(project_id).await,
            SyncCategory::Looks => self.push_looks(project_id).await,
            SyncCategory::Captures => self.push_captures(project_id).await,
            SyncCategory::Schedule => self.push_schedule(project_id).await,
            SyncCategory::CallSheets => self.push_call_sheets(project_id).await,
            SyncCategory::Script => self.push_script(project_id).await,
        };

        match &result {
            Ok(report) if report.photo_failures > 0 => {
                ctx.status.push_incomplete(
                    category,
                    format!("{} photos not uploaded", report.photo_failures),
                );
                tracing::warn!(
                    project_id = %project_id,
                    category = %category,
                    upserted = report.upserted,
                    failures = report.photo_failures,
                    "Push finished with photos left to upload",
                );
            }
            Ok(report) => {
                if let Some(generation) = generation {
                    ctx.status.clear_pending(category, generation);
                }
                ctx.status.push_succeeded(category);
                tracing::info!(
                    project_id = %project_id,
                    category = %category,
                    upserted = report.upserted,
                    deleted = report.deleted,
                    junction = report.junction_changes,
                    photos = report.photos_uploaded,
                    "Push finished",
                );
            }
            Err(e) => {
                ctx.status.push_failed(category, e);
                tracing::warn!(project_id = %project_id, category = %category, error = %e, "Push failed");
            }
        }
        result
    }

    async fn push_characters(&self, project_id: EntityId) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let snapshot = ctx.store.snapshot();
        let desired: Vec<_> = snapshot
            .characters
            .iter()
            .map(|c| (c.id, mapper::character::to_row(c, project_id)))
            .collect();
        let diff = ctx.baselines.read(|b| diff_rows(&b.characters, &desired));

        if !diff.upsert.is_empty() {
            ctx.call(ctx.rows.upsert_characters(&diff.upsert)).await?;
        }
        if !diff.delete.is_empty() {
            ctx.call(ctx.rows.delete_rows(Table::Characters, &diff.delete)).await?;
        }

        ctx.baselines.update(|b| {
            for row in &diff.upsert {
                b.characters.insert(row.id, row.clone());
            }
            for id in &diff.delete {
                b.forget_character(*id);
            }
        });
        Ok(PushReport {
            upserted: diff.upsert.len(),
            deleted: diff.delete.len(),
            ..PushReport::default()
        })
    }

    async fn push_scenes(&self, project_id: EntityId) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let snapshot = ctx.store.snapshot();
        let desired: Vec<_> = snapshot
            .scenes
            .iter()
            .map(|s| (s.id, mapper::scene::to_row(s, project_id)))
            .collect();

        let (diff, insert, delete, touched) = ctx.baselines.read(|b| {
            let diff = diff_rows(&b.scenes, &desired);
            let mut insert: Vec<SceneCharacterRow> = Vec::new();
            let mut delete: Vec<SceneCharacterRow> = Vec::new();
            let mut touched = Vec::new();
            for (scene, (_, row)) in snapshot.scenes.iter().zip(&desired) {
                let wanted = mapper::scene::character_set(scene);
                let (add, remove) = diff_set(b.scene_characters.get(&scene.id), &wanted);
                if add.is_empty() && remove.is_empty() {
                    continue;
                }
                insert.extend(mapper::scene::junction_rows(scene.id, &add));
                delete.extend(mapper::scene::junction_rows(scene.id, &remove));
                touched.push(row.clone());
            }
            (diff, insert, delete, touched)
        });

        if !diff.upsert.is_empty() {
            ctx.call(ctx.rows.upsert_scenes(&diff.upsert)).await?;
        }
        if !touched.is_empty() {
            ctx.call(ctx.rows.apply_scene_character_diff(&insert, &delete))
                .await?;
            // Re-announce the parents so peers refetch their junction rows.
            ctx.call(ctx.rows.upsert_scenes(&touched)).await?;
        }
        if !diff.delete.is_empty() {
            ctx.call(ctx.rows.delete_rows(Table::Scenes, &diff.delete)).await?;
        }

        ctx.baselines.update(|b| {
            for row in diff.upsert.iter().chain(&touched) {
                b.scenes.insert(row.id, row.clone());
            }
            for scene in snapshot.scenes.iter() {
                b.scene_characters
                    .insert(scene.id, mapper::scene::character_set(scene));
            }
            for id in &diff.delete {
                b.forget_scene(*id);
            }
        });
        Ok(PushReport {
            upserted: diff.upsert.len(),
            deleted: diff.delete.len(),
            junction_changes: insert.len() + delete.len(),
            ..PushReport::default()
        })
    }

    async fn push_looks(&self, project_id: EntityId) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let (uploaded, failures) = self.upload_master_references(project_id).await;

        let snapshot = ctx.store.snapshot();
        let desired = snapshot
            .looks
            .iter()
            .map(|l| mapper::look::to_row(l, project_id).map(|row| (l.id, row)))
            .collect::<Result<Vec<_>, _>>()?;

        let (diff, insert, delete, touched) = ctx.baselines.read(|b| {
            let diff = diff_rows(&b.looks, &desired);
            let mut insert: Vec<LookSceneRow> = Vec::new();
            let mut delete: Vec<LookSceneRow> = Vec::new();
            let mut touched = Vec::new();
            for (look, (_, row)) in snapshot.looks.iter().zip(&desired) {
                let wanted = mapper::look::scene_set(look);
                let (add, remove) = diff_set(b.look_scenes.get(&look.id), &wanted);
                if add.is_empty() && remove.is_empty() {
                    continue;
                }
                insert.extend(mapper::look::junction_rows(look.id, &add));
                delete.extend(mapper::look::junction_rows(look.id, &remove));
                touched.push(row.clone());
            }
            (diff, insert, delete, touched)
        });

        if !diff.upsert.is_empty() {
            ctx.call(ctx.rows.upsert_looks(&diff.upsert)).await?;
        }
        if !touched.is_empty() {
            ctx.call(ctx.rows.apply_look_scene_diff(&insert, &delete)).await?;
            ctx.call(ctx.rows.upsert_looks(&touched)).await?;
        }
        if !diff.delete.is_empty() {
            ctx.call(ctx.rows.delete_rows(Table::Looks, &diff.delete)).await?;
        }

        ctx.baselines.update(|b| {
            for row in diff.upsert.iter().chain(&touched) {
                b.looks.insert(row.id, row.clone());
            }
            for look in snapshot.looks.iter() {
                b.look_scenes.insert(look.id, mapper::look::scene_set(look));
            }
            for id in &diff.delete {
                b.forget_look(*id);
            }
        });
        Ok(PushReport {
            upserted: diff.upsert.len(),
            deleted: diff.delete.len(),
            junction_changes: insert.len() + delete.len(),
            photos_uploaded: uploaded,
            photo_failures: failures,
        })
    }

    /// Upload master reference photos that have bytes but no object yet.
    async fn upload_master_references(&self, project_id: EntityId) -> (usize, usize) {
        let snapshot = self.ctx.store.snapshot();
        let pending: Vec<(EntityId, Photo)> = snapshot
            .looks
            .iter()
            .filter_map(|l| l.master_reference.as_ref().map(|p| (l.id, p)))
            .filter(|(_, p)| p.storage_path.is_none())
            .map(|(id, p)| (id, p.clone()))
            .collect();

        let mut uploaded = Vec::new();
        let mut failures = 0;
        for (look_id, photo) in pending {
            if photo.inline.is_none() && !self.ctx.cache.contains(photo.id).await {
                tracing::debug!(look_id = %look_id, photo_id = %photo.id, "Master reference has no local bytes");
                continue;
            }
            match self.upload_photo_binary(project_id, &photo).await {
                Ok(path) => uploaded.push((look_id, photo.id, path)),
                Err(e) => {
                    failures += 1;
                    tracing::warn!(look_id = %look_id, photo_id = %photo.id, error = %e, "Master reference upload failed");
                }
            }
        }
        let count = uploaded.len();
        if !uploaded.is_empty() {
            self.ctx.store.apply_remote(|state| {
                let looks = Arc::make_mut(&mut state.looks);
                for (look_id, photo_id, path) in uploaded {
                    let reference = looks
                        .iter_mut()
                        .find(|l| l.id == look_id)
                        .and_then(|l| l.master_reference.as_mut())
                        .filter(|p| p.id == photo_id);
                    if let Some(photo) = reference {
                        photo.storage_path = Some(path);
                        photo.inline = None;
                    }
                }
            });
        }
        (count, failures)
    }

    async fn push_captures(&self, project_id: EntityId) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let snapshot = ctx.store.snapshot();
        let desired = snapshot
            .captures
            .values()
            .map(|c| mapper::capture::to_row(c).map(|row| (c.id, row)))
            .collect::<Result<Vec<_>, _>>()?;
        let diff = ctx.baselines.read(|b| diff_rows(&b.captures, &desired));

        if !diff.upsert.is_empty() {
            ctx.call(ctx.rows.upsert_captures(&diff.upsert)).await?;
            ctx.baselines.update(|b| {
                for row in &diff.upsert {
                    b.captures.insert(row.id, row.clone());
                }
            });
        }

        let photos = self.push_photos(project_id, &snapshot).await?;

        if !diff.delete.is_empty() {
            ctx.call(ctx.rows.delete_rows(Table::SceneCaptures, &diff.delete))
                .await?;
            ctx.baselines.update(|b| {
                for id in &diff.delete {
                    b.forget_capture(*id);
                }
            });
        }

        Ok(PushReport {
            upserted: diff.upsert.len(),
            deleted: diff.delete.len() + photos.deleted,
            photos_uploaded: photos.uploaded,
            photo_failures: photos.failed,
            ..PushReport::default()
        })
    }

    /// Upload new capture photos and delete removed ones.
    async fn push_photos(
        &self,
        project_id: EntityId,
        snapshot: &ProjectState,
    ) -> Result<PhotoOutcome, SyncError> {
        let ctx = &self.ctx;
        let (candidates, removed) = ctx.baselines.read(|b| {
            let candidates: Vec<(EntityId, Photo)> = snapshot
                .captures
                .values()
                .flat_map(|c| c.photos.iter().map(move |p| (c.id, p)))
                .filter(|(_, p)| !b.photos.contains_key(&p.id))
                .map(|(capture_id, p)| (capture_id, p.clone()))
                .collect();
            let removed: Vec<EntityId> = b
                .photos
                .iter()
                .filter(|(photo_id, capture_id)| {
                    snapshot
                        .capture_by_id(**capture_id)
                        .is_some_and(|c| !c.photos.contains(**photo_id))
                })
                .map(|(photo_id, _)| *photo_id)
                .collect();
            (candidates, removed)
        });

        let mut outcome = PhotoOutcome::default();
        let mut placed: Vec<(EntityId, EntityId, String)> = Vec::new();

        if !candidates.is_empty() {
            let ids: Vec<EntityId> = candidates.iter().map(|(_, p)| p.id).collect();
            let existing: HashSet<EntityId> = ctx.call(ctx.rows.existing_photo_ids(&ids)).await?;

            for (capture_id, photo) in candidates {
                let path = photo_path(project_id, photo.id);
                if existing.contains(&photo.id) {
                    placed.push((capture_id, photo.id, path));
                    continue;
                }
                match self.upload_capture_photo(project_id, capture_id, &photo).await {
                    Ok(path) => {
                        outcome.uploaded += 1;
                        placed.push((capture_id, photo.id, path));
                    }
                    Err(e) => {
                        outcome.failed += 1;
                        tracing::warn!(capture_id = %capture_id, photo_id = %photo.id, error = %e, "Photo upload failed");
                    }
                }
            }
        }

        if !removed.is_empty() {
            ctx.call(ctx.rows.delete_rows(Table::Photos, &removed)).await?;
            outcome.deleted = removed.len();
        }

        ctx.baselines.update(|b| {
            for (capture_id, photo_id, _) in &placed {
                b.photos.insert(*photo_id, *capture_id);
            }
            for id in &removed {
                b.photos.remove(id);
            }
        });

        if !placed.is_empty() {
            ctx.store.apply_remote(|state| {
                let captures = Arc::make_mut(&mut state.captures);
                for (capture_id, photo_id, path) in placed {
                    let photo = captures
                        .values_mut()
                        .find(|c| c.id == capture_id)
                        .and_then(|c| c.photos.get_mut(photo_id));
                    // The bytes now live in the blob cache.
                    if let Some(photo) = photo {
                        photo.storage_path = Some(path);
                        photo.inline = None;
                    }
                }
            });
        }
        Ok(outcome)
    }

    async fn upload_capture_photo(
        &self,
        project_id: EntityId,
        capture_id: EntityId,
        photo: &Photo,
    ) -> Result<String, SyncError> {
        let path = self.upload_photo_binary(project_id, photo).await?;
        let row = mapper::photo::to_row(photo, capture_id, path.clone());
        self.ctx.call(self.ctx.rows.insert_photo(&row)).await?;
        Ok(path)
    }

    /// Upload a photo's bytes, preferring the blob cache over inline data.
    async fn upload_photo_binary(&self, project_id: EntityId, photo: &Photo) -> Result<String, SyncError> {
        let ctx = &self.ctx;
        let bytes = match ctx.cache.get(photo.id).await {
            Some(cached) => cached.blob,
            None => {
                let Some(inline) = photo.inline.as_ref() else {
                    return Err(SyncError::Storage(format!(
                        "no local bytes for photo {}",
                        photo.id
                    )));
                };
                if let Err(e) = ctx.cache.put(photo.id, inline, photo.angle).await {
                    tracing::warn!(photo_id = %photo.id, error = %e, "Caching captured photo failed");
                }
                inline.to_vec()
            }
        };
        let path = photo_path(project_id, photo.id);
        ctx.call(ctx.objects.upload(&path, bytes, JPEG_CONTENT_TYPE))
            .await?;
        Ok(path)
    }

    async fn push_schedule(&self, project_id: EntityId) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let Some(schedule) = (*ctx.store.snapshot().schedule).clone() else {
            return Ok(PushReport::default());
        };
        if let Some(path) = self.upload_pdf(project_id, "schedules", schedule.id, &schedule.pdf).await? {
            ctx.store.apply_remote(|state| {
                if let Some(s) = Arc::make_mut(&mut state.schedule).as_mut().filter(|s| s.id == schedule.id) {
                    s.pdf.storage_path = Some(path);
                }
            });
        }
        let Some(schedule) = (*ctx.store.snapshot().schedule).clone() else {
            return Ok(PushReport::default());
        };

        let row = mapper::document::schedule_to_row(&schedule, project_id)?;
        if ctx.baselines.read(|b| b.schedules.get(&row.id) == Some(&row)) {
            return Ok(PushReport::default());
        }
        ctx.call(ctx.rows.upsert_schedule(&row)).await?;
        ctx.baselines.update(|b| {
            b.schedules.insert(row.id, row);
        });
        Ok(PushReport {
            upserted: 1,
            ..PushReport::default()
        })
    }

    async fn push_script(&self, project_id: EntityId) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let Some(script) = (*ctx.store.snapshot().script).clone() else {
            return Ok(PushReport::default());
        };
        if let Some(path) = self.upload_pdf(project_id, "scripts", script.id, &script.pdf).await? {
            ctx.store.apply_remote(|state| {
                if let Some(s) = Arc::make_mut(&mut state.script).as_mut().filter(|s| s.id == script.id) {
                    s.pdf.storage_path = Some(path);
                }
            });
        }
        let Some(script) = (*ctx.store.snapshot().script).clone() else {
            return Ok(PushReport::default());
        };

        let row = mapper::document::script_to_row(&script, project_id);
        if ctx.baselines.read(|b| b.scripts.get(&row.id) == Some(&row)) {
            return Ok(PushReport::default());
        }
        ctx.call(ctx.rows.upsert_script(&row)).await?;
        ctx.baselines.update(|b| {
            b.scripts.insert(row.id, row);
        });
        Ok(PushReport {
            upserted: 1,
            ..PushReport::default()
        })
    }

    async fn push_call_sheets(&self, project_id: EntityId) -> Result<PushReport, SyncError> {
        let ctx = &self.ctx;
        let sheets = ctx.store.snapshot().call_sheets.clone();
        for sheet in sheets.iter() {
            if let Some(path) = self.upload_pdf(project_id, "call_sheets", sheet.id, &sheet.pdf).await? {
                ctx.store.apply_remote(|state| {
                    let sheets = Arc::make_mut(&mut state.call_sheets);
                    if let Some(s) = sheets.iter_mut().find(|s| s.id == sheet.id) {
                        s.pdf.storage_path = Some(path);
                    }
                });
            }
        }

        let snapshot = ctx.store.snapshot();
        let desired = snapshot
            .call_sheets
            .iter()
            .map(|s| mapper::document::call_sheet_to_row(s, project_id).map(|row| (s.id, row)))
            .collect::<Result<Vec<_>, _>>()?;
        let diff = ctx.baselines.read(|b| diff_rows(&b.call_sheets, &desired));

        if !diff.upsert.is_empty() {
            ctx.call(ctx.rows.upsert_call_sheets(&diff.upsert)).await?;
        }
        if !diff.delete.is_empty() {
            ctx.call(ctx.rows.delete_rows(Table::CallSheets, &diff.delete))
                .await?;
        }
        ctx.baselines.update(|b| {
            for row in &diff.upsert {
                b.call_sheets.insert(row.id, row.clone());
            }
            for id in &diff.delete {
                b.call_sheets.remove(id);
            }
        });
        Ok(PushReport {
            upserted: diff.upsert.len(),
            deleted: diff.delete.len(),
            ..PushReport::default()
        })
    }

    /// Upload a document PDF that has local bytes and no object yet.
    async fn upload_pdf(
        &self,
        project_id: EntityId,
        kind: &str,
        document_id: EntityId,
        pdf: &Attachment,
    ) -> Result<Option<String>, SyncError> {
        let Some(bytes) = pdf.bytes.as_ref().filter(|_| pdf.needs_upload()) else {
            return Ok(None);
        };
        let path = document_path(project_id, kind, document_id);
        self.ctx
            .call(self.ctx.objects.upload(&path, bytes.to_vec(), PDF_CONTENT_TYPE))
            .await?;
        tracing::info!(document_id = %document_id, path = %path, "Document PDF uploaded");
        Ok(Some(path))
    }
}

#[derive(Debug, Default)]
struct PhotoOutcome {
    uploaded: usize,
    failed: usize,
    deleted: usize,
}

#[async_trait]
impl PushLane for PushEngine {
    async fn push_pending(
        &self,
        project_id: EntityId,
        category: SyncCategory,
    ) -> Result<(), SyncError> {
        PushEngine::push_pending(self, project_id, category).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_wait_for_every_parent() {
        assert_eq!(
            dependencies(SyncCategory::Captures),
            &[SyncCategory::Characters, SyncCategory::Scenes, SyncCategory::Looks]
        );
        assert!(dependencies(SyncCategory::Characters).is_empty());
        assert!(dependencies(SyncCategory::Schedule).is_empty());
    }
}
