//! Merge rules shared by the pull and realtime engines.
//!
//! The server wins on every column it models. A local record the server
//! does not return is kept when the server has never seen it (a draft not
//! pushed yet) and dropped when it has (deleted by another client).

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use continuity_core::model::{CaptureKey, CaptureMap, SceneCapture, Schedule, ScriptUpload};
use continuity_core::EntityId;
use continuity_db::models::{CaptureRow, PhotoRow, ScheduleRow, ScriptUploadRow};

use crate::config::ScheduleMergePolicy;
use crate::error::MapperError;
use crate::mapper;

/// Merge a server listing into a local list.
///
/// Local order is kept. Items the server returned are rebuilt from their
/// row (with the local item passed as `existing`), server items new to
/// this client are appended in server order.
pub fn merge_list<T, R>(
    local: &[T],
    server: &[R],
    local_id: impl Fn(&T) -> EntityId,
    row_id: impl Fn(&R) -> EntityId,
    known: impl Fn(EntityId) -> bool,
    mut convert: impl FnMut(&R, Option<&T>) -> Result<T, MapperError>,
) -> Result<Vec<T>, MapperError>
where
    T: Clone,
{
    let by_id: HashMap<EntityId, &R> = server.iter().map(|r| (row_id(r), r)).collect();
    let mut out = Vec::with_capacity(local.len().max(server.len()));
    let mut placed = HashSet::new();

    for item in local {
        let id = local_id(item);
        match by_id.get(&id) {
            Some(row) => {
                if placed.insert(id) {
                    out.push(convert(row, Some(item))?);
                }
            }
            None if known(id) => {}
            None => out.push(item.clone()),
        }
    }
    for row in server {
        if placed.insert(row_id(row)) {
            out.push(convert(row, None)?);
        }
    }
    Ok(out)
}

/// Replace the item with the same id, or append it.
pub fn upsert_by_id<T>(list: &mut Vec<T>, item: T, id: impl Fn(&T) -> EntityId) {
    let wanted = id(&item);
    match list.iter_mut().find(|x| id(x) == wanted) {
        Some(slot) => *slot = item,
        None => list.push(item),
    }
}

/// Rebase an edited junction set onto the server's.
///
/// The result is the server set plus what this client added since `base`,
/// minus what it removed since `base`. Local order is kept and server
/// entries new to this client are appended. A parent never synced has an
/// empty base, so its links are added to whatever the server holds.
pub fn rebase_links<T: Ord + Clone>(
    local: &[T],
    base: Option<&BTreeSet<T>>,
    server: &BTreeSet<T>,
) -> Vec<T> {
    let empty = BTreeSet::new();
    let base = base.unwrap_or(&empty);
    let mut out: Vec<T> = local
        .iter()
        .filter(|x| server.contains(x) || !base.contains(x))
        .cloned()
        .collect();
    for x in server {
        if !base.contains(x) && !local.contains(x) {
            out.push(x.clone());
        }
    }
    out
}

/// Result of merging the server's captures.
pub struct CaptureMerge {
    pub captures: CaptureMap,
    /// Server capture ids now represented locally.
    pub adopted: Vec<EntityId>,
    /// Adopted ids whose local capture was kept as is (unpushed edit).
    pub kept: Vec<EntityId>,
}

/// Merge server capture rows (one project's worth) into the local map.
///
/// The server may hold several captures for one scene/character pair; the
/// one matching the local id wins, otherwise the latest. Local photos not
/// uploaded yet are carried over onto the winner. A local capture for
/// which `keep_local` holds is left untouched.
pub fn merge_captures(
    local: &CaptureMap,
    server: &[CaptureRow],
    photos: &HashMap<EntityId, Vec<PhotoRow>>,
    known: impl Fn(EntityId) -> bool,
    keep_local: impl Fn(&SceneCapture) -> bool,
) -> Result<CaptureMerge, MapperError> {
    let mut groups: BTreeMap<CaptureKey, Vec<&CaptureRow>> = BTreeMap::new();
    for row in server {
        groups
            .entry(CaptureKey::new(row.scene_id, row.character_id))
            .or_default()
            .push(row);
    }

    let mut captures = CaptureMap::new();
    let mut adopted = Vec::new();
    let mut kept = Vec::new();

    for (key, rows) in &groups {
        let existing = local.get(key);
        let winner = existing
            .and_then(|c| rows.iter().find(|r| r.id == c.id))
            .or_else(|| rows.iter().max_by_key(|r| (r.captured_at, r.id)));
        let Some(winner) = winner else { continue };

        match existing {
            Some(draft) if draft.id != winner.id && !known(draft.id) => {
                captures.insert(*key, draft.clone());
            }
            Some(edited) if edited.id == winner.id && keep_local(edited) => {
                captures.insert(*key, edited.clone());
                adopted.push(winner.id);
                kept.push(winner.id);
            }
            _ => {
                let server_photos = photos.get(&winner.id).map(Vec::as_slice).unwrap_or(&[]);
                captures.insert(*key, mapper::capture::from_row(winner, Some(server_photos), existing)?);
                adopted.push(winner.id);
            }
        }
    }

    for (key, capture) in local {
        if !groups.contains_key(key) && !known(capture.id) {
            captures.insert(*key, capture.clone());
        }
    }

    Ok(CaptureMerge {
        captures,
        adopted,
        kept,
    })
}

/// Apply one capture row delivered by the realtime feed.
///
/// Returns `false` when the row loses to the local capture for its pair.
pub fn merge_capture_row(
    captures: &mut CaptureMap,
    row: &CaptureRow,
    known: impl Fn(EntityId) -> bool,
) -> Result<bool, MapperError> {
    let key = CaptureKey::new(row.scene_id, row.character_id);
    let existing = captures.get(&key);
    if let Some(local) = existing.filter(|c| c.id != row.id) {
        let newer = (row.captured_at, row.id) > (local.captured_at, local.id);
        if !known(local.id) || !newer {
            return Ok(false);
        }
    }
    // A capture moved to another pair leaves its old slot.
    let moved: Vec<CaptureKey> = captures
        .iter()
        .filter(|(k, c)| c.id == row.id && **k != key)
        .map(|(k, _)| *k)
        .collect();
    let previous = moved.first().and_then(|k| captures.get(k)).cloned();
    for k in moved {
        captures.remove(&k);
    }
    let existing = captures
        .get(&key)
        .filter(|c| c.id == row.id)
        .cloned()
        .or(previous);
    let merged = mapper::capture::from_row(row, None, existing.as_ref())?;
    captures.insert(key, merged);
    Ok(true)
}

/// Reconcile the local schedule with the server's latest.
pub fn merge_schedule(
    local: Option<&Schedule>,
    server: Option<&ScheduleRow>,
    known: impl Fn(EntityId) -> bool,
    policy: ScheduleMergePolicy,
) -> Result<Option<Schedule>, MapperError> {
    let Some(row) = server else {
        return Ok(local.filter(|s| !known(s.id)).cloned());
    };
    match local {
        Some(s) if policy == ScheduleMergePolicy::KeepLocalIfNonEmpty && s.has_days() => {
            Ok(Some(s.clone()))
        }
        Some(s) if s.id != row.id && s.uploaded_at > row.uploaded_at => Ok(Some(s.clone())),
        _ => mapper::document::schedule_from_row(row, local).map(Some),
    }
}

/// Reconcile the local script with the server's latest; newest wins.
pub fn merge_script(
    local: Option<&ScriptUpload>,
    server: Option<&ScriptUploadRow>,
    known: impl Fn(EntityId) -> bool,
) -> Result<Option<ScriptUpload>, MapperError> {
    let Some(row) = server else {
        return Ok(local.filter(|s| !known(s.id)).cloned());
    };
    match local {
        Some(s) if s.id != row.id && s.uploaded_at > row.uploaded_at => Ok(Some(s.clone())),
        _ => mapper::document::script_from_row(row, local).map(Some),
    }
}
