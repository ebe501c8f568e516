//! `get-locations`/`get-location-segments` (§4.2, §4.6 scenario 6): traces a
//! path's name backward across renames/copies from a peg revision, crossing
//! lineage boundaries the same way `PathHistory::copy_from` does for
//! `emit_add`'s copy-from annotation, just walked the other direction.

use std::sync::Arc;

use svn_objstore::Repository;

use crate::engine::Engine;
use crate::error::Result;
use crate::path_history::PathHistory;

/// One stretch of a path's lineage under a single name, inclusive of both
/// ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub path: Vec<u8>,
    pub start: u64,
    pub end: u64,
}

/// Walks `path`'s lineage backward from `end_revision` (capped at
/// `peg_revision`) down to `start_revision`, crossing renames via
/// `PathHistory::copy_from`. Segments are returned oldest first, each
/// clipped to `start_revision`.
pub fn location_segments(
    engine: &Engine,
    history: &PathHistory,
    path: &[u8],
    peg_revision: u64,
    start_revision: u64,
    end_revision: u64,
) -> Result<Vec<PathSegment>> {
    let mut segments = Vec::new();
    let mut current_path = path.to_vec();
    let mut end = end_revision.min(peg_revision);

    loop {
        if end < start_revision {
            break;
        }

        let creation = creation_revision(engine, &current_path, end)?;
        let start = creation.max(start_revision);
        segments.push(PathSegment {
            path: current_path.clone(),
            start,
            end,
        });

        if creation <= start_revision {
            break;
        }

        match history.copy_from(&current_path, creation)? {
            Some((source_path, source_rev)) => {
                current_path = source_path;
                end = source_rev;
            }
            None => break,
        }
    }

    segments.reverse();
    Ok(segments)
}

/// `get-locations`: the path's location at each of `revisions`, as seen
/// from `peg_revision`. A revision outside every traced segment (the path
/// didn't exist there under this lineage) is simply omitted from the
/// result, matching how a gap in a path's history is reported.
pub fn get_locations(
    engine: &Engine,
    history: &PathHistory,
    path: &[u8],
    peg_revision: u64,
    revisions: &[u64],
) -> Result<Vec<(u64, Vec<u8>)>> {
    let start = revisions.iter().copied().min().unwrap_or(0);
    let segments = location_segments(engine, history, path, peg_revision, start, peg_revision)?;

    let mut out = Vec::new();
    for &revision in revisions {
        if let Some(segment) = segments
            .iter()
            .find(|s| revision >= s.start && revision <= s.end)
        {
            out.push((revision, segment.path.clone()));
        }
    }
    out.sort_by_key(|(revision, _)| std::cmp::Reverse(*revision));
    Ok(out)
}

/// The earliest revision `<= at` at which `path` was continuously present
/// without having changed name: its creation, or most recent re-creation,
/// under this exact name.
fn creation_revision(engine: &Engine, path: &[u8], at: u64) -> Result<u64> {
    if at == 0 {
        return Ok(0);
    }

    let mut creation = at;
    let mut r = at;
    while r > 0 {
        if !present_at(&engine.repo(), engine, path, r - 1)? {
            break;
        }
        creation = r - 1;
        r -= 1;
    }
    Ok(creation)
}

fn present_at(repo: &Arc<std::sync::Mutex<Repository>>, engine: &Engine, path: &[u8], revision: u64) -> Result<bool> {
    let root = engine.tree_for_revision(revision)?;
    let repo = repo.lock().unwrap();
    Ok(crate::paths::resolve(&repo, root, path)?.is_some())
}
