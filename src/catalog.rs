//! Snapshot catalog / resolver (§4.11): `ListAll`, `Find`, `FindOne`.
//!
//! Listing is an O(N) scan of `.jvs/descriptors/` (§9's "catalog
//! indexing" note: a cache may be layered on top later, but it must never
//! become authoritative — this module is always correct on its own).

use chrono::{DateTime, Utc};

use crate::error::JvsError;
use crate::model::Descriptor;
use crate::repo::Repo;

/// Minimum length of a short snapshot-ID prefix accepted by [`find_one`]
/// (§4.11 priority 2).
const MIN_SHORT_ID_LEN: usize = 8;

/// `ListAll(repo)` (§4.11): descriptors sorted by `created_at` descending.
/// Malformed descriptor files are logged and skipped.
///
/// # Errors
/// Returns an I/O error if the descriptors directory cannot be read.
pub fn list_all(repo: &Repo) -> Result<Vec<Descriptor>, JvsError> {
    let dir = repo.jvs_dir().join("descriptors");
    let mut out = Vec::new();
    let entries = match std::fs::read_dir(&dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => {
            return Err(JvsError::Io {
                context: "reading descriptors directory".to_owned(),
                source: e,
            })
        }
    };
    for entry in entries {
        let entry = entry.map_err(|source| JvsError::Io {
            context: "reading descriptors directory entry".to_owned(),
            source,
        })?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Descriptor>(&bytes) {
                Ok(d) => out.push(d),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping malformed descriptor");
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable descriptor");
            }
        }
    }
    out.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.snapshot_id.cmp(&a.snapshot_id))
    });
    Ok(out)
}

/// A `Find` filter (§4.11): every populated field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub note_substring: Option<String>,
    pub tag: Option<String>,
    pub worktree_name: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

/// `Find(filter)` (§4.11).
///
/// # Errors
/// Propagates [`list_all`]'s errors.
pub fn find(repo: &Repo, filter: &Filter) -> Result<Vec<Descriptor>, JvsError> {
    let all = list_all(repo)?;
    Ok(all
        .into_iter()
        .filter(|d| {
            filter
                .note_substring
                .as_ref()
                .is_none_or(|s| d.note.contains(s.as_str()))
        })
        .filter(|d| {
            filter
                .tag
                .as_ref()
                .is_none_or(|t| d.tags.iter().any(|tag| tag.as_str() == t))
        })
        .filter(|d| {
            filter
                .worktree_name
                .as_ref()
                .is_none_or(|w| d.worktree_name.as_str() == w)
        })
        .filter(|d| filter.created_after.is_none_or(|t| d.created_at >= t))
        .filter(|d| filter.created_before.is_none_or(|t| d.created_at <= t))
        .collect())
}

/// `FindOne(ref)` (§4.11): resolve a reference by priority — (1) full
/// snapshot ID, (2) short ID prefix (≥8 hex), (3) exact tag, (4) note
/// prefix. Each priority level that matches more than once is an
/// ambiguity error at that level; priorities are not mixed.
///
/// # Errors
/// Returns [`JvsError::NotFound`] if nothing matches any priority, or
/// [`JvsError::Ambiguous`] if a priority level matches more than once.
pub fn find_one(repo: &Repo, reference: &str) -> Result<Descriptor, JvsError> {
    let all = list_all(repo)?;

    // Priority 1: full snapshot ID.
    if let Some(d) = all.iter().find(|d| d.snapshot_id.as_str() == reference) {
        return Ok(d.clone());
    }

    // Priority 2: short ID prefix (>= 8 hex chars of the full ID string).
    if reference.len() >= MIN_SHORT_ID_LEN
        && reference.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
    {
        let matches: Vec<&Descriptor> = all
            .iter()
            .filter(|d| d.snapshot_id.as_str().starts_with(reference))
            .collect();
        match matches.len() {
            0 => {}
            1 => return Ok(matches[0].clone()),
            _ => {
                return Err(JvsError::Ambiguous {
                    reference: reference.to_owned(),
                    candidates: matches.iter().map(|d| d.snapshot_id.to_string()).collect(),
                })
            }
        }
    }

    // Priority 3: exact tag match.
    let tag_matches: Vec<&Descriptor> = all
        .iter()
        .filter(|d| d.tags.iter().any(|t| t.as_str() == reference))
        .collect();
    match tag_matches.len() {
        0 => {}
        1 => return Ok(tag_matches[0].clone()),
        _ => {
            return Err(JvsError::Ambiguous {
                reference: reference.to_owned(),
                candidates: tag_matches.iter().map(|d| d.snapshot_id.to_string()).collect(),
            })
        }
    }

    // Priority 4: note prefix (substring), must uniquely match.
    let note_matches: Vec<&Descriptor> = all.iter().filter(|d| d.note.contains(reference)).collect();
    match note_matches.len() {
        0 => Err(JvsError::NotFound {
            what: "snapshot".to_owned(),
            reference: reference.to_owned(),
        }),
        1 => Ok(note_matches[0].clone()),
        _ => Err(JvsError::Ambiguous {
            reference: reference.to_owned(),
            candidates: note_matches.iter().map(|d| d.snapshot_id.to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::WorktreeName;
    use crate::repo::Repo;
    use crate::snapshot::{create, CreateRequest};

    fn init_repo() -> (tempfile::TempDir, Repo) {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repo::init(dir.path().to_path_buf()).unwrap();
        (dir, repo)
    }

    #[test]
    fn list_all_sorts_newest_first() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let d1 = create(&repo, &main, &CreateRequest::default()).unwrap();
        std::fs::write(repo.worktree_payload_path(&main).join("a.txt"), b"x").unwrap();
        let d2 = create(&repo, &main, &CreateRequest::default()).unwrap();
        let all = list_all(&repo).unwrap();
        assert_eq!(all[0].snapshot_id, d2.snapshot_id);
        assert_eq!(all[1].snapshot_id, d1.snapshot_id);
    }

    #[test]
    fn find_one_resolves_full_id() {
        let (_dir, repo) = init_repo();
        let d = create(&repo, &WorktreeName::main(), &CreateRequest::default()).unwrap();
        let found = find_one(&repo, d.snapshot_id.as_str()).unwrap();
        assert_eq!(found.snapshot_id, d.snapshot_id);
    }

    #[test]
    fn find_one_resolves_short_prefix() {
        let (_dir, repo) = init_repo();
        let d = create(&repo, &WorktreeName::main(), &CreateRequest::default()).unwrap();
        let prefix = &d.snapshot_id.as_str()[..10];
        let found = find_one(&repo, prefix).unwrap();
        assert_eq!(found.snapshot_id, d.snapshot_id);
    }

    #[test]
    fn find_one_resolves_unique_tag() {
        let (_dir, repo) = init_repo();
        let req = CreateRequest {
            tags: vec![crate::ids::Tag::new("release").unwrap()],
            ..Default::default()
        };
        let d = create(&repo, &WorktreeName::main(), &req).unwrap();
        let found = find_one(&repo, "release").unwrap();
        assert_eq!(found.snapshot_id, d.snapshot_id);
    }

    #[test]
    fn find_one_ambiguous_tag_errors() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let req = CreateRequest {
            tags: vec![crate::ids::Tag::new("dup").unwrap()],
            ..Default::default()
        };
        create(&repo, &main, &req).unwrap();
        std::fs::write(repo.worktree_payload_path(&main).join("a.txt"), b"x").unwrap();
        create(&repo, &main, &req).unwrap();
        assert!(matches!(
            find_one(&repo, "dup"),
            Err(JvsError::Ambiguous { .. })
        ));
    }

    #[test]
    fn find_one_not_found() {
        let (_dir, repo) = init_repo();
        create(&repo, &WorktreeName::main(), &CreateRequest::default()).unwrap();
        assert!(matches!(
            find_one(&repo, "nonexistent-reference"),
            Err(JvsError::NotFound { .. })
        ));
    }

    #[test]
    fn find_filters_by_note_substring() {
        let (_dir, repo) = init_repo();
        let main = WorktreeName::main();
        let req1 = CreateRequest {
            note: "first release".to_owned(),
            ..Default::default()
        };
        create(&repo, &main, &req1).unwrap();
        std::fs::write(repo.worktree_payload_path(&main).join("a.txt"), b"x").unwrap();
        let req2 = CreateRequest {
            note: "bugfix".to_owned(),
            ..Default::default()
        };
        create(&repo, &main, &req2).unwrap();

        let filter = Filter {
            note_substring: Some("release".to_owned()),
            ..Default::default()
        };
        let found = find(&repo, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].note, "first release");
    }
}
