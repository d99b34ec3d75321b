use crate::errors::AppError;
use crate::models::{AppliedFile, ApplyMode, ApplySummary, ChangeSet, SkippedEntry};
use crate::session;
use similar::TextDiff;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

const OLD_ARCHIVE_DIR: &str = "old";
const NEW_ARCHIVE_DIR: &str = "new";
const ROLLED_BACK_SUMMARY: &str = "apply_summary_rolled_back.json";

/// Each overwrite of a session gets its own `apply_<stamp>` folder with archives and summary.
pub const APPLY_DIR_PREFIX: &str = "apply_";

/// Loads a persisted `response.json` and overwrites every file it carries full content for.
///
/// The run is recorded in a fresh `apply_<stamp>` folder under `session_dir`, so applying
/// the same session again never clobbers an earlier archive.
pub async fn apply_from_file(
    response_json: &Path,
    project_root: &Path,
    session_dir: &Path,
) -> Result<ApplySummary, AppError> {
    let change_set = read_change_set(response_json).await?;
    let (apply_dir, stamp) = new_apply_dir(session_dir, &session::timestamp());
    let summary = apply_change_set(&change_set, project_root, &apply_dir, &stamp).await?;
    session::write_json(&apply_dir.join(summary.file_name()), &summary).await?;
    Ok(summary)
}

/// First unused `apply_<timestamp>[_NN]` folder name; the stamp doubles as the backup suffix.
fn new_apply_dir(session_dir: &Path, timestamp: &str) -> (PathBuf, String) {
    let mut stamp = timestamp.to_string();
    let mut attempt = 1;
    while session_dir.join(format!("{APPLY_DIR_PREFIX}{stamp}")).exists() {
        stamp = format!("{timestamp}_{attempt:02}");
        attempt += 1;
    }
    (session_dir.join(format!("{APPLY_DIR_PREFIX}{stamp}")), stamp)
}

/// Reads a change set from disk, rejecting files without any `code_change` entry.
pub async fn read_change_set(response_json: &Path) -> Result<ChangeSet, AppError> {
    if !response_json.exists() {
        return Err(AppError::MissingFile {
            what: "response file",
            path: response_json.to_path_buf(),
        });
    }
    let text = fs::read_to_string(response_json).await?;
    let change_set: ChangeSet = serde_json::from_str(&text)?;
    if change_set.is_empty() {
        return Err(AppError::EmptyChangeSet(response_json.display().to_string()));
    }
    Ok(change_set)
}

/// Writes full-file replacements under `project_root`.
///
/// Existing files are copied to `<file>.bak.<timestamp>` and to `archive_dir/old/`, and
/// the new content is mirrored into `archive_dir/new/`. Entries with only line edits are
/// skipped. A failing write aborts the batch; files already written stay written.
pub async fn apply_change_set(
    change_set: &ChangeSet,
    project_root: &Path,
    archive_dir: &Path,
    timestamp: &str,
) -> Result<ApplySummary, AppError> {
    if change_set.is_empty() {
        return Err(AppError::EmptyChangeSet("parsed response".to_string()));
    }

    let mut summary = ApplySummary::new(ApplyMode::Overwrite);
    for (rel_path, destination, code) in plan(change_set, project_root, &mut summary) {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let created = !destination.exists();
        let mut backup = None;
        let mut archived_previous = None;
        if !created {
            let previous = fs::read(&destination).await?;

            let backup_path = unused_backup_path(&destination, timestamp);
            fs::write(&backup_path, &previous).await?;
            log::info!("Backup created: {}", backup_path.display());
            backup = Some(backup_path);

            let old_copy = archive_dir.join(OLD_ARCHIVE_DIR).join(&rel_path);
            write_creating_parents(&old_copy, &previous).await?;
            archived_previous = Some(old_copy);
        }

        let content = with_trailing_newline(code);
        fs::write(&destination, content.as_bytes()).await?;
        let new_copy = archive_dir.join(NEW_ARCHIVE_DIR).join(&rel_path);
        write_creating_parents(&new_copy, content.as_bytes()).await?;
        log::info!("Updated file: {}", destination.display());

        summary.updated_files.push(destination.clone());
        summary.files.push(AppliedFile {
            path: rel_path,
            destination,
            created,
            backup,
            archived_previous,
            archived_new: Some(new_copy),
            diff: None,
        });
    }

    Ok(summary)
}

/// Dry run: unified diffs of what [`apply_change_set`] would write.
pub async fn preview_change_set(
    change_set: &ChangeSet,
    project_root: &Path,
) -> Result<ApplySummary, AppError> {
    if change_set.is_empty() {
        return Err(AppError::EmptyChangeSet("parsed response".to_string()));
    }

    let mut summary = ApplySummary::new(ApplyMode::DryRun);
    for (rel_path, destination, code) in plan(change_set, project_root, &mut summary) {
        let created = !destination.exists();
        let current = if created {
            String::new()
        } else {
            String::from_utf8_lossy(&fs::read(&destination).await?).into_owned()
        };
        let content = with_trailing_newline(code);
        let diff = TextDiff::from_lines(current.as_str(), content.as_str())
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{rel_path}"), &format!("b/{rel_path}"))
            .to_string();

        summary.updated_files.push(destination.clone());
        summary.files.push(AppliedFile {
            path: rel_path,
            destination,
            created,
            backup: None,
            archived_previous: None,
            archived_new: None,
            diff: Some(diff),
        });
    }

    Ok(summary)
}

/// Undoes every pending apply of the newest session that has one, newest first.
///
/// Files end up as they were before the session's first apply; files an apply created
/// are deleted.
pub async fn rollback_last_apply(out_dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let summary_name = ApplySummary::new(ApplyMode::Overwrite).file_name();
    let session_dir = session::find_latest_session_where(out_dir, |dir| {
        !pending_applies(dir, summary_name).is_empty()
    })
    .ok_or_else(|| {
        AppError::RollbackError(format!("No applied changes recorded under {}", out_dir.display()))
    })?;

    let mut restored: Vec<PathBuf> = Vec::new();
    for apply_dir in pending_applies(&session_dir, summary_name).iter().rev() {
        let summary_path = apply_dir.join(summary_name);
        let summary: ApplySummary =
            serde_json::from_str(&fs::read_to_string(&summary_path).await?)?;
        log::info!("Rolling back {}", apply_dir.display());

        for file in summary.files.iter().rev() {
            if undo_file(file).await? && !restored.contains(&file.destination) {
                restored.push(file.destination.clone());
            }
        }

        // Keep the record but make sure the same apply is not undone twice.
        fs::rename(&summary_path, apply_dir.join(ROLLED_BACK_SUMMARY)).await?;
    }

    let session_summary = session_dir.join(summary_name);
    if session_summary.exists() {
        fs::rename(&session_summary, session_dir.join(ROLLED_BACK_SUMMARY)).await?;
    }
    Ok(restored)
}

/// `apply_*` folders of a session that still hold an overwrite summary, oldest first.
fn pending_applies(session_dir: &Path, summary_name: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(session_dir) else {
        return Vec::new();
    };
    let mut applies: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(APPLY_DIR_PREFIX))
        })
        .map(|entry| entry.path())
        .filter(|dir| dir.join(summary_name).is_file())
        .collect();
    applies.sort();
    applies
}

/// Puts one file back; returns whether anything was changed.
async fn undo_file(file: &AppliedFile) -> Result<bool, AppError> {
    if file.created {
        if file.destination.exists() {
            fs::remove_file(&file.destination).await?;
            log::info!("Deleted new file: {}", file.destination.display());
        }
        return Ok(true);
    }

    match &file.archived_previous {
        Some(previous) if previous.exists() => {
            fs::copy(previous, &file.destination).await?;
            log::info!("Restored: {}", file.destination.display());
            Ok(true)
        }
        _ => {
            log::warn!(
                "No archived copy for {}, leaving it as is",
                file.destination.display()
            );
            Ok(false)
        }
    }
}

/// Applicable `(relative path, destination, code)` triples; everything else lands in `skipped`.
fn plan<'a>(
    change_set: &'a ChangeSet,
    project_root: &Path,
    summary: &mut ApplySummary,
) -> Vec<(String, PathBuf, &'a str)> {
    let mut planned = Vec::new();
    for (rel_path, change) in &change_set.code_change {
        let Some(code) = change.full_code.as_deref().filter(|code| !code.is_empty()) else {
            log::warn!("Missing full-file content for {}, skipping", rel_path);
            summary.skipped.push(SkippedEntry {
                path: rel_path.clone(),
                reason: "no full-file content; line edits are not applied".to_string(),
            });
            continue;
        };
        let Some(destination) = resolve_destination(project_root, rel_path) else {
            log::warn!("Refusing to write outside the project: {}", rel_path);
            summary.skipped.push(SkippedEntry {
                path: rel_path.clone(),
                reason: "path is absolute or leaves the project root".to_string(),
            });
            continue;
        };
        planned.push((rel_path.clone(), destination, code));
    }
    planned
}

fn resolve_destination(project_root: &Path, rel_path: &str) -> Option<PathBuf> {
    let rel = Path::new(rel_path);
    let only_normal = rel
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if rel_path.is_empty() || !only_normal {
        return None;
    }
    Some(project_root.join(rel))
}

fn backup_path_for(destination: &Path, timestamp: &str) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".bak.{timestamp}"));
    destination.with_file_name(name)
}

/// `<file>.bak.<timestamp>`, with a `.N` suffix when that backup already exists.
fn unused_backup_path(destination: &Path, timestamp: &str) -> PathBuf {
    let base = backup_path_for(destination, timestamp);
    let mut candidate = base.clone();
    let mut attempt = 1;
    while candidate.exists() {
        let mut name = base.as_os_str().to_os_string();
        name.push(format!(".{attempt}"));
        candidate = PathBuf::from(name);
        attempt += 1;
    }
    candidate
}

fn with_trailing_newline(code: &str) -> String {
    if code.ends_with('\n') {
        code.to_string()
    } else {
        format!("{code}\n")
    }
}

async fn write_creating_parents(path: &Path, contents: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, contents).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_processing::response_parser;
    use crate::models::FileChange;
    use tempfile::TempDir;

    fn change_set(entries: &[(&str, Option<&str>)]) -> ChangeSet {
        let mut change_set = ChangeSet::default();
        for (path, code) in entries {
            change_set.code_change.insert(
                path.to_string(),
                FileChange {
                    full_code: code.map(str::to_string),
                    ..Default::default()
                },
            );
        }
        change_set
    }

    fn read(path: &Path) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn test_apply_overwrites_with_backup_and_archives() {
        let project = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let root = project.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/App.js"), "old();\n").unwrap();

        let changes = change_set(&[
            ("src/App.js", Some("fixed();")),
            ("src/new/Helper.ts", Some("export {};\n")),
        ]);
        let summary = apply_change_set(&changes, root, archive.path(), "20250101_120000")
            .await
            .unwrap();

        assert_eq!(summary.mode, ApplyMode::Overwrite);
        assert_eq!(summary.updated_files.len(), 2);
        assert_eq!(read(&root.join("src/App.js")), "fixed();\n");
        assert_eq!(read(&root.join("src/new/Helper.ts")), "export {};\n");
        assert_eq!(read(&root.join("src/App.js.bak.20250101_120000")), "old();\n");
        assert_eq!(read(&archive.path().join("old/src/App.js")), "old();\n");
        assert_eq!(read(&archive.path().join("new/src/App.js")), "fixed();\n");
        assert!(!archive.path().join("old/src/new/Helper.ts").exists());

        let helper = summary
            .files
            .iter()
            .find(|file| file.path == "src/new/Helper.ts")
            .unwrap();
        assert!(helper.created);
        assert!(helper.backup.is_none());
    }

    #[tokio::test]
    async fn test_apply_skips_line_edit_only_and_escaping_paths() {
        let project = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let changes = change_set(&[
            ("src/hunks.js", None),
            ("src/empty.js", Some("")),
            ("../outside.js", Some("x")),
            ("/etc/passwd.js", Some("x")),
        ]);

        let summary = apply_change_set(&changes, project.path(), archive.path(), "ts")
            .await
            .unwrap();

        assert!(summary.updated_files.is_empty());
        assert_eq!(summary.skipped.len(), 4);
        assert!(!project.path().join("src").exists());
    }

    #[tokio::test]
    async fn test_apply_rejects_empty_change_set() {
        let project = TempDir::new().unwrap();
        let err = apply_change_set(&ChangeSet::default(), project.path(), project.path(), "ts")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EmptyChangeSet(_)));
    }

    #[tokio::test]
    async fn test_apply_from_file_missing_and_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("response.json");
        let err = apply_from_file(&missing, dir.path(), dir.path()).await.unwrap_err();
        assert!(matches!(err, AppError::MissingFile { .. }));

        std::fs::write(&missing, r#"{"code_change": {}, "root": "", "fix": "", "raw": ""}"#)
            .unwrap();
        let err = apply_from_file(&missing, dir.path(), dir.path()).await.unwrap_err();
        assert!(matches!(err, AppError::EmptyChangeSet(_)));
    }

    #[tokio::test]
    async fn test_json_round_trip_applies_same_files() {
        let response = "UPDATED FILES\nsrc/a.js\nconst a = 1;\nsrc/b.tsx\n<B />\nCHANGES\nsrc/c.js - 4\n+ c()\n";
        let parsed = response_parser::parse(response);

        let direct_root = TempDir::new().unwrap();
        let direct = apply_change_set(&parsed, direct_root.path(), direct_root.path(), "ts")
            .await
            .unwrap();

        let replay_root = TempDir::new().unwrap();
        let json_path = replay_root.path().join("response.json");
        std::fs::write(&json_path, serde_json::to_string_pretty(&parsed).unwrap()).unwrap();
        let replayed = apply_from_file(&json_path, replay_root.path(), replay_root.path())
            .await
            .unwrap();

        let rel = |summary: &ApplySummary| {
            summary
                .files
                .iter()
                .map(|file| file.path.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(rel(&direct), vec!["src/a.js", "src/b.tsx"]);
        assert_eq!(rel(&direct), rel(&replayed));
        for path in rel(&direct) {
            assert_eq!(
                read(&direct_root.path().join(&path)),
                read(&replay_root.path().join(&path))
            );
        }
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let project = TempDir::new().unwrap();
        let changes = change_set(&[("src/a.ts", Some("let a = 2;"))]);
        std::fs::create_dir_all(project.path().join("src")).unwrap();
        std::fs::write(project.path().join("src/a.ts"), "let a = 1;\n").unwrap();

        apply_change_set(&changes, project.path(), &project.path().join("s1"), "first")
            .await
            .unwrap();
        let once = read(&project.path().join("src/a.ts"));
        apply_change_set(&changes, project.path(), &project.path().join("s2"), "second")
            .await
            .unwrap();

        assert_eq!(read(&project.path().join("src/a.ts")), once);
        assert_eq!(read(&project.path().join("src/a.ts.bak.first")), "let a = 1;\n");
        assert_eq!(read(&project.path().join("src/a.ts.bak.second")), "let a = 2;\n");
    }

    #[tokio::test]
    async fn test_preview_leaves_tree_untouched() {
        let project = TempDir::new().unwrap();
        std::fs::create_dir_all(project.path().join("src")).unwrap();
        std::fs::write(project.path().join("src/a.js"), "one\ntwo\n").unwrap();
        let changes = change_set(&[("src/a.js", Some("one\nthree"))]);

        let summary = preview_change_set(&changes, project.path()).await.unwrap();

        assert_eq!(summary.mode, ApplyMode::DryRun);
        let diff = summary.files[0].diff.as_deref().unwrap();
        assert!(diff.contains("--- a/src/a.js"));
        assert!(diff.contains("-two"));
        assert!(diff.contains("+three"));
        assert_eq!(read(&project.path().join("src/a.js")), "one\ntwo\n");
    }

    /// Session folder holding a `response.json` built from `entries`.
    fn session_with_response(out_dir: &Path, entries: &[(&str, Option<&str>)]) -> PathBuf {
        let session_dir = out_dir.join("analysis_20250101_120000");
        std::fs::create_dir_all(&session_dir).unwrap();
        std::fs::write(
            session_dir.join("response.json"),
            serde_json::to_string_pretty(&change_set(entries)).unwrap(),
        )
        .unwrap();
        session_dir
    }

    #[tokio::test]
    async fn test_rollback_restores_and_deletes_created() {
        let out_dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("keep.js"), "original\n").unwrap();
        let session_dir = session_with_response(
            out_dir.path(),
            &[("keep.js", Some("changed")), ("fresh.js", Some("new"))],
        );

        apply_from_file(&session_dir.join("response.json"), project.path(), &session_dir)
            .await
            .unwrap();
        let restored = rollback_last_apply(out_dir.path()).await.unwrap();

        assert_eq!(restored.len(), 2);
        assert_eq!(read(&project.path().join("keep.js")), "original\n");
        assert!(!project.path().join("fresh.js").exists());
        assert!(matches!(
            rollback_last_apply(out_dir.path()).await,
            Err(AppError::RollbackError(_))
        ));
    }

    #[tokio::test]
    async fn test_rollback_after_repeated_apply_restores_original() {
        let out_dir = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::create_dir_all(project.path().join("src")).unwrap();
        std::fs::write(project.path().join("src/a.js"), "ORIGINAL\n").unwrap();
        let session_dir = session_with_response(
            out_dir.path(),
            &[("src/a.js", Some("NEW")), ("src/b.js", Some("created"))],
        );
        let response_json = session_dir.join("response.json");

        apply_from_file(&response_json, project.path(), &session_dir).await.unwrap();
        apply_from_file(&response_json, project.path(), &session_dir).await.unwrap();

        let applies = pending_applies(&session_dir, "apply_summary_overwrite.json");
        assert_eq!(applies.len(), 2);
        assert_eq!(read(&applies[0].join("old/src/a.js")), "ORIGINAL\n");
        assert_eq!(read(&applies[1].join("old/src/a.js")), "NEW\n");

        rollback_last_apply(out_dir.path()).await.unwrap();

        assert_eq!(read(&project.path().join("src/a.js")), "ORIGINAL\n");
        assert!(!project.path().join("src/b.js").exists());
        assert!(pending_applies(&session_dir, "apply_summary_overwrite.json").is_empty());
    }

    #[test]
    fn test_apply_dir_and_backup_never_reuse_a_name() {
        let dir = TempDir::new().unwrap();
        let (first, stamp) = new_apply_dir(dir.path(), "20250101_120000");
        assert_eq!(stamp, "20250101_120000");
        std::fs::create_dir_all(&first).unwrap();
        let (second, stamp) = new_apply_dir(dir.path(), "20250101_120000");
        assert_eq!(stamp, "20250101_120000_01");
        assert!(first < second);

        let file = dir.path().join("a.js");
        std::fs::write(dir.path().join("a.js.bak.ts"), "first").unwrap();
        assert_eq!(unused_backup_path(&file, "ts"), dir.path().join("a.js.bak.ts.1"));
    }

    #[test]
    fn test_backup_path_keeps_extension() {
        assert_eq!(
            backup_path_for(Path::new("/p/src/App.js"), "20250101_000000"),
            PathBuf::from("/p/src/App.js.bak.20250101_000000")
        );
    }
}
