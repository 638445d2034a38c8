// Tests for file-info descriptors

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;

use fmcore::{config, FileInfo, FileType, MimeType, ShortcutItem, ShortcutKind, VfsFileInfo};

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn native_regular_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.txt", b"hello world");

    let fi = FileInfo::from_native_file(&path).unwrap();
    assert_eq!(fi.name(), "notes.txt");
    assert_eq!(fi.disp_name(), "notes.txt");
    assert_eq!(fi.size(), 11);
    assert!(fi.mtime() > 0);
    assert!(fi.is_native());
    assert!(fi.is_accessible());
    assert!(!fi.is_directory());
    assert!(!fi.is_symlink());
    assert!(!fi.is_hidden());

    let mime = fi.mime_type().unwrap();
    assert_eq!(mime.name(), "text/plain");
    assert!(fi.is_text());
    assert!(fi.can_thumbnail());

    assert_eq!(fi.disp_size(), Some("11 B"));
    let disp_mtime = fi.disp_mtime().unwrap();
    assert!(disp_mtime.contains(':'));
}

#[test]
fn native_missing_file_reports_errno() {
    let err = FileInfo::from_native_file(Path::new("/nonexistent/definitely/missing")).unwrap_err();
    assert_eq!(err.kind(), fmcore::IOErrorEnum::NotFound);
    assert!(err.to_string().contains("missing"));
}

#[test]
fn native_directory() {
    let dir = tempfile::tempdir().unwrap();
    let fi = FileInfo::from_native_file(dir.path()).unwrap();
    assert!(fi.is_directory());
    assert_eq!(fi.mime_type().unwrap().name(), "inode/directory");
    // Directories have no display size.
    assert!(fi.disp_size().is_none());
    assert!(!fi.can_thumbnail());
}

#[test]
fn native_symlink_carries_target() {
    let dir = tempfile::tempdir().unwrap();
    let target = write_file(dir.path(), "real.txt", b"data");
    let link = dir.path().join("link.txt");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let fi = FileInfo::from_native_file(&link).unwrap();
    assert!(fi.is_symlink());
    assert_eq!(fi.target(), Some(target.to_str().unwrap()));
}

#[test]
fn hidden_and_backup_files() {
    let dir = tempfile::tempdir().unwrap();
    let hidden = write_file(dir.path(), ".secret", b"x");
    let backup = write_file(dir.path(), "draft.txt~", b"x");

    let hidden_fi = FileInfo::from_native_file(&hidden).unwrap();
    assert!(hidden_fi.is_hidden());

    let backup_fi = FileInfo::from_native_file(&backup).unwrap();
    assert!(!backup_fi.is_hidden());

    config::update(|cfg| cfg.backup_as_hidden = true);
    assert!(backup_fi.is_hidden());
    config::update(|cfg| cfg.backup_as_hidden = false);
    assert!(!backup_fi.is_hidden());
}

#[test]
fn desktop_entry_overrides_name_and_icon() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "editor.desktop",
        b"[Desktop Entry]\nType=Application\nName=My Editor\nIcon=editor.png\nExec=editor %f\n",
    );

    let fi = FileInfo::from_native_file(&path).unwrap();
    assert!(fi.is_desktop_entry());
    assert_eq!(fi.disp_name(), "My Editor");
    assert_eq!(fi.icon().name(), "editor");
    assert!(!fi.can_thumbnail());
}

#[test]
fn executable_detection_requires_shebang_and_exec_bit() {
    let dir = tempfile::tempdir().unwrap();

    let script = write_file(dir.path(), "run.txt", b"#!/bin/sh\necho hi\n");
    let mut perms = std::fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&script, perms).unwrap();

    let fi = FileInfo::from_native_file(&script).unwrap();
    assert!(fi.is_text());
    assert!(fi.is_executable_type());

    // Same content without the execute bit is just text.
    let plain = write_file(dir.path(), "plain.txt", b"#!/bin/sh\necho hi\n");
    let fi = FileInfo::from_native_file(&plain).unwrap();
    assert!(!fi.is_executable_type());

    // Execute bit without a shebang is not enough either.
    let noshebang = write_file(dir.path(), "data.txt", b"just text");
    let mut perms = std::fs::metadata(&noshebang).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&noshebang, perms).unwrap();
    let fi = FileInfo::from_native_file(&noshebang).unwrap();
    assert!(!fi.is_executable_type());
}

#[test]
fn unknown_type_cannot_thumbnail() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "blob", &[0u8, 1, 2, 3]);
    let fi = FileInfo::from_native_file(&path).unwrap();
    assert!(fi.is_unknown_type());
    assert!(!fi.can_thumbnail());

    let empty = write_file(dir.path(), "empty.txt", b"");
    let fi = FileInfo::from_native_file(&empty).unwrap();
    assert!(!fi.can_thumbnail());
}

#[test]
fn vfs_construction() {
    let info = VfsFileInfo {
        display_name: "Remote Photo".into(),
        size: 4096,
        content_type: Some("image/png".into()),
        file_type: FileType::Regular,
        mtime: 1_700_000_000,
        filesystem_id: Some("sftp:host".into()),
        native: false,
        ..Default::default()
    };
    let fi = FileInfo::new_from_vfs(Path::new("/remote/photo.png"), &info);

    assert_eq!(fi.disp_name(), "Remote Photo");
    assert_eq!(fi.size(), 4096);
    assert!(fi.is_image());
    assert!(!fi.is_native());
    assert_eq!(fi.fs_id(), Some("sftp:host"));
    assert_eq!(fi.icon().name(), "image-png");
    assert!(fi.disp_mtime().is_some());
}

#[test]
fn vfs_unreadable_directory_gets_locked_icon() {
    let info = VfsFileInfo {
        display_name: "private".into(),
        file_type: FileType::Directory,
        can_read: Some(false),
        native: false,
        ..Default::default()
    };
    let fi = FileInfo::new_from_vfs(Path::new("/remote/private"), &info);
    assert!(fi.is_directory());
    assert!(!fi.is_accessible());
    assert_eq!(fi.icon().name(), "folder-locked");
}

#[test]
fn vfs_symlink_mime_from_target_name() {
    let info = VfsFileInfo {
        display_name: "shot".into(),
        file_type: FileType::SymbolicLink,
        symlink_target: Some("/data/shot.jpeg".into()),
        native: false,
        ..Default::default()
    };
    let fi = FileInfo::new_from_vfs(Path::new("/remote/shot"), &info);
    assert!(fi.is_symlink());
    assert_eq!(fi.target(), Some("/data/shot.jpeg"));
    assert_eq!(fi.mime_type().unwrap().name(), "image/jpeg");
}

#[test]
fn shortcut_item_construction() {
    let item = ShortcutItem {
        name: "Text Editor".into(),
        icon_name: Some("accessories-text-editor.png".into()),
        kind: ShortcutKind::Application,
        file_path: Some("/usr/share/applications/editor.desktop".into()),
    };
    let fi = FileInfo::from_shortcut_item(Path::new("/menu/editor"), &item);

    assert!(fi.is_shortcut());
    assert_eq!(fi.disp_name(), "Text Editor");
    assert_eq!(fi.icon().name(), "accessories-text-editor");
    assert_eq!(fi.target(), Some("/usr/share/applications/editor.desktop"));

    let folder = ShortcutItem {
        name: "Games".into(),
        icon_name: None,
        kind: ShortcutKind::Directory,
        file_path: None,
    };
    let fi = FileInfo::from_shortcut_item(Path::new("/menu/games"), &folder);
    assert!(fi.is_directory());
}

#[test]
fn update_copies_every_observable_field() {
    let dir = tempfile::tempdir().unwrap();
    let a_path = write_file(dir.path(), "a.txt", b"aaa");
    let b_path = write_file(dir.path(), "b2.txt", b"bbbbbb");

    let mut a = FileInfo::from_native_file(&a_path).unwrap();
    let b = FileInfo::from_native_file(&b_path).unwrap();

    // Warm the lazy fields of the source first.
    let _ = b.collate_key();
    let _ = b.disp_size();
    let _ = b.disp_mtime();
    let _ = b.icon();

    Arc::get_mut(&mut a).unwrap().update(&b);

    assert_eq!(a.path(), b.path());
    assert_eq!(a.name(), b.name());
    assert_eq!(a.disp_name(), b.disp_name());
    assert_eq!(a.size(), b.size());
    assert_eq!(a.mtime(), b.mtime());
    assert_eq!(a.mode(), b.mode());
    assert_eq!(a.uid(), b.uid());
    assert_eq!(a.gid(), b.gid());
    assert_eq!(a.dev(), b.dev());
    assert_eq!(a.blocks(), b.blocks());
    assert_eq!(a.target(), b.target());
    assert_eq!(a.collate_key(), b.collate_key());
    assert_eq!(a.collate_key_nocasefold(), b.collate_key_nocasefold());
    assert_eq!(a.disp_size(), b.disp_size());
    assert_eq!(a.disp_mtime(), b.disp_mtime());
    assert_eq!(a.icon(), b.icon());
    assert_eq!(a.mime_type(), b.mime_type());
    assert_eq!(a.is_hidden(), b.is_hidden());
    assert_eq!(a.is_native(), b.is_native());
}

#[test]
fn update_from_self_identical_fields_is_safe() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "same.txt", b"data");

    let a = FileInfo::from_native_file(&path).unwrap();
    let mut b = FileInfo::from_native_file(&path).unwrap();
    let _ = a.icon();
    let _ = a.mime_type();

    // a and b share interned mime/icon handles; update must not invalidate
    // them mid-copy.
    Arc::get_mut(&mut b).unwrap().update(&a);
    assert_eq!(b.icon(), a.icon());
    assert_eq!(b.mime_type(), a.mime_type());
}

#[test]
fn collate_keys_sort_files_naturally() {
    let dir = tempfile::tempdir().unwrap();
    let key_of = |name: &str| {
        let path = write_file(dir.path(), name, b"x");
        FileInfo::from_native_file(&path)
            .unwrap()
            .collate_key()
            .to_string()
    };

    // Numeric runs compare by value, case is folded away.
    let k1 = key_of("track1.ogg");
    let k2 = key_of("track2.ogg");
    let k10 = key_of("Track10.ogg");
    assert!(k1 < k2);
    assert!(k2 < k10);
}

#[test]
fn deferred_mime_loading_still_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "photo.png", b"not really a png");

    config::update(|cfg| cfg.defer_mime_type_loading = true);
    let fi = FileInfo::from_native_file(&path).unwrap();
    config::update(|cfg| cfg.defer_mime_type_loading = false);

    // Whether the background loader has run yet or not, the getter
    // resolves the type on demand.
    assert_eq!(fi.mime_type().unwrap().name(), "image/png");
    assert!(fi.is_image());
}

#[test]
fn mime_identity_is_shared() {
    let a = MimeType::from_name("video/x-matroska");
    let b = MimeType::from_name("video/x-matroska");
    assert_eq!(a, b);
}
