//! User special-directory lookup.
//!
//! Reads `user-dirs.dirs` from `$XDG_CONFIG_HOME` (or `~/.config`)
//! following the XDG User Directories specification, falling back to the
//! `directories` crate for anything the file does not define. The file-info
//! icon rules key off these paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use directories::UserDirs;
use once_cell::sync::Lazy;

/// User directory types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserDirectory {
    Desktop,
    Documents,
    Download,
    Music,
    Pictures,
    PublicShare,
    Templates,
    Videos,
}

impl UserDirectory {
    pub const ALL: [UserDirectory; 8] = [
        UserDirectory::Desktop,
        UserDirectory::Documents,
        UserDirectory::Download,
        UserDirectory::Music,
        UserDirectory::Pictures,
        UserDirectory::PublicShare,
        UserDirectory::Templates,
        UserDirectory::Videos,
    ];

    fn xdg_key(self) -> &'static str {
        match self {
            UserDirectory::Desktop => "XDG_DESKTOP_DIR",
            UserDirectory::Documents => "XDG_DOCUMENTS_DIR",
            UserDirectory::Download => "XDG_DOWNLOAD_DIR",
            UserDirectory::Music => "XDG_MUSIC_DIR",
            UserDirectory::Pictures => "XDG_PICTURES_DIR",
            UserDirectory::PublicShare => "XDG_PUBLICSHARE_DIR",
            UserDirectory::Templates => "XDG_TEMPLATES_DIR",
            UserDirectory::Videos => "XDG_VIDEOS_DIR",
        }
    }

    /// The themed icon name for this directory.
    pub fn icon_name(self) -> &'static str {
        match self {
            UserDirectory::Desktop => "user-desktop",
            UserDirectory::Documents => "folder-documents",
            UserDirectory::Download => "folder-download",
            UserDirectory::Music => "folder-music",
            UserDirectory::Pictures => "folder-pictures",
            UserDirectory::PublicShare => "folder-publicshare",
            UserDirectory::Templates => "folder-templates",
            UserDirectory::Videos => "folder-videos",
        }
    }
}

/// Parses the `user-dirs.dirs` file format:
///
/// ```text
/// XDG_DESKTOP_DIR="$HOME/Desktop"
/// XDG_DOCUMENTS_DIR="/srv/docs"
/// ```
///
/// Relative (`$HOME`-prefixed) and absolute quoted paths are accepted;
/// anything else is skipped. Later entries override earlier ones.
fn parse_user_dirs_file(content: &str, home_dir: &Path) -> HashMap<UserDirectory, PathBuf> {
    let mut dirs = HashMap::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((directory, rest)) = UserDirectory::ALL
            .iter()
            .find_map(|d| line.strip_prefix(d.xdg_key()).map(|rest| (*d, rest)))
        else {
            continue;
        };

        let Some(rest) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        let Some(quoted) = rest.trim_start().strip_prefix('"') else {
            continue;
        };
        let Some((value, _)) = quoted.split_once('"') else {
            continue;
        };

        let path = if let Some(rel) = value.strip_prefix("$HOME") {
            home_dir.join(rel.trim_start_matches('/'))
        } else if value.starts_with('/') {
            let trimmed = value.trim_end_matches('/');
            PathBuf::from(if trimmed.is_empty() { "/" } else { trimmed })
        } else {
            continue;
        };

        dirs.insert(directory, path);
    }

    dirs
}

fn user_dirs_file_path() -> Option<PathBuf> {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(config_home);
        if path.is_absolute() {
            return Some(path.join("user-dirs.dirs"));
        }
    }
    Some(home_dir()?.join(".config").join("user-dirs.dirs"))
}

fn load_user_special_dirs() -> HashMap<UserDirectory, PathBuf> {
    let mut dirs = HashMap::new();
    let Some(home) = home_dir() else {
        return dirs;
    };

    if let Some(config_file) = user_dirs_file_path() {
        if let Ok(content) = std::fs::read_to_string(&config_file) {
            dirs = parse_user_dirs_file(&content, &home);
        }
    }

    // Desktop falls back to ~/Desktop for historical compatibility.
    dirs.entry(UserDirectory::Desktop)
        .or_insert_with(|| home.join("Desktop"));

    if let Some(user_dirs) = UserDirs::new() {
        let fallbacks: [(UserDirectory, Option<&Path>); 7] = [
            (UserDirectory::Documents, user_dirs.document_dir()),
            (UserDirectory::Download, user_dirs.download_dir()),
            (UserDirectory::Music, user_dirs.audio_dir()),
            (UserDirectory::Pictures, user_dirs.picture_dir()),
            (UserDirectory::PublicShare, user_dirs.public_dir()),
            (UserDirectory::Templates, user_dirs.template_dir()),
            (UserDirectory::Videos, user_dirs.video_dir()),
        ];
        for (directory, fallback) in fallbacks {
            if let Some(path) = fallback {
                dirs.entry(directory).or_insert_with(|| path.to_path_buf());
            }
        }
    }

    dirs
}

static SPECIAL_DIRS: Lazy<HashMap<UserDirectory, PathBuf>> = Lazy::new(load_user_special_dirs);

/// The user's home directory.
pub fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| UserDirs::new().map(|d| d.home_dir().to_path_buf()))
}

/// The path of a special user directory, if it can be determined.
pub fn special_dir(directory: UserDirectory) -> Option<&'static Path> {
    SPECIAL_DIRS.get(&directory).map(PathBuf::as_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_home_relative_and_absolute_entries() {
        let content = r#"
# comment
XDG_DESKTOP_DIR="$HOME/Desktop"
XDG_DOCUMENTS_DIR="/srv/docs/"
XDG_MUSIC_DIR="relative/ignored"
"#;
        let dirs = parse_user_dirs_file(content, Path::new("/home/user"));
        assert_eq!(
            dirs.get(&UserDirectory::Desktop).unwrap(),
            Path::new("/home/user/Desktop")
        );
        assert_eq!(
            dirs.get(&UserDirectory::Documents).unwrap(),
            Path::new("/srv/docs")
        );
        assert!(!dirs.contains_key(&UserDirectory::Music));
    }

    #[test]
    fn later_entries_override() {
        let content = "XDG_VIDEOS_DIR=\"$HOME/Movies\"\nXDG_VIDEOS_DIR=\"$HOME/Videos\"\n";
        let dirs = parse_user_dirs_file(content, Path::new("/home/user"));
        assert_eq!(
            dirs.get(&UserDirectory::Videos).unwrap(),
            Path::new("/home/user/Videos")
        );
    }
}
