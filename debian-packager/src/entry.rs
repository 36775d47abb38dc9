// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Archive entry metadata. */

use crate::paths::normalize_path;

/// Default permissions of regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Default permissions of directories.
pub const DEFAULT_DIR_MODE: u32 = 0o755;

/// Default owner and group name.
pub const ROOT: &str = "root";

/// The kind of a [PackageEntry].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryType {
    /// A regular file.
    File,
    /// A directory.
    Directory,
    /// A symbolic link.
    Symlink,
    /// A hard link to another entry in the same archive.
    HardLink,
}

/// Metadata of a single entry destined for the data archive.
///
/// Content of regular files travels separately, as a reader handed to the
/// consumer alongside the entry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackageEntry {
    path: String,
    pub entry_type: EntryType,
    pub link_target: Option<String>,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    pub user_name: String,
    pub group_name: String,
    pub size: u64,
    pub mtime: Option<u64>,
}

impl PackageEntry {
    fn new(path: &str, entry_type: EntryType, mode: u32) -> Self {
        Self {
            path: normalize_path(path),
            entry_type,
            link_target: None,
            mode,
            uid: 0,
            gid: 0,
            user_name: ROOT.to_string(),
            group_name: ROOT.to_string(),
            size: 0,
            mtime: None,
        }
    }

    /// A regular file of `size` bytes.
    pub fn file(path: impl AsRef<str>, size: u64) -> Self {
        let mut entry = Self::new(path.as_ref(), EntryType::File, DEFAULT_FILE_MODE);
        entry.size = size;
        entry
    }

    /// A directory.
    pub fn directory(path: impl AsRef<str>) -> Self {
        Self::new(path.as_ref(), EntryType::Directory, DEFAULT_DIR_MODE)
    }

    /// A symbolic link pointing at `target`.
    pub fn symlink(path: impl AsRef<str>, target: impl ToString) -> Self {
        let mut entry = Self::new(path.as_ref(), EntryType::Symlink, 0o777);
        entry.link_target = Some(target.to_string());
        entry
    }

    /// A hard link to the archive entry at `target`.
    pub fn hard_link(path: impl AsRef<str>, target: impl AsRef<str>) -> Self {
        let mut entry = Self::new(path.as_ref(), EntryType::HardLink, DEFAULT_FILE_MODE);
        entry.link_target = Some(normalize_path(target.as_ref()));
        entry
    }

    /// The normalized entry path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replace the path of this entry.
    ///
    /// The value is normalized.
    pub fn set_path(&mut self, path: impl AsRef<str>) {
        self.path = normalize_path(path.as_ref());
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_link(&self) -> bool {
        matches!(self.entry_type, EntryType::Symlink | EntryType::HardLink)
    }

    /// Set ownership from names and numeric ids.
    pub fn set_owner(&mut self, user: &str, uid: u64, group: &str, gid: u64) {
        self.user_name = user.to_string();
        self.uid = uid;
        self.group_name = group.to_string();
        self.gid = gid;
    }
}
