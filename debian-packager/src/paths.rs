// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Path manipulation for archive entries.

Paths inside packages are unix-style and relative: forward slashes only, with no
leading `/` or `./`. The tar representation prefixes them with `./`.
*/

use std::path::Path;

/// Normalize a path to the relative unix-style form used for package entries.
///
/// Backslashes become forward slashes. Empty and `.` components are dropped
/// and `..` removes the preceding component, never climbing above the root.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");

    let mut components: Vec<&str> = vec![];
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            c => components.push(c),
        }
    }

    components.join("/")
}

/// Remove `strip` leading `/`-delimited components from a path.
///
/// The path is returned unchanged if it has fewer components than requested.
pub fn strip_path(strip: usize, path: &str) -> &str {
    let mut x = 0;

    for _ in 0..strip {
        if x + 1 > path.len() {
            return path;
        }

        match path[x + 1..].find('/') {
            Some(pos) => {
                x = x + 1 + pos;
            }
            None => {
                return path;
            }
        }
    }

    if strip == 0 {
        path
    } else {
        &path[x + 1..]
    }
}

/// Replace the directory portion of `file` with `target`.
pub fn move_path(file: &str, target: &str) -> String {
    let file = file.replace('\\', "/");
    let name = file.rsplit('/').next().unwrap_or(file.as_str());

    if target.ends_with('/') {
        format!("{}{}", target, name)
    } else {
        format!("{}/{}", target, name)
    }
}

/// Join a prefix and a relative path with a single separator.
pub fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');

    if prefix.is_empty() {
        path.to_string()
    } else if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix, path.trim_start_matches('/'))
    }
}

/// Obtain the path of an entry as stored in a tar archive.
///
/// Directories carry a trailing slash. The root directory is `./`.
pub fn tar_path(path: &str, directory: bool) -> String {
    if path.is_empty() {
        "./".to_string()
    } else if directory {
        format!("./{}/", path)
    } else {
        format!("./{}", path)
    }
}

/// Express a filesystem path relative to `root` using forward slashes.
pub fn relative_unix_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;

    let components = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>();

    Some(components.join("/"))
}

/// All ancestor directories of a normalized path, outermost first.
///
/// `usr/share/doc/foo` yields `usr`, `usr/share`, `usr/share/doc`.
pub fn parent_directories(path: &str) -> Vec<&str> {
    path.match_indices('/')
        .map(|(pos, _)| &path[0..pos])
        .filter(|p| !p.is_empty())
        .collect()
}
