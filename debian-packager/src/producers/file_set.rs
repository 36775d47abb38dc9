// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::{DataConsumer, DataProducer, ProducerOptions},
    crate::{
        entry::{PackageEntry, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, ROOT},
        error::Result,
        paths::join_path,
    },
    std::{fs::File, path::PathBuf},
};

/// Produces a file set resolved by an external tool.
///
/// Each member pairs a filesystem path with the path it has relative to the
/// set's base directory. All members share the same ownership, modes and
/// destination prefix.
pub struct FileSetProducer {
    members: Vec<(PathBuf, String)>,
    pub user: String,
    pub uid: u64,
    pub group: String,
    pub gid: u64,
    pub file_mode: u32,
    pub dir_mode: u32,
    pub prefix: String,
    options: ProducerOptions,
}

impl FileSetProducer {
    pub fn new(
        members: impl IntoIterator<Item = (PathBuf, String)>,
        options: ProducerOptions,
    ) -> Self {
        Self {
            members: members.into_iter().collect(),
            user: ROOT.to_string(),
            uid: 0,
            group: ROOT.to_string(),
            gid: 0,
            file_mode: DEFAULT_FILE_MODE,
            dir_mode: DEFAULT_DIR_MODE,
            prefix: String::new(),
            options,
        }
    }
}

impl DataProducer for FileSetProducer {
    fn produce(&self, logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        for (source, relative) in &self.members {
            if !self.options.check_source(logger, source)? {
                continue;
            }

            let name = join_path(&self.prefix, &relative.replace('\\', "/"));
            let metadata = std::fs::metadata(source)?;

            if metadata.is_dir() {
                let mut entry = PackageEntry::directory(&name);
                entry.set_owner(&self.user, self.uid, &self.group, self.gid);
                entry.mode = self.dir_mode;

                self.options.emit(consumer, entry)?;
            } else {
                let mut entry = PackageEntry::file(&name, metadata.len());
                entry.set_owner(&self.user, self.uid, &self.group, self.gid);
                entry.mode = self.file_mode;

                let mut fh = File::open(source)?;
                self.options.emit_file(consumer, entry, &mut fh)?;
            }
        }

        Ok(())
    }
}
