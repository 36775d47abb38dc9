// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::{DataConsumer, DataProducer, ProducerOptions},
    crate::{
        entry::PackageEntry,
        error::{DebianError, Result},
    },
};

/// Produces a single symbolic or hard link.
pub struct LinkProducer {
    path: String,
    target: String,
    symlink: bool,
    allow_empty_target: bool,
    options: ProducerOptions,
}

impl LinkProducer {
    /// A symbolic link at `path` pointing to `target`.
    pub fn symlink(path: impl ToString, target: impl ToString, options: ProducerOptions) -> Self {
        Self {
            path: path.to_string(),
            target: target.to_string(),
            symlink: true,
            allow_empty_target: false,
            options,
        }
    }

    /// A hard link at `path` to the package entry `target`.
    pub fn hard_link(path: impl ToString, target: impl ToString, options: ProducerOptions) -> Self {
        Self {
            symlink: false,
            ..Self::symlink(path, target, options)
        }
    }

    /// Accept links with an empty target.
    pub fn allow_empty_target(mut self, allow: bool) -> Self {
        self.allow_empty_target = allow;
        self
    }
}

impl DataProducer for LinkProducer {
    fn produce(&self, _logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(DebianError::InvalidLink("link path is empty".into()));
        }
        if self.target.trim().is_empty() && !self.allow_empty_target {
            return Err(DebianError::InvalidLink(format!(
                "link {} has no target",
                self.path
            )));
        }

        let entry = if self.symlink {
            PackageEntry::symlink(&self.path, &self.target)
        } else {
            PackageEntry::hard_link(&self.path, &self.target)
        };

        self.options.emit(consumer, entry)
    }
}
