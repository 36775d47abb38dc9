// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::{DataConsumer, DataProducer, ProducerOptions},
    crate::{
        entry::PackageEntry,
        error::Result,
        paths::{normalize_path, parent_directories},
    },
    std::collections::HashSet,
};

/// Produces directories from literal paths.
///
/// Every path and each of its ancestors is emitted exactly once, ancestors
/// first, even when several paths share a prefix.
pub struct PathTemplateProducer {
    paths: Vec<String>,
    options: ProducerOptions,
}

impl PathTemplateProducer {
    pub fn new(paths: impl IntoIterator<Item = impl ToString>, options: ProducerOptions) -> Self {
        Self {
            paths: paths.into_iter().map(|p| p.to_string()).collect(),
            options,
        }
    }

    /// The directories to emit, in emission order.
    pub fn directories(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut res = vec![];

        for path in &self.paths {
            let path = normalize_path(path);
            if path.is_empty() {
                continue;
            }

            for dir in parent_directories(&path)
                .into_iter()
                .chain(std::iter::once(path.as_str()))
            {
                if seen.insert(dir.to_string()) {
                    res.push(dir.to_string());
                }
            }
        }

        res
    }
}

impl DataProducer for PathTemplateProducer {
    fn produce(&self, _logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        for dir in self.directories() {
            self.options.emit(consumer, PackageEntry::directory(dir))?;
        }

        Ok(())
    }
}
