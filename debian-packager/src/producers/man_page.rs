// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    super::{DataConsumer, DataProducer, ProducerOptions},
    crate::{entry::PackageEntry, error::Result, io::Compression},
    std::{
        fs::File,
        io::{BufReader, Cursor},
        path::{Path, PathBuf},
    },
};

const MAN_PAGE_PREFIX: &str = "/usr/share/man/man";
const DEFAULT_SECTION: u32 = 1;

/// Split a file name into its stem and extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) => (&name[0..pos], &name[pos + 1..]),
        None => (name, ""),
    }
}

fn is_compressed_extension(extension: &str) -> bool {
    matches!(extension, "gz" | "bz2" | "xz")
}

/// The manual section encoded in a file name like `page.7`.
fn section(name: &str) -> Option<u32> {
    match split_extension(name).1 {
        ext if ext.len() == 1 => ext.chars().next().and_then(|c| c.to_digit(10)),
        _ => None,
    }
}

fn with_section(base: &str, extension: &str, section: Option<u32>) -> String {
    match section {
        Some(section) => format!("{}{}/{}.{}", MAN_PAGE_PREFIX, section, base, extension),
        None => format!(
            "{}{}/{}.{}.{}",
            MAN_PAGE_PREFIX, DEFAULT_SECTION, base, DEFAULT_SECTION, extension
        ),
    }
}

/// Resolve where a manual page is installed.
///
/// An explicit destination wins. Otherwise the page goes to
/// `/usr/share/man/man<section>/`, where the section is the single digit
/// extension of the page name, or 1 if the name has none. Pages that are not
/// already compressed gain a `.gz` extension.
pub fn man_page_destination(destination: Option<&str>, source: &Path) -> String {
    if let Some(dest) = destination.filter(|d| !d.is_empty()) {
        return dest.to_string();
    }

    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let (stem, extension) = split_extension(&name);

    if is_compressed_extension(extension) {
        with_section(stem, extension, section(stem))
    } else {
        with_section(&name, "gz", section(&name))
    }
}

/// Produces a manual page, gzip compressing it unless it already is.
pub struct ManPageProducer {
    source: PathBuf,
    destination: String,
    options: ProducerOptions,
}

impl ManPageProducer {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: Option<&str>,
        options: ProducerOptions,
    ) -> Self {
        let source = source.into();
        let destination = man_page_destination(destination, &source);

        Self {
            source,
            destination,
            options,
        }
    }

    /// The path the page is installed at.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    fn compressed_page(&self) -> Result<Vec<u8>> {
        let mut reader = BufReader::new(File::open(&self.source)?);
        let mut encoder = Compression::Gzip.compress(Vec::new())?;
        std::io::copy(&mut reader, &mut encoder)?;

        encoder.finish()
    }
}

impl DataProducer for ManPageProducer {
    fn produce(&self, logger: &slog::Logger, consumer: &mut dyn DataConsumer) -> Result<()> {
        if !self.options.check_source(logger, &self.source)? {
            return Ok(());
        }

        let name = self
            .source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        if is_compressed_extension(split_extension(&name).1) {
            let size = std::fs::metadata(&self.source)?.len();
            let mut fh = File::open(&self.source)?;

            self.options
                .emit_file(consumer, PackageEntry::file(&self.destination, size), &mut fh)
        } else {
            let data = self.compressed_page()?;

            self.options.emit_file(
                consumer,
                PackageEntry::file(&self.destination, data.len() as u64),
                &mut Cursor::new(data),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::producers::{test_logger, CollectingConsumer},
        std::io::Read,
    };

    #[test]
    fn destinations() {
        let cases: &[(Option<&str>, &str, &str)] = &[
            (None, "page.1", "/usr/share/man/man1/page.1.gz"),
            (Some("/some/fixed/location"), "page.1", "/some/fixed/location"),
            (Some("/some/fixed/location"), "page.1.gz", "/some/fixed/location"),
            (Some(""), "/some/page.2.gz", "/usr/share/man/man2/page.2.gz"),
            (Some(""), "/some/page.7.bz2", "/usr/share/man/man7/page.7.bz2"),
            (Some(""), "page", "/usr/share/man/man1/page.1.gz"),
            (Some(""), "page.-1", "/usr/share/man/man1/page.-1.1.gz"),
            (Some(""), "page.txt", "/usr/share/man/man1/page.txt.1.gz"),
        ];

        for (destination, source, expected) in cases {
            assert_eq!(
                man_page_destination(*destination, Path::new(source)),
                *expected,
                "{}",
                source
            );
        }
    }

    #[test]
    fn compresses_page() -> Result<()> {
        let td = tempfile::tempdir()?;
        let source = td.path().join("tool.8");
        std::fs::write(&source, b".TH TOOL 8\n")?;

        let producer = ManPageProducer::new(&source, None, ProducerOptions::default());
        assert_eq!(producer.destination(), "/usr/share/man/man8/tool.8.gz");

        let mut consumer = CollectingConsumer::default();
        producer.produce(&test_logger(), &mut consumer)?;

        let (entry, data) = &consumer.entries[0];
        assert_eq!(entry.path(), "usr/share/man/man8/tool.8.gz");
        assert_eq!(entry.size, data.len() as u64);
        // No compression level is advertised in the gzip header.
        assert_eq!(&data[0..2], &[0x1f, 0x8b]);
        assert_eq!(data[8], 0);

        let mut page = vec![];
        Compression::Gzip
            .decompress(Cursor::new(data.clone()))?
            .read_to_end(&mut page)?;
        assert_eq!(page, b".TH TOOL 8\n");

        Ok(())
    }

    #[test]
    fn keeps_compressed_page() -> Result<()> {
        let td = tempfile::tempdir()?;
        let source = td.path().join("tool.1.gz");
        std::fs::write(&source, b"not really gzip")?;

        let mut consumer = CollectingConsumer::default();
        ManPageProducer::new(&source, None, ProducerOptions::default())
            .produce(&test_logger(), &mut consumer)?;

        let (entry, data) = &consumer.entries[0];
        assert_eq!(entry.path(), "usr/share/man/man1/tool.1.gz");
        assert_eq!(data, b"not really gzip");

        Ok(())
    }
}
