// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Debian `.changes` files and the change log they are assembled from.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html#debian-changes-files-changes>.
*/

use {
    crate::{
        binary_package_control::BinaryPackageControlFile,
        control::{ControlFieldDefinition as Field, ControlFieldType, ControlFile},
        error::{DebianError, Result},
        io::{ChecksumType, MultiContentDigest},
    },
    chrono::{DateTime, NaiveDateTime, TimeZone, Utc},
    std::{
        fmt::{Display, Formatter},
        io::{BufRead, Write},
        ops::{Deref, DerefMut},
    },
};

const MULTILINE: ControlFieldType = ControlFieldType::Multiline;

static FIELDS: &[Field] = &[
    Field::mandatory("Format"),
    Field::mandatory("Date"),
    Field::mandatory("Source"),
    Field::mandatory("Binary"),
    Field::mandatory("Architecture"),
    Field::mandatory("Version"),
    Field::mandatory("Distribution"),
    Field::mandatory("Urgency"),
    Field::mandatory("Maintainer"),
    Field::optional("Changed-By"),
    Field::mandatory("Description")
        .with_kind(MULTILINE)
        .with_first_line_empty(),
    Field::mandatory("Changes")
        .with_kind(MULTILINE)
        .with_first_line_empty(),
    Field::optional("Closes"),
    Field::mandatory("Checksums-Sha1")
        .with_kind(MULTILINE)
        .with_first_line_empty(),
    Field::mandatory("Checksums-Sha256")
        .with_kind(MULTILINE)
        .with_first_line_empty(),
    Field::mandatory("Files")
        .with_kind(MULTILINE)
        .with_first_line_empty(),
];

/// Date format of `release` lines in textual change logs.
const CHANGELOG_DATE_FORMAT: &str = "%H:%M %d.%m.%Y";

/// Format a date the way `.changes` files expect (RFC 2822).
pub fn format_date<Tz: TimeZone>(date: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    date.format("%a, %-d %b %Y %H:%M:%S %z").to_string()
}

/// Format a date in UTC the way `.changes` files expect.
pub fn format_date_utc(date: &DateTime<Utc>) -> String {
    format_date(date)
}

/// An entry in a package change log.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangeSet {
    pub package: String,
    pub version: String,
    pub date: DateTime<Utc>,
    pub distribution: Option<String>,
    pub urgency: Option<String>,
    pub changed_by: Option<String>,
    pub changes: Vec<String>,
}

impl Display for ChangeSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}) {}; urgency={}",
            self.package,
            self.version,
            self.distribution.as_deref().unwrap_or("stable"),
            self.urgency.as_deref().unwrap_or("low")
        )?;

        for change in &self.changes {
            write!(f, "\n  * {}", change)?;
        }

        Ok(())
    }
}

/// A `.changes` file.
///
/// [Deref] and [DerefMut] expose the inner [ControlFile].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChangesFile {
    inner: ControlFile,
}

impl Default for ChangesFile {
    fn default() -> Self {
        let mut inner = ControlFile::new(FIELDS, 'C');
        inner.set("Format", "1.8");
        inner.set("Urgency", "low");
        inner.set("Distribution", "stable");

        Self { inner }
    }
}

impl Deref for ChangesFile {
    type Target = ControlFile;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for ChangesFile {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Display for ChangesFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.inner, f)
    }
}

impl ChangesFile {
    /// Populate fields from the control file of the binary package being uploaded.
    pub fn initialize(&mut self, control: &BinaryPackageControlFile) {
        let copies = [
            ("Binary", "Package"),
            ("Source", "Package"),
            ("Architecture", "Architecture"),
            ("Version", "Version"),
            ("Maintainer", "Maintainer"),
            ("Changed-By", "Maintainer"),
            ("Distribution", "Distribution"),
        ];

        for (to, from) in copies {
            if let Some(value) = control.get(from) {
                self.set(to, value);
            }
        }

        let user_defined = control
            .user_defined_fields()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Vec<_>>();
        for (name, value) in user_defined {
            self.set(name, value);
        }

        let mut description = control.get("Package").unwrap_or_default().to_string();
        if let Some(short) = control.short_description() {
            description.push_str(" - ");
            description.push_str(short);
        }
        self.set("Description", description);
    }

    /// Set the `Changes` field from change sets, most recent first.
    ///
    /// The urgency and author of the most recent change set, when known, become
    /// the `Urgency` and `Changed-By` of this file.
    pub fn set_changes(&mut self, change_sets: &[ChangeSet]) {
        if let Some(latest) = change_sets.first() {
            if let Some(urgency) = &latest.urgency {
                self.set("Urgency", urgency);
            }
            if let Some(changed_by) = &latest.changed_by {
                self.set("Changed-By", changed_by);
            }
        }

        let changes = change_sets
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        self.set("Changes", changes);
    }

    /// Set the `Date` field.
    pub fn set_date<Tz: TimeZone>(&mut self, date: &DateTime<Tz>)
    where
        Tz::Offset: Display,
    {
        self.set("Date", format_date(date));
    }

    /// Record the uploaded package file in the checksum fields.
    pub fn set_package_file(
        &mut self,
        filename: &str,
        size: u64,
        digests: &MultiContentDigest,
        section: &str,
        priority: &str,
    ) {
        for checksum in [ChecksumType::Sha1, ChecksumType::Sha256] {
            self.set(
                checksum.changes_field(),
                format!(
                    "{} {} {}",
                    digests.digest_from_checksum(checksum).digest_hex(),
                    size,
                    filename
                ),
            );
        }

        self.set(
            ChecksumType::Md5.changes_field(),
            format!(
                "{} {} {} {} {}",
                digests.md5.digest_hex(),
                size,
                section,
                priority,
                filename
            ),
        );
    }
}

/// Assemble a validated `.changes` file for a built package.
pub fn build_changes_file(
    control: &BinaryPackageControlFile,
    change_sets: &[ChangeSet],
    package_filename: &str,
    package_size: u64,
    package_digests: &MultiContentDigest,
    date: &DateTime<Utc>,
) -> Result<ChangesFile> {
    let mut changes = ChangesFile::default();
    changes.initialize(control);
    changes.set_changes(change_sets);
    changes.set_date(date);
    changes.set_package_file(
        package_filename,
        package_size,
        package_digests,
        control.section().unwrap_or_default(),
        control.priority().unwrap_or_default(),
    );

    changes.validate().map_err(|e| {
        DebianError::build(
            format!(
                "changes file fields are invalid {:?}; the mandatory fields are {:?}",
                changes.invalid_fields(),
                changes.mandatory_fields()
            ),
            Some(e),
        )
    })?;

    Ok(changes)
}

/// Change sets read from a textual change log.
///
/// The format is a series of `release` lines, each followed by the changes of
/// that release as ` * ` lines:
///
/// ```text
/// release date=22:13 19.08.2007,version=1.5+r90114,urgency=low,by=Someone <someone@example.com>
///  * debian changes support
/// ```
///
/// Changes listed before the first `release` line describe the package being
/// built and take their metadata from its control file.
#[derive(Clone, Debug)]
pub struct TextfileChangesProvider {
    change_sets: Vec<ChangeSet>,
}

impl TextfileChangesProvider {
    /// Parse a change log.
    ///
    /// `date` is the date of changes not preceded by a `release` line.
    pub fn from_reader<R: BufRead>(
        reader: R,
        control: &BinaryPackageControlFile,
        date: DateTime<Utc>,
    ) -> Result<Self> {
        let mut current = ChangeSet {
            package: control.get("Package").unwrap_or_default().to_string(),
            version: control.get("Version").unwrap_or_default().to_string(),
            date,
            distribution: control.get("Distribution").map(|s| s.to_string()),
            urgency: control.get("Urgency").map(|s| s.to_string()),
            changed_by: control.get("Maintainer").map(|s| s.to_string()),
            changes: vec![],
        };
        let mut change_sets = vec![];

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = i + 1;

            if let Some(release) = line.strip_prefix("release ") {
                if !current.changes.is_empty() {
                    let next = current.clone();
                    change_sets.push(std::mem::replace(&mut current, next));
                    current.changes.clear();
                }

                for token in release.split(',') {
                    let (key, value) = token.trim().split_once('=').ok_or_else(|| {
                        DebianError::ChangesParse(
                            line_number,
                            format!("malformed release attribute: {}", token.trim()),
                        )
                    })?;
                    let value = value.trim();

                    match key.trim() {
                        "urgency" => current.urgency = Some(value.to_string()),
                        "by" => current.changed_by = Some(value.to_string()),
                        "date" => {
                            let naive = NaiveDateTime::parse_from_str(value, CHANGELOG_DATE_FORMAT)
                                .map_err(|e| {
                                    DebianError::ChangesParse(
                                        line_number,
                                        format!("invalid date {}: {}", value, e),
                                    )
                                })?;
                            current.date = Utc.from_utc_datetime(&naive);
                        }
                        "version" => current.version = value.to_string(),
                        "distribution" => current.distribution = Some(value.to_string()),
                        _ => {}
                    }
                }

                continue;
            }

            if let Some(change) = line.strip_prefix(" * ") {
                current.changes.push(change.to_string());
                continue;
            }

            return Err(DebianError::ChangesParse(
                line_number,
                format!("unknown line syntax [{}]", line),
            ));
        }

        change_sets.push(current);

        Ok(Self { change_sets })
    }

    /// The parsed change sets, most recent first.
    pub fn change_sets(&self) -> &[ChangeSet] {
        &self.change_sets
    }

    /// Write the change sets back in the textual change log format.
    pub fn save<W: Write>(&self, writer: &mut W) -> Result<()> {
        for change_set in &self.change_sets {
            writeln!(
                writer,
                "release date={},version={},urgency={},by={},distribution={}",
                change_set.date.format(CHANGELOG_DATE_FORMAT),
                change_set.version,
                change_set.urgency.as_deref().unwrap_or_default(),
                change_set.changed_by.as_deref().unwrap_or_default(),
                change_set.distribution.as_deref().unwrap_or_default(),
            )?;

            for change in &change_set.changes {
                writeln!(writer, " * {}", change)?;
            }
        }

        Ok(())
    }
}
