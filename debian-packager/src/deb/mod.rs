// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Interfaces for .deb package files.

The .deb file specification lives at <https://manpages.debian.org/unstable/dpkg-dev/deb.5.en.html>.

A .deb is an `ar` archive holding a `debian-binary` member with the format
version, a `control.tar` archive with package metadata and a `data.tar` archive
with the installed files.
*/

pub mod builder;
mod tar_writer;

pub use tar_writer::DebTarWriter;

use {
    crate::{
        error::{DebianError, Result},
        io::Compression,
    },
    chrono::DateTime,
    serde::Deserialize,
    std::str::FromStr,
};

/// Environment variable holding a reproducible build timestamp.
pub const SOURCE_DATE_EPOCH: &str = "SOURCE_DATE_EPOCH";

/// How tar paths longer than the 100 byte name field are stored.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LongFileMode {
    /// Fail the build.
    Error,
    /// Truncate the name, logging a warning.
    Truncate,
    /// GNU `././@LongLink` entries.
    #[default]
    Gnu,
    /// POSIX pax extended headers.
    Posix,
}

/// How numeric tar header values exceeding their octal fields are stored.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, strum::EnumString, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BigNumberMode {
    /// Fail the build.
    Error,
    /// Base-256 encoding in the header field, as introduced by star.
    #[default]
    Star,
    /// POSIX pax extended headers.
    Posix,
}

/// Tar settings applied to both inner archives of a package.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct TarOptions {
    pub compression: Compression,
    pub long_file_mode: LongFileMode,
    pub big_number_mode: BigNumberMode,
}

impl TarOptions {
    /// Construct an instance from textual selectors.
    ///
    /// Empty selectors keep the default value.
    pub fn from_selectors(
        compression: &str,
        long_file_mode: &str,
        big_number_mode: &str,
    ) -> Result<Self> {
        let mut options = Self::default();

        if !compression.is_empty() {
            options.compression = Compression::from_str(compression)
                .map_err(|_| DebianError::UnknownCompression(compression.to_string()))?;
        }
        if !long_file_mode.is_empty() {
            options.long_file_mode = LongFileMode::from_str(long_file_mode)
                .map_err(|_| DebianError::UnknownLongFileMode(long_file_mode.to_string()))?;
        }
        if !big_number_mode.is_empty() {
            options.big_number_mode = BigNumberMode::from_str(big_number_mode)
                .map_err(|_| DebianError::UnknownBigNumberMode(big_number_mode.to_string()))?;
        }

        Ok(options)
    }
}

fn parse_timestamp(value: &str) -> Result<u64> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(seconds);
    }

    let date = DateTime::parse_from_rfc3339(value)
        .map_err(|_| DebianError::InvalidTimestamp(value.to_string()))?;

    u64::try_from(date.timestamp()).map_err(|_| DebianError::InvalidTimestamp(value.to_string()))
}

/// Resolve the fixed timestamp of archive entries, in seconds since the UNIX epoch.
///
/// An explicit value wins over the `SOURCE_DATE_EPOCH` value. Values are either
/// epoch seconds or RFC 3339 date-times. Empty values are ignored.
pub fn resolve_output_timestamp(
    explicit: Option<&str>,
    source_date_epoch: Option<&str>,
) -> Result<Option<u64>> {
    explicit
        .filter(|v| !v.trim().is_empty())
        .or_else(|| source_date_epoch.filter(|v| !v.trim().is_empty()))
        .map(parse_timestamp)
        .transpose()
}

/// Resolve the fixed timestamp of archive entries, consulting the process environment.
pub fn output_timestamp_from_env(explicit: Option<&str>) -> Result<Option<u64>> {
    let env = std::env::var(SOURCE_DATE_EPOCH).ok();

    resolve_output_timestamp(explicit, env.as_deref())
}
