// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Conversion of arbitrary project versions into Debian package versions.

See <https://www.debian.org/doc/debian-policy/ch-controlfields.html#version>.
The upstream version emitted here only contains full stops, plus signs, tildes
and alphanumerics. Pre-release qualifiers and snapshot suffixes are introduced
with `~` so they sort before the final release.
*/

use {
    chrono::{DateTime, Utc},
    once_cell::sync::Lazy,
    regex::Regex,
    serde::Deserialize,
};

/// Matches versions ending in `-SNAPSHOT` or `+SNAPSHOT`.
static RE_SNAPSHOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.*)[\-+]SNAPSHOT$").unwrap());

/// Matches versions with a pre-release qualifier.
static RE_PRE_RELEASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)
        ^(?:
            # Qualifier preceded by a separator, which is dropped.
            (?:(.*?)([.\-_]))
            |
            # Qualifier directly following a non-letter.
            (.*[^a-z])
        )
        (alpha|a|beta|b|milestone|m|cr|rc)
        ([^a-z].*)?$",
    )
    .unwrap()
});

static RE_ILLEGAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.+~A-Za-z0-9]").unwrap());

static RE_PLUS_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\++").unwrap());

/// Date pattern letters understood in snapshot templates and their strftime equivalents.
const TEMPLATE_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "%Y"),
    ("yy", "%y"),
    ("MM", "%m"),
    ("dd", "%d"),
    ("HH", "%H"),
    ("mm", "%M"),
    ("ss", "%S"),
];

/// Controls how [convert_to_debian_version()] rewrites a version.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(default)]
pub struct DebianVersionOptions {
    /// Replace `SNAPSHOT` suffixes with a timestamp or explicit value.
    ///
    /// When false, the suffix is kept as `~SNAPSHOT`.
    pub expand_snapshot: bool,

    /// Template for expanded snapshots, like `prefix[yyyyMMdd]suffix`.
    ///
    /// The bracketed portion is rendered from the snapshot timestamp and the
    /// remainder is kept verbatim.
    pub snapshot_template: Option<String>,

    /// Explicit snapshot replacement, used when no template is set.
    pub snapshot_value: Option<String>,

    /// Epoch prefixed to the version as `<epoch>:`.
    pub epoch: Option<u32>,
}

/// Convert a `yyyyMMdd` style date pattern into a strftime format.
fn strftime_pattern(pattern: &str) -> String {
    let mut out = String::new();
    let mut remaining = pattern;

    'outer: while !remaining.is_empty() {
        for (token, replacement) in TEMPLATE_TOKENS {
            if let Some(rest) = remaining.strip_prefix(token) {
                out.push_str(replacement);
                remaining = rest;
                continue 'outer;
            }
        }

        let mut chars = remaining.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        remaining = chars.as_str();
    }

    out
}

fn format_snapshot_template(template: &str, timestamp: &DateTime<Utc>) -> String {
    match (template.find('['), template.find(']')) {
        (Some(start), Some(end)) if start < end => {
            let pattern = strftime_pattern(&template[start + 1..end]);

            format!(
                "{}{}{}",
                &template[0..start],
                timestamp.format(&pattern),
                &template[end + 1..]
            )
        }
        _ => template.to_string(),
    }
}

/// Convert a project version to a version suitable for a Debian package.
///
/// `-SNAPSHOT` suffixes become `~` followed by the snapshot expansion (or
/// `SNAPSHOT`). Otherwise the separator before an alpha, beta, milestone or
/// release candidate qualifier is replaced with `~`. Remaining characters that
/// are not allowed in a version become `+`, with runs of `+` collapsed.
///
/// The result is fully determined by the arguments.
pub fn convert_to_debian_version(
    version: &str,
    options: &DebianVersionOptions,
    timestamp: &DateTime<Utc>,
) -> String {
    let version = if let Some(caps) = RE_SNAPSHOT.captures(version) {
        let mut v = format!("{}~", &caps[1]);

        if options.expand_snapshot {
            match (
                options.snapshot_template.as_deref().filter(|t| !t.is_empty()),
                options.snapshot_value.as_deref().filter(|v| !v.is_empty()),
            ) {
                (Some(template), _) => {
                    v.push_str(&format_snapshot_template(template, timestamp));
                }
                (None, Some(value)) => {
                    v.push_str(value);
                }
                (None, None) => {
                    v.push_str(&timestamp.format("%Y%m%d%H%M%S").to_string());
                }
            }
        } else {
            v.push_str("SNAPSHOT");
        }

        v
    } else if let Some(caps) = RE_PRE_RELEASE.captures(version) {
        let base = caps
            .get(1)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();

        format!(
            "{}~{}{}",
            base,
            &caps[4],
            caps.get(5).map(|m| m.as_str()).unwrap_or_default()
        )
    } else {
        version.to_string()
    };

    let version = RE_ILLEGAL.replace_all(&version, "+");
    let version = RE_PLUS_RUN.replace_all(&version, "+");

    match options.epoch {
        Some(epoch) => format!("{}:{}", epoch, version),
        None => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        chrono::{NaiveDate, TimeZone},
    };

    fn timestamp() -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2013, 2, 17)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn convert(version: &str, expand: bool) -> String {
        convert_to_debian_version(
            version,
            &DebianVersionOptions {
                expand_snapshot: expand,
                ..Default::default()
            },
            &timestamp(),
        )
    }

    fn convert_template(version: &str, template: &str) -> String {
        convert_to_debian_version(
            version,
            &DebianVersionOptions {
                expand_snapshot: true,
                snapshot_template: Some(template.to_string()),
                ..Default::default()
            },
            &timestamp(),
        )
    }

    #[test]
    fn snapshots() {
        assert_eq!(convert("1.0", false), "1.0");
        assert_eq!(convert("1.0+SNAPSHOT", false), "1.0~SNAPSHOT");
        assert_eq!(convert("1.0-SNAPSHOT", false), "1.0~SNAPSHOT");
        assert_eq!(convert("1.0+SNAPSHOT", true), "1.0~20130217000000");
        assert_eq!(convert("1.0-prj_3+SNAPSHOT", false), "1.0+prj+3~SNAPSHOT");
        assert_eq!(convert("1.0-prj_3-SNAPSHOT", false), "1.0+prj+3~SNAPSHOT");
        assert_eq!(convert("1.0-prj_3+SNAPSHOT", true), "1.0+prj+3~20130217000000");
        assert_eq!(
            convert("1.0-prj_3-c++-SNAPSHOT", true),
            "1.0+prj+3+c+~20130217000000"
        );
        assert_eq!(
            convert("1.0-prj_3-c+++++++-SNAPSHOT", true),
            "1.0+prj+3+c+~20130217000000"
        );
    }

    #[test]
    fn pre_release_qualifiers() {
        assert_eq!(convert("1.0-RC2", true), "1.0~RC2");
        assert_eq!(convert("1.0-alpha3", true), "1.0~alpha3");
        assert_eq!(convert("1.0.Beta-4", true), "1.0~Beta+4");
        assert_eq!(convert("1.0-milestone-4", true), "1.0~milestone+4");
        assert_eq!(convert("1.0-a-4", true), "1.0~a+4");
        assert_eq!(convert("1.0a-4", true), "1.0~a+4");
        assert_eq!(convert("1.0-b-4", true), "1.0~b+4");
        assert_eq!(convert("1.0rc7", true), "1.0~rc7");
        assert_eq!(convert("1.0.M1", true), "1.0~M1");
        assert_eq!(convert("1.0-M2", true), "1.0~M2");
        assert_eq!(convert("1.0M3", true), "1.0~M3");

        assert_eq!(convert("1.0-prj_3-RC2", true), "1.0+prj+3~RC2");
        assert_eq!(convert("1.0-prj_3.Beta-4", true), "1.0+prj+3~Beta+4");
        assert_eq!(convert("1.0-prj_3-milestone-4", true), "1.0+prj+3~milestone+4");
        assert_eq!(convert("1.0-prj_3.M1", true), "1.0+prj+3~M1");
        assert_eq!(convert("1.0-prj_M3", true), "1.0+prj~M3");
    }

    #[test]
    fn illegal_characters() {
        assert_eq!(convert("1.0-prj_3", false), "1.0+prj+3");
        assert_eq!(convert("1.0-prj__-M3", true), "1.0+prj+~M3");
        assert_eq!(convert("1.0-prj_._-M3", true), "1.0+prj+.+~M3");
        assert_eq!(convert("1.0-prj_3:M3", true), "1.0+prj+3+~M3");
        assert_eq!(convert("1.0-MMM-3", true), "1.0+MMM+3");
        assert_eq!(convert("1.0-aaa-3", true), "1.0+aaa+3");
        assert_eq!(convert("1.0-bbb-3", true), "1.0+bbb+3");
        assert_eq!(convert("1.0aaa-3", true), "1.0aaa+3");
    }

    #[test]
    fn templates() {
        assert_eq!(
            convert_template("1.0+SNAPSHOT", "[yyyyMMddHHmmss]"),
            "1.0~20130217000000"
        );
        assert_eq!(
            convert_template("1.0+SNAPSHOT", "[yyMMddHHmmss]"),
            "1.0~130217000000"
        );
        assert_eq!(convert_template("1.0+SNAPSHOT", "[yyyyMMdd]"), "1.0~20130217");
        assert_eq!(
            convert_template("1.0+SNAPSHOT", "100.[yyyyMMdd]"),
            "1.0~100.20130217"
        );
        assert_eq!(
            convert_template("1.0+SNAPSHOT", "100.[yyyyMMdd].50"),
            "1.0~100.20130217.50"
        );
        assert_eq!(
            convert_template("1.0+SNAPSHOT", "100.[yyyyMMdd].foo"),
            "1.0~100.20130217.foo"
        );
        assert_eq!(convert_template("1.0+SNAPSHOT", "nodate"), "1.0~nodate");
    }

    #[test]
    fn explicit_value_and_epoch() {
        let options = DebianVersionOptions {
            expand_snapshot: true,
            snapshot_value: Some("r1234".to_string()),
            epoch: Some(2),
            ..Default::default()
        };

        assert_eq!(
            convert_to_debian_version("1.0-SNAPSHOT", &options, &timestamp()),
            "2:1.0~r1234"
        );
        assert_eq!(
            convert_to_debian_version("1.0", &options, &timestamp()),
            "2:1.0"
        );
    }

    #[test]
    fn deterministic() {
        for version in ["1.0-SNAPSHOT", "2.1.RC1", "weird version!"] {
            assert_eq!(convert(version, true), convert(version, true));
        }
    }
}
