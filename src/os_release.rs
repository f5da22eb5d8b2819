//! Host operating-system detection from `/etc/os-release`.

use crate::cancel::CancellationToken;
use crate::error::RsprovisionError;
use crate::executor::{CommandChannel, run_checked};

/// Command issued to read the host's identification data.
pub const OS_RELEASE_COMMAND: &str = "cat /etc/os-release";

/// Identity of the host operating system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsRelease {
    /// Normalized (lowercase) family identifier, e.g. `centos`
    pub id: String,
    /// Related family hints from `ID_LIKE`, in file order
    pub id_like: Vec<String>,
    pub name: String,
    pub pretty_name: String,
    pub version: String,
    pub version_id: String,
}

impl OsRelease {
    /// Creates a release with only the family id set.
    ///
    /// Used when the profile pins the family and detection is skipped.
    pub fn from_id(id: impl AsRef<str>) -> Self {
        Self {
            id: id.as_ref().trim().to_ascii_lowercase(),
            ..Default::default()
        }
    }

    /// `PRETTY_NAME` when present, otherwise the id.
    pub fn display_name(&self) -> &str {
        if self.pretty_name.is_empty() {
            &self.id
        } else {
            &self.pretty_name
        }
    }

    /// Parses the contents of an os-release file.
    ///
    /// Blank lines and `#` comments are skipped and unknown keys ignored.
    /// A non-comment line without `=`, or a missing/empty `ID`, fails with
    /// [`RsprovisionError::Detection`].
    pub fn parse(contents: &str) -> Result<Self, RsprovisionError> {
        let mut release = OsRelease::default();

        for (lineno, raw) in contents.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(RsprovisionError::Detection(format!(
                    "unparsable os-release line {}: {:?}",
                    lineno + 1,
                    raw
                )));
            };
            let value = unquote(value.trim());
            match key.trim() {
                "ID" => release.id = value.to_ascii_lowercase(),
                "ID_LIKE" => {
                    release.id_like = value
                        .split_whitespace()
                        .map(|s| s.to_ascii_lowercase())
                        .collect();
                }
                "NAME" => release.name = value,
                "PRETTY_NAME" => release.pretty_name = value,
                "VERSION" => release.version = value,
                "VERSION_ID" => release.version_id = value,
                _ => {}
            }
        }

        if release.id.is_empty() {
            return Err(RsprovisionError::Detection(
                "os-release does not define a non-empty ID".to_string(),
            ));
        }

        Ok(release)
    }
}

/// Strips one level of matching quotes and resolves backslash escapes.
fn unquote(value: &str) -> String {
    let inner = if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Reads and parses `/etc/os-release` from the host.
///
/// Not cached: call once per run and pass the result to strategy selection.
pub fn detect_os_release(
    channel: &dyn CommandChannel,
    cancel: &CancellationToken,
) -> Result<OsRelease, RsprovisionError> {
    let output = run_checked(channel, cancel, OS_RELEASE_COMMAND, false).map_err(|e| match e {
        RsprovisionError::Cancelled => e,
        other => RsprovisionError::Detection(format!("failed to read os-release: {}", other)),
    })?;
    let release = OsRelease::parse(&output.stdout_string())?;
    tracing::debug!("detected os: id={} version_id={}", release.id, release.version_id);
    Ok(release)
}
