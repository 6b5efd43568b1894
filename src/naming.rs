//! Descriptive key titles
//!
//! Every key this tool generates is titled `machine-setup-{host}-{YYYYMMDD}`.
//! The date is anchored as the trailing 8-digit group, so the host segment
//! may itself contain hyphens.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Literal prefix shared by all managed key titles
pub const TITLE_PREFIX: &str = "machine-setup-";

static TITLE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.+)-([0-9]{8})$").expect("valid title pattern"));

/// Host and date carried by a managed key title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyName {
    pub host: String,
    pub date: NaiveDate,
}

/// Build the title for a key generated on `host` at `date`
pub fn encode(host: &str, date: NaiveDate) -> String {
    format!("{}{}-{}", TITLE_PREFIX, host, date.format("%Y%m%d"))
}

/// Parse a title back into host and date
///
/// Returns `None` for titles outside the convention, including ones whose
/// trailing token is not a real calendar date.
pub fn decode(title: &str) -> Option<KeyName> {
    let rest = title.strip_prefix(TITLE_PREFIX)?;
    let caps = TITLE_SUFFIX.captures(rest)?;
    let host = caps.get(1)?.as_str();
    let date = parse_date_tag(caps.get(2)?.as_str())?;

    Some(KeyName {
        host: host.to_string(),
        date,
    })
}

fn parse_date_tag(tag: &str) -> Option<NaiveDate> {
    let year = tag.get(0..4)?.parse().ok()?;
    let month = tag.get(4..6)?.parse().ok()?;
    let day = tag.get(6..8)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Reduce an OS host name to a title-safe token
///
/// Keeps the first DNS label, lowercased, with anything outside
/// `[a-z0-9-]` replaced by `-`.
pub fn sanitize_host(raw: &str) -> String {
    let label = raw.trim().split('.').next().unwrap_or("");
    let cleaned: String = label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-');

    if cleaned.is_empty() {
        "localhost".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Host name of this machine, sanitized for use in a title
pub fn local_host() -> String {
    match hostname::get() {
        Ok(name) => sanitize_host(&name.to_string_lossy()),
        Err(e) => {
            tracing::warn!("Could not read host name, using 'localhost': {}", e);
            "localhost".to_string()
        }
    }
}
