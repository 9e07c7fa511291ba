//! Metadata redaction for log lines.
//!
//! Values of six characters or fewer are fully masked; longer values keep two
//! characters at each end so operators can still tell entries apart.

use std::collections::BTreeMap;
use std::fmt;

const MASK: &str = "***";
const KEEP: usize = 2;
const FULL_MASK_MAX_CHARS: usize = 6;

pub fn redact_value(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= FULL_MASK_MAX_CHARS {
        return MASK.to_string();
    }
    let prefix: String = chars[..KEEP].iter().collect();
    let suffix: String = chars[chars.len() - KEEP..].iter().collect();
    format!("{prefix}{MASK}{suffix}")
}

/// Redact every value of a metadata map, keeping keys readable.
pub fn redact_fields<'a, I>(fields: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), redact_value(value)))
        .collect()
}

/// Display wrapper that prints the redacted form of its contents.
///
/// ```ignore
/// warn!(error = %Redacted(&err), "restart failed");
/// ```
pub struct Redacted<T>(pub T);

impl<T: fmt::Display> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&redact_value(&self.0.to_string()))
    }
}

impl<T: fmt::Display> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
