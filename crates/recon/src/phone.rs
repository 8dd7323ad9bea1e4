//! Phone canonicalization for Israeli numbers.
//!
//! Every phone that takes part in matching goes through [`normalize`]. The
//! canonical form is a local-format digit string: `05XXXXXXXX` for mobiles,
//! `0X XXX XXXX` (9 digits) or 10-digit `0XX…` for landlines. Inputs that do
//! not fit any canonical shape but still carry at least 7 digits are kept as a
//! best-effort key so partially formatted numbers can still match.
//!
//! Derivation is pure and recomputed on demand; records never cache it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Country calling code, stripped and replaced by [`TRUNK_DIGIT`].
const COUNTRY_CODE: &str = "972";
/// Local trunk prefix.
const TRUNK_DIGIT: char = '0';
/// First digit of a mobile number once the trunk digit is removed.
const MOBILE_PREFIX: char = '5';
/// Full local length (trunk digit included).
const FULL_LENGTH: usize = 10;
/// Short landline length (trunk digit included).
const LANDLINE_SHORT_LENGTH: usize = 9;
/// Below this many digits a number is useless as a matching key.
const MIN_KEY_DIGITS: usize = 7;

/// Canonical digit string produced by [`normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// True for one of the canonical local shapes (not a best-effort key).
    pub fn is_canonical(&self) -> bool {
        canonical_shape(&self.0)
    }
}

impl fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedPhone {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn canonical_shape(digits: &str) -> bool {
    let len = digits.len();
    let mobile_lead = format!("{TRUNK_DIGIT}{MOBILE_PREFIX}");
    if len == FULL_LENGTH && digits.starts_with(&mobile_lead) {
        return true;
    }
    // Landlines: 9 digits, or 10 digits for the longer area codes.
    (len == LANDLINE_SHORT_LENGTH || len == FULL_LENGTH) && digits.starts_with(TRUNK_DIGIT)
}

/// Normalize a raw, human-entered phone number.
///
/// Handles `+972-50-123-4567`, `972501234567`, `050-123-4567`, `0501234567`,
/// `501234567`, `050 123 4567`. Returns `None` when fewer than 7 digits
/// survive; callers treat `None` as "cannot match on phone".
pub fn normalize(raw: Option<&str>) -> Option<NormalizedPhone> {
    let raw = raw?;
    let mut digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    if let Some(rest) = digits.strip_prefix(COUNTRY_CODE) {
        digits = format!("{TRUNK_DIGIT}{rest}");
    }

    if digits.len() == FULL_LENGTH - 1 && digits.starts_with(MOBILE_PREFIX) {
        digits.insert(0, TRUNK_DIGIT);
    }

    if canonical_shape(&digits) || digits.len() >= MIN_KEY_DIGITS {
        Some(NormalizedPhone(digits))
    } else {
        None
    }
}

/// True when both inputs normalize to the same key. `false` if either is unusable.
pub fn matches(a: Option<&str>, b: Option<&str>) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Display/indexing variants of a phone number: the canonical form, then the
/// international forms (`972…`, `+972…`), then the dashed `05X-XXX-XXXX`
/// form for 10-digit numbers. Empty when the input does not normalize.
pub fn variants(raw: Option<&str>) -> Vec<String> {
    let Some(normalized) = normalize(raw) else {
        return Vec::new();
    };
    let canonical = normalized.into_string();
    let mut out = Vec::with_capacity(4);

    let international = canonical
        .strip_prefix(TRUNK_DIGIT)
        .map(|rest| format!("{COUNTRY_CODE}{rest}"));

    let dashed = (canonical.len() == FULL_LENGTH).then(|| {
        format!("{}-{}-{}", &canonical[..3], &canonical[3..6], &canonical[6..])
    });

    out.push(canonical);
    if let Some(intl) = international {
        out.push(format!("+{intl}"));
        out.insert(1, intl);
    }
    if let Some(d) = dashed {
        out.push(d);
    }
    out
}
