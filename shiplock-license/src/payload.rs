//! License payload and its canonical byte form.
//!
//! Canonical form is compact JSON with object keys sorted bytewise at every
//! level, timestamps as `YYYY-MM-DDTHH:MM:SSZ`, and numbers as printed by
//! `serde_json`. The signature covers exactly these bytes, and the artifact
//! carries exactly these bytes (base64), so a verifier never has to
//! re-serialize before checking a signature.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, SubsecRound, Timelike, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LicenseError, LicenseResult};
use crate::fingerprint::MachineFingerprint;

/// Fixed timestamp layout used in payloads.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Largest year the four-digit timestamp layout can carry.
pub const MAX_YEAR: i32 = 9999;

/// Sentinel stored in `expires_at` for perpetual licenses.
pub const NEVER: &str = "never";

/// Free-form feature flags carried in a license.
pub type Features = BTreeMap<String, Value>;

/// When a license stops being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    /// Perpetual.
    Never,
    /// Expires after this instant.
    At(DateTime<Utc>),
}

impl Expiry {
    /// Parses operator input: `never`, a date (`2025-12-31`, meaning the end
    /// of that UTC day), or an RFC 3339 timestamp.
    pub fn parse_input(input: &str) -> LicenseResult<Self> {
        let input = input.trim();
        if input.eq_ignore_ascii_case(NEVER) {
            return Ok(Self::Never);
        }
        let at = if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
            date.and_hms_opt(23, 59, 59)
                .map(|end_of_day| end_of_day.and_utc())
                .ok_or_else(|| LicenseError::InvalidPayload(format!("invalid expiry '{input}'")))?
        } else {
            DateTime::parse_from_rfc3339(input)
                .map(|dt| dt.with_timezone(&Utc).trunc_subsecs(0))
                .map_err(|e| LicenseError::InvalidPayload(format!("invalid expiry '{input}': {e}")))?
        };
        check_timestamp("expires_at", at)?;
        Ok(Self::At(at))
    }

    /// True if `now` is past the expiry instant.
    #[must_use]
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Never => false,
            Self::At(at) => now > *at,
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str(NEVER),
            Self::At(at) => write!(f, "{}", at.format(TIMESTAMP_FORMAT)),
        }
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == NEVER {
            return Ok(Self::Never);
        }
        timestamp::parse(&raw).map(Self::At).map_err(de::Error::custom)
    }
}

pub(crate) mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc))
    }
}

/// The signed content of a license.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicensePayload {
    /// Random (v4) license identifier.
    pub license_id: Uuid,
    /// Product the license unlocks.
    pub product_id: String,
    /// Licensee.
    pub client: String,
    /// Issuance time (UTC, whole seconds).
    #[serde(with = "timestamp")]
    pub issued_at: DateTime<Utc>,
    /// Expiry, or `"never"`.
    pub expires_at: Expiry,
    /// Whether `machine_id` must match the verifying machine.
    pub machine_bound: bool,
    /// Hex fingerprint of the licensed machine.
    pub machine_id: Option<String>,
    /// Feature flags for caller-side gating.
    #[serde(default)]
    pub features: Features,
}

impl LicensePayload {
    /// Checks the payload invariants.
    ///
    /// # Errors
    ///
    /// [`LicenseError::InvalidPayload`] if a required field is blank, a
    /// timestamp has no exact canonical form, expiry precedes issuance, or
    /// machine binding is inconsistent.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.product_id.trim().is_empty() {
            return Err(LicenseError::InvalidPayload("product_id is required".into()));
        }
        if self.client.trim().is_empty() {
            return Err(LicenseError::InvalidPayload("client is required".into()));
        }
        check_timestamp("issued_at", self.issued_at)?;
        if let Expiry::At(at) = self.expires_at {
            check_timestamp("expires_at", at)?;
            if at < self.issued_at {
                return Err(LicenseError::InvalidPayload(format!(
                    "expires_at {} precedes issued_at {}",
                    self.expires_at,
                    self.issued_at.format(TIMESTAMP_FORMAT)
                )));
            }
        }
        match (&self.machine_bound, &self.machine_id) {
            (true, None) => Err(LicenseError::InvalidPayload(
                "machine-bound license has no machine_id".into(),
            )),
            (true, Some(id)) => {
                // One machine, one signed encoding: the verifier compares bytes.
                if MachineFingerprint::from_hex(id)?.as_str() != id.as_str() {
                    return Err(LicenseError::InvalidPayload(
                        "machine_id must be lowercase hex".into(),
                    ));
                }
                Ok(())
            }
            (false, Some(_)) => Err(LicenseError::InvalidPayload(
                "unbound license carries a machine_id".into(),
            )),
            (false, None) => Ok(()),
        }
    }

    /// Canonical bytes of this payload.
    pub fn canonical_bytes(&self) -> LicenseResult<Vec<u8>> {
        canonical_bytes(self)
    }

    /// Parses canonical payload bytes, rejecting any other encoding of the
    /// same content.
    pub fn from_canonical_bytes(bytes: &[u8]) -> LicenseResult<Self> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| LicenseError::Malformed(format!("payload: {e}")))?;
        if payload.canonical_bytes()? != bytes {
            return Err(LicenseError::Malformed("payload is not in canonical form".into()));
        }
        Ok(payload)
    }
}

/// Rejects instants the canonical layout would alter: sub-second parts
/// and years outside `0..=9999`.
fn check_timestamp(field: &str, at: DateTime<Utc>) -> LicenseResult<()> {
    if at.nanosecond() != 0 {
        return Err(LicenseError::InvalidPayload(format!(
            "{field} must be whole seconds"
        )));
    }
    if !(0..=MAX_YEAR).contains(&at.year()) {
        return Err(LicenseError::InvalidPayload(format!(
            "{field} year {} is outside 0000-{MAX_YEAR}",
            at.year()
        )));
    }
    Ok(())
}

/// Serializes any value to canonical JSON.
pub fn canonical_bytes<T: Serialize>(value: &T) -> LicenseResult<Vec<u8>> {
    let value = serde_json::to_value(value)?;
    let mut out = Vec::with_capacity(256);
    write_canonical(&value, &mut out)?;
    Ok(out)
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) -> LicenseResult<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_canonical(item, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}
