//! Human-unit duration fields ("500ms", "5s", "2m", "1h", "7d").

use std::time::Duration;

/// Unit suffixes, longest first so "ms" never reads as minutes.
const UNITS: [(&str, Duration); 5] = [
    ("ms", Duration::from_millis(1)),
    ("s", Duration::from_secs(1)),
    ("m", Duration::from_secs(60)),
    ("h", Duration::from_secs(60 * 60)),
    ("d", Duration::from_secs(24 * 60 * 60)),
];

/// Parse a duration like "500ms" or "2m". A bare number means seconds.
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let lowered = text.trim().to_ascii_lowercase();

    for (suffix, unit) in UNITS {
        if let Some(count) = lowered.strip_suffix(suffix) {
            return scale(count, unit, text);
        }
    }
    scale(&lowered, Duration::from_secs(1), text)
}

fn scale(count: &str, unit: Duration, original: &str) -> std::result::Result<Duration, String> {
    let count = count.trim();
    if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!(
            "invalid duration {original:?} (expected forms like \"500ms\", \"5s\", \"2m\", \"1h\", \"7d\")"
        ));
    }
    count
        .parse::<u32>()
        .ok()
        .and_then(|n| unit.checked_mul(n))
        .ok_or_else(|| format!("duration {original:?} is out of range"))
}

/// Render a duration with the coarsest unit that loses nothing.
pub fn format_duration(d: &Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    if d.subsec_millis() != 0 {
        return format!("{}ms", d.as_millis());
    }

    let secs = d.as_secs();
    if secs % (24 * 60 * 60) == 0 {
        format!("{}d", secs / (24 * 60 * 60))
    } else if secs % (60 * 60) == 0 {
        format!("{}h", secs / (60 * 60))
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// `#[serde(with = "duration::serde_duration")]` for required fields.
pub mod serde_duration {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Duration,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

/// `#[serde(with = "duration::serde_opt_duration")]` for optional fields.
pub mod serde_opt_duration {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_str(&format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Option<Duration>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|text| parse_duration(&text).map_err(serde::de::Error::custom))
            .transpose()
    }
}
