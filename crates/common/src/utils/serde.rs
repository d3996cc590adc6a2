//! Serialization utilities for common data types

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serde helpers for `Duration` stored as integer milliseconds.
///
/// Serializes to a `u64` millisecond count. Deserializes from either a
/// millisecond count or a short unit string (`"250ms"`, `"10s"`, `"5m"`,
/// `"24h"`, `"1d"`), which keeps TOML config files readable.
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use serde::{Deserialize, Serialize};
/// use tiercache_common::duration_millis;
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(u64),
        Text(String),
    }

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize milliseconds or a unit string into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(millis) => Ok(Duration::from_millis(millis)),
            Raw::Text(text) => parse(&text).map_err(serde::de::Error::custom),
        }
    }

    /// Parses `"<n><unit>"` where unit is one of `ms`, `s`, `m`, `h`, `d`.
    /// A bare number is taken as milliseconds.
    pub fn parse(text: &str) -> Result<Duration, String> {
        let text = text.trim();
        let split = text.find(|c: char| !c.is_ascii_digit()).unwrap_or(text.len());
        let (digits, unit) = text.split_at(split);
        let value: u64 =
            digits.parse().map_err(|_| format!("invalid duration '{text}': missing number"))?;

        let millis_per_unit = match unit.trim() {
            "" | "ms" => 1,
            "s" => 1_000,
            "m" => 60_000,
            "h" => 3_600_000,
            "d" => 86_400_000,
            other => return Err(format!("invalid duration unit '{other}' in '{text}'")),
        };

        value
            .checked_mul(millis_per_unit)
            .map(Duration::from_millis)
            .ok_or_else(|| format!("duration '{text}' overflows"))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for serialization utilities

    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        #[serde(with = "duration_millis")]
        timeout: Duration,
        name: String,
    }

    /// Tests that Duration serializes to milliseconds as u64
    #[test]
    fn test_duration_millis_serialize() {
        let data = TestStruct { timeout: Duration::from_millis(1500), name: "test".to_string() };

        let json = serde_json::to_string(&data).expect("Should serialize valid struct");
        assert!(json.contains("\"timeout\":1500"), "Should contain milliseconds value");
    }

    /// Tests that a plain millisecond count deserializes to Duration
    #[test]
    fn test_duration_millis_deserialize_number() {
        let json = r#"{"timeout":2500,"name":"test"}"#;
        let data: TestStruct = serde_json::from_str(json).expect("Should deserialize valid JSON");

        assert_eq!(data.timeout, Duration::from_millis(2500));
    }

    /// Validates unit strings for the readable config scenario.
    ///
    /// Assertions:
    /// - Confirms `"24h"` parses to one day.
    /// - Confirms `"10s"` parses to ten seconds.
    /// - Confirms `"250ms"` and `"250"` parse to 250 milliseconds.
    #[test]
    fn test_duration_millis_deserialize_unit_strings() {
        let data: TestStruct = serde_json::from_str(r#"{"timeout":"24h","name":"x"}"#).unwrap();
        assert_eq!(data.timeout, Duration::from_secs(86_400));

        assert_eq!(duration_millis::parse("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(duration_millis::parse("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(duration_millis::parse("250").unwrap(), Duration::from_millis(250));
        assert_eq!(duration_millis::parse("1d").unwrap(), Duration::from_secs(86_400));
    }

    /// Validates the rejection of malformed duration strings.
    ///
    /// Assertions:
    /// - Ensures unknown units, missing numbers and wrong JSON types are
    ///   errors.
    #[test]
    fn test_duration_millis_rejects_invalid_input() {
        assert!(duration_millis::parse("10 weeks").is_err());
        assert!(duration_millis::parse("h").is_err());

        let result: Result<TestStruct, _> = serde_json::from_str(r#"{"timeout":true,"name":"x"}"#);
        assert!(result.is_err());
    }
}
