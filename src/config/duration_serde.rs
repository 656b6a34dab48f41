//! Serde helpers for human-readable durations in configuration.
//!
//! Accepts plain seconds (`30`) or humantime strings (`"30s"`, `"1h30m"`)
//! and always writes the humantime form back out.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::{fmt, time::Duration};

pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("seconds as a number or a duration string such as '5m' or '1h30m'")
        }

        fn visit_u64<E>(self, seconds: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(seconds))
        }

        fn visit_i64<E>(self, seconds: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            u64::try_from(seconds)
                .map(Duration::from_secs)
                .map_err(|_| de::Error::custom(format!("negative duration: {seconds}")))
        }

        fn visit_f64<E>(self, seconds: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Duration::try_from_secs_f64(seconds)
                .map_err(|e| de::Error::custom(format!("invalid duration {seconds}: {e}")))
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(value)
                .map_err(|e| de::Error::custom(format!("invalid duration '{value}': {e}")))
        }
    }

    deserializer.deserialize_any(DurationVisitor)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        timeout: Duration,
    }

    #[test]
    fn test_parses_strings_and_numbers() {
        let w: Wrapper = toml::from_str(r#"timeout = "1h30m""#).unwrap();
        assert_eq!(w.timeout, Duration::from_secs(5400));

        let w: Wrapper = toml::from_str("timeout = 45").unwrap();
        assert_eq!(w.timeout, Duration::from_secs(45));

        assert!(toml::from_str::<Wrapper>(r#"timeout = "soon""#).is_err());
        assert!(toml::from_str::<Wrapper>("timeout = -3").is_err());
    }

    #[test]
    fn test_writes_humantime() {
        let text = toml::to_string(&Wrapper {
            timeout: Duration::from_secs(90),
        })
        .unwrap();
        assert_eq!(text.trim(), r#"timeout = "1m 30s""#);
    }
}
