use chrono::{FixedOffset, Utc};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldTimeError {
    #[error("unknown location: {0}")]
    UnknownLocation(String),
}

/// Location → canonical zone name + standard-time UTC offset in minutes.
/// A fixed-offset table keeps the lookup pure; DST shifts are accepted as
/// a known coarseness.
const ZONES: &[(&[&str], &str, i32)] = &[
    (&["london", "uk"], "Europe/London", 0),
    (&["berlin", "germany", "paris", "france", "madrid", "rome", "amsterdam"], "Europe/Berlin", 60),
    (&["helsinki", "athens", "kyiv", "bucharest"], "Europe/Helsinki", 120),
    (&["moscow"], "Europe/Moscow", 180),
    (&["dubai"], "Asia/Dubai", 240),
    (&["karachi"], "Asia/Karachi", 300),
    (&["delhi", "mumbai", "india", "kolkata"], "Asia/Kolkata", 330),
    (&["dhaka"], "Asia/Dhaka", 360),
    (&["bangkok", "jakarta"], "Asia/Bangkok", 420),
    (&["beijing", "shanghai", "china", "singapore", "hong kong", "taipei"], "Asia/Shanghai", 480),
    (&["tokyo", "japan", "seoul", "korea"], "Asia/Tokyo", 540),
    (&["sydney", "melbourne"], "Australia/Sydney", 600),
    (&["auckland", "new zealand"], "Pacific/Auckland", 720),
    (&["honolulu", "hawaii"], "Pacific/Honolulu", -600),
    (&["anchorage", "alaska"], "America/Anchorage", -540),
    (&["los angeles", "seattle", "san francisco", "california"], "America/Los_Angeles", -480),
    (&["denver", "phoenix"], "America/Denver", -420),
    (&["chicago", "mexico city", "dallas"], "America/Chicago", -360),
    (&["new york", "toronto", "boston", "miami"], "America/New_York", -300),
    (&["sao paulo", "buenos aires"], "America/Sao_Paulo", -180),
    (&["utc", "gmt"], "Etc/UTC", 0),
];

/// Resolve a location string to `(zone name, current time)` formatted as
/// `YYYY-MM-DD HH:MM`.
pub fn current_time(location: &str) -> Result<(String, String), WorldTimeError> {
    let needle = location.trim().to_lowercase();
    for (aliases, zone, offset_minutes) in ZONES {
        if aliases.contains(&needle.as_str()) {
            let offset = FixedOffset::east_opt(offset_minutes * 60)
                .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap());
            let now = Utc::now().with_timezone(&offset);
            return Ok((zone.to_string(), now.format("%Y-%m-%d %H:%M").to_string()));
        }
    }
    Err(WorldTimeError::UnknownLocation(location.to_string()))
}

/// Pull the location out of "time in X" / "what time is it in X".
pub fn parse_time_query(text: &str) -> Option<String> {
    let lower = text.trim().to_lowercase();
    for prefix in ["what time is it in ", "current time in ", "time in "] {
        if let Some(rest) = lower.strip_prefix(prefix) {
            let location = rest.trim().trim_end_matches('?').trim();
            if !location.is_empty() {
                return Some(location.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_locations_resolve() {
        let (zone, time) = current_time("tokyo").unwrap();
        assert_eq!(zone, "Asia/Tokyo");
        // "YYYY-MM-DD HH:MM"
        assert_eq!(time.len(), 16);
    }

    #[test]
    fn unknown_location_is_typed() {
        assert!(matches!(
            current_time("atlantis"),
            Err(WorldTimeError::UnknownLocation(_))
        ));
    }

    #[test]
    fn query_shapes() {
        assert_eq!(parse_time_query("time in tokyo"), Some("tokyo".into()));
        assert_eq!(
            parse_time_query("What time is it in New York?"),
            Some("new york".into())
        );
        assert_eq!(parse_time_query("tokyo weather"), None);
    }
}
