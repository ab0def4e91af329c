use serde::{Deserialize, Serialize};

/// Session facts pulled from the YAML session-info block.
///
/// Only a handful of top-level keys are read, line by line, so a malformed
/// block never prevents decoding telemetry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionInfo {
    /// Short track identifier used for zone lookups (e.g. "spa up")
    pub track_id: Option<String>,
    pub track_name: String,
    pub car_name: Option<String>,
    pub session_type: Option<String>,
}

impl Default for SessionInfo {
    fn default() -> Self {
        Self {
            track_id: None,
            track_name: "Unknown".to_string(),
            car_name: None,
            session_type: None,
        }
    }
}

impl SessionInfo {
    pub fn parse(raw: &str) -> Self {
        let mut info = SessionInfo::default();
        for line in raw.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            // first occurrence wins, later ones belong to nested driver/session lists
            match key.trim().trim_start_matches("- ") {
                "TrackName" if info.track_id.is_none() => info.track_id = Some(value.to_string()),
                "TrackDisplayName" if info.track_name == "Unknown" => {
                    info.track_name = value.to_string()
                }
                "CarScreenName" if info.car_name.is_none() => {
                    info.car_name = Some(value.to_string())
                }
                "SessionType" if info.session_type.is_none() => {
                    info.session_type = Some(value.to_string())
                }
                _ => {}
            }
        }
        info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION_YAML: &str = "---\nWeekendInfo:\n TrackName: spa up\n TrackDisplayName: Circuit de Spa-Francorchamps\nSessionInfo:\n Sessions:\n - SessionNum: 0\n   SessionType: Offline Testing\n - SessionNum: 1\n   SessionType: Race\nDriverInfo:\n Drivers:\n - CarScreenName: Super Formula Lights\n";

    #[test]
    fn test_parse_known_keys() {
        let info = SessionInfo::parse(SESSION_YAML);
        assert_eq!(info.track_id.as_deref(), Some("spa up"));
        assert_eq!(info.track_name, "Circuit de Spa-Francorchamps");
        assert_eq!(info.car_name.as_deref(), Some("Super Formula Lights"));
        assert_eq!(info.session_type.as_deref(), Some("Offline Testing"));
    }

    #[test]
    fn test_parse_garbage_falls_back_to_defaults() {
        let info = SessionInfo::parse("not yaml at all\n\u{0}\u{0}");
        assert_eq!(info, SessionInfo::default());
    }
}
