use serde::{Deserialize, Serialize};

/// User profile persisted locally by the settings page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub town: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl Profile {
    pub const UNKNOWN_LOCATION: &'static str = "Unknown Location";

    /// `"Town, State, Country"` when all three parts are filled in.
    pub fn location(&self) -> Option<String> {
        fn part(p: &Option<String>) -> Option<&str> {
            p.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }
        let (town, state, country) = (part(&self.town)?, part(&self.state)?, part(&self.country)?);
        Some(format!("{town}, {state}, {country}"))
    }
}

/// Location text for an alert, falling back when the profile is missing or incomplete.
pub fn alert_location(profile: Option<&Profile>) -> String {
    profile
        .and_then(Profile::location)
        .unwrap_or_else(|| Profile::UNKNOWN_LOCATION.to_string())
}
