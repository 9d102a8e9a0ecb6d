//! Per-handset pixel coordinates for the steps that have no reliable
//! element to target (gallery thumbnails, caption area, photo send button).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A point on screen, in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// First thumbnail in the gallery picker.
    pub photo_select: Point,
    pub photo_select_fallback: Point,
    /// Added to the horizontal screen centre when tapping the caption field.
    #[serde(default)]
    pub caption_x_offset: i64,
    pub caption_y: i64,
    pub caption_fallback: Point,
    /// Send button on the photo preview screen.
    pub send_button: Point,
    /// Search icon on the chat list, used when the element is not found.
    pub search_button: Point,
}

pub const DEFAULT_PROFILE: &str = "default";

const fn profile(
    photo: (i64, i64),
    photo_fallback: (i64, i64),
    caption_y: i64,
    caption_fallback: (i64, i64),
    send: (i64, i64),
    search: (i64, i64),
) -> DeviceProfile {
    DeviceProfile {
        photo_select: Point::new(photo.0, photo.1),
        photo_select_fallback: Point::new(photo_fallback.0, photo_fallback.1),
        caption_x_offset: 0,
        caption_y,
        caption_fallback: Point::new(caption_fallback.0, caption_fallback.1),
        send_button: Point::new(send.0, send.1),
        search_button: Point::new(search.0, search.1),
    }
}

/// Profiles measured on real handsets. `default` is the Redmi Note 13 Pro.
pub fn builtin_profiles() -> BTreeMap<String, DeviceProfile> {
    let redmi_note_13_pro = profile((180, 1350), (180, 400), 2330, (360, 1400), (990, 2310), (525, 330));
    let mut profiles = BTreeMap::new();
    profiles.insert(DEFAULT_PROFILE.to_string(), redmi_note_13_pro.clone());
    profiles.insert("Redmi Note 13 Pro".to_string(), redmi_note_13_pro);
    profiles.insert(
        "Redmi A3".to_string(),
        profile((111, 858), (111, 858), 1485, (360, 1485), (655, 1485), (355, 235)),
    );
    profiles.insert(
        "Techno Pova 7".to_string(),
        profile((170, 1379), (180, 400), 2260, (360, 1400), (990, 2267), (525, 340)),
    );
    profiles.insert(
        "Redmi 9A".to_string(),
        profile((120, 670), (180, 400), 1533, (360, 1400), (650, 1533), (525, 225)),
    );
    profiles.insert(
        "VIVO V2043".to_string(),
        profile((120, 730), (180, 400), 1460, (360, 1400), (657, 1462), (353, 206)),
    );
    profiles
}

/// Look a profile up by name, ignoring case. An empty name means `default`.
pub fn find_profile<'a>(
    profiles: &'a BTreeMap<String, DeviceProfile>,
    name: &str,
) -> Option<(&'a str, &'a DeviceProfile)> {
    let wanted = if name.trim().is_empty() {
        DEFAULT_PROFILE
    } else {
        name.trim()
    };
    profiles
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
        .map(|(key, profile)| (key.as_str(), profile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_always_exists() {
        let profiles = builtin_profiles();
        let (name, profile) = find_profile(&profiles, "").expect("default profile");
        assert_eq!(name, DEFAULT_PROFILE);
        assert_eq!(profile.send_button, Point::new(990, 2310));
    }

    #[test]
    fn lookup_ignores_case() {
        let profiles = builtin_profiles();
        let (name, profile) = find_profile(&profiles, "redmi a3").expect("Redmi A3");
        assert_eq!(name, "Redmi A3");
        assert_eq!(profile.caption_y, 1485);
        assert!(find_profile(&profiles, "Pixel 9").is_none());
    }
}
