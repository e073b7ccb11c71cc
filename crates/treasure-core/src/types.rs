//! Core types for Treasure Hunt
//!
//! - Block locations
//! - Markers (the claimable treasures)
//! - Actors and claim entries
//! - Timestamps

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Result, TreasureError};

/// Longest marker identifier the store accepts
pub const MAX_ID_LEN: usize = 64;

/// Longest world name the store accepts
pub const MAX_WORLD_LEN: usize = 64;

/// Longest action string the store accepts
pub const MAX_ACTION_LEN: usize = 512;

/// Placeholder replaced by the actor's display name when an action is rendered
pub const ACTOR_PLACEHOLDER: &str = "%player%";

/// Timestamp type alias
pub type Timestamp = DateTime<Utc>;

/// Current moment truncated to whole milliseconds, the store's resolution
pub fn now() -> Timestamp {
    from_millis(Utc::now().timestamp_millis())
}

/// Timestamp from milliseconds since the epoch
pub fn from_millis(ms: i64) -> Timestamp {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// A block-granular position in a named world
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockLocation {
    pub world: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockLocation {
    pub fn new(world: impl Into<String>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }
}

impl fmt::Display for BlockLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}, {}, {}", self.world, self.x, self.y, self.z)
    }
}

/// Case-insensitive lookup key for a marker identifier
pub fn marker_key(id: &str) -> String {
    id.to_ascii_lowercase()
}

/// Identifiers are `[A-Za-z0-9_]+`: the store folds case for ASCII only
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A placed, claimable reward bound to one location.
///
/// Identity is the identifier, compared case-insensitively. A marker is never
/// mutated; changing one means deleting it and creating a replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marker {
    id: String,
    location: BlockLocation,
    action: String,
    created_at: Timestamp,
}

impl Marker {
    /// Create a marker stamped with the current time
    pub fn new(
        id: impl Into<String>,
        location: BlockLocation,
        action: impl Into<String>,
    ) -> Result<Self> {
        Self::with_created_at(id, location, action, now())
    }

    /// Create a marker with an explicit creation time (rows loaded from the store)
    pub fn with_created_at(
        id: impl Into<String>,
        location: BlockLocation,
        action: impl Into<String>,
        created_at: Timestamp,
    ) -> Result<Self> {
        let marker = Self {
            id: id.into(),
            location,
            action: action.into(),
            created_at,
        };
        marker.validate()?;
        Ok(marker)
    }

    fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(TreasureError::InvalidInput(
                "marker id must not be empty".to_string(),
            ));
        }
        if self.id.chars().count() > MAX_ID_LEN {
            return Err(TreasureError::InvalidInput(format!(
                "marker id '{}' exceeds {} characters",
                self.id, MAX_ID_LEN
            )));
        }
        if !is_valid_id(&self.id) {
            return Err(TreasureError::InvalidInput(format!(
                "marker id '{}' may only contain ASCII letters, digits and '_'",
                self.id
            )));
        }
        if self.location.world.is_empty() || self.location.world.chars().count() > MAX_WORLD_LEN {
            return Err(TreasureError::InvalidInput(format!(
                "world name must be 1..={} characters",
                MAX_WORLD_LEN
            )));
        }
        if self.action.chars().count() > MAX_ACTION_LEN {
            return Err(TreasureError::InvalidInput(format!(
                "action for '{}' exceeds {} characters",
                self.id, MAX_ACTION_LEN
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lowercased identifier used by the identifier index
    pub fn key(&self) -> String {
        marker_key(&self.id)
    }

    pub fn location(&self) -> &BlockLocation {
        &self.location
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Whether the given block is this marker's block
    pub fn matches_location(&self, location: &BlockLocation) -> bool {
        self.location == *location
    }

    /// The action with the actor placeholder filled in
    pub fn render_action(&self, actor_name: &str) -> String {
        self.action.replace(ACTOR_PLACEHOLDER, actor_name)
    }

    /// All definitional fields equal, not just the identifier
    pub fn same_fields(&self, other: &Marker) -> bool {
        self.id == other.id
            && self.location == other.location
            && self.action == other.action
            && self.created_at == other.created_at
    }
}

impl PartialEq for Marker {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Marker {}

impl Hash for Marker {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Marker{{id='{}', location={}}}", self.id, self.location)
    }
}

/// Stable identifier of an actor across processes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Someone who interacts with markers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    /// Skips the existence check; the store's constraint still applies
    pub bypass: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ActorId::new(id),
            name: name.into(),
            bypass: false,
        }
    }

    pub fn with_bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }
}

/// One recorded claim, as listed from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub actor_id: ActorId,
    pub claimed_at: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn gold() -> Marker {
        Marker::new("Gold1", BlockLocation::new("overworld", 10, 64, -5), "give %player% gold")
            .unwrap()
    }

    #[test]
    fn test_marker_identity_is_case_insensitive() {
        let a = gold();
        let b = Marker::new("GOLD1", BlockLocation::new("nether", 0, 0, 0), "other").unwrap();

        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_location_display_and_equality() {
        let loc = BlockLocation::new("overworld", 10, 64, -5);
        assert_eq!(loc.to_string(), "overworld 10, 64, -5");
        assert_eq!(loc, BlockLocation::new("overworld", 10, 64, -5));
        assert_ne!(loc, BlockLocation::new("Overworld", 10, 64, -5));
    }

    #[test]
    fn test_matches_location() {
        let marker = gold();
        assert!(marker.matches_location(&BlockLocation::new("overworld", 10, 64, -5)));
        assert!(!marker.matches_location(&BlockLocation::new("Overworld", 10, 64, -5)));
        assert!(!marker.matches_location(&BlockLocation::new("overworld", 10, 65, -5)));
    }

    #[test]
    fn test_render_action() {
        assert_eq!(gold().render_action("Steve"), "give Steve gold");
    }

    #[test]
    fn test_validation_rejects_oversized_fields() {
        let loc = BlockLocation::new("overworld", 0, 0, 0);
        assert!(Marker::new("", loc.clone(), "x").is_err());
        assert!(Marker::new("a".repeat(MAX_ID_LEN + 1), loc.clone(), "x").is_err());
        assert!(Marker::new("ok", loc.clone(), "a".repeat(MAX_ACTION_LEN + 1)).is_err());
        assert!(Marker::new("ok", BlockLocation::new("", 0, 0, 0), "x").is_err());
        assert!(Marker::new("a".repeat(MAX_ID_LEN), loc, "x").is_ok());
    }

    #[test]
    fn test_validation_rejects_ids_outside_ascii_word_chars() {
        let loc = BlockLocation::new("overworld", 0, 0, 0);
        for bad in ["Ärz", "ärz", "gold 1", "gold-1", "gold1\n", "ǅ"] {
            let err = Marker::new(bad, loc.clone(), "x").unwrap_err();
            assert!(matches!(err, TreasureError::InvalidInput(_)), "{bad:?}");
        }
        assert!(Marker::new("Gold_1", loc, "x").is_ok());
        assert!(is_valid_id("abc_XYZ_09"));
        assert!(!is_valid_id(""));
    }

    #[test]
    fn test_marker_key_matches_ascii_case_folding() {
        assert_eq!(marker_key("GoLd_1"), "gold_1");
        assert_eq!(marker_key("Ärz"), "Ärz");
    }

    #[test]
    fn test_now_has_millisecond_resolution() {
        let t = now();
        assert_eq!(from_millis(t.timestamp_millis()), t);
    }
}
