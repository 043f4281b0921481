//! Garage value types shared by the store, the wire protocol and the client mirror.
//!
//! A [`Garage`] is always a copy. The authoritative count lives inside
//! [`OccupancyStore`](crate::store::OccupancyStore); everything else holds
//! snapshots of it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fraction at or above which a garage that still has space is reported busy.
pub const BUSY_THRESHOLD: f64 = 0.75;

fn default_open() -> bool {
    true
}

/// A parking garage and its current occupancy.
///
/// Field names follow the JSON schema used on the wire
/// (`currentCount`, `isOpen`). Unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Garage {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub current_count: u32,
    pub capacity: u32,
    #[serde(default = "default_open")]
    pub is_open: bool,
    /// Number of applied changes to this garage since the server started.
    /// `0` for seed values and for servers that do not report it.
    #[serde(default)]
    pub revision: u64,
}

impl Garage {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, capacity: u32) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            current_count: 0,
            capacity,
            is_open: true,
            revision: 0,
        }
    }

    /// `(latitude, longitude)`
    pub fn location(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Occupied share of the capacity, `0.0` for a zero-capacity garage.
    pub fn occupancy_fraction(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            f64::from(self.current_count) / f64::from(self.capacity)
        }
    }

    pub fn is_full(&self) -> bool {
        self.current_count >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.current_count == 0
    }

    /// `0 <= current_count <= capacity`. The lower bound is carried by the type.
    pub fn within_capacity(&self) -> bool {
        self.current_count <= self.capacity
    }

    pub fn status(&self) -> OccupancyStatus {
        if self.is_full() {
            OccupancyStatus::Full
        } else if self.is_empty() {
            OccupancyStatus::Empty
        } else if self.occupancy_fraction() >= BUSY_THRESHOLD {
            OccupancyStatus::Busy
        } else {
            OccupancyStatus::Moderate
        }
    }

    /// Map pins show busy garages in red.
    pub fn is_busy(&self) -> bool {
        matches!(self.status(), OccupancyStatus::Busy | OccupancyStatus::Full)
    }
}

/// Coarse occupancy bucket derived from the count; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OccupancyStatus {
    Empty,
    Moderate,
    Busy,
    Full,
}

impl fmt::Display for OccupancyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Empty => "Empty",
            Self::Moderate => "Moderate",
            Self::Busy => "Busy",
            Self::Full => "Full",
        };
        f.write_str(label)
    }
}

/// A requested occupancy change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    CheckIn,
    CheckOut,
}

impl Action {
    /// Path segment used by the HTTP gateway.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckIn => "checkin",
            Self::CheckOut => "checkout",
        }
    }

    /// Signed change this action makes when it is applied.
    pub fn delta(&self) -> i64 {
        match self {
            Self::CheckIn => 1,
            Self::CheckOut => -1,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action '{0}', expected 'checkin' or 'checkout'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkin" => Ok(Self::CheckIn),
            "checkout" => Ok(Self::CheckOut),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// How a check-in or check-out was resolved by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationTag {
    /// The count changed and an event was published.
    Applied,
    /// Check-in on a full garage; nothing changed.
    AtCapacity,
    /// Check-out on an empty garage; nothing changed.
    AlreadyEmpty,
}

impl MutationTag {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::AtCapacity => "at-capacity",
            Self::AlreadyEmpty => "already-empty",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "applied" => Some(Self::Applied),
            "at-capacity" => Some(Self::AtCapacity),
            "already-empty" => Some(Self::AlreadyEmpty),
            _ => None,
        }
    }
}

/// Result of a successful store call: the post-call garage plus its tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub garage: Garage,
    pub tag: MutationTag,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn garage(count: u32, capacity: u32) -> Garage {
        Garage {
            current_count: count,
            ..Garage::new("Test", 0.0, 0.0, capacity)
        }
    }

    #[test]
    fn test_occupancy_fraction() {
        assert_eq!(garage(3, 12).occupancy_fraction(), 0.25);
        assert_eq!(garage(0, 0).occupancy_fraction(), 0.0);
    }

    #[test]
    fn test_status_buckets() {
        assert_eq!(garage(0, 12).status(), OccupancyStatus::Empty);
        assert_eq!(garage(5, 12).status(), OccupancyStatus::Moderate);
        assert_eq!(garage(9, 12).status(), OccupancyStatus::Busy);
        assert_eq!(garage(12, 12).status(), OccupancyStatus::Full);
        // No room at all counts as full, not empty.
        assert_eq!(garage(0, 0).status(), OccupancyStatus::Full);
        assert!(garage(9, 12).is_busy());
        assert!(!garage(1, 12).is_busy());
    }

    #[test]
    fn test_wire_field_names() {
        let json = serde_json::to_value(garage(2, 12)).unwrap();
        assert_eq!(json["currentCount"], 2);
        assert_eq!(json["capacity"], 12);
        assert_eq!(json["isOpen"], true);
        assert_eq!(json["revision"], 0);
    }

    #[test]
    fn test_is_open_defaults_to_true() {
        let g: Garage = serde_json::from_str(
            r#"{"name":"McCarty","latitude":29.6,"longitude":-82.3,"currentCount":0,"capacity":12}"#,
        )
        .unwrap();
        assert!(g.is_open);
        assert_eq!(g.revision, 0);
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let res: Result<Garage, _> = serde_json::from_str(
            r#"{"name":"X","latitude":0,"longitude":0,"currentCount":0,"capacity":1,"color":"red"}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_negative_count_rejected() {
        let res: Result<Garage, _> = serde_json::from_str(
            r#"{"name":"X","latitude":0,"longitude":0,"currentCount":-1,"capacity":1}"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_action_parse() {
        assert_eq!("checkin".parse::<Action>().unwrap(), Action::CheckIn);
        assert_eq!("checkout".parse::<Action>().unwrap(), Action::CheckOut);
        assert!("CHECKIN".parse::<Action>().is_err());
        assert_eq!(Action::CheckOut.delta(), -1);
    }

    #[test]
    fn test_mutation_tag_strings() {
        for tag in [MutationTag::Applied, MutationTag::AtCapacity, MutationTag::AlreadyEmpty] {
            assert_eq!(MutationTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(MutationTag::parse("clamped"), None);
    }
}
