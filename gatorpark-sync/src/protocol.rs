//! JSON wire format for garages.
//!
//! Every payload is a [`Garage`] object or an array of them:
//! ```text
//! {"name":"Rawlings","latitude":29.645255,"longitude":-82.342954,
//!  "currentCount":3,"capacity":12,"isOpen":true,"revision":41}
//! ```
//!
//! Decoding is strict: unknown fields, missing fields, negative counts and
//! counts above capacity are all rejected instead of being patched up. Only
//! `isOpen` and `revision` may be left out.
//! The mutation outcome travels in the [`OUTCOME_HEADER`] response header so
//! the body keeps the plain garage schema.

use gatorpark_core::{Garage, MutationTag};
use std::collections::HashSet;

/// Response header carrying the [`MutationTag`] of a check-in/check-out.
pub const OUTCOME_HEADER: &str = "x-occupancy-outcome";

/// Serialize a single garage for the push channel or a mutation response.
pub fn encode_garage(garage: &Garage) -> Result<String, ProtocolError> {
    serde_json::to_string(garage).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

/// Serialize the full garage list.
pub fn encode_snapshot(garages: &[Garage]) -> Result<String, ProtocolError> {
    serde_json::to_string(garages).map_err(|e| ProtocolError::SerializationError(e.to_string()))
}

/// Parse and validate one garage object.
pub fn decode_garage(bytes: &[u8]) -> Result<Garage, ProtocolError> {
    let garage: Garage = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    validate(&garage)?;
    Ok(garage)
}

/// Parse and validate a garage list; names must be unique.
pub fn decode_snapshot(bytes: &[u8]) -> Result<Vec<Garage>, ProtocolError> {
    let garages: Vec<Garage> = serde_json::from_slice(bytes)
        .map_err(|e| ProtocolError::DeserializationError(e.to_string()))?;
    let mut seen = HashSet::with_capacity(garages.len());
    for garage in &garages {
        validate(garage)?;
        if !seen.insert(garage.name.as_str()) {
            return Err(ProtocolError::DuplicateGarage(garage.name.clone()));
        }
    }
    Ok(garages)
}

/// Read the outcome header value. A missing header means the server applied
/// the change without reporting a tag.
pub fn decode_outcome(header: Option<&str>) -> Result<MutationTag, ProtocolError> {
    match header {
        None => Ok(MutationTag::Applied),
        Some(value) => MutationTag::parse(value.trim())
            .ok_or_else(|| ProtocolError::UnknownOutcome(value.to_string())),
    }
}

fn validate(garage: &Garage) -> Result<(), ProtocolError> {
    if garage.name.is_empty() {
        return Err(ProtocolError::DeserializationError(
            "garage name is empty".to_string(),
        ));
    }
    if !garage.within_capacity() {
        return Err(ProtocolError::InvariantViolated {
            name: garage.name.clone(),
            count: garage.current_count,
            capacity: garage.capacity,
        });
    }
    Ok(())
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    SerializationError(String),
    DeserializationError(String),
    InvariantViolated {
        name: String,
        count: u32,
        capacity: u32,
    },
    DuplicateGarage(String),
    UnknownOutcome(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SerializationError(e) => write!(f, "Serialization error: {e}"),
            Self::DeserializationError(e) => write!(f, "Deserialization error: {e}"),
            Self::InvariantViolated {
                name,
                count,
                capacity,
            } => write!(f, "Garage '{name}' reports {count} cars for capacity {capacity}"),
            Self::DuplicateGarage(name) => write!(f, "Garage '{name}' listed twice"),
            Self::UnknownOutcome(value) => write!(f, "Unknown mutation outcome '{value}'"),
        }
    }
}

impl std::error::Error for ProtocolError {}

#[cfg(test)]
mod tests {
    use super::*;

    const RAWLINGS: &str = r#"{"name":"Rawlings","latitude":29.645255,"longitude":-82.342954,"currentCount":3,"capacity":12}"#;

    #[test]
    fn test_decode_without_is_open() {
        let garage = decode_garage(RAWLINGS.as_bytes()).unwrap();
        assert_eq!(garage.name, "Rawlings");
        assert_eq!(garage.current_count, 3);
        assert_eq!(garage.revision, 0);
        assert_eq!(garage.capacity, 12);
        assert!(garage.is_open);
    }

    #[test]
    fn test_encode_is_decodable() {
        let garage = decode_garage(RAWLINGS.as_bytes()).unwrap();
        let text = encode_garage(&garage).unwrap();
        assert!(text.contains("\"currentCount\":3"));
        assert_eq!(decode_garage(text.as_bytes()).unwrap(), garage);
    }

    #[test]
    fn test_missing_field_rejected() {
        let err = decode_garage(br#"{"name":"Rawlings","latitude":1,"longitude":2,"capacity":12}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DeserializationError(_)));
    }

    #[test]
    fn test_over_capacity_rejected() {
        let err = decode_garage(
            br#"{"name":"A","latitude":1,"longitude":2,"currentCount":13,"capacity":12}"#,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvariantViolated {
                name: "A".to_string(),
                count: 13,
                capacity: 12
            }
        );
    }

    #[test]
    fn test_snapshot_duplicates_rejected() {
        let body = format!("[{RAWLINGS},{RAWLINGS}]");
        assert_eq!(
            decode_snapshot(body.as_bytes()),
            Err(ProtocolError::DuplicateGarage("Rawlings".to_string()))
        );
    }

    #[test]
    fn test_snapshot_empty_array() {
        assert!(decode_snapshot(b"[]").unwrap().is_empty());
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_garage(&[0xFF, 0xFE, 0xFD]).is_err());
        assert!(decode_snapshot(b"{\"name\":\"x\"}").is_err());
    }

    #[test]
    fn test_outcome_header() {
        assert_eq!(decode_outcome(None), Ok(MutationTag::Applied));
        assert_eq!(decode_outcome(Some("at-capacity")), Ok(MutationTag::AtCapacity));
        assert_eq!(decode_outcome(Some(" already-empty ")), Ok(MutationTag::AlreadyEmpty));
        assert!(matches!(
            decode_outcome(Some("maybe")),
            Err(ProtocolError::UnknownOutcome(_))
        ));
    }
}
