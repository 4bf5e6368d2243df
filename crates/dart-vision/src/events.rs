//! Outbound events pushed by the detection loop.
//!
//! Serialized as flat JSON objects tagged by `type`:
//! `{"type":"dart_detected","segment":"T20","value":20,"multiplier":3,
//! "dartNumber":1,"confidence":0.91,"timestamp":"..."}` and
//! `{"type":"takeout_detected","timestamp":"..."}`.

use crate::fusion::FusedDetection;
use crate::segment::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DartDetected {
    pub segment: Segment,
    pub value: u32,
    pub multiplier: u32,
    /// Position within the current turn, 1..=3.
    pub dart_number: u8,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl DartDetected {
    pub fn from_fused(fused: &FusedDetection, dart_number: u8, timestamp: DateTime<Utc>) -> Self {
        Self {
            segment: fused.segment,
            value: fused.value,
            multiplier: fused.multiplier,
            dart_number,
            confidence: fused.confidence,
            timestamp,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TakeoutDetected {
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DetectionEvent {
    DartDetected(DartDetected),
    TakeoutDetected(TakeoutDetected),
}

impl DetectionEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::DartDetected(e) => e.timestamp,
            Self::TakeoutDetected(e) => e.timestamp,
        }
    }

    pub fn as_dart(&self) -> Option<&DartDetected> {
        match self {
            Self::DartDetected(e) => Some(e),
            Self::TakeoutDetected(_) => None,
        }
    }

    pub fn is_takeout(&self) -> bool {
        matches!(self, Self::TakeoutDetected(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 18, 30, 5).unwrap()
    }

    #[test]
    fn dart_event_wire_shape() {
        let event = DetectionEvent::DartDetected(DartDetected {
            segment: Segment::Triple(20),
            value: 20,
            multiplier: 3,
            dart_number: 2,
            confidence: 0.75,
            timestamp: ts(),
        });
        let v: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "dart_detected");
        assert_eq!(v["segment"], "T20");
        assert_eq!(v["value"], 20);
        assert_eq!(v["multiplier"], 3);
        assert_eq!(v["dartNumber"], 2);
        assert_eq!(v["confidence"], 0.75);
        assert!(v["timestamp"].as_str().unwrap().starts_with("2024-03-09T18:30:05"));

        let back: DetectionEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn takeout_event_wire_shape() {
        let event = DetectionEvent::TakeoutDetected(TakeoutDetected { timestamp: ts() });
        let v: Value = serde_json::to_value(&event).unwrap();
        assert_eq!(v["type"], "takeout_detected");
        assert_eq!(v.as_object().unwrap().len(), 2);
        assert!(event.is_takeout());
        assert!(event.as_dart().is_none());
    }
}
