//! Hand-landmark gesture classification.
//!
//! Landmarks use the usual 21-point hand model with normalised image
//! coordinates. Only a handful of points matter here: wrist (0), thumb tip
//! (4), index tip (8), middle knuckle (9) and the four finger tips.

use std::time::Duration;

use serde::Deserialize;

use crate::config::GestureThresholds;
use crate::state::AppState;

pub const WRIST: usize = 0;
pub const THUMB_TIP: usize = 4;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const FINGER_TIPS: [usize; 4] = [8, 12, 16, 20];
pub const LANDMARKS_PER_HAND: usize = 21;

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Planar distance; depth is ignored.
    pub fn distance(&self, other: &Landmark) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// One detected hand. Deserialises from a plain array of landmarks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Hand(pub Vec<Landmark>);

impl Hand {
    pub fn landmark(&self, idx: usize) -> Option<&Landmark> {
        self.0.get(idx)
    }

    pub fn is_complete(&self) -> bool {
        self.0.len() >= LANDMARKS_PER_HAND
    }
}

/// One frame of detector output.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HandFrame {
    #[serde(default)]
    pub hands: Vec<Hand>,
    /// Wait this long before applying the frame (recorded feeds).
    #[serde(default, with = "humantime_serde")]
    pub after: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureReading {
    pub state: AppState,
    /// Horizontal hand position driving the EXPLODE/PHOTO rotation.
    pub hand_x: Option<f32>,
}

/// Map the detected hands to a desired state.
///
/// Exactly two hands whose index tips and thumb tips both touch form a HEART. A single
/// hand is a fist (TREE), a pinch (PHOTO) or open (EXPLODE). No hands falls
/// back to TREE. Hands with missing landmarks are skipped.
pub fn classify(hands: &[Hand], thresholds: &GestureThresholds) -> GestureReading {
    let complete: Vec<&Hand> = hands.iter().filter(|h| h.is_complete()).collect();

    if let [a, b] = complete.as_slice() {
        let index = a.0[INDEX_TIP].distance(&b.0[INDEX_TIP]);
        let thumb = a.0[THUMB_TIP].distance(&b.0[THUMB_TIP]);
        if index < thresholds.heart_distance && thumb < thresholds.heart_distance {
            return GestureReading {
                state: AppState::Heart,
                hand_x: None,
            };
        }
    }

    let Some(hand) = complete.first() else {
        return GestureReading {
            state: AppState::Tree,
            hand_x: None,
        };
    };
    let lm = &hand.0;
    let wrist = lm[WRIST];
    let avg_tip = FINGER_TIPS
        .iter()
        .map(|i| lm[*i].distance(&wrist))
        .sum::<f32>()
        / FINGER_TIPS.len() as f32;
    let pinch = lm[THUMB_TIP].distance(&lm[INDEX_TIP]);

    let state = if avg_tip < thresholds.fist_distance {
        AppState::Tree
    } else if pinch < thresholds.pinch_distance {
        AppState::Photo
    } else {
        AppState::Explode
    };
    GestureReading {
        state,
        hand_x: Some(lm[MIDDLE_MCP].x),
    }
}

/// Group rotation target for a normalised hand X in [0, 1].
pub fn hand_rotation(hand_x: f32) -> f32 {
    (hand_x - 0.5) * 4.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hand(f: impl Fn(usize) -> Landmark) -> Hand {
        Hand((0..LANDMARKS_PER_HAND).map(f).collect())
    }

    fn open_hand(offset_x: f32) -> Hand {
        hand(|i| match i {
            WRIST => Landmark::new(offset_x, 0.9),
            THUMB_TIP => Landmark::new(offset_x - 0.2, 0.5),
            _ if FINGER_TIPS.contains(&i) => Landmark::new(offset_x + 0.02 * i as f32, 0.4),
            _ => Landmark::new(offset_x, 0.7),
        })
    }

    #[test]
    fn no_hands_is_tree() {
        let reading = classify(&[], &GestureThresholds::default());
        assert_eq!(reading.state, AppState::Tree);
        assert_eq!(reading.hand_x, None);
    }

    #[test]
    fn fist_is_tree() {
        let fist = hand(|i| Landmark::new(0.5 + 0.001 * i as f32, 0.5));
        let reading = classify(&[fist], &GestureThresholds::default());
        assert_eq!(reading.state, AppState::Tree);
        assert!(reading.hand_x.is_some());
    }

    #[test]
    fn open_hand_is_explode_and_reports_knuckle_x() {
        let reading = classify(&[open_hand(0.3)], &GestureThresholds::default());
        assert_eq!(reading.state, AppState::Explode);
        assert_eq!(reading.hand_x, Some(0.3));
    }

    #[test]
    fn pinch_is_photo() {
        let mut h = open_hand(0.5);
        h.0[THUMB_TIP] = Landmark::new(h.0[INDEX_TIP].x + 0.01, h.0[INDEX_TIP].y);
        let reading = classify(&[h], &GestureThresholds::default());
        assert_eq!(reading.state, AppState::Photo);
    }

    #[test]
    fn two_touching_hands_are_heart() {
        let left = open_hand(0.4);
        let mut right = open_hand(0.6);
        right.0[INDEX_TIP] = Landmark::new(left.0[INDEX_TIP].x + 0.05, left.0[INDEX_TIP].y);
        right.0[THUMB_TIP] = Landmark::new(left.0[THUMB_TIP].x + 0.05, left.0[THUMB_TIP].y);
        let reading = classify(&[left, right], &GestureThresholds::default());
        assert_eq!(reading.state, AppState::Heart);
    }

    #[test]
    fn three_touching_hands_are_not_heart() {
        let reading = classify(
            &[open_hand(0.5), open_hand(0.5), open_hand(0.5)],
            &GestureThresholds::default(),
        );
        assert_eq!(reading.state, AppState::Explode);
        assert_eq!(reading.hand_x, Some(0.5));

        let partial = Hand(vec![Landmark::default(); 5]);
        let reading = classify(
            &[open_hand(0.5), partial, open_hand(0.5)],
            &GestureThresholds::default(),
        );
        assert_eq!(reading.state, AppState::Heart);
    }

    #[test]
    fn two_apart_hands_use_the_first() {
        let reading = classify(
            &[open_hand(0.1), open_hand(0.9)],
            &GestureThresholds::default(),
        );
        assert_eq!(reading.state, AppState::Explode);
        assert_eq!(reading.hand_x, Some(0.1));
    }

    #[test]
    fn incomplete_hands_are_ignored() {
        let partial = Hand(vec![Landmark::default(); 5]);
        let reading = classify(&[partial], &GestureThresholds::default());
        assert_eq!(reading.state, AppState::Tree);
    }

    #[test]
    fn rotation_is_centred() {
        assert_eq!(hand_rotation(0.5), 0.0);
        assert_eq!(hand_rotation(1.0), 2.0);
        assert_eq!(hand_rotation(0.0), -2.0);
    }

    #[test]
    fn frame_parses_from_json() {
        let json = r#"{"hands":[[{"x":0.1,"y":0.2},{"x":0.3,"y":0.4,"z":0.5}]]}"#;
        let frame: HandFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.hands.len(), 1);
        assert_eq!(frame.hands[0].0[1].z, 0.5);
        assert_eq!(frame.after, None);
        let empty: HandFrame = serde_json::from_str(r#"{"after":"40ms"}"#).unwrap();
        assert!(empty.hands.is_empty());
        assert_eq!(empty.after, Some(Duration::from_millis(40)));
    }
}
