//! Core ID types for keyframes and landmarks.

/// Unique identifier for a KeyFrame.
///
/// Assigned by the front end; used as a lightweight handle for logging and
/// bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyFrameId(pub u64);

impl KeyFrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for KeyFrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KF{}", self.0)
    }
}

/// Unique identifier for a Landmark.
///
/// Landmark identity is what deduplicates shared landmarks when a window is
/// rescaled, so ids must be unique across all live landmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LandmarkId(pub u64);

impl LandmarkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LM{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyframe_id_equality() {
        assert_eq!(KeyFrameId::new(42), KeyFrameId::new(42));
        assert_ne!(KeyFrameId::new(42), KeyFrameId::new(43));
    }

    #[test]
    fn test_landmark_id_display() {
        assert_eq!(format!("{}", LandmarkId::new(123)), "LM123");
        assert_eq!(format!("{}", KeyFrameId::new(7)), "KF7");
    }

    #[test]
    fn test_id_as_hashset_key() {
        use std::collections::HashSet;

        let mut seen: HashSet<LandmarkId> = HashSet::new();
        assert!(seen.insert(LandmarkId::new(1)));
        assert!(!seen.insert(LandmarkId::new(1)));
        assert!(seen.insert(LandmarkId::new(2)));
    }
}
