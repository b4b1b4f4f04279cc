//! Landmark - a triangulated 3D point shared by every feature observing it.
//!
//! Landmarks are handed around as `Arc<Landmark>`: each [`Feature`] that
//! observes the point holds one strong reference, so the landmark lives as
//! long as its longest-surviving observer. The position is guarded by a
//! reader-writer lock because tracking and visualization read it while the
//! back end rewrites it.
//!
//! [`Feature`]: super::feature::Feature

use std::sync::atomic::{AtomicU32, Ordering};

use nalgebra::Vector3;
use parking_lot::RwLock;

use super::types::LandmarkId;

pub struct Landmark {
    pub id: LandmarkId,

    /// 3D position in world frame. Scale-ambiguous until visual-inertial
    /// initialization has run.
    position: RwLock<Vector3<f64>>,

    /// Number of successful reprojections.
    succeeded_reprojections: AtomicU32,
}

impl Landmark {
    pub fn new(id: LandmarkId, position: Vector3<f64>) -> Self {
        Self {
            id,
            position: RwLock::new(position),
            succeeded_reprojections: AtomicU32::new(0),
        }
    }

    /// Position read under the shared lock.
    pub fn position(&self) -> Vector3<f64> {
        *self.position.read()
    }

    /// Replace the whole position under the exclusive lock.
    pub fn set_position(&self, position: Vector3<f64>) {
        *self.position.write() = position;
    }

    /// Multiply the position by `scale` while holding the exclusive lock for
    /// the whole read-modify-write.
    pub fn rescale(&self, scale: f64) {
        let mut guard = self.position.write();
        *guard = *guard * scale;
    }

    pub fn succeeded_reprojections(&self) -> u32 {
        self.succeeded_reprojections.load(Ordering::Relaxed)
    }

    pub fn increase_succeeded(&self) {
        self.succeeded_reprojections.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Landmark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Landmark")
            .field("id", &self.id)
            .field("position", &self.position())
            .field("succeeded_reprojections", &self.succeeded_reprojections())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rescale() {
        let lm = Landmark::new(LandmarkId::new(1), Vector3::new(1.0, 2.0, 3.0));
        lm.rescale(2.0);
        assert_eq!(lm.position(), Vector3::new(2.0, 4.0, 6.0));
    }

    #[test]
    fn test_success_counter() {
        let lm = Landmark::new(LandmarkId::new(1), Vector3::zeros());
        lm.increase_succeeded();
        lm.increase_succeeded();
        assert_eq!(lm.succeeded_reprojections(), 2);
    }

    #[test]
    fn test_readers_never_observe_torn_positions() {
        let lm = Arc::new(Landmark::new(LandmarkId::new(1), Vector3::new(1.0, 1.0, 1.0)));

        let reader = {
            let lm = Arc::clone(&lm);
            thread::spawn(move || {
                for _ in 0..10_000 {
                    let p = lm.position();
                    assert!(p.x == p.y && p.y == p.z);
                }
            })
        };

        for i in 0..10_000 {
            let v = i as f64;
            lm.set_position(Vector3::new(v, v, v));
        }
        reader.join().unwrap();
    }
}
