//! Stream watchdogs: fire-once failure listeners, one per activation.

use std::collections::HashMap;

use crate::camera::CameraId;

/// Identifies one attach of a camera's stream transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Activation(pub u64);

#[derive(Debug, Default)]
pub struct WatchdogSet {
    armed: HashMap<CameraId, Activation>,
    next_activation: u64,
}

impl WatchdogSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a fresh watchdog for a camera, replacing any earlier one
    pub fn arm(&mut self, camera: CameraId) -> Activation {
        let activation = Activation(self.next_activation);
        self.next_activation += 1;
        self.armed.insert(camera, activation);
        activation
    }

    pub fn disarm(&mut self, camera: CameraId) -> Option<Activation> {
        self.armed.remove(&camera)
    }

    /// Consume a failure signal. Only the current activation fires, and only once.
    pub fn fire(&mut self, camera: CameraId, activation: Activation) -> bool {
        match self.armed.get(&camera) {
            Some(current) if *current == activation => {
                self.armed.remove(&camera);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self, camera: CameraId) -> bool {
        self.armed.contains_key(&camera)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.armed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once() {
        let mut dogs = WatchdogSet::new();
        let act = dogs.arm(CameraId(1));
        assert!(dogs.fire(CameraId(1), act));
        assert!(!dogs.fire(CameraId(1), act));
        assert!(!dogs.is_armed(CameraId(1)));
    }

    #[test]
    fn test_rearm_ignores_stale_activation() {
        let mut dogs = WatchdogSet::new();
        let first = dogs.arm(CameraId(1));
        let second = dogs.arm(CameraId(1));
        assert_ne!(first, second);
        assert!(!dogs.fire(CameraId(1), first));
        assert!(dogs.is_armed(CameraId(1)));
        assert!(dogs.fire(CameraId(1), second));
    }

    #[test]
    fn test_disarmed_does_not_fire() {
        let mut dogs = WatchdogSet::new();
        let act = dogs.arm(CameraId(4));
        assert_eq!(dogs.disarm(CameraId(4)), Some(act));
        assert!(!dogs.fire(CameraId(4), act));
        assert_eq!(dogs.len(), 0);
    }
}
