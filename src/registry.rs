//! Ordered camera registry.
//!
//! The registry is the source of truth for which cameras exist. A camera's
//! position in the list is its order, and order decides slot assignment in
//! the grid, so the list is always contiguous from 0.

use crate::camera::{Camera, CameraDefinition, CameraId};
use crate::error::FleetError;

#[derive(Debug, Default)]
pub struct CameraRegistry {
    cameras: Vec<Camera>,
    /// Next id to hand out. Never decreases, so deleted ids are not reused.
    next_id: u64,
    /// Bumped on every mutation; lets late async results detect newer state
    revision: u64,
}

impl CameraRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a camera at the next order, in state Idle
    pub fn add(&mut self, definition: CameraDefinition) -> Result<CameraId, FleetError> {
        definition.validate()?;
        let id = CameraId(self.next_id);
        self.next_id += 1;
        self.cameras.push(Camera::new(id, definition));
        self.revision += 1;
        Ok(id)
    }

    /// Delete a camera, compacting the order of everything after it.
    /// The caller is responsible for stopping an Active camera first.
    pub fn remove(&mut self, id: CameraId) -> Option<Camera> {
        let index = self.position(id)?;
        self.revision += 1;
        Some(self.cameras.remove(index))
    }

    /// Move a camera to order 0; the ones before it shift back by one
    pub fn reorder_to_front(&mut self, id: CameraId) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        if index > 0 {
            let camera = self.cameras.remove(index);
            self.cameras.insert(0, camera);
        }
        self.revision += 1;
        true
    }

    pub fn list(&self) -> &[Camera] {
        &self.cameras
    }

    pub fn get(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.id == id)
    }

    /// Mutable access counts as a mutation
    pub fn get_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        let camera = self.cameras.iter_mut().find(|c| c.id == id)?;
        self.revision += 1;
        Some(camera)
    }

    /// Order of a camera
    pub fn position(&self, id: CameraId) -> Option<usize> {
        self.cameras.iter().position(|c| c.id == id)
    }

    /// The camera occupying slot 0
    pub fn primary(&self) -> Option<&Camera> {
        self.cameras.first()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replace the whole list with restored cameras. `next_id` is raised past
    /// every restored id so new cameras cannot collide with them.
    pub fn restore(&mut self, cameras: Vec<Camera>, next_id: u64) {
        let past_max = cameras.iter().map(|c| c.id.0 + 1).max().unwrap_or(0);
        self.next_id = self.next_id.max(next_id).max(past_max);
        self.cameras = cameras;
        self.revision += 1;
    }

    /// Drop every camera, keeping the id counter
    pub fn clear(&mut self) -> Vec<Camera> {
        self.revision += 1;
        std::mem::take(&mut self.cameras)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraState, Source};

    fn def(name: &str) -> CameraDefinition {
        CameraDefinition::new(name, Source::Rtsp(format!("rtsp://cams/{}", name)), false)
    }

    fn names(registry: &CameraRegistry) -> Vec<&str> {
        registry.list().iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_add_assigns_unique_ids_in_order() {
        let mut registry = CameraRegistry::new();
        let a = registry.add(def("a")).unwrap();
        let b = registry.add(def("b")).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.position(a), Some(0));
        assert_eq!(registry.position(b), Some(1));
        assert_eq!(registry.get(a).unwrap().state, CameraState::Idle);
    }

    #[test]
    fn test_add_rejects_invalid_without_mutation() {
        let mut registry = CameraRegistry::new();
        let before = registry.revision();
        assert!(registry.add(CameraDefinition::new("", Source::Local(0), false)).is_err());
        assert!(registry.add(CameraDefinition::new("x", Source::Http(String::new()), false)).is_err());
        assert!(registry.is_empty());
        assert_eq!(registry.revision(), before);
        assert_eq!(registry.next_id(), 0);
    }

    #[test]
    fn test_local_zero_accepted() {
        let mut registry = CameraRegistry::new();
        assert!(registry.add(CameraDefinition::new("desk", Source::Local(0), true)).is_ok());
    }

    #[test]
    fn test_remove_compacts_and_never_reuses_ids() {
        let mut registry = CameraRegistry::new();
        let ids: Vec<_> = ["a", "b", "c", "d"].iter().map(|n| registry.add(def(n)).unwrap()).collect();

        registry.remove(ids[1]).unwrap();
        assert_eq!(names(&registry), vec!["a", "c", "d"]);
        assert_eq!(registry.position(ids[2]), Some(1));
        assert_eq!(registry.position(ids[3]), Some(2));

        let e = registry.add(def("e")).unwrap();
        assert!(!ids.contains(&e));
        assert_eq!(registry.position(e), Some(3));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut registry = CameraRegistry::new();
        registry.add(def("a")).unwrap();
        let before = registry.revision();
        assert!(registry.remove(CameraId(99)).is_none());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.revision(), before);
    }

    #[test]
    fn test_reorder_from_order_three() {
        let mut registry = CameraRegistry::new();
        let ids: Vec<_> = ["a", "b", "c", "d", "e"].iter().map(|n| registry.add(def(n)).unwrap()).collect();

        assert!(registry.reorder_to_front(ids[3]));
        assert_eq!(names(&registry), vec!["d", "a", "b", "c", "e"]);
        assert_eq!(registry.primary().unwrap().id, ids[3]);
    }

    #[test]
    fn test_reorder_unknown_is_noop() {
        let mut registry = CameraRegistry::new();
        registry.add(def("a")).unwrap();
        assert!(!registry.reorder_to_front(CameraId(42)));
        assert_eq!(names(&registry), vec!["a"]);
    }

    #[test]
    fn test_restore_raises_next_id() {
        let mut registry = CameraRegistry::new();
        let camera = Camera::new(CameraId(9), def("old"));
        registry.restore(vec![camera], 3);
        assert_eq!(registry.next_id(), 10);
        let fresh = registry.add(def("new")).unwrap();
        assert_eq!(fresh, CameraId(10));
    }
}
