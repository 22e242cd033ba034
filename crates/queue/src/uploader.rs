//! Registry of named queues with metrics aggregated across all of them.

use std::sync::Arc;

use tracing::info;
use upqueue_protocol::AnchorConfig;

use crate::config::QueueConfig;
use crate::engine::EngineFactory;
use crate::error::QueueError;
use crate::file::FileEntry;
use crate::queue::{UploadQueue, percent};
use crate::target::UploadTarget;

/// Owns every [`UploadQueue`] of an application, keyed by name.
pub struct Uploader {
    factory: Arc<dyn EngineFactory>,
    config: QueueConfig,
    /// Registration order.
    queues: Vec<UploadQueue>,
}

impl Uploader {
    pub fn new(factory: Arc<dyn EngineFactory>, config: QueueConfig) -> Self {
        Self {
            factory,
            config,
            queues: Vec::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Returns the queue called `name`, creating it if needed.
    ///
    /// The queue's host target is replaced with `target`. When an anchor is
    /// given a session is bound to it; if that binding fails an existing
    /// queue keeps its previous target and a new queue is not registered.
    pub fn find_or_create(
        &mut self,
        name: &str,
        target: Arc<dyn UploadTarget>,
        anchor: Option<&AnchorConfig>,
    ) -> Result<&mut UploadQueue, QueueError> {
        let index = match self.queues.iter().position(|q| q.name() == name) {
            Some(index) => {
                let queue = &mut self.queues[index];
                let previous = queue.set_target(target);
                if let Some(anchor) = anchor {
                    if let Err(e) = queue.configure(anchor) {
                        queue.set_target(previous);
                        return Err(e);
                    }
                }
                index
            }
            None => {
                let mut queue = UploadQueue::new(
                    name,
                    self.config.clone(),
                    Arc::clone(&self.factory),
                    target,
                );
                if let Some(anchor) = anchor {
                    queue.configure(anchor)?;
                }
                info!(queue = name, "queue created");
                self.queues.push(queue);
                self.queues.len() - 1
            }
        };
        Ok(&mut self.queues[index])
    }

    pub fn get(&self, name: &str) -> Option<&UploadQueue> {
        self.queues.iter().find(|q| q.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut UploadQueue> {
        self.queues.iter_mut().find(|q| q.name() == name)
    }

    /// Destroys and unregisters a queue. Returns `false` if it was unknown.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(pos) = self.queues.iter().position(|q| q.name() == name) else {
            return false;
        };
        let mut queue = self.queues.remove(pos);
        queue.destroy();
        true
    }

    pub fn queue_names(&self) -> impl Iterator<Item = &str> {
        self.queues.iter().map(UploadQueue::name)
    }

    pub fn queues(&self) -> &[UploadQueue] {
        &self.queues
    }

    /// Every tracked file, queue by queue.
    pub fn files(&self) -> Vec<Arc<FileEntry>> {
        self.queues
            .iter()
            .flat_map(|q| q.files().iter().cloned())
            .collect()
    }

    pub fn size(&self) -> u64 {
        self.queues.iter().fold(0u64, |acc, q| acc.saturating_add(q.size()))
    }

    pub fn loaded(&self) -> u64 {
        self.queues.iter().fold(0u64, |acc, q| acc.saturating_add(q.loaded()))
    }

    /// Progress across all queues, weighted by size.
    pub fn progress(&self) -> u8 {
        let (loaded, size) = self.queues.iter().fold((0u128, 0u128), |(loaded, size), q| {
            let (l, s) = q.wide_totals();
            (loaded + l, size + s)
        });
        percent(loaded, size)
    }

    pub fn uploading(&self) -> bool {
        self.queues.iter().any(UploadQueue::uploading)
    }

    /// Drains pending events of every queue.
    pub fn process_pending(&mut self) -> usize {
        self.queues
            .iter_mut()
            .map(UploadQueue::process_pending)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use upqueue_protocol::{EngineEvent, RawFile, SessionId};

    use super::*;
    use crate::test_support::{MockFactory, MockTarget};

    fn anchor(id: &str) -> AnchorConfig {
        AnchorConfig::new("/upload").with_browse_button(id)
    }

    fn add(queue: &mut UploadQueue, session: SessionId, id: &str, size: u64, loaded: u64) {
        queue.handle_event(
            session,
            EngineEvent::FilesAdded {
                files: vec![RawFile::new(id, "test-filename.jpg", size).with_loaded(loaded)],
            },
        );
    }

    fn first_session(queue: &UploadQueue) -> SessionId {
        queue.sessions()[0].id()
    }

    #[test]
    fn size_aggregates_all_queues() {
        let factory = MockFactory::new();
        let target = MockTarget::with_anchors(&["b1", "b2", "b3"]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());

        uploader.find_or_create("queue1", target.clone(), Some(&anchor("b1"))).unwrap();
        uploader.find_or_create("queue2", target.clone(), Some(&anchor("b2"))).unwrap();
        uploader.find_or_create("queue3", target.clone(), Some(&anchor("b3"))).unwrap();
        assert_eq!(uploader.files().len(), 0);
        assert_eq!(uploader.size(), 0);
        assert_eq!(uploader.progress(), 0);
        assert!(!uploader.uploading());

        let q1 = uploader.get_mut("queue1").unwrap();
        let s1 = first_session(q1);
        add(q1, s1, "test", 2000, 0);
        assert_eq!(uploader.files().len(), 1);
        assert_eq!(uploader.size(), 2000);

        let q2 = uploader.get_mut("queue2").unwrap();
        let s2 = first_session(q2);
        add(q2, s2, "test1", 3500, 0);
        add(q2, s2, "test2", 1400, 0);
        assert_eq!(uploader.files().len(), 3);
        assert_eq!(uploader.size(), 6900);
        assert_eq!(uploader.loaded(), 0);
        assert!(uploader.uploading());
    }

    #[test]
    fn loaded_and_progress_aggregate_all_queues() {
        let factory = MockFactory::new();
        let target = MockTarget::with_anchors(&["b1", "b2", "b3"]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());

        let q1 = uploader.find_or_create("queue1", target.clone(), Some(&anchor("b1"))).unwrap();
        let s1 = first_session(q1);
        add(q1, s1, "test", 2000, 500);
        assert_eq!(uploader.loaded(), 500);
        assert_eq!(uploader.progress(), 25);

        let q2 = uploader.find_or_create("queue2", target.clone(), Some(&anchor("b2"))).unwrap();
        let s2 = first_session(q2);
        add(q2, s2, "test1", 3500, 500);
        assert_eq!(uploader.size(), 5500);
        assert_eq!(uploader.loaded(), 1000);
        assert_eq!(uploader.progress(), 18);

        uploader.find_or_create("queue3", target.clone(), Some(&anchor("b3"))).unwrap();
        let q2 = uploader.get_mut("queue2").unwrap();
        add(q2, s2, "test2", 1400, 1000);
        assert_eq!(uploader.size(), 6900);
        assert_eq!(uploader.loaded(), 2000);
        assert_eq!(uploader.progress(), 28);
    }

    #[test]
    fn find_returns_existing_queue() {
        let factory = MockFactory::new();
        let first = MockTarget::with_anchors(&["b1"]);
        let second = MockTarget::with_anchors(&["b1"]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());

        uploader.find_or_create("photos", first.clone(), Some(&anchor("b1"))).unwrap();
        let queue = uploader.find_or_create("photos", second.clone(), None).unwrap();
        assert_eq!(queue.sessions().len(), 1);
        assert_eq!(uploader.queue_names().collect::<Vec<_>>(), ["photos"]);
        assert_eq!(factory.created(), 1);

        let queue = uploader.get_mut("photos").unwrap();
        let session = first_session(queue);
        add(queue, session, "a", 10, 0);
        assert!(first.added().is_empty());
        assert_eq!(second.added().len(), 1);
    }

    #[test]
    fn failed_binding_registers_nothing() {
        let factory = MockFactory::new();
        let target = MockTarget::with_anchors(&[]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());

        let err = uploader
            .find_or_create("photos", target.clone(), Some(&anchor("missing")))
            .unwrap_err();
        assert!(matches!(err, QueueError::MissingAnchor(_)));
        assert!(uploader.get("photos").is_none());
    }

    #[test]
    fn failed_rebinding_keeps_previous_target() {
        let factory = MockFactory::new();
        let first = MockTarget::with_anchors(&["b1"]);
        let second = MockTarget::with_anchors(&[]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());
        uploader.find_or_create("photos", first.clone(), Some(&anchor("b1"))).unwrap();

        let err = uploader
            .find_or_create("photos", second.clone(), Some(&anchor("b2")))
            .unwrap_err();
        assert!(matches!(err, QueueError::MissingAnchor(_)));

        let queue = uploader.get_mut("photos").unwrap();
        let session = first_session(queue);
        add(queue, session, "a", 10, 0);
        assert_eq!(first.added().len(), 1);
        assert!(second.added().is_empty());
    }

    #[test]
    fn aggregates_survive_sizes_past_u64() {
        let factory = MockFactory::new();
        let target = MockTarget::with_anchors(&["b1", "b2"]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());
        let half = u64::MAX / 2 + 1;

        let q1 = uploader.find_or_create("queue1", target.clone(), Some(&anchor("b1"))).unwrap();
        let s1 = first_session(q1);
        add(q1, s1, "a", half, half);
        let q2 = uploader.find_or_create("queue2", target.clone(), Some(&anchor("b2"))).unwrap();
        let s2 = first_session(q2);
        add(q2, s2, "b", half, 0);

        assert_eq!(uploader.size(), u64::MAX);
        assert_eq!(uploader.loaded(), half);
        assert_eq!(uploader.progress(), 50);
    }

    #[test]
    fn remove_destroys_queue() {
        let factory = MockFactory::new();
        let target = MockTarget::with_anchors(&["b1"]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());
        uploader.find_or_create("photos", target.clone(), Some(&anchor("b1"))).unwrap();

        assert!(uploader.remove("photos"));
        assert!(!uploader.remove("photos"));
        assert!(uploader.queues().is_empty());
        assert_eq!(factory.engine(0).unbind_count(), 1);
    }

    #[test]
    fn process_pending_drains_every_queue() {
        let factory = MockFactory::new();
        let target = MockTarget::with_anchors(&["b1", "b2"]);
        let mut uploader = Uploader::new(factory.clone(), QueueConfig::default());
        uploader.find_or_create("one", target.clone(), Some(&anchor("b1"))).unwrap();
        uploader.find_or_create("two", target.clone(), Some(&anchor("b2"))).unwrap();

        for n in 0..2 {
            factory.engine(n).emit(EngineEvent::FilesAdded {
                files: vec![RawFile::new(format!("f{n}"), "x", 100)],
            });
        }
        assert_eq!(uploader.process_pending(), 2);
        assert_eq!(uploader.size(), 200);
    }
}
