//! Publication of stepped link poses to consumers outside the physics thread.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{LinkId, Model, Transform};
use crate::utils::{Arena, ModelId};

use super::state::Kinematics;
use super::system::{BodyRole, MultibodySystem};

/// Identifies a link across the world's models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkHandle {
    pub model: ModelId,
    pub link: LinkId,
}

/// One pending pose change of a link.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseUpdate {
    pub link: LinkHandle,
    /// World pose of the link frame.
    pub pose: Transform,
}

/// Shared list of pose updates awaiting a consumer.
///
/// The inner lock is only held to push or swap out the list, never across a
/// physics step, so draining never stalls the stepping thread for long.
#[derive(Debug, Clone, Default)]
pub struct PoseQueue {
    inner: Arc<Mutex<Vec<PoseUpdate>>>,
}

impl PoseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, update: PoseUpdate) {
        self.inner.lock().push(update);
    }

    pub fn publish_all(&self, updates: impl IntoIterator<Item = PoseUpdate>) {
        self.inner.lock().extend(updates);
    }

    /// Takes every pending update, leaving the queue empty.
    pub fn drain(&self) -> Vec<PoseUpdate> {
        std::mem::take(&mut *self.inner.lock())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Writes master body poses back into their links and enqueues them.
///
/// Links of static models publish their fixed ground pose.
pub fn synchronize(
    system: &MultibodySystem,
    kin: &Kinematics,
    models: &mut Arena<Model>,
    queue: &PoseQueue,
) -> usize {
    let mut updates = Vec::with_capacity(system.num_masters() + system.grounded.len());

    for (i, body) in system.mobilized() {
        let BodyRole::Master { model, link } = body.role else {
            continue;
        };
        let pose = kin.poses[i];
        if let Some(target) = models.get_mut(model).and_then(|m| m.link_mut(link)) {
            target.world_pose = pose;
        }
        updates.push(PoseUpdate {
            link: LinkHandle { model, link },
            pose,
        });
    }

    for grounded in &system.grounded {
        if let Some(target) = models
            .get_mut(grounded.model)
            .and_then(|m| m.link_mut(grounded.link))
        {
            target.world_pose = grounded.pose;
        }
        updates.push(PoseUpdate {
            link: LinkHandle {
                model: grounded.model,
                link: grounded.link,
            },
            pose: grounded.pose,
        });
    }

    let count = updates.len();
    queue.publish_all(updates);
    count
}
