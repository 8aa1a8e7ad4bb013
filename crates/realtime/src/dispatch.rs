use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::events::ServerEvent;
use crate::notification::{Notification, Recipient, TaskEvent};
use crate::registry::ConnectionRegistry;

/// Pushes task notifications to live sessions.
///
/// There is no queue: a notification for a user with no live session is
/// dropped. Role-addressed notifications go to every session and clients
/// keep the ones meant for their role.
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the number of sessions the notification reached.
    pub async fn dispatch(&self, notification: &Notification) -> usize {
        let event = ServerEvent::TaskNotification(notification.clone());
        let delivered = match &notification.assigned_to {
            Recipient::User(user) => self.registry.emit_to_user(user, &event).await,
            Recipient::Role { .. } => self.registry.broadcast(&event, None).await,
        };

        if delivered == 0 {
            debug!(
                notification_id = %notification.id,
                task_id = %notification.task_id,
                "notification target offline, dropped"
            );
        } else {
            info!(
                notification_id = %notification.id,
                kind = ?notification.kind,
                delivered,
                "notification dispatched"
            );
        }
        delivered
    }

    /// Turns a task event into notifications and dispatches each one.
    pub async fn publish(&self, event: &TaskEvent) -> Vec<(Notification, usize)> {
        let mut outcomes = Vec::new();
        for notification in event.notifications(Utc::now()) {
            let delivered = self.dispatch(&notification).await;
            outcomes.push((notification, delivered));
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{NotificationType, TaskRef, TaskStatus};
    use taskhub_auth::{Identity, JwtManager, Role, UserId};
    use tokio::sync::mpsc;

    fn registry() -> Arc<ConnectionRegistry> {
        Arc::new(ConnectionRegistry::new(Arc::new(JwtManager::new(
            "dispatch-test-secret-dispatch",
        ))))
    }

    fn task() -> TaskRef {
        TaskRef {
            task_id: "t-1".to_string(),
            task_title: "Inventory".to_string(),
        }
    }

    #[tokio::test]
    async fn offline_target_gets_nothing_and_nothing_is_kept() {
        let registry = registry();
        let dispatcher = NotificationDispatcher::new(Arc::clone(&registry));

        let outcomes = dispatcher
            .publish(&TaskEvent::Assigned {
                task: task(),
                assignee: UserId::from("u-1"),
                assigned_by: UserId::from("admin-1"),
            })
            .await;
        assert!(outcomes.iter().all(|(_, delivered)| *delivered == 0));

        let (tx, mut rx) = mpsc::channel(4);
        registry
            .admit_identity(tx, Identity::new("u-1", Role::User))
            .await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn role_notification_reaches_everyone() {
        let registry = registry();
        let dispatcher = NotificationDispatcher::new(Arc::clone(&registry));
        let (tx_admin, mut rx_admin) = mpsc::channel(4);
        let (tx_staff, mut rx_staff) = mpsc::channel(4);
        registry
            .admit_identity(tx_admin, Identity::new("admin-1", Role::Admin))
            .await;
        registry
            .admit_identity(tx_staff, Identity::new("u-1", Role::User))
            .await;

        let outcomes = dispatcher
            .publish(&TaskEvent::StatusChanged {
                task: task(),
                assignee: UserId::from("u-1"),
                actor: UserId::from("u-1"),
                actor_role: Role::User,
                status: TaskStatus::Failed,
            })
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].1, 2);
        for rx in [&mut rx_admin, &mut rx_staff] {
            match rx.try_recv().unwrap() {
                ServerEvent::TaskNotification(note) => {
                    assert_eq!(note.kind, NotificationType::TaskFailed)
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }
}
