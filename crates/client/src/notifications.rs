use chrono::Duration;
use taskhub_realtime::{Identity, Notification};

use crate::config::{chrono_duration, ClientConfig};

/// Task notifications received by this user, newest first.
///
/// Role-targeted notifications are broadcast to every session, so anything
/// not addressed to this user or their role is dropped here.
#[derive(Debug, Clone)]
pub struct NotificationCenter {
    identity: Identity,
    dedup_window: Duration,
    items: Vec<Notification>,
}

impl NotificationCenter {
    pub fn new(identity: Identity, config: &ClientConfig) -> Self {
        Self {
            identity,
            dedup_window: chrono_duration(config.notification_dedup_window),
            items: Vec::new(),
        }
    }

    /// Returns false when the notification is not ours or repeats one seen
    /// within the dedup window.
    pub fn accept(&mut self, notification: Notification) -> bool {
        if !notification.assigned_to.matches(&self.identity) {
            return false;
        }

        let duplicate = self.items.iter().any(|seen| {
            seen.task_id == notification.task_id
                && seen.kind == notification.kind
                && seen.assigned_to == notification.assigned_to
                && (seen.timestamp - notification.timestamp).abs() < self.dedup_window
        });
        if duplicate {
            return false;
        }

        self.items.insert(0, notification);
        self.items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        true
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.items.iter().filter(|item| !item.read).count()
    }

    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|item| item.id == id) {
            Some(item) if !item.read => {
                item.read = true;
                true
            }
            _ => false,
        }
    }

    pub fn mark_all_read(&mut self) -> usize {
        let mut marked = 0;
        for item in self.items.iter_mut().filter(|item| !item.read) {
            item.read = true;
            marked += 1;
        }
        marked
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskhub_realtime::{NotificationType, Recipient, Role, TaskRef, UserId};

    fn note(kind: NotificationType, task: &str, to: Recipient, secs: i64) -> Notification {
        let task = TaskRef {
            task_id: task.to_string(),
            task_title: "Inventory".to_string(),
        };
        Notification::new(kind, &task, "msg", to, Utc::now() + Duration::seconds(secs))
    }

    fn center(user: &str, role: Role) -> NotificationCenter {
        NotificationCenter::new(Identity::new(user, role), &ClientConfig::default())
    }

    #[test]
    fn only_own_and_role_notifications_are_kept() {
        let mut admin = center("a-1", Role::Admin);
        let mut user = center("u-1", Role::User);
        let to_admins = note(NotificationType::TaskCompleted, "t-1", Recipient::admins(), 0);
        let to_user = note(
            NotificationType::TaskAssigned,
            "t-1",
            Recipient::User(UserId::from("u-1")),
            0,
        );

        assert!(admin.accept(to_admins.clone()));
        assert!(!admin.accept(to_user.clone()));
        assert!(!user.accept(to_admins));
        assert!(user.accept(to_user));
    }

    #[test]
    fn repeats_inside_window_are_dropped() {
        let mut center = center("u-1", Role::User);
        let me = Recipient::User(UserId::from("u-1"));

        assert!(center.accept(note(NotificationType::TaskAssigned, "t-1", me.clone(), 0)));
        assert!(!center.accept(note(NotificationType::TaskAssigned, "t-1", me.clone(), 3)));
        assert!(center.accept(note(NotificationType::TaskStatusUpdated, "t-1", me.clone(), 3)));
        assert!(center.accept(note(NotificationType::TaskAssigned, "t-1", me, 10)));
        assert_eq!(center.notifications().len(), 3);
    }

    #[test]
    fn newest_first_with_read_tracking() {
        let mut center = center("u-1", Role::User);
        let me = Recipient::User(UserId::from("u-1"));
        center.accept(note(NotificationType::TaskAssigned, "t-1", me.clone(), 0));
        center.accept(note(NotificationType::TaskAssigned, "t-2", me.clone(), 20));
        center.accept(note(NotificationType::TaskAssigned, "t-3", me, 10));

        let order: Vec<_> = center
            .notifications()
            .iter()
            .map(|n| n.task_id.as_str())
            .collect();
        assert_eq!(order, ["t-2", "t-3", "t-1"]);
        assert_eq!(center.unread_count(), 3);

        let newest = center.notifications()[0].id.clone();
        assert!(center.mark_read(&newest));
        assert!(!center.mark_read(&newest));
        assert_eq!(center.unread_count(), 2);
        assert_eq!(center.mark_all_read(), 2);
        assert_eq!(center.unread_count(), 0);

        center.clear();
        assert!(center.notifications().is_empty());
    }
}
