//! Task notifications and the domain events that produce them.
//!
//! A status change by an admin notifies the assignee only when the admin is
//! not the assignee; a change by anyone else goes to the admin role.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskhub_auth::{Identity, Role, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    TaskAssigned,
    TaskReceived,
    TaskCompleted,
    TaskFailed,
    TaskOverdue,
    TaskCreated,
    TaskStatusUpdated,
}

/// Who a notification is meant for.
///
/// Role-addressed notifications are broadcast to every session and the
/// client decides whether it belongs to the role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipient {
    User(UserId),
    Role { role: Role },
}

impl Recipient {
    pub fn admins() -> Self {
        Recipient::Role { role: Role::Admin }
    }

    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            Recipient::User(user_id) => user_id == &identity.user_id,
            Recipient::Role { role } => role == &identity.role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub task_id: String,
    pub task_title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
    pub assigned_to: Recipient,
}

impl Notification {
    pub fn new(
        kind: NotificationType,
        task: &TaskRef,
        message: impl Into<String>,
        assigned_to: Recipient,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: cuid2::create_id(),
            kind,
            task_id: task.task_id.clone(),
            task_title: task.task_title.clone(),
            message: message.into(),
            timestamp,
            read: false,
            assigned_to,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Failed,
    Overdue,
}

impl TaskStatus {
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "Not started",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Done => "Done",
            TaskStatus::Failed => "Failed",
            TaskStatus::Overdue => "Overdue",
        }
    }

    fn admin_notification_type(&self) -> NotificationType {
        match self {
            TaskStatus::Done => NotificationType::TaskCompleted,
            TaskStatus::Failed => NotificationType::TaskFailed,
            TaskStatus::Overdue => NotificationType::TaskOverdue,
            TaskStatus::Todo | TaskStatus::InProgress => NotificationType::TaskStatusUpdated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub task_id: String,
    pub task_title: String,
}

/// Events raised by the task subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    #[serde(rename_all = "camelCase")]
    Assigned {
        #[serde(flatten)]
        task: TaskRef,
        assignee: UserId,
        assigned_by: UserId,
    },
    #[serde(rename_all = "camelCase")]
    Received {
        #[serde(flatten)]
        task: TaskRef,
        assignee: UserId,
        admin: UserId,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        #[serde(flatten)]
        task: TaskRef,
        assignee: UserId,
        actor: UserId,
        actor_role: Role,
        status: TaskStatus,
    },
}

impl TaskEvent {
    /// Whether `caller` may publish this event. Admins may publish anything;
    /// everyone else only status changes they made themselves and
    /// acknowledgements of their own tasks.
    pub fn publishable_by(&self, caller: &Identity) -> bool {
        if caller.is_admin() {
            return true;
        }
        match self {
            TaskEvent::Assigned { .. } => false,
            TaskEvent::Received { assignee, .. } => assignee == &caller.user_id,
            TaskEvent::StatusChanged {
                actor, actor_role, ..
            } => actor == &caller.user_id && actor_role == &caller.role,
        }
    }

    /// Builds the notifications an event fans out into.
    pub fn notifications(&self, now: DateTime<Utc>) -> Vec<Notification> {
        match self {
            TaskEvent::Assigned {
                task,
                assignee,
                assigned_by,
            } => vec![
                Notification::new(
                    NotificationType::TaskAssigned,
                    task,
                    format!("You have been assigned a new task: {}", task.task_title),
                    Recipient::User(assignee.clone()),
                    now,
                ),
                Notification::new(
                    NotificationType::TaskCreated,
                    task,
                    format!("Task \"{}\" was created and assigned", task.task_title),
                    Recipient::User(assigned_by.clone()),
                    now,
                ),
            ],
            TaskEvent::Received {
                task,
                assignee,
                admin,
            } => vec![Notification::new(
                NotificationType::TaskReceived,
                task,
                format!("{} acknowledged task \"{}\"", assignee, task.task_title),
                Recipient::User(admin.clone()),
                now,
            )],
            TaskEvent::StatusChanged {
                task,
                assignee,
                actor,
                actor_role,
                status,
            } => {
                let mut out = Vec::new();
                if *actor_role == Role::Admin {
                    if actor != assignee {
                        out.push(Notification::new(
                            NotificationType::TaskStatusUpdated,
                            task,
                            format!(
                                "Your task \"{}\" is now: {}",
                                task.task_title,
                                status.label()
                            ),
                            Recipient::User(assignee.clone()),
                            now,
                        ));
                    }
                } else {
                    out.push(Notification::new(
                        status.admin_notification_type(),
                        task,
                        format!(
                            "Task \"{}\" status changed to: {}",
                            task.task_title,
                            status.label()
                        ),
                        Recipient::admins(),
                        now,
                    ));
                }
                out
            }
        }
    }
}
