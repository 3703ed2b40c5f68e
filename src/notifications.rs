//! Notification dispatch: workflow events → inbox records → external channels.
//!
//! Recording is synchronous and runs on the caller's connection (usually
//! inside the triggering transaction), so the inbox record exists before
//! the request succeeds. Delivery to external channels happens after
//! commit on spawned tasks; failures are logged and dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::enums::{AppointmentStatus, NotificationType};
use crate::models::Notification;

/// Inbox page size returned by `GET /notifications`.
pub const INBOX_LIMIT: u32 = 50;

// ═══════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════

/// Emitted by the state machine for every accepted transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionEvent {
    pub appointment_id: Uuid,
    pub citizen_id: Uuid,
    pub from_status: AppointmentStatus,
    pub to_status: AppointmentStatus,
    pub actor: Uuid,
    pub reason: Option<String>,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    pub timestamp: DateTime<Utc>,
}

/// A new booking entering the `pending` state.
#[derive(Debug, Clone, PartialEq)]
pub struct BookedEvent {
    pub appointment_id: Uuid,
    pub citizen_id: Uuid,
    pub center_id: Uuid,
    pub service_name: String,
    pub appointment_date: NaiveDate,
    pub time_slot: String,
    pub timestamp: DateTime<Utc>,
}

/// Explicit staff request for documents the citizen still has to bring.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingDocumentsEvent {
    pub appointment_id: Uuid,
    pub citizen_id: Uuid,
    pub missing_documents: Vec<String>,
    pub alternatives: Vec<String>,
    pub message: Option<String>,
    pub actor: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Transition(TransitionEvent),
    Booked(BookedEvent),
    MissingDocuments(MissingDocumentsEvent),
}

// ═══════════════════════════════════════════════════════════
// Recording
// ═══════════════════════════════════════════════════════════

fn appointment_notification(
    recipient_id: Uuid,
    title: String,
    message: String,
    meta: serde_json::Value,
    created_at: DateTime<Utc>,
) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        recipient_id,
        notification_type: NotificationType::Appointment,
        title,
        message,
        meta: Some(meta),
        is_read: false,
        created_at,
    }
}

fn transition_copy(event: &TransitionEvent) -> Option<(String, String)> {
    let when = format!(
        "{} at {}",
        event.appointment_date.format("%d %b %Y"),
        event.time_slot
    );
    let copy = match event.to_status {
        AppointmentStatus::Confirmed => (
            "Appointment confirmed".to_string(),
            format!("Your appointment on {when} has been confirmed. Please bring the selected documents."),
        ),
        AppointmentStatus::InProgress => (
            "Appointment in progress".to_string(),
            "Staff have started processing your appointment.".to_string(),
        ),
        AppointmentStatus::Completed => (
            "Appointment completed".to_string(),
            format!("Your appointment on {when} has been completed."),
        ),
        AppointmentStatus::Cancelled => {
            let reason = event.reason.as_deref().unwrap_or("").trim();
            (
                format!("Appointment cancelled: {reason}"),
                format!("Your appointment on {when} was cancelled. Reason: {reason}"),
            )
        }
        AppointmentStatus::Pending => return None,
    };
    Some(copy)
}

/// Compose the missing-documents message body.
pub fn missing_documents_message(
    missing: &[String],
    alternatives: &[String],
    message: Option<&str>,
) -> String {
    let mut text = format!(
        "Please bring the following documents to your appointment: {}.",
        missing.join(", ")
    );
    if !alternatives.is_empty() {
        text.push_str(&format!(" Accepted alternatives: {}.", alternatives.join(", ")));
    }
    if let Some(extra) = message.map(str::trim).filter(|m| !m.is_empty()) {
        text.push(' ');
        text.push_str(extra);
    }
    text
}

/// Build and persist the inbox records for `event`.
///
/// Pass the transaction of the triggering operation so records and the
/// state change commit together.
pub fn record(conn: &Connection, event: &NotificationEvent) -> Result<Vec<Notification>, DatabaseError> {
    let notifications = match event {
        NotificationEvent::Transition(e) => match transition_copy(e) {
            Some((title, message)) => vec![appointment_notification(
                e.citizen_id,
                title,
                message,
                json!({
                    "appointmentId": e.appointment_id,
                    "fromStatus": e.from_status,
                    "status": e.to_status,
                }),
                e.timestamp,
            )],
            None => Vec::new(),
        },
        NotificationEvent::Booked(e) => {
            let meta = json!({ "appointmentId": e.appointment_id, "status": "pending" });
            let date = e.appointment_date.format("%d %b %Y");
            let mut items = vec![appointment_notification(
                e.citizen_id,
                "Appointment booked".into(),
                format!(
                    "Your appointment for {} on {date} at {} is awaiting confirmation.",
                    e.service_name, e.time_slot
                ),
                meta.clone(),
                e.timestamp,
            )];
            for staff_user in db::active_staff_user_ids(conn, &e.center_id)? {
                items.push(appointment_notification(
                    staff_user,
                    "New appointment booking".into(),
                    format!("{} booked for {date} at {}.", e.service_name, e.time_slot),
                    meta.clone(),
                    e.timestamp,
                ));
            }
            items
        }
        NotificationEvent::MissingDocuments(e) => vec![appointment_notification(
            e.citizen_id,
            "Documents required".into(),
            missing_documents_message(&e.missing_documents, &e.alternatives, e.message.as_deref()),
            json!({
                "appointmentId": e.appointment_id,
                "missingDocuments": e.missing_documents,
                "alternatives": e.alternatives,
            }),
            e.timestamp,
        )],
    };

    for n in &notifications {
        db::insert_notification(conn, n)?;
    }
    Ok(notifications)
}

// ═══════════════════════════════════════════════════════════
// Inbox
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbox {
    pub notifications: Vec<Notification>,
    pub unread_count: u64,
}

pub fn inbox(conn: &Connection, recipient_id: &Uuid) -> Result<Inbox, DatabaseError> {
    Ok(Inbox {
        notifications: db::list_notifications(conn, recipient_id, INBOX_LIMIT)?,
        unread_count: db::count_unread(conn, recipient_id)?,
    })
}

// ═══════════════════════════════════════════════════════════
// External delivery
// ═══════════════════════════════════════════════════════════

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Channel rejected notification: {0}")]
    Rejected(String),
}

pub type DeliveryFuture<'a> = Pin<Box<dyn Future<Output = Result<(), DeliveryError>> + Send + 'a>>;

/// Outbound channel (email/SMS gateway, webhook...).
pub trait DeliveryChannel: Send + Sync {
    fn name(&self) -> &str;
    fn deliver<'a>(&'a self, notification: &'a Notification) -> DeliveryFuture<'a>;
}

/// Posts each notification as JSON to a configured URL.
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url: url.into(),
        }
    }
}

impl DeliveryChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn deliver<'a>(&'a self, notification: &'a Notification) -> DeliveryFuture<'a> {
        Box::pin(async move {
            let response = self.client.post(&self.url).json(notification).send().await?;
            if !response.status().is_success() {
                return Err(DeliveryError::Rejected(response.status().to_string()));
            }
            Ok(())
        })
    }
}

/// Fans recorded notifications out to external channels, best effort.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    channels: Vec<Arc<dyn DeliveryChannel>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Spawn one delivery task per channel. Never blocks, never fails.
    pub fn deliver(&self, notifications: Vec<Notification>) {
        if self.channels.is_empty() || notifications.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime, skipping external notification delivery");
            return;
        };
        let notifications = Arc::new(notifications);
        for channel in &self.channels {
            let channel = Arc::clone(channel);
            let notifications = Arc::clone(&notifications);
            runtime.spawn(async move {
                for n in notifications.iter() {
                    if let Err(e) = channel.deliver(n).await {
                        tracing::warn!(
                            channel = channel.name(),
                            notification_id = %n.id,
                            "Notification delivery failed: {e}"
                        );
                    }
                }
            });
        }
    }
}
