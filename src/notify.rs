use std::sync::Arc;

use async_trait::async_trait;

use crate::model::Booking;
use crate::observability::NOTIFICATIONS_TOTAL;

/// Outbound channel for customer notifications (email, SMS gateway, ...).
///
/// `send` reports whether the message was accepted. Failures are never
/// propagated to booking operations.
#[async_trait]
pub trait NotificationSender: Send + Sync + 'static {
    async fn send(&self, contact: &str, subject: &str, body: &str) -> bool;
}

/// Writes each message to the log and reports success.
#[derive(Debug, Default)]
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(&self, contact: &str, subject: &str, body: &str) -> bool {
        tracing::info!(to = contact, subject, body, "notification");
        true
    }
}

/// No delivery configured: every send is declined.
#[derive(Debug, Default)]
pub struct NoopSender;

#[async_trait]
impl NotificationSender for NoopSender {
    async fn send(&self, _contact: &str, _subject: &str, _body: &str) -> bool {
        false
    }
}

/// Fire-and-forget delivery of booking notifications.
#[derive(Clone)]
pub struct Dispatcher {
    sender: Arc<dyn NotificationSender>,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn NotificationSender>) -> Self {
        Self { sender }
    }

    /// `log` or `none`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "log" => Some(Self::new(Arc::new(LogSender))),
            "none" | "noop" | "off" => Some(Self::new(Arc::new(NoopSender))),
            _ => None,
        }
    }

    /// Tell the customer a booking is confirmed, if their contact is an email
    /// address. Spawns the send and returns immediately; must run inside a
    /// tokio runtime.
    pub fn booking_confirmed(&self, booking: &Booking) {
        let Some(contact) = booking.email_contact() else {
            return;
        };
        let contact = contact.to_string();
        let subject = format!("Booking confirmed #{}", booking.id);
        let body = format!(
            "Your booking for {} is confirmed.",
            booking.span.start
        );
        let id = booking.id;
        let sender = self.sender.clone();

        tokio::spawn(async move {
            if sender.send(&contact, &subject, &body).await {
                metrics::counter!(NOTIFICATIONS_TOTAL, "outcome" => "sent").increment(1);
            } else {
                tracing::warn!(booking = %id, to = %contact, "confirmation notification not delivered");
                metrics::counter!(NOTIFICATIONS_TOTAL, "outcome" => "failed").increment(1);
            }
        });
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(LogSender))
    }
}
