use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// `max(s1, s2) < min(e1, e2)`: touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Provisional,
    Confirmed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Provisional => "provisional",
            BookingStatus::Confirmed => "confirmed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "provisional" => Some(BookingStatus::Provisional),
            "confirmed" => Some(BookingStatus::Confirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservation of the venue for a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub customer_name: String,
    pub contact: Option<String>,
    pub notes: Option<String>,
    pub span: Span,
    pub party_size: u32,
    pub status: BookingStatus,
    pub created_at: Ms,
    /// Set only while `status` is provisional.
    pub provisional_expires_at: Option<Ms>,
}

impl Booking {
    pub fn is_confirmed(&self) -> bool {
        self.status == BookingStatus::Confirmed
    }

    /// A provisional whose hold window has not yet elapsed at `now`.
    pub fn is_active_hold(&self, now: Ms) -> bool {
        self.status == BookingStatus::Provisional
            && self.provisional_expires_at.is_some_and(|exp| exp > now)
    }

    /// A provisional whose hold window has elapsed and is waiting for the sweep.
    pub fn is_due(&self, now: Ms) -> bool {
        self.status == BookingStatus::Provisional
            && self.provisional_expires_at.is_some_and(|exp| exp <= now)
    }

    /// Contact to notify on confirmation, if it looks like an email address.
    pub fn email_contact(&self) -> Option<&str> {
        self.contact.as_deref().filter(|c| c.contains('@'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: Ulid,
    pub name: String,
    pub standby: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub id: Ulid,
    pub employee_id: Ulid,
    pub span: Span,
}

/// A validated request for a time-windowed booking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub customer_name: String,
    pub contact: Option<String>,
    pub notes: Option<String>,
    pub start: Ms,
    pub end: Ms,
    pub party_size: u32,
}

impl BookingRequest {
    pub fn new(customer_name: impl Into<String>, start: Ms, end: Ms, party_size: u32) -> Self {
        Self {
            customer_name: customer_name.into(),
            contact: None,
            notes: None,
            start,
            end,
            party_size,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A request without a time window (legacy path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyRequest {
    pub customer_name: String,
    pub contact: Option<String>,
    pub notes: Option<String>,
}

/// A possibly incomplete request, as extracted from free text or the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookingIntake {
    pub customer_name: String,
    pub contact: Option<String>,
    pub notes: Option<String>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub party_size: Option<u32>,
}

/// Which admission path an intake resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Windowed(BookingRequest),
    Legacy(LegacyRequest),
}

impl BookingIntake {
    /// Both times present ⇒ windowed; either missing ⇒ legacy. Party size defaults to 1.
    pub fn into_admission(self) -> Admission {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Admission::Windowed(BookingRequest {
                customer_name: self.customer_name,
                contact: self.contact,
                notes: self.notes,
                start,
                end,
                party_size: self.party_size.unwrap_or(1),
            }),
            _ => Admission::Legacy(LegacyRequest {
                customer_name: self.customer_name,
                contact: self.contact,
                notes: self.notes,
            }),
        }
    }
}

/// Outcome of one finalization sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    pub promoted: Vec<Ulid>,
    /// Expired provisionals left pending behind a confirmed conflict.
    pub blocked: Vec<Ulid>,
}

/// WAL record format. Flat, no nesting beyond the records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// A booking entered the ledger; `superseded` provisionals left it in the same step.
    BookingAdmitted {
        booking: Booking,
        superseded: Vec<Ulid>,
    },
    ProvisionalsConfirmed {
        ids: Vec<Ulid>,
    },
    EmployeeCreated {
        employee: Employee,
    },
    StandbyChanged {
        id: Ulid,
        standby: bool,
    },
    ShiftCreated {
        shift: Shift,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provisional(expires_at: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            customer_name: "Ada".into(),
            contact: None,
            notes: None,
            span: Span::new(1000, 2000),
            party_size: 2,
            status: BookingStatus::Provisional,
            created_at: 0,
            provisional_expires_at: Some(expires_at),
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
        assert!(s.contains_instant(100));
        assert!(s.contains_instant(199));
        assert!(!s.contains_instant(200)); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        let inner = Span::new(120, 130);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(a.overlaps(&inner));
        assert!(!a.overlaps(&c)); // touching, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn status_parse_and_display() {
        assert_eq!(BookingStatus::parse("Provisional"), Some(BookingStatus::Provisional));
        assert_eq!(BookingStatus::parse("confirmed"), Some(BookingStatus::Confirmed));
        assert_eq!(BookingStatus::parse("cancelled"), None);
        assert_eq!(BookingStatus::Confirmed.to_string(), "confirmed");
    }

    #[test]
    fn hold_activity_is_strict_at_expiry() {
        let b = provisional(5000);
        assert!(b.is_active_hold(4999));
        assert!(!b.is_active_hold(5000));
        assert!(b.is_due(5000));
        assert!(!b.is_due(4999));
    }

    #[test]
    fn confirmed_is_neither_active_nor_due() {
        let mut b = provisional(5000);
        b.status = BookingStatus::Confirmed;
        b.provisional_expires_at = None;
        assert!(!b.is_active_hold(0));
        assert!(!b.is_due(10_000));
    }

    #[test]
    fn email_contact_requires_at_sign() {
        let mut b = provisional(0);
        assert_eq!(b.email_contact(), None);
        b.contact = Some("555-0100".into());
        assert_eq!(b.email_contact(), None);
        b.contact = Some("ada@example.com".into());
        assert_eq!(b.email_contact(), Some("ada@example.com"));
    }

    #[test]
    fn intake_with_times_is_windowed() {
        let intake = BookingIntake {
            customer_name: "Ada".into(),
            start: Some(1000),
            end: Some(2000),
            ..Default::default()
        };
        match intake.into_admission() {
            Admission::Windowed(req) => {
                assert_eq!(req.party_size, 1);
                assert_eq!((req.start, req.end), (1000, 2000));
            }
            other => panic!("expected windowed, got {other:?}"),
        }
    }

    #[test]
    fn intake_missing_a_time_is_legacy() {
        let intake = BookingIntake {
            customer_name: "Ada".into(),
            start: Some(1000),
            party_size: Some(4),
            notes: Some("window seat".into()),
            ..Default::default()
        };
        match intake.into_admission() {
            Admission::Legacy(req) => {
                assert_eq!(req.customer_name, "Ada");
                assert_eq!(req.notes.as_deref(), Some("window seat"));
            }
            other => panic!("expected legacy, got {other:?}"),
        }
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BookingAdmitted {
            booking: provisional(9000),
            superseded: vec![Ulid::new()],
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
