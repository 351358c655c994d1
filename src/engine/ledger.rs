use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Authoritative in-memory state of one venue: bookings, employees, shifts.
///
/// Bookings and shifts are kept sorted by `span.start` so overlap queries can
/// skip everything that starts at or after the query end.
#[derive(Debug, Default)]
pub struct Ledger {
    bookings: Vec<Booking>,
    employees: HashMap<Ulid, Employee>,
    shifts: Vec<Shift>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.bookings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bookings.is_empty()
    }

    /// Store a booking as-is. Callers validate first.
    pub fn insert(&mut self, booking: Booking) -> Ulid {
        let id = booking.id;
        let pos = self
            .bookings
            .partition_point(|b| b.span.start <= booking.span.start);
        self.bookings.insert(pos, booking);
        id
    }

    pub fn delete(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    /// Confirming clears the provisional expiry.
    pub fn update_status(&mut self, id: Ulid, status: BookingStatus) -> Result<(), EngineError> {
        let booking = self
            .bookings
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or(EngineError::NotFound(id))?;
        booking.status = status;
        if status == BookingStatus::Confirmed {
            booking.provisional_expires_at = None;
        }
        Ok(())
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn list_all(&self) -> Vec<Booking> {
        self.bookings.clone()
    }

    pub fn bookings(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter()
    }

    /// Bookings whose span overlaps `query`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.overlaps(query))
    }

    // ── Employees ────────────────────────────────────────────

    pub fn employee_count(&self) -> usize {
        self.employees.len()
    }

    pub fn insert_employee(&mut self, employee: Employee) {
        self.employees.insert(employee.id, employee);
    }

    pub fn employee(&self, id: Ulid) -> Option<&Employee> {
        self.employees.get(&id)
    }

    pub fn set_standby(&mut self, id: Ulid, standby: bool) -> Result<(), EngineError> {
        let employee = self.employees.get_mut(&id).ok_or(EngineError::NotFound(id))?;
        employee.standby = standby;
        Ok(())
    }

    /// Employees in id order (ULIDs sort by creation time).
    pub fn employees(&self) -> Vec<Employee> {
        let mut all: Vec<Employee> = self.employees.values().cloned().collect();
        all.sort_by_key(|e| e.id);
        all
    }

    // ── Shifts ───────────────────────────────────────────────

    pub fn shift_count(&self) -> usize {
        self.shifts.len()
    }

    pub fn insert_shift(&mut self, shift: Shift) {
        let pos = self.shifts.partition_point(|s| s.span.start <= shift.span.start);
        self.shifts.insert(pos, shift);
    }

    pub fn shifts(&self) -> Vec<Shift> {
        self.shifts.clone()
    }

    pub fn shifts_overlapping(&self, query: &Span) -> impl Iterator<Item = &Shift> {
        let right_bound = self.shifts.partition_point(|s| s.span.start < query.end);
        self.shifts[..right_bound]
            .iter()
            .filter(move |s| s.span.overlaps(query))
    }

    // ── Event application ────────────────────────────────────

    /// The single mutation path, shared by live writes and WAL replay.
    pub fn apply(&mut self, event: &Event) {
        match event {
            Event::BookingAdmitted {
                booking,
                superseded,
            } => {
                for id in superseded {
                    self.delete(*id);
                }
                self.insert(booking.clone());
            }
            Event::ProvisionalsConfirmed { ids } => {
                for id in ids {
                    // Replay of a compacted log may name bookings that no longer exist.
                    let _ = self.update_status(*id, BookingStatus::Confirmed);
                }
            }
            Event::EmployeeCreated { employee } => self.insert_employee(employee.clone()),
            Event::StandbyChanged { id, standby } => {
                let _ = self.set_standby(*id, *standby);
            }
            Event::ShiftCreated { shift } => self.insert_shift(shift.clone()),
        }
    }

    /// Minimal event list that rebuilds this ledger from empty.
    pub fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::with_capacity(
            self.employees.len() + self.shifts.len() + self.bookings.len(),
        );
        for employee in self.employees() {
            events.push(Event::EmployeeCreated { employee });
        }
        for shift in &self.shifts {
            events.push(Event::ShiftCreated {
                shift: shift.clone(),
            });
        }
        for booking in &self.bookings {
            events.push(Event::BookingAdmitted {
                booking: booking.clone(),
                superseded: Vec::new(),
            });
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(start: Ms, end: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            customer_name: "Ada".into(),
            contact: None,
            notes: None,
            span: Span::new(start, end),
            party_size: 2,
            status,
            created_at: 0,
            provisional_expires_at: match status {
                BookingStatus::Provisional => Some(60_000),
                BookingStatus::Confirmed => None,
            },
        }
    }

    fn shift(start: Ms, end: Ms) -> Shift {
        Shift {
            id: Ulid::new(),
            employee_id: Ulid::new(),
            span: Span::new(start, end),
        }
    }

    #[test]
    fn insert_keeps_start_order() {
        let mut ledger = Ledger::new();
        ledger.insert(booking(300, 400, BookingStatus::Confirmed));
        ledger.insert(booking(100, 200, BookingStatus::Provisional));
        ledger.insert(booking(200, 300, BookingStatus::Provisional));
        let starts: Vec<Ms> = ledger.list_all().iter().map(|b| b.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn delete_returns_removed_booking() {
        let mut ledger = Ledger::new();
        let b = booking(100, 200, BookingStatus::Provisional);
        let id = ledger.insert(b.clone());
        assert_eq!(ledger.delete(id), Some(b));
        assert!(ledger.is_empty());
        assert_eq!(ledger.delete(id), None);
    }

    #[test]
    fn update_status_clears_expiry_on_confirm() {
        let mut ledger = Ledger::new();
        let id = ledger.insert(booking(100, 200, BookingStatus::Provisional));
        ledger.update_status(id, BookingStatus::Confirmed).unwrap();
        let b = ledger.get(id).unwrap();
        assert_eq!(b.status, BookingStatus::Confirmed);
        assert_eq!(b.provisional_expires_at, None);
    }

    #[test]
    fn update_status_unknown_id() {
        let mut ledger = Ledger::new();
        let result = ledger.update_status(Ulid::new(), BookingStatus::Confirmed);
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn overlapping_skips_past_future_and_adjacent() {
        let mut ledger = Ledger::new();
        ledger.insert(booking(100, 200, BookingStatus::Confirmed)); // ends at query start
        ledger.insert(booking(450, 600, BookingStatus::Provisional));
        ledger.insert(booking(0, 10_000, BookingStatus::Provisional)); // spans the query
        ledger.insert(booking(800, 900, BookingStatus::Confirmed)); // starts at query end

        let hits: Vec<Span> = ledger
            .overlapping(&Span::new(200, 800))
            .map(|b| b.span)
            .collect();
        assert_eq!(hits, vec![Span::new(0, 10_000), Span::new(450, 600)]);
    }

    #[test]
    fn overlapping_empty_ledger() {
        let ledger = Ledger::new();
        assert_eq!(ledger.overlapping(&Span::new(0, 1000)).count(), 0);
    }

    #[test]
    fn shifts_overlapping_uses_half_open_test() {
        let mut ledger = Ledger::new();
        ledger.insert_shift(shift(0, 100));
        ledger.insert_shift(shift(50, 150));
        ledger.insert_shift(shift(150, 300));
        assert_eq!(ledger.shifts_overlapping(&Span::new(100, 150)).count(), 1);
        assert_eq!(ledger.shifts_overlapping(&Span::new(0, 400)).count(), 3);
    }

    #[test]
    fn apply_admission_supersedes_in_one_step() {
        let mut ledger = Ledger::new();
        let loser = booking(100, 200, BookingStatus::Provisional);
        ledger.apply(&Event::BookingAdmitted {
            booking: loser.clone(),
            superseded: vec![],
        });
        let winner = booking(150, 250, BookingStatus::Provisional);
        ledger.apply(&Event::BookingAdmitted {
            booking: winner.clone(),
            superseded: vec![loser.id],
        });
        assert_eq!(ledger.list_all(), vec![winner]);
    }

    #[test]
    fn apply_confirmation_tolerates_missing_ids() {
        let mut ledger = Ledger::new();
        let id = ledger.insert(booking(100, 200, BookingStatus::Provisional));
        ledger.apply(&Event::ProvisionalsConfirmed {
            ids: vec![Ulid::new(), id],
        });
        assert!(ledger.get(id).unwrap().is_confirmed());
    }

    #[test]
    fn snapshot_rebuilds_identical_ledger() {
        let mut ledger = Ledger::new();
        let emp = Employee {
            id: Ulid::new(),
            name: "Grace".into(),
            standby: false,
        };
        ledger.insert_employee(emp.clone());
        ledger.set_standby(emp.id, true).unwrap();
        ledger.insert_shift(shift(0, 500));
        ledger.insert(booking(100, 200, BookingStatus::Confirmed));
        ledger.insert(booking(300, 400, BookingStatus::Provisional));

        let mut rebuilt = Ledger::new();
        for event in ledger.snapshot_events() {
            rebuilt.apply(&event);
        }
        assert_eq!(rebuilt.list_all(), ledger.list_all());
        assert_eq!(rebuilt.employees(), ledger.employees());
        assert_eq!(rebuilt.shifts(), ledger.shifts());
        assert!(rebuilt.employee(emp.id).unwrap().standby);
    }
}
