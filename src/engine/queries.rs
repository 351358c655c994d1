use ulid::Ulid;

use crate::model::*;

use super::Engine;

impl Engine {
    pub async fn list_all(&self) -> Vec<Booking> {
        self.ledger.read().await.list_all()
    }

    pub async fn list_provisionals(&self) -> Vec<Booking> {
        self.list_by_status(BookingStatus::Provisional).await
    }

    pub async fn list_by_status(&self, status: BookingStatus) -> Vec<Booking> {
        let ledger = self.ledger.read().await;
        ledger
            .bookings()
            .filter(|b| b.status == status)
            .cloned()
            .collect()
    }

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        self.ledger.read().await.get(id).cloned()
    }

    pub async fn list_employees(&self) -> Vec<Employee> {
        self.ledger.read().await.employees()
    }

    pub async fn list_shifts(&self) -> Vec<Shift> {
        self.ledger.read().await.shifts()
    }
}
