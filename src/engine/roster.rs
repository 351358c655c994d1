use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{validate_span, Engine, EngineError};

impl Engine {
    pub async fn create_employee(&self, name: impl Into<String>) -> Result<Employee, EngineError> {
        let name = name.into();
        if name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("employee name too long"));
        }
        let mut ledger = self.ledger.write().await;
        if ledger.employee_count() >= MAX_EMPLOYEES_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many employees"));
        }

        let employee = Employee {
            id: Ulid::new(),
            name,
            standby: false,
        };
        let event = Event::EmployeeCreated {
            employee: employee.clone(),
        };
        self.persist_and_apply(&mut ledger, event).await?;
        tracing::info!(id = %employee.id, name = %employee.name, "employee created");
        Ok(employee)
    }

    pub async fn create_shift(
        &self,
        employee_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Shift, EngineError> {
        let span = validate_span(start, end)?;
        let mut ledger = self.ledger.write().await;
        if ledger.employee(employee_id).is_none() {
            return Err(EngineError::NotFound(employee_id));
        }
        if ledger.shift_count() >= MAX_SHIFTS_PER_VENUE {
            return Err(EngineError::LimitExceeded("too many shifts"));
        }

        let shift = Shift {
            id: Ulid::new(),
            employee_id,
            span,
        };
        let event = Event::ShiftCreated {
            shift: shift.clone(),
        };
        self.persist_and_apply(&mut ledger, event).await?;
        Ok(shift)
    }

    pub async fn set_standby(&self, employee_id: Ulid, standby: bool) -> Result<Employee, EngineError> {
        let mut ledger = self.ledger.write().await;
        if ledger.employee(employee_id).is_none() {
            return Err(EngineError::NotFound(employee_id));
        }
        self.persist_and_apply(&mut ledger, Event::StandbyChanged { id: employee_id, standby })
            .await?;
        ledger
            .employee(employee_id)
            .cloned()
            .ok_or(EngineError::NotFound(employee_id))
    }
}
