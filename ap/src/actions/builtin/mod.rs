//! Built-in clinic action handlers

mod appointment;
mod billing;
mod calendar;
mod messaging;

pub use appointment::{MoveAppointmentHandler, SetAppointmentStatusHandler};
pub use billing::{CreateInvoiceHandler, SetInvoiceStatusHandler, VerifyInsuranceHandler};
pub use calendar::{BlockTimeHandler, NoopHandler, UnblockTimeHandler};
pub use messaging::{NotifyPatientHandler, SendReminderHandler};
