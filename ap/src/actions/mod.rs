//! Step action handlers and the in-memory clinic they mutate

mod builtin;
mod context;
mod error;
mod executor;
mod traits;

pub use builtin::{
    BlockTimeHandler, CreateInvoiceHandler, MoveAppointmentHandler, NoopHandler, NotifyPatientHandler,
    SendReminderHandler, SetAppointmentStatusHandler, SetInvoiceStatusHandler, UnblockTimeHandler,
    VerifyInsuranceHandler,
};
pub use context::{ActionContext, Clinic, ClinicState, Notification, NotificationKind};
pub use error::ActionError;
pub use executor::ActionExecutor;
pub use traits::{ActionHandler, ActionOutcome};
