mod service;
mod session;

pub use crate::error::ProgressServiceError;
pub use service::{OpenedModule, ProgressService, SectionOutcome};
pub use session::{ModuleSession, PersistenceWarning, Reconciliation, RefreshTicket};
