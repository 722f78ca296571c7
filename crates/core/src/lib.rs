pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod signature;
pub mod trigger;

pub use domain::action_log::{ActionKind, ActionLogEntry, ActionLogId, ActionResult};
pub use domain::automation::{Automation, AutomationId, ResponseType, TriggerScope};
pub use domain::contact::{AutoClassification, Contact, ContactId};
pub use domain::integration::{Integration, IntegrationId};
pub use domain::send::{SendContext, SendResult};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use events::{EventDecodeError, SendFailedEvent};
pub use signature::verify_signature;
pub use trigger::match_automation;
