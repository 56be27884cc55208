//! autoscaler-broker — attach and detach scaling policies.
//!
//! The broker validates a tenant's raw policy JSON, reporting every
//! violation with its property path, then runs the bind saga: the policy
//! is stored as pending, its schedules are registered with the scheduler
//! and only then does it become active. Unbind reverses the steps and is
//! idempotent.

pub mod binding;
pub mod error;
pub mod registrar;
pub mod validation;

pub use binding::BindingService;
pub use error::{BrokerError, BrokerResult, RegistrarError};
pub use registrar::{HttpScheduleRegistrar, ScheduleRegistrar};
pub use validation::{ValidationError, ValidationErrors, validate_policy};
