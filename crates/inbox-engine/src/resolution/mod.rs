//! # Resolution Workflow
//!
//! The terminal `assigned → resolved` transition. Teams without a wrap-up
//! form use the default form (a category from a fixed list plus optional
//! notes); teams with a form submit its field values, or skip the wrap-up
//! when the form is not mandatory.
//!
//! Once resolved, a session never re-enters routing. The only later change
//! is the CSAT score attached to its [`Resolution`].

pub mod form;
pub mod types;
pub mod workflow;

pub use form::{FieldKind, WrapUpField, WrapUpForm};
pub use types::{Resolution, ResolutionCategory, ResolveOutcome, ResolveRequest, WrapUpPayload, DEFAULT_OUTCOME};
pub use workflow::{prepare_wrap_up, PreparedWrapUp, ResolutionWorkflow};
