//! The `/authorize` state machine.
//!
//! `ENTRY -> (AUTHENTICATE) -> VALIDATED -> PREAUTH_CHECK -> SILENT_CODE | CONSENT`
//! on GET, and `CONSENT_SUBMITTED -> CODE_ISSUED` on POST. Every terminal
//! redirect clears the client's authz params cookie.

pub mod consent;
pub mod flow;
pub mod params;

pub use flow::{authorize, submit, AuthorizeForm};
