//! Stereoscopic rendering interception.
//!
//! The workspace is split by concern:
//!
//! - [`dxbc`] reflects shader bytecode (DXBC `RDEF`, `CTAB`).
//! - [`rules`] holds modification rules, view math and the persisted rule-set format.
//! - [`proxy`] wraps native objects, duplicates resources per eye and dispatches intercepted calls.

#![forbid(unsafe_code)]

pub use parallax_dxbc as dxbc;
pub use parallax_proxy as proxy;
pub use parallax_rules as rules;

pub mod inspect;
