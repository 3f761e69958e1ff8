//! `sendwatch-auth`: client-side capability checks for campaign commands.
//!
//! This crate is intentionally decoupled from HTTP and storage. The checks
//! here gate the UI only; the execution engine re-checks every command.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{authorize_edit, can_edit, AuthzError};
pub use permissions::Permission;
pub use principal::{Capabilities, CurrentUser};
pub use roles::Role;
