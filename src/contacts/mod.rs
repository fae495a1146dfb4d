pub mod contact;
pub mod contact_manager;
pub(crate) mod contact_solver;

pub use contact::{Contact, ContactHandle, ContactUpdate};
pub use contact_manager::ContactManager;
