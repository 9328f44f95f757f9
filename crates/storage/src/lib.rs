pub mod registry;
pub mod store;

pub use registry::{Group, Registry, Session, Tab, TabRef, CURRENT_SCHEMA};
pub use store::StateStore;
