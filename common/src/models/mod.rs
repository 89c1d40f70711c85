//! Shared data models for the service tester.

pub mod binding;
pub mod connection;
pub mod operation;
pub mod resources;

// Re-export commonly used types
pub use binding::ServiceBinding;
pub use connection::{ConnectionDescriptor, ServiceKind, ServiceStatus};
pub use operation::{Operation, OperationResult, TestParams};
pub use resources::{KeyInfo, KeyListing, QueueInfo, QueueListing, TableData, TableInfo, TableListing};
