//! Alert notification: recipients, message composition and delivery.

pub mod dispatch;
pub mod message;
pub mod recipients;
pub mod transport;

// Re-export commonly used types
pub use dispatch::{DispatchReport, Notifier};
pub use message::compose_alert;
pub use recipients::{
    parse_address_list, resolve_recipients, DirectoryDocument, DirectoryError, FileDirectory,
    Profile, RecipientDefaults, RecipientDirectory, StaticDirectory,
};
pub use transport::{
    ConsoleTransport, Notification, NotificationTransport, OutboxEntry, OutboxTransport,
    TransportError,
};
