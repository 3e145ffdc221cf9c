pub mod dispatch;

pub use dispatch::NotificationDispatcher;
