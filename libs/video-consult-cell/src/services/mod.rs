pub mod binder;
pub mod whereby;

pub use binder::SessionBinder;
pub use whereby::WherebyClient;
