//! Stock interceptors

mod journal;
mod namespace;
mod renaming;

pub use journal::LoggingInterceptor;
pub use namespace::{NamespaceUnwrapper, NamespaceWrapper};
pub use renaming::RenamingInterceptor;
