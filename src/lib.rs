// Export modules for use in tests
pub mod host;
pub mod panic_handler;
pub mod pdf;
pub mod settings;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use host::{Host, UploadPolicy, UploadedFile};
pub use pdf::{DocumentSource, SessionConfig, SourceMode, ViewerSession};
pub use settings::Settings;
