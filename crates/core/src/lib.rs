pub mod config;
pub mod error;
pub mod record;

pub use config::Config;
pub use error::*;
pub use record::*;

#[doc(hidden)]
pub mod __private {
    pub use serde_json;
}
