//! # Palaver I18n
//!
//! Internationalization support using the Fluent localization system.
//!
//! The catalogues for every supported locale are embedded at compile time
//! and parsed once when [`Messages`] is built.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod locale;
pub mod messages;

pub use error::{I18nError, I18nResult};
pub use fluent_bundle::{FluentArgs, FluentValue};
pub use locale::Locale;
pub use messages::{Messages, MESSAGE_IDS};

/// Builds `Option<FluentArgs>` from `key => value` pairs.
#[macro_export]
macro_rules! fluent_args {
    () => {
        None
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut args = $crate::FluentArgs::new();
        $(
            args.set($key, $value);
        )+
        Some(args)
    }};
}
