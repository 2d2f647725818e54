//! Content module catalog, typed views and user content persistence for Prismtone.

mod catalog;
mod i18n;
mod info;
mod loader;
mod registry;
mod repository;
mod settings;
mod updater;
mod validator;
mod views;

pub use catalog::*;
pub use i18n::*;
pub use info::*;
pub use loader::*;
pub use registry::*;
pub use repository::*;
pub use settings::*;
pub use updater::*;
pub use validator::*;
pub use views::*;
