//! Task options, engine settings, and file loading.
mod loader;
mod settings;
mod types;


pub use loader::{load_options, load_settings};
pub use settings::EngineSettings;
pub use types::{
    DataField, FieldKind, Form, HttpOptions, Options, SendData, Step, TcpOptions, TransactionSpec,
};

pub(crate) use loader::load_file;
