pub mod appointment;
pub mod enums;
pub mod notification;
pub mod service;
pub mod settings;
pub mod user;

pub use appointment::*;
pub use notification::*;
pub use service::*;
pub use settings::*;
pub use user::*;
