pub mod address;
pub mod event;
pub mod key;
pub mod lock;
pub mod transaction;
pub mod values;
