pub mod gateway;
pub mod routes;

pub use gateway::{deliver, Delivered, DeliveryError};
