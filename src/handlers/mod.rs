pub mod auth;
pub mod bookings;
pub mod profile;
pub mod provider;
pub mod reviews;
pub mod services;
