pub mod api;
pub mod events;
pub mod images;
pub mod tags;
