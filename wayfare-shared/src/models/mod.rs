pub mod events;
pub mod money;
