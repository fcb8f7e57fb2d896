pub mod chat;
pub mod composer;
pub mod status_bar;
