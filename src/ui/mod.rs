pub mod action_icon;
pub mod overlay;
