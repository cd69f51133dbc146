pub mod geometry;
pub mod message;
pub mod popup_info;
pub mod url_pattern;
