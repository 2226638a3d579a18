pub mod css;
pub mod dom;
pub mod html;


pub use html::{ParsedPage, parse_page};
