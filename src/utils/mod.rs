pub mod constants;
mod timeout;
mod wait_for_element;

pub use timeout::{validate_element_timeout, validate_navigation_timeout};
pub use wait_for_element::wait_for_element;
