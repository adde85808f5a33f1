//! Default value functions for configuration.

use crate::negotiate::DEFAULT_REQUEST_BUDGET;

pub fn default_port() -> u16 {
    6667
}

pub fn default_request_budget() -> usize {
    DEFAULT_REQUEST_BUDGET
}

pub fn default_mechanism() -> String {
    "PLAIN".to_string()
}

pub fn default_username() -> String {
    "capab".to_string()
}

pub fn default_realname() -> String {
    "capab-check".to_string()
}
