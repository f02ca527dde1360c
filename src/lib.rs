mod database {
    pub mod actions;
    pub mod draft;
    pub mod error;
    pub mod form;
    pub mod import;
    pub mod pagination;
    pub mod schema;
    pub mod shopping_list;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod permissions;
}
mod constants;

pub mod api;
pub mod config;
pub mod storage;

pub use authentication::*;
pub use constants::*;
pub use database::*;
