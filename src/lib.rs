pub mod catalog;
pub mod connect;
pub mod controller;
pub mod demo;
pub mod domain;
pub mod export;
pub mod loader;
pub mod render;
pub mod session;
pub mod store;
pub mod value;
pub mod view;
