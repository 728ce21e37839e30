pub mod analyzer;
pub mod calibration;
pub mod collection;
pub mod config;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod resolver;

pub use orchardflux_parser as parser;
