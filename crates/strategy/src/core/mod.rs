pub mod controller;
pub mod flash;
pub mod optimizer;
pub mod position_reader;
pub mod rate_model;
