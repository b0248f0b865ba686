pub mod adaptation;
pub mod calibration;
pub mod config;
pub mod csv_io;
pub mod diagnostics;
pub mod features;
pub mod logging;
pub mod match_record;
pub mod nuts;
pub mod pipeline;
pub mod posterior;
pub mod rating_model;
pub mod sampler;
pub mod simulate;
