pub mod batch;
pub mod resolve;
pub mod run;
