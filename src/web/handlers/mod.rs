pub mod auth;
pub mod features;
pub mod models;
pub mod results;
pub mod run;
pub mod training;
