pub mod anomalies;
pub mod status;
