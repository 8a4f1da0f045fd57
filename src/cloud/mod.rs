//! Cloud provider integrations

pub mod gke;

pub use gke::Gcloud;
