// Application layer - Use cases and the ports they depend on
pub mod grafana_api;
pub mod image_acquisition;
pub mod report;
pub mod report_service;
