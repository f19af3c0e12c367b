pub mod auth_service;
pub mod html_report;
pub mod report_service;
pub mod snapshot_service;
pub mod snapshot_store;
pub mod svg_report;
pub mod xbox_api;
