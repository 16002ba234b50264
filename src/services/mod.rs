// Workflow services
pub mod coupons;
pub mod invoices;
pub mod parts;
pub mod service_visits;
pub mod warranties;
pub mod warranty_sync;

// Collaborators shared by the workflow services
pub mod activity;
pub mod locks;
pub mod media;
pub mod notifications;
pub mod sequences;
