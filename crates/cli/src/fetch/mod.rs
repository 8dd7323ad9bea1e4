//! Remote collaborators: the CRM source loader and the shared HTTP client.

pub mod common;
pub mod zoho;
